//! YouTube解析器
//!
//! 元数据与直链来自 yt-dlp。超过时长上限的视频只给出缩略图。

use async_trait::async_trait;
use regex::Captures;

use super::ytdlp::{audio_stream, video_stream, YtDlp, YtVideoInfo};
use super::Parser;
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, Session,
};
use crate::services::matcher::Signature;

fn canonical_url(resource_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", resource_id)
}

fn video_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| m.as_str().to_string())
}

/// YouTube链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Youtube, canonical_url)
        .canonical("youtu.be", r"youtu\.be/(?P<id>[A-Za-z0-9_-]{11})", video_id)?
        .canonical(
            "youtube.com/watch",
            r"youtube\.com/watch\?(?:\S*?&)?v=(?P<id>[A-Za-z0-9_-]{11})",
            video_id,
        )?
        .canonical(
            "youtube.com/shorts",
            r"youtube\.com/shorts/(?P<id>[A-Za-z0-9_-]{11})",
            video_id,
        )
}

/// 由 yt-dlp 元数据组装提取结果
///
/// # 参数
/// - `max_duration_secs`: 视频时长上限,超过时不输出视频流
/// - `audio_only`: 仅输出缩略图与音频
pub fn assemble(info: &YtVideoInfo, max_duration_secs: u64, audio_only: bool) -> RawExtraction {
    let mut raw = info.base_extraction();
    let within_limit = info.duration_secs() <= max_duration_secs;

    if audio_only || !within_limit {
        if let Some(thumbnail) = &info.thumbnail {
            raw = raw.with_image(thumbnail.clone());
        }
    }
    if !audio_only && within_limit {
        if let Some(stream) = info.best_muxed().and_then(video_stream) {
            raw = raw.with_video(stream);
        }
    }
    if audio_only || within_limit {
        if let Some(stream) = info.best_audio().and_then(audio_stream) {
            raw = raw.with_audio(stream);
        }
    }
    raw
}

/// YouTube解析器
pub struct YoutubeParser {
    ytdlp: YtDlp,
    max_duration_secs: u64,
}

impl YoutubeParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ytdlp: YtDlp::new(config, &PlatformId::Youtube),
            max_duration_secs: config.max_duration_secs,
        })
    }

    pub fn with_ytdlp(mut self, ytdlp: YtDlp) -> Self {
        self.ytdlp = ytdlp;
        self
    }

    async fn extract(
        &self,
        canonical: &CanonicalLink,
        audio_only: bool,
    ) -> Result<RawExtraction, ApiError> {
        let info = self.ytdlp.extract_info(&canonical.canonical_url).await?;
        if info.duration_secs() > self.max_duration_secs {
            tracing::info!(
                video_id = %canonical.resource_id,
                duration = info.duration_secs(),
                limit = self.max_duration_secs,
                "Video exceeds duration limit"
            );
        }
        Ok(assemble(&info, self.max_duration_secs, audio_only))
    }
}

#[async_trait]
impl Parser for YoutubeParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Youtube
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        self.extract(canonical, false).await
    }

    async fn handle_audio(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        self.extract(canonical, true).await
    }
}
