//! TikTok解析器,通过 yt-dlp 提取

use async_trait::async_trait;
use regex::Captures;

use super::ytdlp::{video_stream, YtDlp};
use super::Parser;
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::matcher::Signature;

/// yt-dlp 接受省略用户名的视频地址
fn canonical_url(resource_id: &str) -> String {
    format!("https://www.tiktok.com/@/video/{}", resource_id)
}

fn video_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| m.as_str().to_string())
}

/// TikTok链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Tiktok, canonical_url)
        .short_link("tiktok.com", r"v[tm]\.tiktok\.com/[A-Za-z0-9]+")?
        .canonical(
            "tiktok.com/@",
            r"tiktok\.com/@[\w.-]*/video/(?P<id>\d+)",
            video_id,
        )
}

/// TikTok解析器
pub struct TiktokParser {
    ytdlp: YtDlp,
}

impl TiktokParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ytdlp: YtDlp::new(config, &PlatformId::Tiktok),
        })
    }

    pub fn with_ytdlp(mut self, ytdlp: YtDlp) -> Self {
        self.ytdlp = ytdlp;
        self
    }
}

#[async_trait]
impl Parser for TiktokParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Tiktok
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let info = self.ytdlp.extract_info(&canonical.canonical_url).await?;
        let mut raw = info.base_extraction();

        // TikTok 的直链通常只有音视频合一的格式
        let stream = info.best_muxed().and_then(video_stream).or_else(|| {
            info.formats
                .iter()
                .rev()
                .find(|f| f.has_video())
                .and_then(|f| f.url.clone())
                .map(RawStream::new)
        });
        if let Some(stream) = stream {
            raw = raw.with_video(stream);
        }
        Ok(raw)
    }
}
