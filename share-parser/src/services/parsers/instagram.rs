//! Instagram解析器
//!
//! 视频与多图帖子中的视频条目由 yt-dlp 提取。纯图片帖子 yt-dlp 无法处理,
//! 改用 `gallery-dl -j` 列出图片地址。

use async_trait::async_trait;
use regex::Captures;
use serde_json::Value;
use std::path::PathBuf;
use tokio::process::Command;

use super::ytdlp::{audio_stream, video_stream, YtDlp, YtVideoInfo};
use super::Parser;
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::matcher::Signature;

fn canonical_url(resource_id: &str) -> String {
    format!("https://www.instagram.com/{}/", resource_id)
}

/// `reels` 与 `reel` 指向同一资源
fn post_id(caps: &Captures<'_>) -> Option<String> {
    let kind = match caps.name("kind")?.as_str() {
        "reels" => "reel",
        other => other,
    };
    Some(format!("{}/{}", kind, caps.name("code")?.as_str()))
}

/// Instagram链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Instagram, canonical_url)
        .short_link(
            "instagram.com/share",
            r"instagram\.com/share/(?:p/|reel/)?[A-Za-z0-9_-]+",
        )?
        .canonical(
            "instagram.com",
            r"instagram\.com/(?P<kind>p|reels?|tv)/(?P<code>[A-Za-z0-9_-]+)",
            post_id,
        )?
        .canonical(
            "instagr.am",
            r"instagr\.am/(?P<kind>p|reels?|tv)/(?P<code>[A-Za-z0-9_-]+)",
            post_id,
        )
}

/// 单个条目的视频流
///
/// 优先分离的音视频 (视频附带音轨地址),其次音视频合一格式,最后条目自身的地址。
fn entry_stream(entry: &YtVideoInfo) -> Option<RawStream> {
    if let (Some(video), Some(audio)) = (entry.best_video_only(), entry.best_audio()) {
        let audio_url = audio_stream(audio)?.url;
        return video_stream(video).map(|s| s.with_companion_audio(audio_url));
    }
    if let Some(stream) = entry.best_muxed().and_then(video_stream) {
        return Some(stream);
    }
    entry.direct_video_url().map(RawStream::new)
}

/// 由 yt-dlp 条目组装提取结果,元数据取第一个条目
pub fn assemble(entries: &[YtVideoInfo]) -> RawExtraction {
    let Some(first) = entries.first() else {
        return RawExtraction::new();
    };
    let mut raw = first.base_extraction();
    for stream in entries.iter().filter_map(entry_stream) {
        raw = raw.with_video(stream);
    }
    raw
}

fn unescape(url: &str) -> String {
    url.replace("&amp;", "&")
}

/// 解析 `gallery-dl -j` 输出中的图片地址
///
/// 输出为消息数组: `[3, url, meta]` 为文件,`[-1, {"message": ..}]` 为错误。
/// 整体不是合法JSON时按行解析。
///
/// # 错误
/// 返回 `ApiError::ContentUnavailable` 如果没有任何图片地址
pub fn gallery_image_urls(output: &str) -> Result<Vec<String>, ApiError> {
    let items: Vec<Value> = match serde_json::from_str::<Value>(output.trim()) {
        Ok(Value::Array(items)) => items,
        Ok(other) => vec![other],
        Err(_) => output
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect(),
    };

    let mut urls = Vec::new();
    let mut errors = Vec::new();
    for item in &items {
        let url = match item {
            Value::Array(msg) => match (msg.first().and_then(Value::as_i64), msg.get(1)) {
                (Some(3), Some(Value::String(url))) => Some(url.as_str()),
                (Some(3), Some(meta @ Value::Object(_))) => super::str_at(meta, "/url")
                    .or_else(|| super::str_at(meta, "/display_url")),
                (Some(-1), Some(meta)) => {
                    if let Some(message) = super::str_at(meta, "/message") {
                        errors.push(message.to_string());
                    }
                    None
                }
                _ => None,
            },
            Value::Object(_) => {
                super::str_at(item, "/url").or_else(|| super::str_at(item, "/display_url"))
            }
            _ => None,
        };
        if let Some(url) = url {
            urls.push(unescape(url));
        }
    }

    if urls.is_empty() {
        let reason = errors
            .into_iter()
            .next()
            .unwrap_or_else(|| "gallery-dl 未返回图片链接".to_string());
        return Err(ApiError::ContentUnavailable(reason));
    }
    Ok(urls)
}

/// gallery-dl 调用器
#[derive(Debug, Clone)]
pub struct GalleryDl {
    binary: Option<PathBuf>,
    cookies_file: Option<PathBuf>,
    proxy: Option<String>,
}

impl GalleryDl {
    pub fn new(config: &ParserConfig) -> Self {
        let binary = config
            .gallery_dl_path
            .clone()
            .or_else(|| which::which("gallery-dl").ok());
        if binary.is_none() {
            tracing::warn!("gallery-dl not found, Instagram image posts will fail");
        }
        Self {
            binary,
            cookies_file: config.instagram_cookies_file.clone(),
            proxy: config.proxy_for(&PlatformId::Instagram).map(str::to_string),
        }
    }

    fn args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["-j".to_string()];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args.push(url.to_string());
        args
    }

    /// 列出帖子中的图片地址
    ///
    /// # 错误
    /// - `ApiError::CommandFailed`: 找不到 gallery-dl、进程启动失败或非零退出
    /// - `ApiError::ContentUnavailable`: 输出中没有图片
    pub async fn image_urls(&self, url: &str) -> Result<Vec<String>, ApiError> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| ApiError::CommandFailed("未找到 gallery-dl 可执行文件".to_string()))?;

        let output = Command::new(binary)
            .args(self.args(url))
            .output()
            .await
            .map_err(|e| {
                tracing::error!(binary = %binary.display(), error = %e, "Failed to execute gallery-dl");
                ApiError::CommandFailed(format!("gallery-dl 启动失败: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(url = %url, stderr = %stderr, "gallery-dl exited with failure");
            return Err(ApiError::CommandFailed(format!(
                "gallery-dl 解析失败: {}",
                stderr.trim()
            )));
        }

        gallery_image_urls(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Instagram解析器
pub struct InstagramParser {
    ytdlp: YtDlp,
    gallery: GalleryDl,
}

impl InstagramParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ytdlp: YtDlp::new(config, &PlatformId::Instagram).with_playlist(true),
            gallery: GalleryDl::new(config),
        })
    }

    pub fn with_ytdlp(mut self, ytdlp: YtDlp) -> Self {
        self.ytdlp = ytdlp.with_playlist(true);
        self
    }

    pub fn with_gallery_dl(mut self, gallery: GalleryDl) -> Self {
        self.gallery = gallery;
        self
    }

    /// 图片帖子回退到 gallery-dl,保留已有的元数据
    async fn with_gallery_images(
        &self,
        canonical: &CanonicalLink,
        mut raw: RawExtraction,
    ) -> Result<RawExtraction, ApiError> {
        for url in self.gallery.image_urls(&canonical.canonical_url).await? {
            raw = raw.with_image(url);
        }
        Ok(raw)
    }
}

#[async_trait]
impl Parser for InstagramParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Instagram
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let is_video_post = !canonical.resource_id.starts_with("p/");

        match self.ytdlp.extract_entries(&canonical.canonical_url).await {
            Ok(entries) => {
                let raw = assemble(&entries);
                if !raw.videos.is_empty() || is_video_post {
                    return Ok(raw);
                }
                tracing::debug!(post = %canonical.resource_id, "No video entries, listing images");
                self.with_gallery_images(canonical, raw).await
            }
            Err(e) if !is_video_post => {
                tracing::warn!(post = %canonical.resource_id, error = %e, "yt-dlp failed, listing images");
                self.with_gallery_images(canonical, RawExtraction::new()).await
            }
            Err(e) => Err(e),
        }
    }
}
