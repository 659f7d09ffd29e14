use serde::{Deserialize, Serialize};

use crate::models::{CanonicalLink, PlatformId};

/// 媒体格式提示
///
/// 所有平台共享的格式词汇,供下载器选择处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatHint {
    Mp4Avc,
    Mp4Hevc,
    Mp4Av1,
    /// DASH 分段流 (视频与音频分离)
    DashM4s,
    Hls,
    Webm,
    Jpeg,
    Png,
    Webp,
    Gif,
    M4a,
    Mp3,
    Opus,
    Flac,
    Unknown,
}

impl FormatHint {
    /// 根据编码标签推断格式
    ///
    /// 接受平台常见写法: `avc1.640032`、`hev1`、`h265`、`av01`、`mp4a.40.2` 等
    pub fn from_codec(codec: &str) -> Option<FormatHint> {
        let codec = codec.to_ascii_lowercase();
        if codec.starts_with("avc") || codec.contains("h264") {
            Some(FormatHint::Mp4Avc)
        } else if codec.starts_with("hev") || codec.starts_with("hvc") || codec.contains("h265") {
            Some(FormatHint::Mp4Hevc)
        } else if codec.starts_with("av01") || codec == "av1" {
            Some(FormatHint::Mp4Av1)
        } else if codec.starts_with("mp4a") || codec == "aac" {
            Some(FormatHint::M4a)
        } else if codec == "opus" {
            Some(FormatHint::Opus)
        } else if codec == "flac" {
            Some(FormatHint::Flac)
        } else if codec == "mp3" {
            Some(FormatHint::Mp3)
        } else {
            None
        }
    }

    /// 根据URL扩展名推断格式
    pub fn from_url(url: &str) -> FormatHint {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        let ext = path.rsplit('.').next().unwrap_or("");
        match ext {
            "mp4" => FormatHint::Mp4Avc,
            "m4s" => FormatHint::DashM4s,
            "m3u8" => FormatHint::Hls,
            "webm" => FormatHint::Webm,
            "jpg" | "jpeg" => FormatHint::Jpeg,
            "png" => FormatHint::Png,
            "webp" => FormatHint::Webp,
            "gif" => FormatHint::Gif,
            "m4a" => FormatHint::M4a,
            "mp3" => FormatHint::Mp3,
            "opus" | "ogg" => FormatHint::Opus,
            "flac" => FormatHint::Flac,
            _ => FormatHint::Unknown,
        }
    }
}

/// 可下载的媒体资源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaAsset {
    /// 视频,DASH 流携带配套音频地址
    Video {
        download_url: String,
        audio_url: Option<String>,
        size_hint: Option<u64>,
        format_hint: FormatHint,
    },

    /// 有序图集
    ImageSet {
        urls: Vec<String>,
        format_hint: FormatHint,
    },

    /// 音频
    Audio {
        download_url: String,
        size_hint: Option<u64>,
        format_hint: FormatHint,
    },
}

impl MediaAsset {
    /// 资源的主下载地址 (图集取第一张)
    pub fn primary_url(&self) -> Option<&str> {
        match self {
            MediaAsset::Video { download_url, .. } | MediaAsset::Audio { download_url, .. } => {
                Some(download_url.as_str())
            }
            MediaAsset::ImageSet { urls, .. } => urls.first().map(String::as_str),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaAsset::Video { .. })
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, MediaAsset::Audio { .. })
    }

    pub fn is_image_set(&self) -> bool {
        matches!(self, MediaAsset::ImageSet { .. })
    }
}

/// 统一解析结果
///
/// `assets` 至少包含一项,由规范化器保证。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub platform: PlatformId,
    pub canonical: CanonicalLink,
    pub title: String,
    pub author: String,
    pub author_avatar: Option<String>,
    pub cover_url: Option<String>,
    pub assets: Vec<MediaAsset>,
    pub duration_seconds: Option<u64>,
    /// 正文或简介
    pub text: Option<String>,
    /// 发布时间 (Unix秒)
    pub timestamp: Option<i64>,
    /// 附加信息,如分集提示
    pub extra_info: Option<String>,
}

impl ParseResult {
    /// 第一个音频资源
    pub fn audio(&self) -> Option<&MediaAsset> {
        self.assets.iter().find(|a| a.is_audio())
    }

    /// 第一个视频资源
    pub fn video(&self) -> Option<&MediaAsset> {
        self.assets.iter().find(|a| a.is_video())
    }

    /// 图片总数
    pub fn image_count(&self) -> usize {
        self.assets
            .iter()
            .map(|a| match a {
                MediaAsset::ImageSet { urls, .. } => urls.len(),
                _ => 0,
            })
            .sum()
    }

    /// 单行摘要,用于日志和命令行输出
    pub fn summary(&self) -> String {
        let kinds: Vec<&str> = self
            .assets
            .iter()
            .map(|a| match a {
                MediaAsset::Video { .. } => "video",
                MediaAsset::ImageSet { .. } => "images",
                MediaAsset::Audio { .. } => "audio",
            })
            .collect();
        format!(
            "[{}] {} - {} ({})",
            self.platform.display_name(),
            self.title,
            self.author,
            kinds.join("+")
        )
    }
}

/// 解析器产出的原始流
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStream {
    pub url: String,
    /// DASH 视频的配套音频地址
    pub companion_audio: Option<String>,
    /// 平台原始清晰度标签 (如 `720p`、`mp4_hd_mp4`)
    pub quality: Option<String>,
    /// 编码标签 (如 `avc1.640032`、`h265`)
    pub codec: Option<String>,
    pub size: Option<u64>,
}

impl RawStream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_companion_audio(mut self, audio_url: impl Into<String>) -> Self {
        self.companion_audio = Some(audio_url.into());
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// 解析器产出的原始提取结果
///
/// 解析器只负责填充这个约定好的结构,格式推断、去重与校验由规范化器完成。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExtraction {
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_avatar: Option<String>,
    pub cover_url: Option<String>,
    pub duration_seconds: Option<u64>,
    pub text: Option<String>,
    pub timestamp: Option<i64>,
    pub videos: Vec<RawStream>,
    /// 图集,顺序即展示顺序
    pub images: Vec<String>,
    pub audios: Vec<RawStream>,
    pub extra_info: Option<String>,
}

impl RawExtraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_author_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.author_avatar = Some(avatar.into());
        self
    }

    pub fn with_cover(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_video(mut self, stream: RawStream) -> Self {
        self.videos.push(stream);
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.images.push(url.into());
        self
    }

    pub fn with_audio(mut self, stream: RawStream) -> Self {
        self.audios.push(stream);
        self
    }

    pub fn with_extra_info(mut self, info: impl Into<String>) -> Self {
        self.extra_info = Some(info.into());
        self
    }

    /// 是否不含任何媒体地址
    pub fn is_empty(&self) -> bool {
        self.videos.iter().all(|v| v.url.is_empty())
            && self.images.iter().all(|i| i.is_empty())
            && self.audios.iter().all(|a| a.url.is_empty())
    }
}
