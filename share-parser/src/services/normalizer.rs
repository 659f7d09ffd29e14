//! 解析结果规范化
//!
//! 把解析器的原始提取结果整理为统一的 `ParseResult`:
//! 推断格式、去除重复地址、保持图集顺序,并保证至少有一项媒体资源。

use std::collections::HashSet;

use crate::models::{
    CanonicalLink, FormatHint, MediaAsset, NormalizationError, ParseResult, PlatformId,
    RawExtraction, RawStream,
};

/// 资源过滤方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetFilter {
    /// 保留全部资源
    #[default]
    All,

    /// 仅保留一个音频资源 (`bm` / `ym` 快捷指令)
    AudioOnly,
}

/// 规范化原始提取结果
///
/// # 错误
/// - `NormalizationError::EmptyAssets`: 没有任何可用的媒体地址
/// - `NormalizationError::NoAudio`: 仅音频模式下没有音频
pub fn normalize(
    raw: RawExtraction,
    platform: &PlatformId,
    canonical: &CanonicalLink,
    filter: AssetFilter,
) -> Result<ParseResult, NormalizationError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut assets = Vec::new();

    if filter == AssetFilter::All {
        for stream in &raw.videos {
            if stream.url.is_empty() || !seen.insert(stream.url.clone()) {
                continue;
            }
            assets.push(MediaAsset::Video {
                download_url: stream.url.clone(),
                audio_url: stream.companion_audio.clone().filter(|a| !a.is_empty()),
                size_hint: stream.size,
                format_hint: video_format(stream),
            });
        }

        let urls: Vec<String> = raw
            .images
            .iter()
            .filter(|url| !url.is_empty() && seen.insert((*url).clone()))
            .cloned()
            .collect();
        if let Some(first) = urls.first() {
            let format_hint = image_format(first);
            assets.push(MediaAsset::ImageSet { urls, format_hint });
        }
    }

    for stream in &raw.audios {
        if stream.url.is_empty() || !seen.insert(stream.url.clone()) {
            continue;
        }
        assets.push(MediaAsset::Audio {
            download_url: stream.url.clone(),
            size_hint: stream.size,
            format_hint: audio_format(stream),
        });
        if filter == AssetFilter::AudioOnly {
            break;
        }
    }

    if assets.is_empty() {
        tracing::warn!(
            platform = %platform,
            resource_id = %canonical.resource_id,
            filter = ?filter,
            "Extraction produced no usable assets"
        );
        return Err(match filter {
            AssetFilter::All => NormalizationError::EmptyAssets,
            AssetFilter::AudioOnly => NormalizationError::NoAudio,
        });
    }

    Ok(ParseResult {
        platform: platform.clone(),
        canonical: canonical.clone(),
        title: raw.title.map(|t| t.trim().to_string()).unwrap_or_default(),
        author: raw.author.unwrap_or_default(),
        author_avatar: raw.author_avatar,
        cover_url: raw.cover_url.filter(|c| !c.is_empty()),
        assets,
        duration_seconds: raw.duration_seconds,
        text: raw.text.filter(|t| !t.trim().is_empty()),
        timestamp: raw.timestamp,
        extra_info: raw.extra_info,
    })
}

fn video_format(stream: &RawStream) -> FormatHint {
    if stream.companion_audio.is_some() {
        return FormatHint::DashM4s;
    }
    let by_url = FormatHint::from_url(&stream.url);
    if matches!(by_url, FormatHint::Hls | FormatHint::Webm | FormatHint::DashM4s) {
        return by_url;
    }
    stream
        .codec
        .as_deref()
        .and_then(FormatHint::from_codec)
        .or_else(|| stream.quality.as_deref().and_then(quality_codec))
        .unwrap_or(if by_url == FormatHint::Unknown {
            FormatHint::Mp4Avc
        } else {
            by_url
        })
}

/// 部分平台只在清晰度标签中携带编码信息,如 `h265_720p`
fn quality_codec(quality: &str) -> Option<FormatHint> {
    let quality = quality.to_ascii_lowercase();
    ["h265", "hevc", "av1", "h264", "avc"]
        .iter()
        .find(|tag| quality.contains(*tag))
        .and_then(|tag| FormatHint::from_codec(tag))
}

fn image_format(url: &str) -> FormatHint {
    match FormatHint::from_url(url) {
        FormatHint::Unknown => {
            let lower = url.to_ascii_lowercase();
            if lower.contains("webp") {
                FormatHint::Webp
            } else {
                FormatHint::Jpeg
            }
        }
        hint => hint,
    }
}

fn audio_format(stream: &RawStream) -> FormatHint {
    stream
        .codec
        .as_deref()
        .and_then(FormatHint::from_codec)
        .unwrap_or_else(|| match FormatHint::from_url(&stream.url) {
            FormatHint::DashM4s | FormatHint::Unknown => FormatHint::M4a,
            hint => hint,
        })
}
