//! X (Twitter) 解析器
//!
//! 通过第三方解析服务 xdown 获取下载页片段,再从中取出媒体直链。

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::Deserialize;

use super::{strip_tags, Parser};
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::http::{headers, HttpClient, COMMON_UA};
use crate::services::matcher::Signature;

const XDOWN_BASE: &str = "https://xdown.app";

fn canonical_url(resource_id: &str) -> String {
    format!("https://x.com/i/status/{}", resource_id)
}

fn status_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| m.as_str().to_string())
}

/// X链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Twitter, canonical_url)
        .canonical(
            "x.com",
            r"\bx\.com/[0-9a-zA-Z_]{1,20}/status/(?P<id>\d+)",
            status_id,
        )?
        .canonical(
            "twitter.com",
            r"twitter\.com/[0-9a-zA-Z_]{1,20}/status/(?P<id>\d+)",
            status_id,
        )
}

#[derive(Debug, Deserialize)]
struct XdownResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: Option<String>,
}

/// 下载页片段中的媒体
#[derive(Debug, Default, PartialEq, Eq)]
struct XdownMedia {
    title: Option<String>,
    cover: Option<String>,
    video: Option<String>,
    images: Vec<String>,
    gifs: Vec<String>,
}

/// 下载页片段解析用的正则
struct XdownPatterns {
    anchor: Regex,
    class: Regex,
    href: Regex,
    img: Regex,
    h3: Regex,
}

impl XdownPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            anchor: Regex::new(r"(?s)<a\s([^>]*)>(.*?)</a>")?,
            class: Regex::new(r#"class="([^"]*)""#)?,
            href: Regex::new(r#"href="([^"]+)""#)?,
            img: Regex::new(r#"<img[^>]*?\ssrc="([^"]+)""#)?,
            h3: Regex::new(r"(?s)<h3[^>]*>(.*?)</h3>")?,
        })
    }

    fn parse(&self, html: &str) -> XdownMedia {
        let mut media = XdownMedia {
            cover: self.img.captures(html).map(|c| c[1].to_string()),
            title: self
                .h3
                .captures(html)
                .map(|c| strip_tags(&c[1]))
                .filter(|t| !t.is_empty()),
            ..XdownMedia::default()
        };

        for caps in self.anchor.captures_iter(html) {
            let attrs = &caps[1];
            let is_download = self.class.captures(attrs).is_some_and(|c| {
                c[1].split_whitespace()
                    .any(|class| class == "tw-button-dl" || class == "abutton")
            });
            if !is_download {
                continue;
            }
            let Some(href) = self.href.captures(attrs).map(|c| c[1].replace("&amp;", "&")) else {
                continue;
            };
            let label = strip_tags(&caps[2]);
            if label.contains("下载 MP4") {
                media.video = Some(href);
                break;
            } else if label.contains("下载图片") {
                media.images.push(href);
            } else if label.contains("下载 gif") {
                media.gifs.push(href);
            }
        }
        media
    }
}

/// X解析器
pub struct TwitterParser {
    http: HttpClient,
    base: String,
    patterns: XdownPatterns,
}

impl TwitterParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Twitter, config)?,
            base: XDOWN_BASE.to_string(),
            patterns: XdownPatterns::new()?,
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Parser for TwitterParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Twitter
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let request_headers = headers(&[
            ("user-agent", COMMON_UA),
            ("accept", "application/json, text/plain, */*"),
            ("origin", "https://xdown.app"),
            ("referer", "https://xdown.app/"),
        ]);
        let url = format!("{}/api/ajaxSearch", self.base);
        let response: XdownResponse = self
            .http
            .post_form_json(
                &url,
                request_headers,
                &[("q", canonical.canonical_url.as_str()), ("lang", "zh-cn")],
            )
            .await?;

        if response.status != "ok" {
            return Err(ApiError::InvalidResponse(format!(
                "解析服务返回状态: {}",
                response.status
            )));
        }
        let html = response
            .data
            .ok_or_else(|| ApiError::ContentUnavailable("解析失败, 数据为空".to_string()))?;

        let media = self.patterns.parse(&html);
        let mut raw = RawExtraction::new();
        if let Some(title) = media.title {
            raw = raw.with_title(title);
        }
        if let Some(cover) = media.cover {
            raw = raw.with_cover(cover);
        }
        if let Some(video) = media.video {
            raw = raw.with_video(RawStream::new(video));
        }
        for gif in media.gifs {
            raw = raw.with_video(RawStream::new(gif));
        }
        for image in media.images {
            raw = raw.with_image(image);
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetryPolicy;
    use crate::services::matcher::SignatureMatcher;
    use mockito::{Matcher, Server};

    const VIDEO_HTML: &str = r#"<div class="tw-video"><div class="thumbnail"><img src="https://pbs.twimg.com/thumb.jpg"></div>
        <div class="content"><h3>推文标题</h3></div>
        <a class="tw-button-dl button dl-success" href="https://dl.snapcdn.app/get?token=v1&amp;x=1"><i class="icon"></i> 下载 MP4 (720p)</a>
        <a class="tw-button-dl button" href="https://dl.snapcdn.app/get?token=v2">下载 MP4 (360p)</a></div>"#;

    #[test]
    fn test_surface_forms() {
        let matcher = SignatureMatcher::new(vec![signature().unwrap()]).unwrap();
        let mentions = matcher.detect(
            "https://x.com/elonmusk/status/1234567890 与 https://twitter.com/elonmusk/status/1234567890?s=20",
        );
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].resource_id.as_deref(), Some("1234567890"));
        // 其他域名中的 x.com 片段不被识别
        assert!(matcher.detect("https://box.com/a/status/1").iter().all(|m| m.resource_id.is_none()));
    }

    #[test]
    fn test_parse_video_html() {
        let media = XdownPatterns::new().unwrap().parse(VIDEO_HTML);
        assert_eq!(media.title.as_deref(), Some("推文标题"));
        assert_eq!(media.cover.as_deref(), Some("https://pbs.twimg.com/thumb.jpg"));
        assert_eq!(media.video.as_deref(), Some("https://dl.snapcdn.app/get?token=v1&x=1"));
        assert!(media.images.is_empty());
    }

    #[test]
    fn test_parse_image_html() {
        let html = r#"<ul><li><a href="https://dl.snapcdn.app/1.jpg" class="abutton is-success">下载图片</a></li>
            <li><a href="https://dl.snapcdn.app/2.jpg" class="abutton is-success">下载图片</a></li>
            <li><a href="https://other.link" class="other">下载图片</a></li></ul>"#;
        let media = XdownPatterns::new().unwrap().parse(html);
        assert_eq!(
            media.images,
            vec!["https://dl.snapcdn.app/1.jpg".to_string(), "https://dl.snapcdn.app/2.jpg".to_string()]
        );
        assert!(media.video.is_none());
    }

    #[tokio::test]
    async fn test_handle_via_service() {
        let mut server = Server::new_async().await;
        let _search = server
            .mock("POST", "/api/ajaxSearch")
            .match_body(Matcher::UrlEncoded("lang".into(), "zh-cn".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::json!({"status": "ok", "data": VIDEO_HTML}).to_string())
            .create_async()
            .await;

        let config = ParserConfig::default().with_retry(RetryPolicy::none());
        let parser = TwitterParser::new(&config).unwrap().with_base_url(&server.url());
        let link = CanonicalLink::new(
            PlatformId::Twitter,
            "1234567890",
            canonical_url("1234567890"),
            "https://x.com/elonmusk/status/1234567890",
        );
        let raw = parser.handle(&link, None).await.unwrap();
        assert_eq!(raw.videos.len(), 1);
        assert_eq!(raw.title.as_deref(), Some("推文标题"));
    }
}
