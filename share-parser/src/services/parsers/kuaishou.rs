//! 快手解析器
//!
//! 统一请求移动端分享页 `/fw/photo/<id>`,从 `window.INIT_STATE` 中取出带 `photo` 的条目。

use async_trait::async_trait;
use regex::Captures;
use serde_json::Value;

use super::{absolutize, i64_at, json_after_marker, str_at, Parser};
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::http::{headers, HttpClient, IOS_UA};
use crate::services::matcher::Signature;

const BASE: &str = "https://v.m.chenzhongtech.com";

fn canonical_url(resource_id: &str) -> String {
    format!("https://www.kuaishou.com/short-video/{}", resource_id)
}

fn photo_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| m.as_str().to_string())
}

/// 快手链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Kuaishou, canonical_url)
        .short_link("v.kuaishou", r"v\.kuaishou\.com/[A-Za-z\d._?%&+\-=/#]+")?
        .canonical(
            "kuaishou.com/short-video",
            r"kuaishou\.com/short-video/(?P<id>[A-Za-z0-9]+)",
            photo_id,
        )?
        .canonical(
            "chenzhongtech",
            r"chenzhongtech\.com/fw/(?:photo|long-video)/(?P<id>[A-Za-z0-9]+)",
            photo_id,
        )
}

/// 图集图片: `https://<cdn>/<path>`
fn atlas_images(photo: &Value) -> Vec<String> {
    let Some(cdn) = str_at(photo, "/ext_params/atlas/cdnList/0/cdn") else {
        return Vec::new();
    };
    photo
        .pointer("/ext_params/atlas/list")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(|path| format!("https://{}/{}", cdn, path.trim_start_matches('/')))
                .collect()
        })
        .unwrap_or_default()
}

fn photo_to_raw(photo: &Value) -> RawExtraction {
    let name = str_at(photo, "/userName")
        .map(|n| n.replace('\u{3164}', "").trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "未知用户".to_string());

    let mut raw = RawExtraction::new().with_author(name);
    if let Some(caption) = str_at(photo, "/caption") {
        raw = raw.with_title(caption);
    }
    if let Some(head) = str_at(photo, "/headUrl") {
        raw = raw.with_author_avatar(absolutize(head));
    }
    if let Some(ms) = i64_at(photo, "/timestamp") {
        raw = raw.with_timestamp(ms / 1000);
    }
    if let Some(ms) = i64_at(photo, "/duration").filter(|d| *d > 0) {
        raw = raw.with_duration((ms / 1000) as u64);
    }
    if let Some(cover) = str_at(photo, "/coverUrls/0/url") {
        raw = raw.with_cover(absolutize(cover));
    }
    if let Some(video) = str_at(photo, "/mainMvUrls/0/url") {
        raw = raw.with_video(RawStream::new(absolutize(video)));
    }
    for url in atlas_images(photo) {
        raw = raw.with_image(url);
    }
    raw
}

/// 快手解析器
pub struct KuaishouParser {
    http: HttpClient,
    base: String,
}

impl KuaishouParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Kuaishou, config)?,
            base: BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Parser for KuaishouParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Kuaishou
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let url = format!("{}/fw/photo/{}", self.base, canonical.resource_id);
        let request_headers = headers(&[
            ("user-agent", IOS_UA),
            ("referer", "https://v.kuaishou.com/"),
        ]);
        let html = self.http.get_text(&url, request_headers).await?;
        let state = json_after_marker(&html, "window.INIT_STATE")?;

        let photo = state
            .as_object()
            .and_then(|map| {
                map.values()
                    .find_map(|entry| entry.get("photo").filter(|p| p.is_object()))
            })
            .ok_or_else(|| {
                ApiError::ContentUnavailable("作品不存在或不包含视频/图集".to_string())
            })?;

        Ok(photo_to_raw(photo))
    }
}
