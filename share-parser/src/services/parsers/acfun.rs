//! A站解析器
//!
//! 视频页以 ajaxpipe 方式请求,`window.videoInfo` 是转义过的JSON,
//! 其中 `ksPlayJson` 又是一层JSON字符串,包含各清晰度的 HLS 地址。

use async_trait::async_trait;
use regex::Captures;
use serde_json::Value;

use super::{absolutize, i64_at, str_at, Parser};
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::http::{headers, HttpClient, COMMON_UA};
use crate::services::matcher::Signature;

const BASE: &str = "https://www.acfun.cn";

/// 清晰度列表从高到低排列,默认取第4档 (通常为720P)
const PREFERRED_REPRESENTATION: usize = 3;

fn canonical_url(resource_id: &str) -> String {
    format!("https://www.acfun.cn/v/{}", resource_id)
}

fn ac_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| format!("ac{}", m.as_str()))
}

/// A站链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Acfun, canonical_url)
        .canonical("acfun.cn/v/ac", r"acfun\.cn/v/ac(?P<id>\d+)", ac_id)?
        .canonical("acfun.cn", r"acfun\.cn/\S*?ac=(?P<id>\d+)", ac_id)
}

/// 取出 `window.videoInfo` 并还原转义
fn extract_video_info(page: &str) -> Result<Value, ApiError> {
    const MARKER: &str = "window.videoInfo =";
    let start = page
        .find(MARKER)
        .map(|i| i + MARKER.len())
        .ok_or_else(|| ApiError::InvalidResponse("解析 acfun 视频信息失败".to_string()))?;
    let rest = &page[start..];
    let end = rest.find("</script>").unwrap_or(rest.len());
    let raw = rest[..end].trim().trim_end_matches(';');
    let unescaped = raw.replace("\\\\\"", "\\\"").replace("\\\"", "\"");
    Ok(serde_json::from_str(&unescaped)?)
}

/// `2024-12-1` 形式的日期,或毫秒时间戳
fn parse_create_time(info: &Value) -> Option<i64> {
    if let Some(ms) = info.get("createTimeMillis").and_then(Value::as_i64) {
        return Some(ms / 1000);
    }
    let text = str_at(info, "/createTime")?;
    chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc().timestamp())
}

fn info_to_raw(info: &Value) -> Result<RawExtraction, ApiError> {
    let play_json = str_at(info, "/currentVideoInfo/ksPlayJson")
        .ok_or_else(|| ApiError::ContentUnavailable("视频没有可用的播放信息".to_string()))?;
    let play: Value = serde_json::from_str(play_json)?;
    let representations = play
        .pointer("/adaptationSet/0/representation")
        .and_then(Value::as_array)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::InvalidResponse("ksPlayJson 中没有 representation".to_string()))?;

    let idx = PREFERRED_REPRESENTATION.min(representations.len() - 1);
    let chosen = &representations[idx];
    let url = str_at(chosen, "/url")
        .ok_or_else(|| ApiError::InvalidResponse("representation 缺少 url".to_string()))?;

    let mut stream = RawStream::new(url);
    if let Some(label) = str_at(chosen, "/qualityLabel") {
        stream = stream.with_quality(label);
    }
    if let Some(codec) = str_at(chosen, "/codecs") {
        stream = stream.with_codec(codec);
    }

    let mut raw = RawExtraction::new().with_video(stream);
    if let Some(title) = str_at(info, "/title") {
        raw = raw.with_title(title);
    }
    if let Some(name) = str_at(info, "/user/name") {
        raw = raw.with_author(name);
    }
    if let Some(avatar) = str_at(info, "/user/headUrl") {
        raw = raw.with_author_avatar(absolutize(avatar));
    }
    if let Some(cover) = str_at(info, "/coverUrl") {
        raw = raw.with_cover(absolutize(cover));
    }
    if let Some(desc) = str_at(info, "/description") {
        raw = raw.with_text(format!("简介: {}", desc));
    }
    if let Some(ms) = i64_at(info, "/currentVideoInfo/durationMillis") {
        raw = raw.with_duration((ms / 1000) as u64);
    }
    if let Some(ts) = parse_create_time(info) {
        raw = raw.with_timestamp(ts);
    }
    Ok(raw)
}

/// A站解析器
pub struct AcfunParser {
    http: HttpClient,
    base: String,
}

impl AcfunParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Acfun, config)?,
            base: BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Parser for AcfunParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Acfun
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let url = format!(
            "{}/v/{}?quickViewId=videoInfo_new&ajaxpipe=1",
            self.base, canonical.resource_id
        );
        let request_headers = headers(&[
            ("user-agent", COMMON_UA),
            ("referer", "https://www.acfun.cn/"),
        ]);
        let page = self.http.get_text(&url, request_headers).await?;
        let info = extract_video_info(&page)?;
        info_to_raw(&info)
    }
}
