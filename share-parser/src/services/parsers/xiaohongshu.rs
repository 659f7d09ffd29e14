//! 小红书解析器
//!
//! 笔记详情从 `window.__INITIAL_STATE__` 提取。访问需要来源链接上的 `xsec_token`,
//! explore 页失败时回退到 discovery 页。

use async_trait::async_trait;
use regex::Captures;
use serde_json::Value;
use std::sync::Arc;

use super::{
    absolutize, i64_at, invalidate_if_rejected, json_after_marker, str_at, AuthRequirement, Parser,
};
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::credential_store::CredentialStore;
use crate::services::http::{headers, with_session_cookie, HttpClient, COMMON_UA, IOS_UA};
use crate::services::matcher::Signature;

const BASE: &str = "https://www.xiaohongshu.com";

/// 访问笔记时需要透传的来源参数
const FORWARDED_QUERY: [&str; 2] = ["xsec_token", "xsec_source"];

fn canonical_url(resource_id: &str) -> String {
    format!("https://www.xiaohongshu.com/explore/{}", resource_id)
}

fn note_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("xhs_id").map(|m| m.as_str().to_string())
}

/// 小红书链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Xiaohongshu, canonical_url)
        .short_link("xhslink.com", r"xhslink\.com/[A-Za-z0-9._?%&+=/#@-]+")?
        .canonical(
            "xiaohongshu.com",
            r"xiaohongshu\.com/(?:explore|discovery/item)/(?P<xhs_id>[0-9a-zA-Z]+)(?:\?[A-Za-z0-9._%&+=/#@-]+)?",
            note_id,
        )
}

/// 按编码优先级取视频地址,h265 无水印
fn video_url(note: &Value) -> Option<&str> {
    ["h265", "h264", "av1", "h266"].iter().find_map(|codec| {
        let pointer = format!("/video/media/stream/{}/0/masterUrl", codec);
        str_at(note, &pointer)
    })
}

fn image_urls(note: &Value, field: &str) -> Vec<String> {
    note.get("imageList")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|img| str_at(img, field))
                .map(absolutize)
                .collect()
        })
        .unwrap_or_default()
}

/// 笔记JSON转换为原始提取结果
///
/// 视频笔记以第一张图片作为封面,图文笔记输出全部图片。
fn note_to_raw(note: &Value, image_field: &str, nickname_pointer: &str) -> RawExtraction {
    let mut raw = RawExtraction::new();
    if let Some(title) = str_at(note, "/title") {
        raw = raw.with_title(title);
    }
    if let Some(desc) = str_at(note, "/desc") {
        raw = raw.with_text(desc);
    }
    if let Some(name) = str_at(note, nickname_pointer) {
        raw = raw.with_author(name);
    }
    if let Some(avatar) = str_at(note, "/user/avatar") {
        raw = raw.with_author_avatar(absolutize(avatar));
    }
    if let Some(ms) = i64_at(note, "/time") {
        raw = raw.with_timestamp(ms / 1000);
    }

    let images = image_urls(note, image_field);
    let video = (str_at(note, "/type") == Some("video"))
        .then(|| video_url(note))
        .flatten();
    match video {
        Some(url) => {
            if let Some(cover) = images.first() {
                raw = raw.with_cover(cover.clone());
            }
            raw = raw.with_video(RawStream::new(absolutize(url)));
        }
        None => {
            for url in images {
                raw = raw.with_image(url);
            }
        }
    }
    raw
}

/// 小红书解析器
pub struct XiaohongshuParser {
    http: HttpClient,
    store: Arc<CredentialStore>,
    base: String,
}

impl XiaohongshuParser {
    pub fn new(config: &ParserConfig, store: Arc<CredentialStore>) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Xiaohongshu, config)?,
            store,
            base: BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    fn query_of(canonical: &CanonicalLink) -> String {
        FORWARDED_QUERY
            .iter()
            .filter_map(|key| {
                canonical.original_query(key).map(|v| {
                    let encoded: String = url::form_urlencoded::byte_serialize(v.as_bytes()).collect();
                    format!("{}={}", key, encoded)
                })
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn parse_explore(
        &self,
        id: &str,
        query: &str,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let url = format!("{}/explore/{}?{}", self.base, id, query);
        let request_headers = with_session_cookie(
            headers(&[
                ("user-agent", COMMON_UA),
                ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
            ]),
            session,
        );
        let html = self.http.get_text(&url, request_headers).await?;
        let state = json_after_marker(&html, "window.__INITIAL_STATE__")?;

        let note = state
            .pointer(&format!("/note/noteDetailMap/{}/note", id))
            .filter(|n| n.as_object().is_some_and(|o| !o.is_empty()))
            .ok_or_else(|| ApiError::InvalidResponse("页面中没有笔记详情".to_string()))?;
        Ok(note_to_raw(note, "/urlDefault", "/user/nickname"))
    }

    async fn parse_discovery(
        &self,
        id: &str,
        query: &str,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let url = format!("{}/discovery/item/{}?{}", self.base, id, query);
        let request_headers = with_session_cookie(
            headers(&[
                ("user-agent", IOS_UA),
                ("origin", "https://www.xiaohongshu.com"),
                ("x-requested-with", "XMLHttpRequest"),
            ]),
            session,
        );
        let html = self.http.get_text(&url, request_headers).await?;
        let state = json_after_marker(&html, "window.__INITIAL_STATE__")?;

        let note = state
            .pointer("/noteData/data/noteData")
            .filter(|n| n.is_object())
            .ok_or_else(|| ApiError::ContentUnavailable("小红书分享链接失效或内容已删除".to_string()))?;
        Ok(note_to_raw(note, "/url", "/user/nickName"))
    }
}

#[async_trait]
impl Parser for XiaohongshuParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Xiaohongshu
    }

    fn auth_requirement(&self) -> AuthRequirement {
        AuthRequirement::Optional
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let id = canonical.resource_id.as_str();
        let query = Self::query_of(canonical);

        let result = match self.parse_explore(id, &query, session).await {
            Err(ApiError::Unauthorized(reason)) => Err(ApiError::Unauthorized(reason)),
            Err(e) => {
                tracing::warn!(note_id = %id, error = %e, "Explore page failed, falling back to discovery");
                self.parse_discovery(id, &query, session).await
            }
            ok => ok,
        };
        invalidate_if_rejected(&self.store, canonical, session, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetryPolicy;
    use crate::services::matcher::SignatureMatcher;
    use mockito::{Matcher, Server};

    #[test]
    fn test_detect_keeps_query() {
        let matcher = SignatureMatcher::new(vec![signature().unwrap()]).unwrap();
        let mentions = matcher.detect(
            "https://www.xiaohongshu.com/discovery/item/68e8e3fa00000000030342ec?xsec_source=app_share&xsec_token=CBW9rw%3D 复制后打开",
        );
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].resource_id.as_deref(), Some("68e8e3fa00000000030342ec"));

        let link = matcher.link(
            &PlatformId::Xiaohongshu,
            "68e8e3fa00000000030342ec",
            &mentions[0].raw,
        );
        assert_eq!(
            link.canonical_url,
            "https://www.xiaohongshu.com/explore/68e8e3fa00000000030342ec"
        );
        assert_eq!(
            XiaohongshuParser::query_of(&link),
            "xsec_token=CBW9rw%3D&xsec_source=app_share"
        );
    }

    fn parser_with_store(server: &Server, store: Arc<CredentialStore>) -> XiaohongshuParser {
        let config = ParserConfig::default().with_retry(RetryPolicy::none());
        XiaohongshuParser::new(&config, store).unwrap().with_base_url(&server.url())
    }

    fn parser(server: &Server) -> XiaohongshuParser {
        parser_with_store(server, Arc::new(CredentialStore::in_memory()))
    }

    fn link() -> CanonicalLink {
        CanonicalLink::new(
            PlatformId::Xiaohongshu,
            "abc123",
            canonical_url("abc123"),
            "https://www.xiaohongshu.com/explore/abc123?xsec_token=tok",
        )
    }

    #[tokio::test]
    async fn test_explore_image_note() {
        let mut server = Server::new_async().await;
        let page = server
            .mock("GET", "/explore/abc123")
            .match_query(Matcher::UrlEncoded("xsec_token".into(), "tok".into()))
            .with_status(200)
            .with_body(
                r#"<script>window.__INITIAL_STATE__={"note":{"noteDetailMap":{"abc123":{"note":{
                    "type":"normal","title":"标题","desc":"正文","time":1700000000000,
                    "user":{"nickname":"博主","avatar":"https://sns-avatar.xhscdn.com/a.jpg"},
                    "imageList":[{"urlDefault":"http://sns-webpic.xhscdn.com/1.jpg"},{"urlDefault":"http://sns-webpic.xhscdn.com/2.jpg"}],
                    "video":undefined}}}}}</script>"#,
            )
            .create_async()
            .await;

        let raw = parser(&server).handle(&link(), None).await.unwrap();
        page.assert_async().await;
        assert_eq!(raw.title.as_deref(), Some("标题"));
        assert_eq!(raw.author.as_deref(), Some("博主"));
        assert_eq!(raw.timestamp, Some(1700000000));
        assert_eq!(raw.images.len(), 2);
        assert!(raw.images[0].starts_with("https://"));
        assert!(raw.videos.is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_discovery_video() {
        let mut server = Server::new_async().await;
        let _explore = server
            .mock("GET", Matcher::Regex(r"^/explore/".to_string()))
            .with_status(200)
            .with_body(r#"<script>window.__INITIAL_STATE__={"note":{"noteDetailMap":{}}}</script>"#)
            .create_async()
            .await;
        let _discovery = server
            .mock("GET", Matcher::Regex(r"^/discovery/item/".to_string()))
            .with_status(200)
            .with_body(
                r#"<script>window.__INITIAL_STATE__={"noteData":{"data":{"noteData":{
                    "type":"video","title":"视频笔记","desc":"","time":1700000000000,
                    "user":{"nickName":"up","avatar":"https://a/1.jpg"},
                    "imageList":[{"url":"https://img/cover.jpg"}],
                    "video":{"media":{"stream":{"h264":[{"masterUrl":"https://v/264.mp4"}],"h265":[{"masterUrl":"https://v/265.mp4"}]}}}}}}}</script>"#,
            )
            .create_async()
            .await;

        let raw = parser(&server).handle(&link(), None).await.unwrap();
        assert_eq!(raw.author.as_deref(), Some("up"));
        assert_eq!(raw.videos[0].url, "https://v/265.mp4");
        assert_eq!(raw.cover_url.as_deref(), Some("https://img/cover.jpg"));
        assert!(raw.images.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_session_invalidated() {
        let mut server = Server::new_async().await;
        let explore = server
            .mock("GET", Matcher::Regex(r"^/explore/".to_string()))
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let discovery = server
            .mock("GET", Matcher::Regex(r"^/discovery/item/".to_string()))
            .expect(0)
            .create_async()
            .await;

        let store = Arc::new(CredentialStore::in_memory());
        let session = Session::from_cookie_str(PlatformId::Xiaohongshu, "web_session=dead; a1=x").unwrap();
        store.put(PlatformId::Xiaohongshu, session.clone()).await;

        let err = parser_with_store(&server, store.clone())
            .handle(&link(), Some(&session))
            .await
            .unwrap_err();

        explore.assert_async().await;
        discovery.assert_async().await;
        assert!(matches!(err, ApiError::Unauthorized(_)));
        assert!(store.get(&PlatformId::Xiaohongshu).await.is_none());
    }
}
