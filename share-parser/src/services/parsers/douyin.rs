//! 抖音解析器
//!
//! 视频与图文从分享页内嵌的 `window._ROUTER_DATA` 中提取,
//! 先尝试 `m.douyin.com`,失败后回退到 `iesdouyin.com`。图集 (slides) 走独立接口。

use async_trait::async_trait;
use regex::Captures;
use serde::Deserialize;
use std::sync::Arc;

use super::{invalidate_if_rejected, json_after_marker, AuthRequirement, Parser};
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::credential_store::CredentialStore;
use crate::services::http::{ua_headers, with_session_cookie, HttpClient, ANDROID_UA, IOS_UA};
use crate::services::matcher::Signature;

const M_BASE: &str = "https://m.douyin.com";
const IES_BASE: &str = "https://www.iesdouyin.com";

fn canonical_url(resource_id: &str) -> String {
    match resource_id.split_once('/') {
        Some(("slides", vid)) => format!("https://www.iesdouyin.com/share/slides/{}", vid),
        Some((ty, vid)) => format!("https://www.douyin.com/{}/{}", ty, vid),
        None => format!("https://www.douyin.com/video/{}", resource_id),
    }
}

fn typed_id(caps: &Captures<'_>) -> Option<String> {
    Some(format!("{}/{}", caps.name("ty")?.as_str(), caps.name("vid")?.as_str()))
}

/// 抖音链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Douyin, canonical_url)
        .short_link("v.douyin", r"v\.douyin\.com/[a-zA-Z0-9_\-]+")?
        .short_link("jx.douyin", r"jx\.douyin\.com/[a-zA-Z0-9_\-]+")?
        .canonical("douyin", r"douyin\.com/(?P<ty>video|note)/(?P<vid>\d+)", typed_id)?
        .canonical(
            "iesdouyin",
            r"iesdouyin\.com/share/(?P<ty>slides|video|note)/(?P<vid>\d+)",
            typed_id,
        )?
        .canonical(
            "m.douyin",
            r"m\.douyin\.com/share/(?P<ty>slides|video|note)/(?P<vid>\d+)",
            typed_id,
        )?
        .canonical(
            "jingxuan.douyin",
            r"jingxuan\.douyin\.com/m/(?P<ty>slides|video|note)/(?P<vid>\d+)",
            typed_id,
        )
}

#[derive(Debug, Deserialize)]
struct UrlList {
    #[serde(default)]
    url_list: Vec<String>,
}

impl UrlList {
    fn first(&self) -> Option<&str> {
        self.url_list.iter().map(String::as_str).find(|u| !u.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    avatar_thumb: Option<UrlList>,
    #[serde(default)]
    avatar_medium: Option<UrlList>,
}

impl Author {
    fn avatar(&self) -> Option<&str> {
        self.avatar_thumb
            .as_ref()
            .and_then(UrlList::first)
            .or_else(|| self.avatar_medium.as_ref().and_then(UrlList::first))
    }
}

#[derive(Debug, Deserialize)]
struct Video {
    play_addr: UrlList,
    #[serde(default)]
    cover: Option<UrlList>,
    /// 毫秒
    #[serde(default)]
    duration: u64,
}

impl Video {
    /// 去水印地址
    fn play_url(&self) -> Option<String> {
        self.play_addr.first().map(|u| u.replace("playwm", "play"))
    }
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(default)]
    video: Option<Video>,
    #[serde(default)]
    url_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Aweme {
    #[serde(default)]
    create_time: i64,
    author: Author,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    images: Option<Vec<Image>>,
    #[serde(default)]
    video: Option<Video>,
}

impl Aweme {
    fn into_raw(self) -> RawExtraction {
        let mut raw = RawExtraction::new()
            .with_author(self.author.nickname.clone())
            .with_timestamp(self.create_time);
        if !self.desc.is_empty() {
            raw = raw.with_title(self.desc.clone());
        }
        if let Some(avatar) = self.author.avatar() {
            raw = raw.with_author_avatar(avatar);
        }

        let images = self.images.unwrap_or_default();
        if !images.is_empty() {
            for image in &images {
                if let Some(url) = image.url_list.iter().find(|u| !u.is_empty()) {
                    raw = raw.with_image(url.clone());
                }
            }
            // 动图: 图集中带视频的条目
            for video in images.iter().filter_map(|i| i.video.as_ref()) {
                if let Some(url) = video.play_url() {
                    raw = raw.with_video(RawStream::new(url));
                }
            }
            return raw;
        }

        if let Some(video) = self.video {
            if let Some(cover) = video.cover.as_ref().and_then(UrlList::first) {
                raw = raw.with_cover(cover);
            }
            if video.duration > 0 {
                raw = raw.with_duration(video.duration / 1000);
            }
            if let Some(url) = video.play_url() {
                raw = raw.with_video(RawStream::new(url));
            }
        }
        raw
    }
}

#[derive(Debug, Default, Deserialize)]
struct VideoInfoRes {
    #[serde(default)]
    item_list: Vec<Aweme>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(rename = "videoInfoRes", default)]
    video_info_res: VideoInfoRes,
}

#[derive(Debug, Default, Deserialize)]
struct LoaderData {
    #[serde(rename = "video_(id)/page", default)]
    video_page: Option<PageData>,
    #[serde(rename = "note_(id)/page", default)]
    note_page: Option<PageData>,
}

#[derive(Debug, Deserialize)]
struct RouterData {
    #[serde(rename = "loaderData", default)]
    loader_data: LoaderData,
}

impl RouterData {
    fn into_aweme(self) -> Option<Aweme> {
        let page = self.loader_data.video_page.or(self.loader_data.note_page)?;
        page.video_info_res.item_list.into_iter().next()
    }
}

#[derive(Debug, Deserialize)]
struct SlidesInfo {
    #[serde(default)]
    aweme_details: Vec<Aweme>,
}

/// 抖音解析器
pub struct DouyinParser {
    http: HttpClient,
    store: Arc<CredentialStore>,
    m_base: String,
    ies_base: String,
}

impl DouyinParser {
    pub fn new(config: &ParserConfig, store: Arc<CredentialStore>) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Douyin, config)?,
            store,
            m_base: M_BASE.to_string(),
            ies_base: IES_BASE.to_string(),
        })
    }

    /// 替换分享页与接口地址 (构建器模式,测试使用)
    pub fn with_base_urls(mut self, m_base: &str, ies_base: &str) -> Self {
        self.m_base = m_base.trim_end_matches('/').to_string();
        self.ies_base = ies_base.trim_end_matches('/').to_string();
        self
    }

    async fn parse_page(&self, url: &str, session: Option<&Session>) -> Result<Aweme, ApiError> {
        let html = self
            .http
            .get_text(url, with_session_cookie(ua_headers(IOS_UA), session))
            .await?;
        let value = json_after_marker(&html, "window._ROUTER_DATA")?;
        let router: RouterData = serde_json::from_value(value)?;
        router.into_aweme().ok_or_else(|| {
            ApiError::InvalidResponse("页面中没有 video_(id)/page 或 note_(id)/page".to_string())
        })
    }

    async fn parse_slides(&self, vid: &str, session: Option<&Session>) -> Result<Aweme, ApiError> {
        let url = format!(
            "{}/web/api/v2/aweme/slidesinfo/?aweme_ids=[{}]&request_source=200",
            self.ies_base, vid
        );
        let info: SlidesInfo = self
            .http
            .get_json(&url, with_session_cookie(ua_headers(ANDROID_UA), session))
            .await?;
        info.aweme_details
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::ContentUnavailable("图集不存在或已删除".to_string()))
    }
}

#[async_trait]
impl Parser for DouyinParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Douyin
    }

    fn auth_requirement(&self) -> AuthRequirement {
        AuthRequirement::Optional
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let result = self.fetch(canonical, session).await;
        invalidate_if_rejected(&self.store, canonical, session, result).await
    }
}

impl DouyinParser {
    /// 按资源类型抓取,分享页依次尝试两个域名
    ///
    /// 凭证被拒绝时立即返回,不再尝试下一个域名。
    async fn fetch(
        &self,
        canonical: &CanonicalLink,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let (ty, vid) = canonical
            .resource_id
            .split_once('/')
            .unwrap_or(("video", canonical.resource_id.as_str()));

        if ty == "slides" {
            return Ok(self.parse_slides(vid, session).await?.into_raw());
        }

        let urls = [
            format!("{}/share/{}/{}", self.m_base, ty, vid),
            format!("{}/share/{}/{}", self.ies_base, ty, vid),
        ];
        for url in &urls {
            match self.parse_page(url, session).await {
                Ok(aweme) => return Ok(aweme.into_raw()),
                Err(e @ ApiError::Unauthorized(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Douyin share page failed, trying next");
                }
            }
        }
        Err(ApiError::ContentUnavailable(
            "分享已删除或资源直链提取失败, 请稍后再试".to_string(),
        ))
    }
}
