//! 微博解析器
//!
//! 普通微博走 `m.weibo.cn/statuses/show` (伪装XHR,不带cookie),
//! 视频号 (fid) 与头条文章各有独立接口。转发微博的正文与媒体合并进结果。

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

use super::{absolutize, i64_at, str_at, strip_tags, Parser};
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::http::{headers, HttpClient, COMMON_UA};
use crate::services::matcher::Signature;

const M_BASE: &str = "https://m.weibo.cn";
const VIDEO_BASE: &str = "https://h5.video.weibo.com";
const CARD_BASE: &str = "https://card.weibo.com";

const BASE62: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn base62(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE62[(n % 62) as usize]);
        n /= 62;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// 数字 mid 转换为微博 bid
///
/// 从右向左每7位一组,各组转为62进制;除最高位组外不足4位左侧补零。
///
/// # 返回值
/// 输入为空或包含非数字字符时返回 `None`
pub fn mid2id(mid: &str) -> Option<String> {
    if mid.is_empty() || !mid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut chunks = Vec::new();
    let mut end = mid.len();
    while end > 0 {
        let start = end.saturating_sub(7);
        let n: u64 = mid[start..end].parse().ok()?;
        let encoded = base62(n);
        if start > 0 {
            chunks.push(format!("{:0>4}", encoded));
        } else {
            chunks.push(encoded);
        }
        end = start;
    }
    chunks.reverse();
    Some(chunks.concat())
}

fn canonical_url(resource_id: &str) -> String {
    match resource_id.split_once('/') {
        Some(("fid", fid)) => format!("https://video.weibo.com/show?fid={}", fid),
        Some(("article", id)) => format!("https://card.weibo.com/article/m/show/id/{}", id),
        Some((_, bid)) => format!("https://m.weibo.cn/status/{}", bid),
        None => format!("https://m.weibo.cn/status/{}", resource_id),
    }
}

fn status_from_mid(caps: &Captures<'_>) -> Option<String> {
    mid2id(caps.name("mid")?.as_str()).map(|bid| format!("status/{}", bid))
}

fn status_id(caps: &Captures<'_>) -> Option<String> {
    let wid = caps.name("wid")?.as_str();
    let bid = if wid.bytes().all(|b| b.is_ascii_digit()) {
        mid2id(wid)?
    } else {
        wid.to_string()
    };
    Some(format!("status/{}", bid))
}

fn fid_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("fid").map(|m| format!("fid/{}", m.as_str()))
}

fn article_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| format!("article/{}", m.as_str()))
}

/// 微博链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Weibo, canonical_url)
        .short_link("mapp.api.weibo", r"mapp\.api\.weibo\.cn/fx/[A-Za-z\d]+\.html")?
        .canonical(
            "weibo.com/tv",
            r"weibo\.com/tv/show/\d{4}:\d+\?mid=(?P<mid>\d+)",
            status_from_mid,
        )?
        .canonical("video.weibo", r"video\.weibo\.com/show\?fid=(?P<fid>\d+:\d+)", fid_id)?
        .canonical(
            "m.weibo.cn",
            r"m\.weibo\.cn/(?:status|detail)/(?P<wid>[0-9a-zA-Z]+)",
            status_id,
        )?
        .canonical("weibo.com", r"weibo\.com/\d+/(?P<wid>[0-9a-zA-Z]+)", status_id)?
        .canonical("ttarticle", r"weibo\.com/ttarticle/\S*?id=(?P<id>\d+)", article_id)?
        .canonical(
            "card.weibo",
            r"card\.weibo\.com/article/m/show/id/(?P<id>\d+)",
            article_id,
        )
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    screen_name: String,
    #[serde(default)]
    profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LargePic {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Pic {
    url: String,
    #[serde(default)]
    large: Option<LargePic>,
}

#[derive(Debug, Default, Deserialize)]
struct Urls {
    #[serde(default)]
    mp4_720p_mp4: Option<String>,
    #[serde(default)]
    mp4_hd_mp4: Option<String>,
    #[serde(default)]
    mp4_ld_mp4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PagePic {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    urls: Option<Urls>,
    #[serde(default)]
    page_pic: Option<PagePic>,
}

#[derive(Debug, Deserialize)]
struct WeiboStatus {
    user: User,
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    pics: Option<Vec<Pic>>,
    #[serde(default)]
    page_info: Option<PageInfo>,
    #[serde(default)]
    retweeted_status: Option<Box<WeiboStatus>>,
}

impl WeiboStatus {
    fn video_url(&self) -> Option<&str> {
        let urls = self.page_info.as_ref()?.urls.as_ref()?;
        urls.mp4_720p_mp4
            .as_deref()
            .or(urls.mp4_hd_mp4.as_deref())
            .or(urls.mp4_ld_mp4.as_deref())
            .filter(|u| !u.is_empty())
    }

    fn cover_url(&self) -> Option<&str> {
        self.page_info.as_ref()?.page_pic.as_ref().map(|p| p.url.as_str())
    }

    fn image_urls(&self) -> Vec<String> {
        self.pics
            .iter()
            .flatten()
            .map(|p| p.large.as_ref().map_or(p.url.as_str(), |l| l.url.as_str()))
            .map(absolutize)
            .collect()
    }

    /// 发布时间,格式如 `Thu Oct 02 14:39:33 +0800 2025`
    fn timestamp(&self) -> Option<i64> {
        chrono::DateTime::parse_from_str(&self.created_at, "%a %b %d %H:%M:%S %z %Y")
            .ok()
            .map(|t| t.timestamp())
    }

    fn append_media(&self, mut raw: RawExtraction) -> RawExtraction {
        if let Some(url) = self.video_url() {
            raw = raw.with_video(RawStream::new(absolutize(url)));
        }
        for url in self.image_urls() {
            raw = raw.with_image(url);
        }
        raw
    }

    fn into_raw(self) -> RawExtraction {
        let mut text = strip_tags(&self.text);
        let mut raw = RawExtraction::new().with_author(self.user.screen_name.clone());

        if let Some(title) = self.page_info.as_ref().and_then(|p| p.title.clone()) {
            raw = raw.with_title(title);
        }
        if let Some(avatar) = self.user.profile_image_url.as_deref() {
            raw = raw.with_author_avatar(absolutize(avatar));
        }
        if let Some(cover) = self.cover_url() {
            raw = raw.with_cover(absolutize(cover));
        }
        if let Some(ts) = self.timestamp() {
            raw = raw.with_timestamp(ts);
        }
        raw = self.append_media(raw);

        if let Some(retweeted) = &self.retweeted_status {
            text.push_str(&format!(
                "\n\n// @{}: {}",
                retweeted.user.screen_name,
                strip_tags(&retweeted.text)
            ));
            if raw.cover_url.is_none() {
                if let Some(cover) = retweeted.cover_url() {
                    raw = raw.with_cover(absolutize(cover));
                }
            }
            raw = retweeted.append_media(raw);
        }

        if !text.trim().is_empty() {
            raw = raw.with_text(text);
        }
        raw
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    ok: i64,
    #[serde(default)]
    data: Option<WeiboStatus>,
}

/// 视频清晰度键如 `高清 1080P`,取数字最大者
fn best_quality_url(urls: &serde_json::Map<String, Value>) -> Option<&str> {
    let quality = |key: &str| -> u32 {
        key.chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .unwrap_or(0)
    };
    urls.iter()
        .filter_map(|(k, v)| v.as_str().filter(|s| !s.is_empty()).map(|url| (quality(k), url)))
        .max_by_key(|(q, _)| *q)
        .map(|(_, url)| url)
}

/// 微博解析器
pub struct WeiboParser {
    http: HttpClient,
    m_base: String,
    video_base: String,
    card_base: String,
    img_src: Regex,
}

impl WeiboParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Weibo, config)?,
            m_base: M_BASE.to_string(),
            video_base: VIDEO_BASE.to_string(),
            card_base: CARD_BASE.to_string(),
            img_src: Regex::new(r#"<img[^>]*?\ssrc="([^"]+)""#)?,
        })
    }

    /// 将三个接口地址替换为同一个 (构建器模式,测试使用)
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        self.m_base = base.clone();
        self.video_base = base.clone();
        self.card_base = base;
        self
    }

    async fn parse_status(&self, bid: &str) -> Result<RawExtraction, ApiError> {
        let referer = format!("https://m.weibo.cn/detail/{}", bid);
        let request_headers = headers(&[
            ("user-agent", COMMON_UA),
            ("accept", "application/json, text/plain, */*"),
            ("referer", referer.as_str()),
            ("origin", "https://m.weibo.cn"),
            ("x-requested-with", "XMLHttpRequest"),
            ("mweibo-pwa", "1"),
        ]);
        let url = format!(
            "{}/statuses/show?id={}&_={}",
            self.m_base,
            bid,
            chrono::Utc::now().timestamp_millis()
        );

        let response: StatusResponse = self.http.get_json(&url, request_headers).await?;
        match response.data {
            Some(status) if response.ok == 1 => Ok(status.into_raw()),
            _ => Err(ApiError::ContentUnavailable(format!(
                "微博不存在或不可见: {}",
                bid
            ))),
        }
    }

    async fn parse_fid(&self, fid: &str) -> Result<RawExtraction, ApiError> {
        let referer = format!("https://h5.video.weibo.com/show/{}", fid);
        let request_headers = headers(&[
            ("user-agent", COMMON_UA),
            ("referer", referer.as_str()),
            ("content-type", "application/x-www-form-urlencoded"),
        ]);
        let url = format!("{}/api/component?page=/show/{}", self.video_base, fid);
        let payload = serde_json::json!({ "Component_Play_Playinfo": { "oid": fid } }).to_string();

        let value: Value = self
            .http
            .post_form_json(&url, request_headers, &[("data", payload.as_str())])
            .await?;
        let info = value
            .pointer("/data/Component_Play_Playinfo")
            .filter(|v| v.is_object())
            .ok_or_else(|| ApiError::InvalidResponse("Component_Play_Playinfo 数据为空".to_string()))?;

        let mut raw = RawExtraction::new()
            .with_author(str_at(info, "/reward/user/name").unwrap_or("未知"));
        if let Some(avatar) = str_at(info, "/reward/user/profile_image_url") {
            raw = raw.with_author_avatar(absolutize(avatar));
        }
        if let Some(title) = str_at(info, "/title") {
            raw = raw.with_title(title);
        }
        if let Some(text) = str_at(info, "/text") {
            raw = raw.with_text(strip_tags(text));
        }
        if let Some(cover) = str_at(info, "/cover_image") {
            raw = raw.with_cover(absolutize(cover));
        }
        if let Some(ts) = i64_at(info, "/real_date") {
            raw = raw.with_timestamp(ts);
        }

        let video = info
            .get("urls")
            .and_then(Value::as_object)
            .and_then(best_quality_url)
            .or_else(|| str_at(info, "/stream_url"));
        if let Some(url) = video {
            raw = raw.with_video(RawStream::new(absolutize(url)));
        }
        Ok(raw)
    }

    async fn parse_article(&self, id: &str) -> Result<RawExtraction, ApiError> {
        let request_headers = headers(&[
            ("user-agent", COMMON_UA),
            ("referer", "https://weibo.com/"),
        ]);
        let url = format!("{}/article/m/aj/detail", self.card_base);
        let rid = uuid::Uuid::new_v4().to_string();
        let t = chrono::Utc::now().timestamp_millis().to_string();

        let value: Value = self
            .http
            .post_form_json(
                &url,
                request_headers,
                &[("_rid", rid.as_str()), ("id", id), ("_t", t.as_str())],
            )
            .await?;
        if str_at(&value, "/msg") != Some("success") {
            return Err(ApiError::ContentUnavailable(format!(
                "文章请求失败: {}",
                str_at(&value, "/msg").unwrap_or("unknown")
            )));
        }
        let data = value
            .get("data")
            .ok_or_else(|| ApiError::InvalidResponse("文章响应缺少 data".to_string()))?;

        let content = str_at(data, "/content").unwrap_or_default();
        let mut raw = RawExtraction::new()
            .with_author(str_at(data, "/userinfo/screen_name").unwrap_or("未知"));
        if let Some(title) = str_at(data, "/title") {
            raw = raw.with_title(title);
        }
        if let Some(avatar) = str_at(data, "/userinfo/profile_image_url") {
            raw = raw.with_author_avatar(absolutize(avatar));
        }
        if let Some(ts) = i64_at(data, "/create_at_unix") {
            raw = raw.with_timestamp(ts);
        }
        for caps in self.img_src.captures_iter(content) {
            raw = raw.with_image(absolutize(&caps[1]));
        }
        let text = strip_tags(&content.replace("</p>", "</p>\n"));
        if !text.is_empty() {
            raw = raw.with_text(text);
        }
        Ok(raw)
    }
}

#[async_trait]
impl Parser for WeiboParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Weibo
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        match canonical.resource_id.split_once('/') {
            Some(("fid", fid)) => self.parse_fid(fid).await,
            Some(("article", id)) => self.parse_article(id).await,
            Some((_, bid)) => self.parse_status(bid).await,
            None => self.parse_status(&canonical.resource_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetryPolicy;
    use crate::services::matcher::SignatureMatcher;
    use mockito::{Matcher, Server};

    #[test]
    fn test_mid2id() {
        assert_eq!(mid2id("4976424138313924").as_deref(), Some("Nw48JySPy"));
        assert_eq!(mid2id("5007452630158934").as_deref(), Some("O37Sn0Fls"));
        assert_eq!(mid2id("5234367615996775").as_deref(), Some("Qeq3Dpa2b"));
        assert_eq!(mid2id("12a"), None);
        assert_eq!(mid2id(""), None);
    }

    fn ids(text: &str) -> Vec<Option<String>> {
        SignatureMatcher::new(vec![signature().unwrap()])
            .unwrap()
            .detect(text)
            .into_iter()
            .map(|m| m.resource_id)
            .collect()
    }

    #[test]
    fn test_surface_forms_collapse() {
        let expected = vec![Some("status/O37Sn0Fls".to_string())];
        assert_eq!(
            ids("https://weibo.com/tv/show/1034:5007449447661594?mid=5007452630158934"),
            expected
        );
        assert_eq!(ids("https://m.weibo.cn/detail/5007452630158934"), expected);
        assert_eq!(ids("https://m.weibo.cn/status/O37Sn0Fls"), expected);
        assert_eq!(ids("https://weibo.com/7207262816/O37Sn0Fls"), expected);
    }

    #[test]
    fn test_fid_and_article_forms() {
        assert_eq!(
            ids("https://video.weibo.com/show?fid=1034:5145615399845897"),
            vec![Some("fid/1034:5145615399845897".to_string())]
        );
        assert_eq!(
            ids("https://weibo.com/ttarticle/p/show?id=2309404962180771742222"),
            vec![Some("article/2309404962180771742222".to_string())]
        );
        assert_eq!(
            ids("https://card.weibo.com/article/m/show/id/2309404962180771742222"),
            vec![Some("article/2309404962180771742222".to_string())]
        );
        assert_eq!(
            ids("https://mapp.api.weibo.cn/fx/233911ddcc6bffea835a55e725fb0ebc.html"),
            vec![None]
        );
    }

    fn parser(server: &Server) -> WeiboParser {
        let config = ParserConfig::default().with_retry(RetryPolicy::none());
        WeiboParser::new(&config).unwrap().with_base_url(&server.url())
    }

    fn link(id: &str) -> CanonicalLink {
        CanonicalLink::new(PlatformId::Weibo, id, canonical_url(id), canonical_url(id))
    }

    #[tokio::test]
    async fn test_status_with_retweet() {
        let mut server = Server::new_async().await;
        let _status = server
            .mock("GET", Matcher::Regex(r"^/statuses/show".to_string()))
            .match_header("x-requested-with", "XMLHttpRequest")
            .with_status(200)
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body(
                r#"{"ok":1,"data":{
                    "user":{"screen_name":"转发者","profile_image_url":"https://tva1.sinaimg.cn/a.jpg"},
                    "text":"看这个<br />好看",
                    "created_at":"Thu Oct 02 14:39:33 +0800 2025",
                    "retweeted_status":{
                        "user":{"screen_name":"原作者"},
                        "text":"<a href='/n/x'>原文</a>",
                        "pics":[{"url":"https://wx1.sinaimg.cn/orj360/1.jpg","large":{"url":"https://wx1.sinaimg.cn/large/1.jpg"}}]
                    }}}"#,
            )
            .create_async()
            .await;

        let raw = parser(&server).handle(&link("status/O37Sn0Fls"), None).await.unwrap();
        assert_eq!(raw.author.as_deref(), Some("转发者"));
        assert_eq!(raw.text.as_deref(), Some("看这个\n好看\n\n// @原作者: 原文"));
        assert_eq!(raw.images, vec!["https://wx1.sinaimg.cn/large/1.jpg".to_string()]);
        assert_eq!(raw.timestamp, Some(1759387173));
    }

    #[tokio::test]
    async fn test_missing_status() {
        let mut server = Server::new_async().await;
        let _status = server
            .mock("GET", Matcher::Regex(r"^/statuses/show".to_string()))
            .with_status(200)
            .with_body(r#"{"ok":0,"msg":"这条微博已经被删除"}"#)
            .create_async()
            .await;

        let err = parser(&server).handle(&link("status/x"), None).await.unwrap_err();
        assert!(matches!(err, ApiError::ContentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fid_video_picks_highest_quality() {
        let mut server = Server::new_async().await;
        let _component = server
            .mock("POST", Matcher::Regex(r"^/api/component".to_string()))
            .match_body(Matcher::Regex("Component_Play_Playinfo".to_string()))
            .with_status(200)
            .with_body(
                r#"{"data":{"Component_Play_Playinfo":{
                    "title":"视频标题","text":"<p>描述</p>","cover_image":"//wx3.sinaimg.cn/c.jpg",
                    "real_date":1700000000,
                    "reward":{"user":{"name":"博主"}},
                    "urls":{"标清 480P":"//f.video.weibocdn.com/480.mp4","高清 1080P":"//f.video.weibocdn.com/1080.mp4","高清 720P":"//f.video.weibocdn.com/720.mp4"}}}}"#,
            )
            .create_async()
            .await;

        let raw = parser(&server)
            .handle(&link("fid/1034:5145615399845897"), None)
            .await
            .unwrap();
        assert_eq!(raw.videos[0].url, "https://f.video.weibocdn.com/1080.mp4");
        assert_eq!(raw.cover_url.as_deref(), Some("https://wx3.sinaimg.cn/c.jpg"));
        assert_eq!(raw.author.as_deref(), Some("博主"));
        assert_eq!(raw.text.as_deref(), Some("描述"));
    }

    #[tokio::test]
    async fn test_article_images_and_text() {
        let mut server = Server::new_async().await;
        let _article = server
            .mock("POST", "/article/m/aj/detail")
            .with_status(200)
            .with_body(
                r#"{"code":"100000","msg":"success","data":{"url":"u","title":"文章",
                    "content":"<p>第一段</p><img src=\"https://wx.sinaimg.cn/large/a.jpg\"><p>第二段</p>",
                    "userinfo":{"screen_name":"作者","profile_image_url":"https://tva.sinaimg.cn/a.jpg"},
                    "create_at_unix":1700000000}}"#,
            )
            .create_async()
            .await;

        let raw = parser(&server).handle(&link("article/1"), None).await.unwrap();
        assert_eq!(raw.title.as_deref(), Some("文章"));
        assert_eq!(raw.images, vec!["https://wx.sinaimg.cn/large/a.jpg".to_string()]);
        assert_eq!(raw.text.as_deref(), Some("第一段\n第二段"));
    }
}
