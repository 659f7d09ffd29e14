//! B站解析器
//!
//! 支持视频 (含分P)、动态、图文、直播间、收藏夹与专栏。
//! 视频使用 DASH 流: 在配置的清晰度上限内选择最高画质,优先配置的编码,音频取最高码率。

use async_trait::async_trait;
use regex::Captures;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{absolutize, i64_at, invalidate_if_rejected, str_at, strip_tags, AuthRequirement, Parser};
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session, VideoCodec,
};
use crate::services::credential_store::CredentialStore;
use crate::services::http::{headers, with_session_cookie, HttpClient, COMMON_UA};
use crate::services::matcher::Signature;

const API_BASE: &str = "https://api.bilibili.com";
const LIVE_API_BASE: &str = "https://api.live.bilibili.com";

/// 未登录业务码
const CODE_NOT_LOGGED_IN: i64 = -101;

const XOR_CODE: u64 = 23442827791579;
const MASK_CODE: u64 = 2251799813685247;
const MAX_AID: u64 = 1 << 51;
const BASE: u64 = 58;
const ALPHABET: &[u8; 58] = b"FcwAPNKTMug3GV5Lj7EJnHpWsx4tb8haYeviqBz6rkCy12mUSDQX9RdoZf";

/// av号转BV号
///
/// # 返回值
/// aid 为0或超出范围时返回 `None`
pub fn av2bv(aid: u64) -> Option<String> {
    if aid == 0 || aid >= MAX_AID {
        return None;
    }
    let mut bytes = *b"BV1000000000";
    let mut tmp = (MAX_AID | aid) ^ XOR_CODE;
    for idx in (3..bytes.len()).rev() {
        bytes[idx] = ALPHABET[(tmp % BASE) as usize];
        tmp /= BASE;
    }
    bytes.swap(3, 9);
    bytes.swap(4, 7);
    String::from_utf8(bytes.to_vec()).ok()
}

/// BV号转av号
pub fn bv2av(bvid: &str) -> Option<u64> {
    if bvid.len() != 12 || !bvid.starts_with("BV") {
        return None;
    }
    let mut bytes: Vec<u8> = bvid.bytes().collect();
    bytes.swap(3, 9);
    bytes.swap(4, 7);
    let mut tmp = 0u64;
    for b in &bytes[3..] {
        let pos = ALPHABET.iter().position(|c| c == b)? as u64;
        tmp = tmp.checked_mul(BASE)?.checked_add(pos)?;
    }
    Some((tmp & MASK_CODE) ^ XOR_CODE)
}

/// B站资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiliResource {
    /// 视频,`page` 从1开始
    Video { bvid: String, page: u32 },
    Dynamic(String),
    Opus(String),
    Live(String),
    Favlist(String),
    Read(String),
}

impl BiliResource {
    /// 从规范资源标识解析
    ///
    /// 格式: `BV…`、`BV…/p2`、`dynamic/<id>`、`opus/<id>`、`live/<id>`、`favlist/<id>`、`read/<id>`
    pub fn parse(resource_id: &str) -> Option<BiliResource> {
        let (kind, rest) = resource_id.split_once('/').unwrap_or((resource_id, ""));
        match kind {
            "dynamic" => Some(BiliResource::Dynamic(rest.to_string())),
            "opus" => Some(BiliResource::Opus(rest.to_string())),
            "live" => Some(BiliResource::Live(rest.to_string())),
            "favlist" => Some(BiliResource::Favlist(rest.to_string())),
            "read" => Some(BiliResource::Read(rest.to_string())),
            bvid if bvid.starts_with("BV") => {
                let page = rest
                    .strip_prefix('p')
                    .and_then(|p| p.parse::<u32>().ok())
                    .unwrap_or(1);
                Some(BiliResource::Video {
                    bvid: bvid.to_string(),
                    page,
                })
            }
            _ => None,
        }
    }

    pub fn resource_id(&self) -> String {
        match self {
            BiliResource::Video { bvid, page } if *page > 1 => format!("{}/p{}", bvid, page),
            BiliResource::Video { bvid, .. } => bvid.clone(),
            BiliResource::Dynamic(id) => format!("dynamic/{}", id),
            BiliResource::Opus(id) => format!("opus/{}", id),
            BiliResource::Live(id) => format!("live/{}", id),
            BiliResource::Favlist(id) => format!("favlist/{}", id),
            BiliResource::Read(id) => format!("read/{}", id),
        }
    }

    pub fn url(&self) -> String {
        match self {
            BiliResource::Video { bvid, page } if *page > 1 => {
                format!("https://www.bilibili.com/video/{}?p={}", bvid, page)
            }
            BiliResource::Video { bvid, .. } => format!("https://www.bilibili.com/video/{}", bvid),
            BiliResource::Dynamic(id) => format!("https://t.bilibili.com/{}", id),
            BiliResource::Opus(id) => format!("https://www.bilibili.com/opus/{}", id),
            BiliResource::Live(id) => format!("https://live.bilibili.com/{}", id),
            BiliResource::Favlist(id) => format!("https://space.bilibili.com/favlist?fid={}", id),
            BiliResource::Read(id) => format!("https://www.bilibili.com/read/cv{}", id),
        }
    }
}

fn canonical_url(resource_id: &str) -> String {
    BiliResource::parse(resource_id)
        .map(|r| r.url())
        .unwrap_or_else(|| format!("https://www.bilibili.com/video/{}", resource_id))
}

fn page_of(caps: &Captures<'_>) -> u32 {
    caps.name("page")
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

fn bv_id(caps: &Captures<'_>) -> Option<String> {
    let bvid = caps.name("bvid")?.as_str().to_string();
    Some(BiliResource::Video { bvid, page: page_of(caps) }.resource_id())
}

fn av_id(caps: &Captures<'_>) -> Option<String> {
    let aid = caps.name("avid")?.as_str().parse::<u64>().ok()?;
    let bvid = av2bv(aid)?;
    Some(BiliResource::Video { bvid, page: page_of(caps) }.resource_id())
}

fn dynamic_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| BiliResource::Dynamic(m.as_str().to_string()).resource_id())
}

fn opus_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| BiliResource::Opus(m.as_str().to_string()).resource_id())
}

fn live_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| BiliResource::Live(m.as_str().to_string()).resource_id())
}

fn favlist_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| BiliResource::Favlist(m.as_str().to_string()).resource_id())
}

fn read_id(caps: &Captures<'_>) -> Option<String> {
    caps.name("id").map(|m| BiliResource::Read(m.as_str().to_string()).resource_id())
}

/// B站链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Bilibili, canonical_url)
        .short_link("b23.tv", r"b23\.tv/[A-Za-z\d\._?%&+\-=/#]+")?
        .short_link("bili2233", r"bili2233\.cn/[A-Za-z\d\._?%&+\-=/#]+")?
        .canonical(
            "/BV",
            r"bilibili\.com(?:/video)?/(?P<bvid>BV[0-9a-zA-Z]{10})(?:/?\?p=(?P<page>\d{1,3}))?",
            bv_id,
        )?
        .canonical(
            "BV",
            r"^(?P<bvid>BV[0-9a-zA-Z]{10})(?:\s)?(?P<page>\d{1,3})?$",
            bv_id,
        )?
        .canonical(
            "/av",
            r"bilibili\.com(?:/video)?/av(?P<avid>\d{6,})(?:/?\?p=(?P<page>\d{1,3}))?",
            av_id,
        )?
        .canonical("av", r"^av(?P<avid>\d{6,})(?:\s)?(?P<page>\d{1,3})?$", av_id)?
        .canonical("/dynamic/", r"bilibili\.com/dynamic/(?P<id>\d+)", dynamic_id)?
        .canonical("t.bili", r"t\.bilibili\.com/(?P<id>\d+)", dynamic_id)?
        .canonical("live.bili", r"live\.bilibili\.com/(?P<id>\d+)", live_id)?
        .canonical("/favlist", r"favlist\?fid=(?P<id>\d+)", favlist_id)?
        .canonical("/read/", r"bilibili\.com/read/cv(?P<id>\d+)", read_id)?
        .canonical("/opus/", r"bilibili\.com/opus/(?P<id>\d+)", opus_id)
}

/// 接口通用外层结构
#[derive(Debug, Deserialize)]
struct BiliResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> BiliResponse<T> {
    /// 业务码归类
    fn into_data(self) -> Result<T, ApiError> {
        match self.code {
            0 => self
                .data
                .ok_or_else(|| ApiError::InvalidResponse("响应缺少 data 字段".to_string())),
            CODE_NOT_LOGGED_IN => Err(ApiError::Unauthorized(format!(
                "账号未登录: {}",
                self.message
            ))),
            -352 | -403 | -412 => Err(ApiError::RiskControl(format!(
                "code {}: {}",
                self.code, self.message
            ))),
            -404 | 62002 | 62004 | 62012 | 4101147 => {
                Err(ApiError::ContentUnavailable(self.message))
            }
            code => Err(ApiError::InvalidResponse(format!(
                "code {}: {}",
                code, self.message
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Owner {
    name: String,
    #[serde(default)]
    face: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Stat {
    #[serde(default)]
    view: i64,
    #[serde(default)]
    danmaku: i64,
    #[serde(default)]
    reply: i64,
    #[serde(default)]
    favorite: i64,
    #[serde(default)]
    coin: i64,
    #[serde(default)]
    share: i64,
    #[serde(default)]
    like: i64,
}

impl Stat {
    /// 格式化统计信息,超过一万时以"万"为单位
    fn formatted(&self) -> String {
        let fmt = |v: i64| {
            if v > 10000 {
                format!("{:.1}万", v as f64 / 10000.0)
            } else {
                v.to_string()
            }
        };
        [
            ("👍", self.like),
            ("🪙", self.coin),
            ("⭐", self.favorite),
            ("↩️", self.share),
            ("💬", self.reply),
            ("👀", self.view),
            ("💭", self.danmaku),
        ]
        .iter()
        .map(|(icon, v)| format!("{} {}", icon, fmt(*v)))
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    cid: u64,
    #[serde(default)]
    part: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    first_frame: Option<String>,
    #[serde(default)]
    ctime: i64,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    bvid: String,
    title: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    duration: u64,
    owner: Owner,
    #[serde(default)]
    pic: Option<String>,
    #[serde(default)]
    pubdate: i64,
    #[serde(default)]
    cid: u64,
    #[serde(default)]
    pages: Vec<Page>,
    #[serde(default)]
    stat: Stat,
}

/// 分P信息
#[derive(Debug, PartialEq, Eq)]
struct PageInfo {
    cid: u64,
    title: String,
    duration: u64,
    cover: Option<String>,
    timestamp: i64,
}

impl ViewData {
    /// 选择分P,页码超出范围时取模回绕
    fn page_info(&self, page_num: u32) -> PageInfo {
        if self.pages.len() > 1 {
            let idx = (page_num.max(1) as usize - 1) % self.pages.len();
            let page = &self.pages[idx];
            return PageInfo {
                cid: page.cid,
                title: format!("{} | 分集 - {}", self.title, page.part),
                duration: page.duration,
                cover: page.first_frame.clone().or_else(|| self.pic.clone()),
                timestamp: page.ctime,
            };
        }
        PageInfo {
            cid: self.pages.first().map_or(self.cid, |p| p.cid),
            title: self.title.clone(),
            duration: self.duration,
            cover: self.pic.clone(),
            timestamp: self.pubdate,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DashStream {
    id: u32,
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(default)]
    codecid: i64,
    #[serde(default)]
    codecs: String,
    #[serde(default)]
    bandwidth: u64,
}

#[derive(Debug, Deserialize)]
struct Dash {
    #[serde(default)]
    video: Vec<DashStream>,
    #[serde(default)]
    audio: Option<Vec<DashStream>>,
}

#[derive(Debug, Deserialize)]
struct Durl {
    url: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct PlayUrlData {
    #[serde(default)]
    dash: Option<Dash>,
    #[serde(default)]
    durl: Vec<Durl>,
}

/// 清晰度上限内的最高画质,同画质优先指定编码;没有不超过上限的流时取最低画质
fn select_video(streams: &[DashStream], max_qn: u32, codecid: i64) -> Option<&DashStream> {
    let within: Vec<&DashStream> = streams.iter().filter(|s| s.id <= max_qn).collect();
    if within.is_empty() {
        return streams.iter().min_by_key(|s| s.id);
    }
    let best = within.iter().map(|s| s.id).max()?;
    let candidates: Vec<&DashStream> = within.into_iter().filter(|s| s.id == best).collect();
    candidates
        .iter()
        .find(|s| s.codecid == codecid)
        .or_else(|| candidates.first())
        .copied()
}

fn select_audio(streams: &[DashStream]) -> Option<&DashStream> {
    streams.iter().max_by_key(|s| (s.bandwidth, s.id))
}

fn quality_label(qn: u32) -> String {
    match qn {
        6 => "240P".to_string(),
        16 => "360P".to_string(),
        32 => "480P".to_string(),
        64 => "720P".to_string(),
        74 => "720P60".to_string(),
        80 => "1080P".to_string(),
        112 => "1080P+".to_string(),
        116 => "1080P60".to_string(),
        120 => "4K".to_string(),
        125 => "HDR".to_string(),
        126 => "杜比视界".to_string(),
        127 => "8K".to_string(),
        other => format!("qn{}", other),
    }
}

/// B站解析器
pub struct BilibiliParser {
    http: HttpClient,
    store: Arc<CredentialStore>,
    api_base: String,
    live_base: String,
    quality: u32,
    codec: VideoCodec,
}

impl BilibiliParser {
    pub fn new(config: &ParserConfig, store: Arc<CredentialStore>) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Bilibili, config)?,
            store,
            api_base: API_BASE.to_string(),
            live_base: LIVE_API_BASE.to_string(),
            quality: config.bilibili_quality,
            codec: config.bilibili_codec,
        })
    }

    /// 替换接口地址 (构建器模式,测试使用)
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_base = base.to_string();
        self.live_base = base.to_string();
        self
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        session: Option<&Session>,
    ) -> Result<T, ApiError> {
        let request_headers = with_session_cookie(
            headers(&[
                ("user-agent", COMMON_UA),
                ("referer", "https://www.bilibili.com/"),
                ("origin", "https://www.bilibili.com"),
            ]),
            session,
        );
        let response: BiliResponse<T> = self.http.get_json(url, request_headers).await?;
        response.into_data()
    }

    async fn fetch(
        &self,
        resource: &BiliResource,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        match resource {
            BiliResource::Video { bvid, page } => self.parse_video(bvid, *page, session).await,
            BiliResource::Dynamic(id) | BiliResource::Opus(id) => {
                self.parse_dynamic(id, session).await
            }
            BiliResource::Live(id) => self.parse_live(id, session).await,
            BiliResource::Favlist(id) => self.parse_favlist(id, session).await,
            BiliResource::Read(id) => self.parse_read(id, session).await,
        }
    }

    async fn parse_video(
        &self,
        bvid: &str,
        page: u32,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let view: ViewData = self
            .get(
                &format!("{}/x/web-interface/view?bvid={}", self.api_base, bvid),
                session,
            )
            .await?;
        let info = view.page_info(page);

        let play: PlayUrlData = self
            .get(
                &format!(
                    "{}/x/player/playurl?bvid={}&cid={}&qn={}&fnval=4048&fourk=1",
                    self.api_base, view.bvid, info.cid, self.quality
                ),
                session,
            )
            .await?;

        let mut raw = RawExtraction::new()
            .with_title(info.title)
            .with_author(view.owner.name)
            .with_duration(info.duration)
            .with_timestamp(info.timestamp)
            .with_extra_info(view.stat.formatted());
        if let Some(face) = view.owner.face {
            raw = raw.with_author_avatar(absolutize(&face));
        }
        if let Some(cover) = info.cover.filter(|c| !c.is_empty()) {
            raw = raw.with_cover(absolutize(&cover));
        }
        if !view.desc.trim().is_empty() {
            raw = raw.with_text(format!("简介: {}", view.desc));
        }

        match play.dash {
            Some(dash) => {
                let audio = dash.audio.as_deref().and_then(select_audio);
                if let Some(video) =
                    select_video(&dash.video, self.quality, self.codec.bilibili_codecid())
                {
                    let mut stream = RawStream::new(video.base_url.clone())
                        .with_quality(quality_label(video.id))
                        .with_codec(video.codecs.clone());
                    if let Some(audio) = audio {
                        stream = stream.with_companion_audio(audio.base_url.clone());
                    }
                    raw = raw.with_video(stream);
                }
                if let Some(audio) = audio {
                    raw = raw.with_audio(
                        RawStream::new(audio.base_url.clone()).with_codec(audio.codecs.clone()),
                    );
                }
            }
            None => {
                for durl in play.durl {
                    raw = raw.with_video(RawStream::new(durl.url).with_size(durl.size));
                }
            }
        }

        tracing::debug!(
            bvid = %bvid,
            page = page,
            videos = raw.videos.len(),
            audios = raw.audios.len(),
            "Bilibili video extracted"
        );
        Ok(raw)
    }

    async fn parse_dynamic(
        &self,
        id: &str,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let data: Value = self
            .get(
                &format!(
                    "{}/x/polymer/web-dynamic/v1/detail?id={}&features=itemOpusStyle",
                    self.api_base, id
                ),
                session,
            )
            .await?;
        let item = data
            .get("item")
            .ok_or_else(|| ApiError::InvalidResponse("动态数据缺少 item".to_string()))?;

        let mut raw = RawExtraction::new();
        if let Some(name) = str_at(item, "/modules/module_author/name") {
            raw = raw.with_author(name);
        }
        if let Some(face) = str_at(item, "/modules/module_author/face") {
            raw = raw.with_author_avatar(absolutize(face));
        }
        if let Some(ts) = i64_at(item, "/modules/module_author/pub_ts") {
            raw = raw.with_timestamp(ts);
        }

        let major = item.pointer("/modules/module_dynamic/major");
        let title = major
            .and_then(|m| str_at(m, "/opus/title").or_else(|| str_at(m, "/archive/title")));
        if let Some(title) = title {
            raw = raw.with_title(title);
        }
        let text = str_at(item, "/modules/module_dynamic/desc/text")
            .or_else(|| major.and_then(|m| str_at(m, "/opus/summary/text")));
        if let Some(text) = text {
            raw = raw.with_text(text);
        }

        let mut images = dynamic_images(item);
        if images.is_empty() {
            if let Some(orig) = item.get("orig") {
                images = dynamic_images(orig);
            }
        }
        for url in images {
            raw = raw.with_image(url);
        }
        Ok(raw)
    }

    async fn parse_live(
        &self,
        room_id: &str,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let data: Value = self
            .get(
                &format!("{}/room/v1/Room/get_info?room_id={}", self.live_base, room_id),
                session,
            )
            .await?;

        let mut raw = RawExtraction::new().with_extra_info(
            if i64_at(&data, "/live_status") == Some(1) {
                "直播中"
            } else {
                "未开播"
            },
        );
        if let Some(title) = str_at(&data, "/title") {
            raw = raw.with_title(title);
        }
        if let Some(desc) = str_at(&data, "/description") {
            raw = raw.with_text(strip_tags(desc));
        }
        if let Some(cover) = str_at(&data, "/user_cover") {
            raw = raw.with_cover(absolutize(cover)).with_image(absolutize(cover));
        }
        if let Some(keyframe) = str_at(&data, "/keyframe") {
            raw = raw.with_image(absolutize(keyframe));
        }
        Ok(raw)
    }

    async fn parse_favlist(
        &self,
        fav_id: &str,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let data: Value = self
            .get(
                &format!(
                    "{}/x/v3/fav/resource/list?media_id={}&pn=1&ps=20&platform=web",
                    self.api_base, fav_id
                ),
                session,
            )
            .await?;

        let medias = data
            .get("medias")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::ContentUnavailable("收藏夹内容为空, 或被风控".to_string()))?;

        let mut raw = RawExtraction::new();
        if let Some(title) = str_at(&data, "/info/title") {
            raw = raw.with_title(title);
        }
        if let Some(name) = str_at(&data, "/info/upper/name") {
            raw = raw.with_author(name);
        }
        if let Some(face) = str_at(&data, "/info/upper/face") {
            raw = raw.with_author_avatar(absolutize(face));
        }
        if let Some(ts) = i64_at(&data, "/info/ctime") {
            raw = raw.with_timestamp(ts);
        }

        let mut lines = Vec::new();
        for media in medias {
            if let Some(cover) = str_at(media, "/cover") {
                raw = raw.with_image(absolutize(cover));
            }
            if let Some(title) = str_at(media, "/title") {
                lines.push(title.to_string());
            }
        }
        if !lines.is_empty() {
            raw = raw.with_text(lines.join("\n"));
        }
        Ok(raw)
    }

    async fn parse_read(
        &self,
        read_id: &str,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let data: Value = self
            .get(
                &format!("{}/x/article/view?id={}", self.api_base, read_id),
                session,
            )
            .await?;

        let mut raw = RawExtraction::new();
        if let Some(title) = str_at(&data, "/title") {
            raw = raw.with_title(title);
        }
        if let Some(name) = str_at(&data, "/author/name") {
            raw = raw.with_author(name);
        }
        if let Some(face) = str_at(&data, "/author/face") {
            raw = raw.with_author_avatar(absolutize(face));
        }
        if let Some(ts) = i64_at(&data, "/publish_time") {
            raw = raw.with_timestamp(ts);
        }
        if let Some(summary) = str_at(&data, "/summary") {
            raw = raw.with_text(summary);
        }

        let images = data
            .get("origin_image_urls")
            .and_then(Value::as_array)
            .filter(|list| !list.is_empty())
            .or_else(|| data.get("image_urls").and_then(Value::as_array));
        for url in images.into_iter().flatten().filter_map(Value::as_str) {
            raw = raw.with_image(absolutize(url));
        }
        Ok(raw)
    }
}

/// 动态中的图片: 图文 (opus) 与旧版相册 (draw),以及视频动态的封面
fn dynamic_images(item: &Value) -> Vec<String> {
    let Some(major) = item.pointer("/modules/module_dynamic/major") else {
        return Vec::new();
    };
    let from = |pointer: &str, field: &str| -> Vec<String> {
        major
            .pointer(pointer)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| str_at(i, field))
                    .map(absolutize)
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut images = from("/opus/pics", "/url");
    if images.is_empty() {
        images = from("/draw/items", "/src");
    }
    if images.is_empty() {
        if let Some(cover) = str_at(major, "/archive/cover") {
            images.push(absolutize(cover));
        }
    }
    images
}

#[async_trait]
impl Parser for BilibiliParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Bilibili
    }

    fn auth_requirement(&self) -> AuthRequirement {
        AuthRequirement::Optional
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        let resource = BiliResource::parse(&canonical.resource_id).ok_or_else(|| {
            ApiError::InvalidResponse(format!("无法识别的资源标识: {}", canonical.resource_id))
        })?;

        let result = self.fetch(&resource, session).await;
        invalidate_if_rejected(&self.store, canonical, session, result).await
    }
}
