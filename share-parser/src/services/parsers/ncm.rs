//! 网易云音乐解析器
//!
//! 歌曲走 `song/detail` 与 `song/enhance/player/url` 两个接口;
//! `music.126.net` 上的 mp3 直链不请求接口,直接作为音频资源。

use async_trait::async_trait;
use regex::Captures;
use serde_json::Value;
use std::sync::Arc;

use super::{first_str, i64_at, invalidate_if_rejected, str_at, AuthRequirement, Parser};
use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, RawStream,
    Session,
};
use crate::services::credential_store::CredentialStore;
use crate::services::http::{headers, with_session_cookie, HttpClient, COMMON_UA};
use crate::services::matcher::Signature;

const BASE: &str = "https://music.163.com";

/// 播放地址码率
const BITRATE: u32 = 320_000;

/// 接口返回的未登录业务码
const CODE_NEED_LOGIN: i64 = 301;

fn canonical_url(resource_id: &str) -> String {
    match resource_id.split_once('/') {
        Some(("mp3", location)) => format!("https://{}", location),
        Some((_, id)) => format!("https://music.163.com/#/song?id={}", id),
        None => format!("https://music.163.com/#/song?id={}", resource_id),
    }
}

fn song_id(caps: &Captures<'_>) -> Option<String> {
    Some(format!("song/{}", caps.name("id")?.as_str()))
}

fn mp3_location(caps: &Captures<'_>) -> Option<String> {
    Some(format!("mp3/{}", caps.name("location")?.as_str()))
}

/// 网易云链接签名
pub fn signature() -> Result<Signature, ConfigError> {
    Signature::new(PlatformId::Ncm, canonical_url)
        .short_link("163cn.tv", r"163cn\.tv/[A-Za-z0-9]+")?
        .canonical(
            "music.163.com/song/media",
            r"music\.163\.com/song/media/outer/url\?(?:\S*?&)?id=(?P<id>\d+)",
            song_id,
        )?
        .canonical(
            "music.163.com",
            r"music\.163\.com/(?:#/|m/)?song\?(?:\S*?&)?id=(?P<id>\d+)",
            song_id,
        )?
        .canonical(
            "music.126.net",
            r"(?P<location>[A-Za-z0-9.-]*music\.126\.net/[^\s?#]+\.mp3)",
            mp3_location,
        )
}

/// 外链播放地址,接口不给地址 (版权或会员限制) 时使用
fn outer_url(id: &str) -> String {
    format!("https://music.163.com/song/media/outer/url?id={}.mp3", id)
}

/// 歌曲详情转换为原始提取结果 (不含音频流)
fn song_to_raw(song: &Value) -> RawExtraction {
    let mut raw = RawExtraction::new();

    let name = str_at(song, "/name").unwrap_or_default();
    let title = match first_str(song, "/alias") {
        Some(alias) => format!("{}（{}）", name, alias),
        None => name.to_string(),
    };
    raw = raw.with_title(title);

    if let Some(album) = str_at(song, "/album/name") {
        raw = raw.with_text(format!("专辑：{}", album));
    }
    if let Some(pic) = str_at(song, "/album/picUrl") {
        raw = raw.with_cover(format!("{}?param=640y640", pic));
    }
    if let Some(ms) = i64_at(song, "/duration") {
        raw = raw.with_duration((ms.max(0) / 1000) as u64);
    }

    let artists: Vec<&str> = song
        .get("artists")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(|a| str_at(a, "/name")).collect())
        .unwrap_or_default();
    if !artists.is_empty() {
        raw = raw.with_author(artists.join(" / "));
    }
    if let Some(avatar) = str_at(song, "/artists/0/img1v1Url") {
        raw = raw.with_author_avatar(avatar);
    }
    raw
}

/// 接口业务码检查
fn check_code(value: &Value) -> Result<(), ApiError> {
    match i64_at(value, "/code") {
        Some(CODE_NEED_LOGIN) => Err(ApiError::Unauthorized("网易云需要登录".to_string())),
        Some(200) | None => Ok(()),
        Some(code) => Err(ApiError::InvalidResponse(format!("网易云接口返回 code={}", code))),
    }
}

/// 网易云音乐解析器
pub struct NcmParser {
    http: HttpClient,
    store: Arc<CredentialStore>,
    base: String,
}

impl NcmParser {
    pub fn new(config: &ParserConfig, store: Arc<CredentialStore>) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Ncm, config)?,
            store,
            base: BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, url: &str, session: Option<&Session>) -> Result<Value, ApiError> {
        let request_headers = with_session_cookie(
            headers(&[("user-agent", COMMON_UA), ("referer", "https://music.163.com")]),
            session,
        );
        let value: Value = self.http.get_json(url, request_headers).await?;
        check_code(&value)?;
        Ok(value)
    }

    async fn parse_song(&self, id: &str, session: Option<&Session>) -> Result<RawExtraction, ApiError> {
        let detail = self
            .get(
                &format!("{}/api/song/detail/?id={}&ids=[{}]", self.base, id, id),
                session,
            )
            .await?;
        let song = detail
            .pointer("/songs/0")
            .filter(|s| s.as_object().is_some_and(|o| !o.is_empty()))
            .ok_or_else(|| ApiError::ContentUnavailable("未找到该歌曲".to_string()))?;
        let raw = song_to_raw(song);

        let player = self
            .get(
                &format!(
                    "{}/api/song/enhance/player/url?ids=[{}]&br={}",
                    self.base, id, BITRATE
                ),
                session,
            )
            .await?;

        let stream = match str_at(&player, "/data/0/url") {
            Some(url) => {
                let mut stream = RawStream::new(url);
                if let Some(kind) = str_at(&player, "/data/0/type") {
                    stream = stream.with_codec(kind.to_lowercase());
                }
                if let Some(size) = i64_at(&player, "/data/0/size") {
                    stream = stream.with_size(size.max(0) as u64);
                }
                stream
            }
            None => {
                tracing::info!(song_id = %id, "No player url, using outer link");
                RawStream::new(outer_url(id)).with_codec("mp3")
            }
        };
        Ok(raw.with_audio(stream))
    }
}

#[async_trait]
impl Parser for NcmParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Ncm
    }

    fn auth_requirement(&self) -> AuthRequirement {
        AuthRequirement::Optional
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        match canonical.resource_id.split_once('/') {
            Some(("mp3", _)) => Ok(RawExtraction::new()
                .with_title("网易云音乐")
                .with_text("直链音频")
                .with_audio(RawStream::new(canonical.canonical_url.clone()).with_codec("mp3"))),
            Some(("song", id)) => {
                let result = self.parse_song(id, session).await;
                invalidate_if_rejected(&self.store, canonical, session, result).await
            }
            _ => Err(ApiError::InvalidResponse(format!(
                "无法识别的资源标识: {}",
                canonical.resource_id
            ))),
        }
    }
}
