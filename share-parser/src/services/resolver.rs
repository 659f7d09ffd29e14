//! 短链与卡片解析
//!
//! 将候选链接解析为规范链接。短链逐跳跟随重定向,结果进入带TTL的缓存;
//! 同一短链的并发请求合并为一次上游调用。

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::header::{LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{
    ApiError, CanonicalLink, MentionKind, ParserConfig, PlatformId, RawMention, ResolutionError,
    StorageError,
};
use crate::services::http::COMMON_UA;
use crate::services::matcher::SignatureMatcher;

/// 最大重定向跳数
pub const MAX_HOPS: usize = 3;

/// 卡片/小程序数据中可能携带链接的字段,按优先级排列
const CARD_URL_POINTERS: [&str; 4] = [
    "/meta/music/musicUrl",
    "/meta/detail_1/qqdocurl",
    "/meta/news/jumpUrl",
    "/meta/music/jumpUrl",
];

/// 卡片/小程序消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// 卡片来源应用,如 `com.tencent.miniapp_01`
    pub app: String,
    /// 卡片携带的链接,没有可用字段时为错误
    pub link: Result<String, ResolutionError>,
}

fn card_url(value: &Value) -> Result<String, ResolutionError> {
    CARD_URL_POINTERS
        .iter()
        .filter_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| s.replace("\\/", "/"))
        .ok_or_else(|| ResolutionError::InvalidCard("卡片中没有可用的链接".to_string()))
}

/// 单跳重定向
///
/// 生产实现不跟随重定向,只读取 `Location`;测试中替换为内存实现。
#[async_trait]
pub trait Redirector: Send + Sync {
    /// 请求 `url` 并返回重定向目标
    ///
    /// # 返回值
    /// - `Some(next)`: 下一跳地址 (已拼接为绝对地址)
    /// - `None`: 响应不是重定向
    async fn next_hop(&self, url: &str) -> Result<Option<String>, ResolutionError>;
}

/// 基于 reqwest 的重定向器
pub struct HttpRedirector {
    client: reqwest::Client,
}

impl HttpRedirector {
    pub fn new(config: &ParserConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Redirector for HttpRedirector {
    async fn next_hop(&self, url: &str) -> Result<Option<String>, ResolutionError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, COMMON_UA)
            .send()
            .await
            .map_err(|e| ResolutionError::Network {
                url: url.to_string(),
                reason: ApiError::from(e).to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ResolutionError::Network {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let Some(location) = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(None);
        };

        let next = url::Url::parse(url)
            .and_then(|base| base.join(location))
            .map(|u| u.to_string())
            .map_err(|e| ResolutionError::Network {
                url: url.to_string(),
                reason: format!("Location 无效: {}", e),
            })?;

        Ok(Some(next))
    }
}

/// 链接解析器
pub struct LinkResolver {
    matcher: Arc<SignatureMatcher>,
    redirector: Arc<dyn Redirector>,
    cache: Cache<String, CanonicalLink>,
}

impl LinkResolver {
    /// 创建解析器
    ///
    /// # 参数
    /// - `ttl`: 短链缓存有效期
    /// - `capacity`: 缓存条目上限
    pub fn new(
        matcher: Arc<SignatureMatcher>,
        redirector: Arc<dyn Redirector>,
        ttl: Duration,
        capacity: u64,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self {
            matcher,
            redirector,
            cache,
        }
    }

    pub fn matcher(&self) -> &Arc<SignatureMatcher> {
        &self.matcher
    }

    /// 解析候选链接为规范链接
    ///
    /// 长链与裸ID在本地完成;短链经缓存跟随重定向,同一短链的并发调用共享一次上游请求,
    /// 失败结果不缓存。
    ///
    /// # 错误
    /// - `ResolutionError::NoRedirect`: 短链没有重定向
    /// - `ResolutionError::Unrecognized`: 重定向终点不是该平台的已知链接
    /// - `ResolutionError::Network`: 请求失败
    pub async fn resolve(&self, mention: &RawMention) -> Result<CanonicalLink, ResolutionError> {
        match mention.kind {
            MentionKind::Canonical => {
                let resource_id =
                    mention
                        .resource_id
                        .as_deref()
                        .ok_or_else(|| ResolutionError::MissingIdentifier {
                            raw: mention.raw.clone(),
                        })?;
                Ok(self.matcher.link(&mention.platform, resource_id, &mention.raw))
            }
            MentionKind::ShortLink => self.resolve_short(&mention.platform, &mention.raw).await,
        }
    }

    /// 解析任意平台URL
    ///
    /// 对已是规范形式的URL返回与其自身相等的规范链接。
    pub async fn resolve_url(
        &self,
        platform: &PlatformId,
        url: &str,
    ) -> Result<CanonicalLink, ResolutionError> {
        if let Some(resource_id) = self.matcher.match_canonical(platform, url) {
            return Ok(self.matcher.link(platform, &resource_id, url));
        }
        let is_short = self
            .matcher
            .signature(platform)
            .is_some_and(|s| s.is_short_link(url));
        if is_short {
            return self.resolve_short(platform, url).await;
        }
        Err(ResolutionError::Unrecognized {
            url: url.to_string(),
        })
    }

    async fn resolve_short(
        &self,
        platform: &PlatformId,
        raw: &str,
    ) -> Result<CanonicalLink, ResolutionError> {
        let key = raw.to_string();
        self.cache
            .try_get_with(key, self.follow(platform, raw))
            .await
            .map_err(|e: Arc<ResolutionError>| (*e).clone())
    }

    async fn follow(
        &self,
        platform: &PlatformId,
        raw: &str,
    ) -> Result<CanonicalLink, ResolutionError> {
        let mut current = raw.to_string();

        for hop in 0..MAX_HOPS {
            let next = match self.redirector.next_hop(&current).await? {
                Some(next) if next != current => next,
                _ if hop == 0 => {
                    tracing::warn!(platform = %platform, url = %raw, "Short link did not redirect");
                    return Err(ResolutionError::NoRedirect {
                        url: raw.to_string(),
                    });
                }
                _ => return Err(ResolutionError::Unrecognized { url: current }),
            };

            if let Some(resource_id) = self.matcher.match_canonical(platform, &next) {
                tracing::info!(
                    platform = %platform,
                    short_link = %raw,
                    resource_id = %resource_id,
                    hops = hop + 1,
                    "Short link resolved"
                );
                return Ok(self.matcher.link(platform, &resource_id, &next));
            }
            current = next;
        }

        Err(ResolutionError::TooManyHops { url: current })
    }

    /// 解包卡片/小程序数据,返回其中携带的链接
    ///
    /// # 错误
    /// 返回 `ResolutionError::InvalidCard` 如果数据不是JSON或没有可用字段
    pub fn unwrap_card(payload: &str) -> Result<String, ResolutionError> {
        let value: Value = serde_json::from_str(payload.trim())
            .map_err(|e| ResolutionError::InvalidCard(format!("JSON 无效: {}", e)))?;
        card_url(&value)
    }

    /// 识别卡片/小程序消息并解包
    ///
    /// 只有能解析为JSON对象且带有 `app` 或 `meta` 字段时才视为卡片;
    /// 返回 `None` 时应按普通文本识别。
    pub fn card_payload(text: &str) -> Option<Card> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let value: Value = serde_json::from_str(trimmed).ok()?;
        let object = value.as_object()?;
        if !object.contains_key("app") && !object.contains_key("meta") {
            return None;
        }

        let app = object
            .get("app")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("card")
            .to_string();
        let link = card_url(&value);
        if let Err(e) = &link {
            tracing::warn!(app = %app, error = %e, "Card payload without link");
        }
        Some(Card { app, link })
    }

    /// 缓存中的短链条目
    pub fn cache_snapshot(&self) -> Vec<(String, CanonicalLink)> {
        self.cache
            .iter()
            .map(|(k, v)| (k.as_ref().clone(), v))
            .collect()
    }

    /// 预热缓存
    pub async fn warm_cache(&self, entries: Vec<(String, CanonicalLink)>) {
        for (short, link) in entries {
            self.cache.insert(short, link).await;
        }
    }

    /// 保存缓存快照到文件 (尽力而为)
    pub async fn save_snapshot(&self, path: &Path) -> Result<usize, StorageError> {
        let entries = self.cache_snapshot();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&entries)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "Short link cache saved");
        Ok(entries.len())
    }

    /// 从快照文件恢复缓存,文件不存在时不做任何事
    pub async fn load_snapshot(&self, path: &Path) -> Result<usize, StorageError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<(String, CanonicalLink)> = serde_json::from_slice(&bytes)?;
        let count = entries.len();
        self.warm_cache(entries).await;
        tracing::info!(path = %path.display(), entries = count, "Short link cache restored");
        Ok(count)
    }
}
