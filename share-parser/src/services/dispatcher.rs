//! 解析分发
//!
//! 一条消息的处理流程: 识别候选 → 解析规范链接 → 选择解析器 → 抓取 → 规范化。
//! 每个候选各自成败,一个失败不影响同一消息中的其他候选。

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{
    CanonicalLink, ConfigError, ParseError, ParseResult, ParserConfig, PlatformId, RawMention,
};
use crate::services::credential_store::CredentialStore;
use crate::services::matcher::SignatureMatcher;
use crate::services::normalizer::{normalize, AssetFilter};
use crate::services::parsers::{builtin_parsers, builtin_signatures, AuthRequirement};
use crate::services::registry::ParserRegistry;
use crate::services::resolver::{HttpRedirector, LinkResolver, Redirector};

/// 解析分发器
pub struct Dispatcher {
    resolver: Arc<LinkResolver>,
    registry: Arc<ParserRegistry>,
    store: Arc<CredentialStore>,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<LinkResolver>,
        registry: Arc<ParserRegistry>,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self {
            resolver,
            registry,
            store,
        }
    }

    /// 按配置装配内置平台
    ///
    /// 被禁用的平台仍保留链接签名,只是不注册解析器。
    ///
    /// # 错误
    /// - `ConfigError::InvalidPattern`: 内置签名正则无效
    /// - `ConfigError::HttpClient`: HTTP客户端构建失败 (如代理地址无效)
    pub fn from_config(
        config: &ParserConfig,
        store: Arc<CredentialStore>,
    ) -> Result<Self, ConfigError> {
        let redirector: Arc<dyn Redirector> = Arc::new(HttpRedirector::new(config)?);
        Self::with_redirector(config, store, redirector)
    }

    /// 指定重定向器装配内置平台
    pub fn with_redirector(
        config: &ParserConfig,
        store: Arc<CredentialStore>,
        redirector: Arc<dyn Redirector>,
    ) -> Result<Self, ConfigError> {
        let matcher = Arc::new(SignatureMatcher::new(builtin_signatures()?)?);
        let resolver = Arc::new(LinkResolver::new(
            matcher,
            redirector,
            config.short_link_ttl,
            config.short_link_capacity,
        ));

        let mut registry = ParserRegistry::new();
        for parser in builtin_parsers(config, Arc::clone(&store))? {
            registry.register(parser);
        }

        tracing::info!(
            platforms = ?registry.platforms().iter().map(|p| p.as_str().to_string()).collect::<Vec<_>>(),
            "Dispatcher assembled"
        );
        Ok(Self::new(resolver, Arc::new(registry), store))
    }

    pub fn resolver(&self) -> &Arc<LinkResolver> {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<ParserRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// 识别消息中的候选链接
    ///
    /// 卡片/小程序数据先解包出其中的链接;没有可用链接的卡片不产生候选。
    pub fn detect(&self, text: &str) -> Vec<RawMention> {
        self.detect_mentions(text).unwrap_or_default()
    }

    /// 识别消息中的候选链接,卡片解包失败时返回错误
    ///
    /// 只有能解析为JSON对象且带 `app` 或 `meta` 字段的消息才视为卡片,
    /// 其余消息 (包括以 `{` 开头的普通文本) 按文本识别。
    ///
    /// # 错误
    /// 返回 `ParseError::Resolution` 如果卡片中没有可用的链接字段,
    /// 平台标记为卡片来源应用
    pub fn detect_mentions(&self, text: &str) -> Result<Vec<RawMention>, ParseError> {
        let Some(card) = LinkResolver::card_payload(text) else {
            return Ok(self.resolver.matcher().detect(text));
        };
        match card.link {
            Ok(url) => {
                tracing::debug!(app = %card.app, url = %url, "Card payload unwrapped");
                Ok(self.resolver.matcher().detect(&url))
            }
            Err(e) => Err(ParseError::Resolution {
                platform: PlatformId::Custom(card.app),
                raw: text.trim().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// 解析消息中的全部链接
    pub async fn parse(&self, text: &str) -> Vec<Result<ParseResult, ParseError>> {
        self.parse_with(text, AssetFilter::All).await
    }

    /// 按资源过滤方式解析消息中的全部链接
    ///
    /// # 返回值
    /// 每个候选一个结果,顺序与候选在文本中的出现顺序一致
    pub async fn parse_with(
        &self,
        text: &str,
        filter: AssetFilter,
    ) -> Vec<Result<ParseResult, ParseError>> {
        let mentions = match self.detect_mentions(text) {
            Ok(mentions) => mentions,
            Err(e) => return vec![Err(e)],
        };
        if mentions.is_empty() {
            return Vec::new();
        }
        tracing::debug!(mentions = mentions.len(), "Dispatching mentions");
        join_all(mentions.iter().map(|m| self.parse_mention(m, filter))).await
    }

    /// 处理单个候选
    pub async fn parse_mention(
        &self,
        mention: &RawMention,
        filter: AssetFilter,
    ) -> Result<ParseResult, ParseError> {
        let canonical = self.resolve(mention).await?;
        self.parse_link(&canonical, filter).await
    }

    /// 将候选解析为规范链接
    ///
    /// 未被任何签名认领的普通URL,仅当有解析器声明其平台时以原链接作为资源标识。
    ///
    /// # 错误
    /// - `ParseError::UnsupportedPlatform`: 普通URL没有对应解析器
    /// - `ParseError::Resolution`: 短链或卡片解析失败
    pub async fn resolve(&self, mention: &RawMention) -> Result<CanonicalLink, ParseError> {
        if mention.platform.is_custom() && mention.resource_id.is_none() {
            if !self.registry.supports(&mention.platform) {
                tracing::debug!(platform = %mention.platform, raw = %mention.raw, "Unclaimed URL");
                return Err(ParseError::UnsupportedPlatform {
                    platform: mention.platform.clone(),
                    raw: mention.raw.clone(),
                });
            }
            return Ok(CanonicalLink::new(
                mention.platform.clone(),
                mention.raw.as_str(),
                mention.raw.as_str(),
                mention.raw.as_str(),
            ));
        }

        self.resolver.resolve(mention).await.map_err(|e| {
            tracing::warn!(platform = %mention.platform, raw = %mention.raw, error = %e, "Link resolution failed");
            ParseError::Resolution {
                platform: mention.platform.clone(),
                raw: mention.raw.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// 解析平台URL (短链或长链均可)
    pub async fn resolve_url(
        &self,
        platform: &PlatformId,
        url: &str,
    ) -> Result<CanonicalLink, ParseError> {
        self.resolver
            .resolve_url(platform, url)
            .await
            .map_err(|e| ParseError::Resolution {
                platform: platform.clone(),
                raw: url.to_string(),
                reason: e.to_string(),
            })
    }

    /// 抓取并规范化一个规范链接
    ///
    /// 仅当解析器声明需要凭证时才查询凭证存储;没有凭证不会中止流程。
    ///
    /// # 错误
    /// - `ParseError::UnsupportedPlatform`: 没有解析器
    /// - `ParseError::AuthRequired`: 平台要求登录或凭证失效
    /// - `ParseError::Extraction`: 解析器失败
    /// - `ParseError::Normalization`: 结果中没有可用资源
    pub async fn parse_link(
        &self,
        canonical: &CanonicalLink,
        filter: AssetFilter,
    ) -> Result<ParseResult, ParseError> {
        let parser = self.registry.select(canonical)?;
        let platform = parser.platform();

        let session = match parser.auth_requirement() {
            AuthRequirement::None => None,
            AuthRequirement::Optional | AuthRequirement::Required => {
                self.store.get(&platform).await
            }
        };

        let started = std::time::Instant::now();
        let extraction = match filter {
            AssetFilter::All => parser.handle(canonical, session.as_ref()).await,
            AssetFilter::AudioOnly => parser.handle_audio(canonical, session.as_ref()).await,
        };
        let elapsed = started.elapsed();

        let raw = extraction.map_err(|e| {
            tracing::warn!(
                platform = %platform,
                resource_id = %canonical.resource_id,
                has_session = session.is_some(),
                error = %e,
                "Extraction failed"
            );
            ParseError::from_api(platform.clone(), e)
        })?;

        let result = normalize(raw, &platform, canonical, filter).map_err(|e| {
            ParseError::Normalization {
                platform: platform.clone(),
                reason: e.to_string(),
            }
        })?;

        log_parsed(&result, elapsed);
        Ok(result)
    }
}

fn log_parsed(result: &ParseResult, elapsed: Duration) {
    crate::log_event!(
        "Parsed",
        platform = %result.platform,
        resource_id = %result.canonical.resource_id,
        assets = result.assets.len(),
        elapsed_ms = elapsed.as_millis() as u64
    );
}
