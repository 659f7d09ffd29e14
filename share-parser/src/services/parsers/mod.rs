//! 平台解析器
//!
//! 每个平台一个解析器,负责该平台的全部细节 (请求头、签名、清晰度选择),
//! 对外只暴露统一的 `Parser` 接口。链接识别规则 (`signature()`) 与解析器放在同一个模块中。

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::models::{
    ApiError, CanonicalLink, ConfigError, ParserConfig, PlatformId, RawExtraction, Session,
};
use crate::services::credential_store::CredentialStore;
use crate::services::matcher::Signature;

pub mod acfun;
pub mod bilibili;
pub mod douyin;
pub mod instagram;
pub mod kuaishou;
pub mod ncm;
pub mod tiktok;
pub mod twitter;
pub mod weibo;
pub mod xiaohongshu;
pub mod youtube;
pub mod ytdlp;

pub use acfun::AcfunParser;
pub use bilibili::BilibiliParser;
pub use douyin::DouyinParser;
pub use instagram::InstagramParser;
pub use kuaishou::KuaishouParser;
pub use ncm::NcmParser;
pub use tiktok::TiktokParser;
pub use twitter::TwitterParser;
pub use weibo::WeiboParser;
pub use xiaohongshu::XiaohongshuParser;
pub use youtube::YoutubeParser;

/// 解析器对登录凭证的需求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    /// 从不使用凭证
    None,
    /// 有凭证时效果更好 (更高清晰度等)
    Optional,
    /// 没有凭证无法解析
    Required,
}

/// 平台解析器接口
#[async_trait]
pub trait Parser: Send + Sync {
    /// 解析器负责的平台,实例生命周期内不变
    fn platform(&self) -> PlatformId;

    fn auth_requirement(&self) -> AuthRequirement {
        AuthRequirement::None
    }

    /// 抓取并提取规范链接对应的内容
    ///
    /// # 参数
    /// - `canonical`: 已解析的规范链接
    /// - `session`: 平台凭证,仅在 `auth_requirement()` 不为 `None` 时传入
    ///
    /// # 错误
    /// 返回 `ApiError::Unauthorized` 时,解析器已使对应凭证失效
    async fn handle(
        &self,
        canonical: &CanonicalLink,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError>;

    /// 仅需要音频时的抓取入口
    ///
    /// 默认与 `handle` 相同,由规范化阶段过滤出音频。
    async fn handle_audio(
        &self,
        canonical: &CanonicalLink,
        session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        self.handle(canonical, session).await
    }
}

/// 上游拒绝凭证时使该平台凭证失效,结果原样返回
///
/// 需要凭证的解析器在 `handle` 返回前调用,保证 `Unauthorized` 返回时凭证已被移除。
/// 本次请求没有携带凭证时不做任何操作。
pub(crate) async fn invalidate_if_rejected<T>(
    store: &CredentialStore,
    canonical: &CanonicalLink,
    session: Option<&Session>,
    result: Result<T, ApiError>,
) -> Result<T, ApiError> {
    if let (Err(ApiError::Unauthorized(reason)), Some(_)) = (&result, session) {
        tracing::warn!(
            platform = %canonical.platform,
            resource_id = %canonical.resource_id,
            reason = %reason,
            "Session rejected by upstream, invalidating"
        );
        store.invalidate(&canonical.platform).await;
    }
    result
}

/// 内置平台的链接签名,顺序即匹配器中的注册顺序
pub fn builtin_signatures() -> Result<Vec<Signature>, ConfigError> {
    Ok(vec![
        bilibili::signature()?,
        douyin::signature()?,
        weibo::signature()?,
        xiaohongshu::signature()?,
        kuaishou::signature()?,
        acfun::signature()?,
        youtube::signature()?,
        tiktok::signature()?,
        twitter::signature()?,
        instagram::signature()?,
        ncm::signature()?,
    ])
}

/// 构造已启用平台的内置解析器
///
/// 被禁用的平台不会注册解析器,其链接仍会被识别,但选择时返回不支持。
pub fn builtin_parsers(
    config: &ParserConfig,
    store: Arc<CredentialStore>,
) -> Result<Vec<Arc<dyn Parser>>, ConfigError> {
    let mut parsers: Vec<Arc<dyn Parser>> = Vec::new();

    for platform in PlatformId::builtin() {
        if !config.is_enabled(&platform) {
            tracing::info!(platform = %platform, "Parser disabled by configuration");
            continue;
        }
        let parser: Arc<dyn Parser> = match platform {
            PlatformId::Bilibili => Arc::new(BilibiliParser::new(config, store.clone())?),
            PlatformId::Douyin => Arc::new(DouyinParser::new(config, store.clone())?),
            PlatformId::Weibo => Arc::new(WeiboParser::new(config)?),
            PlatformId::Xiaohongshu => Arc::new(XiaohongshuParser::new(config, store.clone())?),
            PlatformId::Kuaishou => Arc::new(KuaishouParser::new(config)?),
            PlatformId::Acfun => Arc::new(AcfunParser::new(config)?),
            PlatformId::Youtube => Arc::new(YoutubeParser::new(config)?),
            PlatformId::Tiktok => Arc::new(TiktokParser::new(config)?),
            PlatformId::Twitter => Arc::new(TwitterParser::new(config)?),
            PlatformId::Instagram => Arc::new(InstagramParser::new(config)?),
            PlatformId::Ncm => Arc::new(NcmParser::new(config, store.clone())?),
            PlatformId::Custom(_) => continue,
        };
        parsers.push(parser);
    }

    tracing::info!(
        parsers = ?parsers.iter().map(|p| p.platform().to_string()).collect::<Vec<_>>(),
        "Built-in parsers constructed"
    );
    Ok(parsers)
}

/// 取出页面中 `marker` 之后赋值的JSON对象
///
/// 适用于 `window._ROUTER_DATA = {...}</script>` 这类内嵌状态。
/// JavaScript 字面量 `undefined` 会被替换为 `null`。
///
/// # 错误
/// 返回 `ApiError::InvalidResponse` 如果页面中没有该标记
pub fn json_after_marker(html: &str, marker: &str) -> Result<Value, ApiError> {
    let start = html
        .find(marker)
        .map(|i| i + marker.len())
        .ok_or_else(|| ApiError::InvalidResponse(format!("页面中没有 {}", marker)))?;
    let rest = html[start..].trim_start().trim_start_matches('=');
    let end = rest.find("</script>").unwrap_or(rest.len());
    let raw = rest[..end].trim().trim_end_matches(';');
    let raw = raw.replace(":undefined", ":null");
    Ok(serde_json::from_str(&raw)?)
}

/// 去除HTML标签,`<br>` 转换为换行
pub fn strip_tags(html: &str) -> String {
    let html = html
        .replace("<br />", "\n")
        .replace("<br/>", "\n")
        .replace("<br>", "\n");
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace('\u{200b}', "")
        .trim()
        .to_string()
}

/// 读取JSON字符串字段
pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// 读取JSON整数字段,兼容字符串形式的数字
pub(crate) fn i64_at(value: &Value, pointer: &str) -> Option<i64> {
    let v = value.pointer(pointer)?;
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// 列表中第一个非空字符串,如 `url_list[0]`
pub(crate) fn first_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .and_then(|list| list.iter().filter_map(Value::as_str).find(|s| !s.is_empty()))
        .map(str::to_string)
}

/// 协议相对地址补全为 https
pub(crate) fn absolutize(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else if url.starts_with("http://") {
        url.replacen("http://", "https://", 1)
    } else {
        url.to_string()
    }
}
