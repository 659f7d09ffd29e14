//! 链接签名匹配
//!
//! 每个平台声明一组链接模式 (关键字预筛 + 正则 + 资源标识提取),
//! 匹配器在任意文本中找出所有候选,并按确定的优先级消解重叠。

use regex::{Captures, Regex};
use std::cmp::Reverse;
use std::collections::HashSet;

use crate::models::{CanonicalLink, ConfigError, MentionKind, PlatformId, RawMention};

/// 从正则捕获中提取资源标识
pub type IdExtractor = fn(&Captures<'_>) -> Option<String>;

/// 由资源标识派生规范URL
pub type UrlBuilder = fn(&str) -> String;

/// 单条链接模式
pub struct LinkPattern {
    /// 预筛关键字,文本不包含时跳过正则
    pub keyword: &'static str,
    pub regex: Regex,
    pub kind: MentionKind,
    /// 仅 `Canonical` 模式使用
    pub extract: Option<IdExtractor>,
}

/// 平台链接签名
pub struct Signature {
    pub platform: PlatformId,
    pub patterns: Vec<LinkPattern>,
    pub canonical_url: UrlBuilder,
}

impl Signature {
    /// 创建空签名
    pub fn new(platform: PlatformId, canonical_url: UrlBuilder) -> Self {
        Self {
            platform,
            patterns: Vec::new(),
            canonical_url,
        }
    }

    /// 添加长链/裸ID模式 (构建器模式)
    ///
    /// # 错误
    /// 返回 `ConfigError::InvalidPattern` 如果正则无效
    pub fn canonical(
        mut self,
        keyword: &'static str,
        pattern: &str,
        extract: IdExtractor,
    ) -> Result<Self, ConfigError> {
        self.patterns.push(LinkPattern {
            keyword,
            regex: Regex::new(pattern)?,
            kind: MentionKind::Canonical,
            extract: Some(extract),
        });
        Ok(self)
    }

    /// 添加短链模式 (构建器模式)
    ///
    /// 正则不应包含协议头,命中的文本会被补全为 `https://` 链接。
    pub fn short_link(mut self, keyword: &'static str, pattern: &str) -> Result<Self, ConfigError> {
        self.patterns.push(LinkPattern {
            keyword,
            regex: Regex::new(pattern)?,
            kind: MentionKind::ShortLink,
            extract: None,
        });
        Ok(self)
    }

    /// 在一个已解引用的URL上匹配长链模式,返回资源标识
    pub fn match_canonical(&self, url: &str) -> Option<String> {
        self.patterns
            .iter()
            .filter(|p| p.kind == MentionKind::Canonical)
            .find_map(|p| {
                let caps = p.regex.captures(url)?;
                p.extract.and_then(|extract| extract(&caps))
            })
    }

    /// URL是否为该平台的短链
    pub fn is_short_link(&self, url: &str) -> bool {
        self.patterns
            .iter()
            .filter(|p| p.kind == MentionKind::ShortLink)
            .any(|p| p.regex.is_match(url))
    }

    /// 构造规范链接
    pub fn link(&self, resource_id: &str, original_url: &str) -> CanonicalLink {
        CanonicalLink::new(
            self.platform.clone(),
            resource_id,
            (self.canonical_url)(resource_id),
            original_url,
        )
    }
}

/// 匹配候选,排序用
struct Hit {
    mention: RawMention,
    keyword_len: usize,
}

/// 签名匹配器
///
/// 平台签名按注册顺序保存,彼此独立;增删一个平台不影响其他平台的识别。
pub struct SignatureMatcher {
    signatures: Vec<Signature>,
    generic_url: Regex,
}

impl SignatureMatcher {
    pub fn new(signatures: Vec<Signature>) -> Result<Self, ConfigError> {
        Ok(Self {
            signatures,
            generic_url: Regex::new(r#"https?://[^\s<>"'()\[\]{}，。！？、；：“”‘’（）【】《》]+"#)?,
        })
    }

    /// 追加一个平台签名
    pub fn add_signature(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    pub fn signature(&self, platform: &PlatformId) -> Option<&Signature> {
        self.signatures.iter().find(|s| &s.platform == platform)
    }

    pub fn platforms(&self) -> Vec<PlatformId> {
        self.signatures.iter().map(|s| s.platform.clone()).collect()
    }

    /// 在文本中识别所有候选链接
    ///
    /// 重叠消解规则: 按起始位置、匹配长度 (长者优先)、关键字长度 (长者优先)
    /// 排序后依次接受,与已接受候选重叠的丢弃。同一平台同一资源只保留首次出现。
    /// 未被任何平台认领的普通URL以 `Custom(<host>)` 形式返回。
    ///
    /// # 返回值
    /// 按出现位置排序的候选列表
    pub fn detect(&self, text: &str) -> Vec<RawMention> {
        let mut hits = Vec::new();

        for signature in &self.signatures {
            for pattern in &signature.patterns {
                if !text.contains(pattern.keyword) {
                    continue;
                }
                for caps in pattern.regex.captures_iter(text) {
                    let Some(m) = caps.get(0) else { continue };
                    let mention = match pattern.kind {
                        MentionKind::Canonical => {
                            let Some(resource_id) = pattern.extract.and_then(|f| f(&caps)) else {
                                continue;
                            };
                            RawMention::canonical(
                                signature.platform.clone(),
                                m.range(),
                                m.as_str().trim().to_string(),
                                resource_id,
                            )
                        }
                        MentionKind::ShortLink => RawMention::short_link(
                            signature.platform.clone(),
                            m.range(),
                            format!("https://{}", m.as_str()),
                        ),
                    };
                    hits.push(Hit {
                        mention,
                        keyword_len: pattern.keyword.len(),
                    });
                }
            }
        }

        hits.sort_by_key(|h| {
            (
                h.mention.span.start,
                Reverse(h.mention.span.len()),
                Reverse(h.keyword_len),
            )
        });

        let mut accepted: Vec<RawMention> = Vec::new();
        for hit in hits {
            if accepted.iter().all(|a| !a.overlaps(&hit.mention)) {
                accepted.push(hit.mention);
            }
        }

        for m in self.generic_url.find_iter(text) {
            let url_match = RawMention::unclaimed(String::new(), m.range(), m.as_str().to_string());
            if accepted.iter().any(|a| a.overlaps(&url_match)) {
                continue;
            }
            let Some(host) = url::Url::parse(m.as_str())
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
            else {
                continue;
            };
            accepted.push(RawMention::unclaimed(host, m.range(), m.as_str().to_string()));
        }

        accepted.sort_by_key(|m| m.span.start);

        let mut seen = HashSet::new();
        accepted.retain(|m| seen.insert(m.dedup_key()));

        tracing::debug!(
            candidates = accepted.len(),
            platforms = ?accepted.iter().map(|m| m.platform.as_str()).collect::<Vec<_>>(),
            "Detected link candidates"
        );

        accepted
    }

    /// 将平台URL匹配为资源标识
    pub fn match_canonical(&self, platform: &PlatformId, url: &str) -> Option<String> {
        self.signature(platform)?.match_canonical(url)
    }

    /// 构造规范链接
    ///
    /// 平台没有签名时使用原始链接作为规范URL。
    pub fn link(&self, platform: &PlatformId, resource_id: &str, original_url: &str) -> CanonicalLink {
        match self.signature(platform) {
            Some(signature) => signature.link(resource_id, original_url),
            None => CanonicalLink::new(platform.clone(), resource_id, original_url, original_url),
        }
    }
}
