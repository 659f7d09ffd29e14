use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::models::PlatformId;

/// 提及的链接形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
    /// 长链接或裸ID,可在本地直接得到资源标识
    Canonical,

    /// 短链,需要跟随重定向
    ShortLink,
}

/// 文本中识别出的一个候选链接
///
/// 每个候选只在一次分发中存活,不做持久化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMention {
    /// 识别出的平台
    pub platform: PlatformId,

    /// 在原文中的字节区间
    pub span: Range<usize>,

    /// 原始链接文本 (短链已补全协议头)
    pub raw: String,

    /// 链接形式
    pub kind: MentionKind,

    /// 本地提取出的资源标识 (仅 `Canonical` 形式有值)
    pub resource_id: Option<String>,
}

impl RawMention {
    pub fn canonical(
        platform: PlatformId,
        span: Range<usize>,
        raw: String,
        resource_id: String,
    ) -> Self {
        Self {
            platform,
            span,
            raw,
            kind: MentionKind::Canonical,
            resource_id: Some(resource_id),
        }
    }

    pub fn short_link(platform: PlatformId, span: Range<usize>, raw: String) -> Self {
        Self {
            platform,
            span,
            raw,
            kind: MentionKind::ShortLink,
            resource_id: None,
        }
    }

    /// 未被任何平台签名识别的普通URL
    pub fn unclaimed(host: String, span: Range<usize>, raw: String) -> Self {
        Self {
            platform: PlatformId::Custom(host),
            span,
            raw,
            kind: MentionKind::Canonical,
            resource_id: None,
        }
    }

    /// 与另一个候选的区间是否重叠
    pub fn overlaps(&self, other: &RawMention) -> bool {
        self.span.start < other.span.end && other.span.start < self.span.end
    }

    /// 去重键: 同一平台的同一资源或同一原始链接只处理一次
    pub fn dedup_key(&self) -> (PlatformId, String) {
        let key = self.resource_id.clone().unwrap_or_else(|| self.raw.clone());
        (self.platform.clone(), key)
    }
}
