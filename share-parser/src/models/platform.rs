use serde::{Deserialize, Serialize};
use std::fmt;

/// 平台标识
///
/// 内置平台为封闭集合,按固定顺序注册;`Custom` 为开放扩展点,
/// 未被任何签名识别的普通URL以 `Custom(<host>)` 标记。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlatformId {
    Bilibili,
    Douyin,
    Weibo,
    Xiaohongshu,
    Kuaishou,
    Acfun,
    Youtube,
    Tiktok,
    Twitter,
    Instagram,
    Ncm,
    Custom(String),
}

impl PlatformId {
    /// 内置平台,按注册顺序排列
    pub fn builtin() -> [PlatformId; 11] {
        [
            PlatformId::Bilibili,
            PlatformId::Douyin,
            PlatformId::Weibo,
            PlatformId::Xiaohongshu,
            PlatformId::Kuaishou,
            PlatformId::Acfun,
            PlatformId::Youtube,
            PlatformId::Tiktok,
            PlatformId::Twitter,
            PlatformId::Instagram,
            PlatformId::Ncm,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlatformId::Bilibili => "bilibili",
            PlatformId::Douyin => "douyin",
            PlatformId::Weibo => "weibo",
            PlatformId::Xiaohongshu => "xiaohongshu",
            PlatformId::Kuaishou => "kuaishou",
            PlatformId::Acfun => "acfun",
            PlatformId::Youtube => "youtube",
            PlatformId::Tiktok => "tiktok",
            PlatformId::Twitter => "twitter",
            PlatformId::Instagram => "instagram",
            PlatformId::Ncm => "ncm",
            PlatformId::Custom(name) => name.as_str(),
        }
    }

    /// 面向聊天用户的显示名称
    pub fn display_name(&self) -> &str {
        match self {
            PlatformId::Bilibili => "B站",
            PlatformId::Douyin => "抖音",
            PlatformId::Weibo => "微博",
            PlatformId::Xiaohongshu => "小红书",
            PlatformId::Kuaishou => "快手",
            PlatformId::Acfun => "A站",
            PlatformId::Youtube => "油管",
            PlatformId::Tiktok => "TikTok",
            PlatformId::Twitter => "推特",
            PlatformId::Instagram => "Instagram",
            PlatformId::Ncm => "网易云",
            PlatformId::Custom(name) => name.as_str(),
        }
    }

    /// 环境变量中使用的平台段,如 `PARSER_BILIBILI_COOKIES` 中的 `BILIBILI`
    pub fn env_segment(&self) -> String {
        self.as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, PlatformId::Custom(_))
    }
}

impl From<&str> for PlatformId {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "bilibili" | "bili" | "b站" => PlatformId::Bilibili,
            "douyin" | "抖音" => PlatformId::Douyin,
            "weibo" | "微博" => PlatformId::Weibo,
            "xiaohongshu" | "xhs" | "小红书" => PlatformId::Xiaohongshu,
            "kuaishou" | "快手" => PlatformId::Kuaishou,
            "acfun" | "a站" => PlatformId::Acfun,
            "youtube" | "油管" => PlatformId::Youtube,
            "tiktok" => PlatformId::Tiktok,
            "twitter" | "x" | "推特" => PlatformId::Twitter,
            "instagram" | "ins" => PlatformId::Instagram,
            "ncm" | "netease" | "网易云" => PlatformId::Ncm,
            other => PlatformId::Custom(other.to_string()),
        }
    }
}

impl From<String> for PlatformId {
    fn from(value: String) -> Self {
        PlatformId::from(value.as_str())
    }
}

impl From<PlatformId> for String {
    fn from(value: PlatformId) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
