use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::models::PlatformId;

/// 规范链接
///
/// 同一资源的所有表面形式 (长链、短链、卡片、裸ID) 解析后得到相同的
/// `(platform, resource_id)`。`canonical_url` 由二者确定性派生,
/// `original_url` 仅记录来源,不参与相等性判断。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalLink {
    pub platform: PlatformId,
    pub resource_id: String,
    pub canonical_url: String,
    pub original_url: String,
}

impl CanonicalLink {
    pub fn new(
        platform: PlatformId,
        resource_id: impl Into<String>,
        canonical_url: impl Into<String>,
        original_url: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            resource_id: resource_id.into(),
            canonical_url: canonical_url.into(),
            original_url: original_url.into(),
        }
    }

    /// 读取来源链接上的查询参数
    ///
    /// 部分平台 (如小红书的 `xsec_token`) 需要来源链接携带的额外参数。
    pub fn original_query(&self, key: &str) -> Option<String> {
        let with_scheme = if self.original_url.starts_with("http") {
            self.original_url.clone()
        } else {
            format!("https://{}", self.original_url)
        };
        url::Url::parse(&with_scheme)
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

impl PartialEq for CanonicalLink {
    fn eq(&self, other: &Self) -> bool {
        self.platform == other.platform && self.resource_id == other.resource_id
    }
}

impl Eq for CanonicalLink {}

impl Hash for CanonicalLink {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.platform.hash(state);
        self.resource_id.hash(state);
    }
}
