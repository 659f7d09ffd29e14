//! 解析器注册表
//!
//! 有序列表,先注册者优先。选择过程只依赖注册顺序,与运行时状态无关。

use std::sync::Arc;

use crate::models::{CanonicalLink, ParseError, PlatformId};
use crate::services::parsers::Parser;

/// 注册条目
struct Registration {
    platform: PlatformId,
    parser: Arc<dyn Parser>,
}

/// 解析器注册表
#[derive(Default)]
pub struct ParserRegistry {
    entries: Vec<Registration>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加解析器到末尾
    pub fn register(&mut self, parser: Arc<dyn Parser>) {
        let platform = parser.platform();
        tracing::debug!(platform = %platform, position = self.entries.len(), "Parser registered");
        self.entries.push(Registration { platform, parser });
    }

    /// 插入解析器到最前,覆盖已有的同平台解析器
    pub fn register_first(&mut self, parser: Arc<dyn Parser>) {
        let platform = parser.platform();
        tracing::debug!(platform = %platform, "Parser registered with top priority");
        self.entries.insert(0, Registration { platform, parser });
    }

    /// 为规范链接选择解析器
    ///
    /// # 错误
    /// 返回 `ParseError::UnsupportedPlatform` 如果没有解析器声明该平台
    pub fn select(&self, canonical: &CanonicalLink) -> Result<Arc<dyn Parser>, ParseError> {
        self.entries
            .iter()
            .find(|entry| entry.platform == canonical.platform)
            .map(|entry| Arc::clone(&entry.parser))
            .ok_or_else(|| ParseError::UnsupportedPlatform {
                platform: canonical.platform.clone(),
                raw: canonical.original_url.clone(),
            })
    }

    /// 是否有解析器声明该平台
    pub fn supports(&self, platform: &PlatformId) -> bool {
        self.entries.iter().any(|entry| &entry.platform == platform)
    }

    /// 已注册的平台,按注册顺序
    pub fn platforms(&self) -> Vec<PlatformId> {
        self.entries.iter().map(|e| e.platform.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
