//! 数据模型模块
//!
//! 包含所有核心数据结构:
//! - errors: 错误类型定义 (API、解析、存储、配置)
//! - platform: 平台标识
//! - mention / canonical: 候选链接与规范链接
//! - media: 媒体资源与解析结果
//! - session: 平台登录凭证
//! - login_session / login_event: 二维码登录状态与事件
//! - config: 解析管线配置
//!
//! # 设计原则
//!
//! 1. **存在即合理**: 每个字段都有明确目的,无冗余
//! 2. **错误处理**: 所有验证返回 Result,提供完整上下文
//! 3. **日志安全**: 敏感数据不记录到日志 (如 cookies 值)

pub mod canonical;
pub mod config;
pub mod errors;
pub mod login_event;
pub mod login_session;
pub mod media;
pub mod mention;
pub mod platform;
pub mod session;

// 重导出常用类型,简化外部引用
pub use canonical::CanonicalLink;
pub use config::{ParserConfig, PlatformSettings, RetryPolicy, SessionBackend, VideoCodec};
pub use errors::{
    ApiError, ConfigError, NormalizationError, ParseError, ResolutionError, StorageError,
    ValidationError,
};
pub use login_event::{LoginEvent, LoginEventType};
pub use login_session::{QrCodeStatus, QrLoginSession};
pub use media::{FormatHint, MediaAsset, ParseResult, RawExtraction, RawStream};
pub use mention::{MentionKind, RawMention};
pub use platform::PlatformId;
pub use session::{LoginMethod, Session};
