//! 服务层模块
//!
//! 解析管线的各个阶段与它们依赖的基础设施:
//! - `matcher`: 平台链接签名,在文本中识别候选链接
//! - `resolver`: 短链重定向与卡片解包,带TTL缓存
//! - `registry`: 有序的解析器注册表
//! - `parsers`: 各平台解析器
//! - `normalizer`: 原始提取结果 → 统一的 `ParseResult`
//! - `dispatcher`: 串联以上阶段,每个候选一个结果
//! - `credential_store` / `redis_service`: 平台凭证与持久化后端
//! - `login` / `session_manager`: B站扫码登录流程及其唯一性管理
//! - `debouncer`: 会话级防抖
//! - `config_service`: `.env` 配置读写
//! - `http`: 带重试的平台HTTP客户端
//!
//! # 服务架构
//!
//! ```text
//!   消息文本
//!      │
//!      ▼
//! ┌──────────────────────────────────────────────┐
//! │ Dispatcher                                   │
//! │  SignatureMatcher → LinkResolver → Registry  │
//! │                                  │           │
//! │                 CredentialStore ─▶ Parser    │
//! │                                  │           │
//! │                             Normalizer       │
//! └──────────────────────────────────────────────┘
//!      │
//!      ▼
//!  Vec<Result<ParseResult, ParseError>>
//! ```
//!
//! # 使用示例
//!
//! ```no_run
//! use share_parser::models::ParserConfig;
//! use share_parser::services::{CredentialStore, Dispatcher};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ParserConfig::default();
//! let store = Arc::new(CredentialStore::from_config(&config, None));
//! let dispatcher = Dispatcher::from_config(&config, store)?;
//!
//! for result in dispatcher.parse("https://b23.tv/abc123").await {
//!     match result {
//!         Ok(parsed) => println!("{}", parsed.summary()),
//!         Err(e) if e.is_auth_required() => println!("需要登录: {}", e),
//!         Err(e) => println!("解析失败: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config_service;
pub mod credential_store;
pub mod debouncer;
pub mod dispatcher;
pub mod http;
pub mod login;
pub mod matcher;
pub mod normalizer;
pub mod parsers;
pub mod redis_service;
pub mod registry;
pub mod resolver;
pub mod session_manager;

// 重导出常用类型,简化外部引用
pub use config_service::ConfigService;
pub use credential_store::{CredentialStore, FileSessionPersistence, SessionPersistence};
pub use debouncer::Debouncer;
pub use dispatcher::Dispatcher;
pub use http::HttpClient;
pub use login::{BilibiliQrLogin, LoginOutcome};
pub use matcher::{Signature, SignatureMatcher};
pub use normalizer::{normalize, AssetFilter};
pub use parsers::{AuthRequirement, Parser};
pub use redis_service::RedisService;
pub use registry::ParserRegistry;
pub use resolver::{Card, HttpRedirector, LinkResolver, Redirector};
pub use session_manager::LoginFlowManager;
