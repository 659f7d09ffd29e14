//! 聊天分享链接识别与媒体解析
//!
//! 从聊天消息中识别各平台的分享链接,解析为规范链接后抓取媒体资源:
//! - models: 数据模型与错误类型
//! - services: 识别、短链解析、平台解析器、凭证与登录
//! - commands: 面向聊天机器人与命令行的入口
//! - state: 全局状态装配

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

pub use models::{CanonicalLink, MediaAsset, ParseError, ParseResult, ParserConfig, PlatformId};
pub use services::{ConfigService, Dispatcher};
pub use state::AppState;
