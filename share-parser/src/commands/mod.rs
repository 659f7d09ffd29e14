/// 命令模块
///
/// 聊天机器人与命令行共用的入口:
/// - parse_commands: 消息解析与音频快捷命令 (`bm` / `ym`)
/// - toggle_commands: 会话级解析开关
/// - login_commands: 扫码登录
///
/// 命令层把错误转换为可直接回复给用户的字符串。

pub mod login_commands;
pub mod parse_commands;
pub mod toggle_commands;

pub use login_commands::{cancel_login, start_login};
pub use parse_commands::{bilibili_audio, parse_message, youtube_audio};
pub use toggle_commands::{disable_parsing, enable_parsing};
