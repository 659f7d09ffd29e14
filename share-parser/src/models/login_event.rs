use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::PlatformId;

/// 登录事件 (用于聊天侧通知和日志追踪)
///
/// 记录扫码登录流程中的所有关键事件,通过事件通道推送给调用方。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    /// 事件类型
    pub event_type: LoginEventType,

    /// 时间戳
    pub timestamp: DateTime<Utc>,

    /// 登录流程ID
    pub session_id: String,

    pub platform: PlatformId,

    /// 额外详情 (JSON格式,灵活扩展)
    pub details: Value,
}

/// 登录事件类型
///
/// - 成功路径: QrCodeGenerated -> QrCodeScanned -> Confirmed
/// - 失败路径: QrCodeExpired, TimedOut, Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginEventType {
    /// 二维码生成成功
    QrCodeGenerated,

    /// 二维码已扫描
    QrCodeScanned,

    /// 登录成功,凭证已保存
    Confirmed,

    /// 二维码已过期
    QrCodeExpired,

    /// 轮询超时
    TimedOut,

    /// 发生错误 (网络、接口、存储等)
    Error,
}

impl LoginEvent {
    pub fn new(
        event_type: LoginEventType,
        session_id: String,
        platform: PlatformId,
        details: Value,
    ) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            session_id,
            platform,
            details,
        }
    }

    /// 二维码生成事件
    pub fn qr_generated(session_id: String, platform: PlatformId, login_url: &str) -> Self {
        Self::new(
            LoginEventType::QrCodeGenerated,
            session_id,
            platform,
            serde_json::json!({ "login_url": login_url }),
        )
    }

    pub fn qr_scanned(session_id: String, platform: PlatformId) -> Self {
        Self::new(
            LoginEventType::QrCodeScanned,
            session_id,
            platform,
            serde_json::json!({}),
        )
    }

    /// 登录成功事件
    ///
    /// # 参数
    /// - `cookie_sample`: 仅包含cookie键名的样本,不含值
    pub fn confirmed(session_id: String, platform: PlatformId, cookie_sample: String) -> Self {
        Self::new(
            LoginEventType::Confirmed,
            session_id,
            platform,
            serde_json::json!({ "cookies": cookie_sample }),
        )
    }

    pub fn qr_expired(session_id: String, platform: PlatformId) -> Self {
        Self::new(
            LoginEventType::QrCodeExpired,
            session_id,
            platform,
            serde_json::json!({}),
        )
    }

    pub fn timed_out(session_id: String, platform: PlatformId, waited_secs: u64) -> Self {
        Self::new(
            LoginEventType::TimedOut,
            session_id,
            platform,
            serde_json::json!({ "waited_secs": waited_secs }),
        )
    }

    pub fn error(session_id: String, platform: PlatformId, error_message: String) -> Self {
        Self::new(
            LoginEventType::Error,
            session_id,
            platform,
            serde_json::json!({ "error": error_message }),
        )
    }

    /// 是否为终态事件
    pub fn is_final(&self) -> bool {
        !matches!(
            self.event_type,
            LoginEventType::QrCodeGenerated | LoginEventType::QrCodeScanned
        )
    }

    /// 面向聊天用户的提示语
    pub fn message(&self) -> String {
        match self.event_type {
            LoginEventType::QrCodeGenerated => "请使用手机客户端扫描二维码登录".to_string(),
            LoginEventType::QrCodeScanned => "二维码已扫描, 请确认登录".to_string(),
            LoginEventType::Confirmed => "登录成功".to_string(),
            LoginEventType::QrCodeExpired => "二维码过期, 请重新生成".to_string(),
            LoginEventType::TimedOut => "二维码登录超时, 请重新生成".to_string(),
            LoginEventType::Error => format!(
                "登录失败: {}",
                self.details
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("未知错误")
            ),
        }
    }
}
