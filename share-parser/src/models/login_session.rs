use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 扫码登录会话
///
/// 追踪从二维码生成到确认完成的完整登录流程。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrLoginSession {
    /// 二维码标识 (B站 `qrcode_key`)
    pub qrcode_key: String,

    /// 二维码内容,用户用手机客户端扫描此地址
    pub login_url: String,

    /// 当前状态
    pub status: QrCodeStatus,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 扫码时间 (可选)
    pub scanned_at: Option<DateTime<Utc>>,

    /// 确认登录时间 (可选)
    pub confirmed_at: Option<DateTime<Utc>>,

    /// 过期时间 (B站为创建后180秒)
    pub expires_at: DateTime<Utc>,
}

/// 二维码状态
///
/// 状态转换流程:
/// Pending -> Scanned -> Confirmed
///     |          |
///     +----------+---> Expired (任何状态超时)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrCodeStatus {
    /// 等待扫码
    Pending,

    /// 已扫码,等待确认
    Scanned,

    /// 确认成功
    Confirmed,

    /// 已过期
    Expired,
}

impl QrCodeStatus {
    /// B站轮询接口业务码映射
    ///
    /// - `86101`: 未扫码
    /// - `86090`: 已扫码未确认
    /// - `86038`: 二维码已失效
    /// - `0`: 登录成功
    pub fn from_bilibili_code(code: i64) -> Option<QrCodeStatus> {
        match code {
            86101 => Some(QrCodeStatus::Pending),
            86090 => Some(QrCodeStatus::Scanned),
            86038 => Some(QrCodeStatus::Expired),
            0 => Some(QrCodeStatus::Confirmed),
            _ => None,
        }
    }
}

impl QrLoginSession {
    /// 创建新的登录会话
    ///
    /// # 参数
    /// - `qrcode_key`: 平台返回的二维码标识
    /// - `login_url`: 二维码内容
    /// - `expires_in_seconds`: 过期时长(秒)
    pub fn new(qrcode_key: String, login_url: String, expires_in_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            qrcode_key,
            login_url,
            status: QrCodeStatus::Pending,
            created_at: now,
            scanned_at: None,
            confirmed_at: None,
            expires_at: now + chrono::Duration::seconds(expires_in_seconds),
        }
    }

    /// 检查是否已过期
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at || self.status == QrCodeStatus::Expired
    }

    /// 检查是否为终态
    ///
    /// 一旦进入终态,不应再进行状态轮询。
    pub fn is_final_status(&self) -> bool {
        matches!(self.status, QrCodeStatus::Confirmed | QrCodeStatus::Expired)
    }

    /// 根据轮询结果推进状态
    ///
    /// # 返回值
    /// 状态是否发生变化。已扫码状态只在第一次出现时视为变化。
    pub fn apply(&mut self, status: QrCodeStatus) -> bool {
        if self.status == status {
            return false;
        }
        match status {
            QrCodeStatus::Pending => return false,
            QrCodeStatus::Scanned => self.mark_scanned(),
            QrCodeStatus::Confirmed => self.mark_confirmed(),
            QrCodeStatus::Expired => self.mark_expired(),
        }
        true
    }

    /// 更新状态为已扫码
    pub fn mark_scanned(&mut self) {
        self.status = QrCodeStatus::Scanned;
        self.scanned_at = Some(Utc::now());
    }

    /// 更新状态为确认成功
    pub fn mark_confirmed(&mut self) {
        self.status = QrCodeStatus::Confirmed;
        self.confirmed_at = Some(Utc::now());
    }

    /// 更新状态为已过期
    pub fn mark_expired(&mut self) {
        self.status = QrCodeStatus::Expired;
    }

    /// 获取距离过期的剩余秒数
    ///
    /// 返回负数表示已过期。
    pub fn remaining_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> QrLoginSession {
        QrLoginSession::new(
            "key_123".to_string(),
            "https://account.bilibili.com/h5/account-h5/auth/scan-web?qrcode_key=key_123".to_string(),
            180,
        )
    }

    #[test]
    fn test_new_session_initial_state() {
        let session = session();
        assert_eq!(session.status, QrCodeStatus::Pending);
        assert!(session.scanned_at.is_none());
        assert!(!session.is_expired());
        assert!(!session.is_final_status());
        assert!(session.remaining_seconds() > 170);
    }

    #[test]
    fn test_bilibili_codes() {
        assert_eq!(QrCodeStatus::from_bilibili_code(86101), Some(QrCodeStatus::Pending));
        assert_eq!(QrCodeStatus::from_bilibili_code(86090), Some(QrCodeStatus::Scanned));
        assert_eq!(QrCodeStatus::from_bilibili_code(86038), Some(QrCodeStatus::Expired));
        assert_eq!(QrCodeStatus::from_bilibili_code(0), Some(QrCodeStatus::Confirmed));
        assert_eq!(QrCodeStatus::from_bilibili_code(-400), None);
    }

    #[test]
    fn test_apply_transitions() {
        let mut session = session();
        assert!(!session.apply(QrCodeStatus::Pending));
        assert!(session.apply(QrCodeStatus::Scanned));
        assert!(session.scanned_at.is_some());
        // 重复的已扫码状态不再视为变化
        assert!(!session.apply(QrCodeStatus::Scanned));
        assert!(session.apply(QrCodeStatus::Confirmed));
        assert!(session.is_final_status());
        assert!(session.confirmed_at.is_some());
    }

    #[test]
    fn test_expired() {
        let mut session = QrLoginSession::new("k".into(), "u".into(), -1);
        assert!(session.is_expired());
        session.mark_expired();
        assert!(session.is_final_status());
    }
}
