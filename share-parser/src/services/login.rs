//! B站二维码登录
//!
//! 状态机: Pending → Scanned → Confirmed,任意阶段都可能 Expired。
//! 确认后凭证来自响应的 `Set-Cookie`,没有时回退到确认地址的查询参数。

use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::{
    ApiError, ConfigError, LoginEvent, LoginMethod, ParserConfig, PlatformId, QrCodeStatus,
    QrLoginSession, Session,
};
use crate::services::credential_store::CredentialStore;
use crate::services::http::{headers, HttpClient, COMMON_UA};

const PASSPORT_BASE: &str = "https://passport.bilibili.com";

/// 二维码有效期 (秒)
pub const QR_VALID_SECS: i64 = 180;

/// 确认地址中携带的凭证字段
const CONFIRM_COOKIE_KEYS: [&str; 4] = ["DedeUserID", "DedeUserID__ckMd5", "SESSDATA", "bili_jct"];

#[derive(Debug, Deserialize)]
struct PassportResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    url: String,
    qrcode_key: String,
}

#[derive(Debug, Deserialize)]
struct PollData {
    code: i64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    message: String,
}

/// 单次轮询结果
#[derive(Debug)]
pub enum PollOutcome {
    /// 尚未确认
    Status(QrCodeStatus),
    /// 已确认,携带新凭证
    Confirmed(Session),
}

/// 登录流程的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Confirmed,
    Expired,
    TimedOut,
    Cancelled,
    Failed,
}

/// B站二维码登录客户端
pub struct BilibiliQrLogin {
    http: HttpClient,
    base: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl BilibiliQrLogin {
    pub fn new(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(PlatformId::Bilibili, config)?,
            base: PASSPORT_BASE.to_string(),
            poll_interval: config.login_poll_interval,
            timeout: config.login_timeout,
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    /// 设置轮询间隔与总超时 (构建器模式)
    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    fn request_headers() -> HeaderMap {
        headers(&[
            ("user-agent", COMMON_UA),
            ("referer", "https://www.bilibili.com/"),
        ])
    }

    /// 生成登录二维码
    ///
    /// # 返回值
    /// 二维码会话,`login_url` 即二维码内容
    ///
    /// # 错误
    /// 返回 `ApiError::InvalidResponse` 如果接口返回非0业务码
    pub async fn generate(&self) -> Result<QrLoginSession, ApiError> {
        let url = format!("{}/x/passport-login/web/qrcode/generate", self.base);
        let response: PassportResponse<GenerateData> =
            self.http.get_json(&url, Self::request_headers()).await?;

        let data = match (response.code, response.data) {
            (0, Some(data)) => data,
            (code, _) => {
                tracing::error!(code = code, message = %response.message, "QR code generation rejected");
                return Err(ApiError::InvalidResponse(format!(
                    "生成二维码失败 ({}): {}",
                    code, response.message
                )));
            }
        };

        tracing::info!(qrcode_key = %data.qrcode_key, "QR code generated");
        Ok(QrLoginSession::new(data.qrcode_key, data.url, QR_VALID_SECS))
    }

    /// 查询一次扫码状态
    ///
    /// # 错误
    /// - `ApiError::InvalidResponse`: 未知状态码,或确认后缺少必需的 cookie
    pub async fn poll(&self, qrcode_key: &str) -> Result<PollOutcome, ApiError> {
        let url = format!("{}/x/passport-login/web/qrcode/poll", self.base);
        let request_headers = Self::request_headers();
        let response = self
            .http
            .send(|c| {
                c.get(&url)
                    .headers(request_headers.clone())
                    .query(&[("qrcode_key", qrcode_key)])
            })
            .await?;

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        let body: PassportResponse<PollData> = serde_json::from_str(&response.text().await?)?;
        let data = body.data.ok_or_else(|| {
            ApiError::InvalidResponse(format!("轮询响应缺少 data ({}): {}", body.code, body.message))
        })?;

        match QrCodeStatus::from_bilibili_code(data.code) {
            Some(QrCodeStatus::Confirmed) => {
                session_from_confirmation(&set_cookies, &data).map(PollOutcome::Confirmed)
            }
            Some(status) => Ok(PollOutcome::Status(status)),
            None => Err(ApiError::InvalidResponse(format!(
                "未知的二维码状态 {}: {}",
                data.code, data.message
            ))),
        }
    }

    /// 运行登录流程直到结束
    ///
    /// 每个间隔轮询一次;已扫码事件只发送一次。确认后凭证写入 `store`。
    /// 超时发送 `TimedOut` 事件后正常返回;取消时不再发送事件。
    ///
    /// # 参数
    /// - `flow_id`: 流程标识,写入每个事件
    /// - `events`: 事件通道,接收方关闭不影响流程
    /// - `cancel`: 取消令牌,新流程启动时由管理器触发
    pub async fn run(
        &self,
        flow_id: &str,
        qr: QrLoginSession,
        store: &CredentialStore,
        events: &mpsc::Sender<LoginEvent>,
        cancel: &CancellationToken,
    ) -> LoginOutcome {
        let started = Instant::now();
        let mut qr = qr;

        let polling = async {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(flow_id = %flow_id, "Login flow cancelled");
                        return LoginOutcome::Cancelled;
                    }
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }

                if qr.is_expired() {
                    emit(events, LoginEvent::qr_expired(flow_id.to_string(), PlatformId::Bilibili)).await;
                    return LoginOutcome::Expired;
                }

                match self.poll(&qr.qrcode_key).await {
                    Ok(PollOutcome::Confirmed(session)) => {
                        qr.mark_confirmed();
                        let sample = session.sample_for_logging();
                        store.put(PlatformId::Bilibili, session).await;
                        crate::log_event!("LoginConfirmed", flow_id = %flow_id, cookies = %sample);
                        emit(
                            events,
                            LoginEvent::confirmed(flow_id.to_string(), PlatformId::Bilibili, sample),
                        )
                        .await;
                        return LoginOutcome::Confirmed;
                    }
                    Ok(PollOutcome::Status(status)) => {
                        if !qr.apply(status) {
                            continue;
                        }
                        match status {
                            QrCodeStatus::Scanned => {
                                emit(events, LoginEvent::qr_scanned(flow_id.to_string(), PlatformId::Bilibili)).await;
                            }
                            QrCodeStatus::Expired => {
                                emit(events, LoginEvent::qr_expired(flow_id.to_string(), PlatformId::Bilibili)).await;
                                return LoginOutcome::Expired;
                            }
                            QrCodeStatus::Pending | QrCodeStatus::Confirmed => {}
                        }
                    }
                    Err(e) => {
                        crate::log_error!("LoginPollFailed", flow_id = %flow_id, error = %e);
                        emit(
                            events,
                            LoginEvent::error(flow_id.to_string(), PlatformId::Bilibili, e.to_string()),
                        )
                        .await;
                        return LoginOutcome::Failed;
                    }
                }
            }
        };

        match tokio::time::timeout(self.timeout, polling).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let waited = started.elapsed().as_secs();
                tracing::info!(flow_id = %flow_id, waited_secs = waited, "Login flow timed out");
                emit(
                    events,
                    LoginEvent::timed_out(flow_id.to_string(), PlatformId::Bilibili, waited),
                )
                .await;
                LoginOutcome::TimedOut
            }
        }
    }
}

async fn emit(events: &mpsc::Sender<LoginEvent>, event: LoginEvent) {
    if events.send(event).await.is_err() {
        tracing::debug!("Login event receiver dropped");
    }
}

/// 由确认响应构造凭证
///
/// 优先使用 `Set-Cookie`,为空时读取确认地址的查询参数;
/// 查询参数中的 `Expires` 为过期时间戳 (秒)。
fn session_from_confirmation(set_cookies: &[String], data: &PollData) -> Result<Session, ApiError> {
    let mut cookies: HashMap<String, String> = set_cookies
        .iter()
        .filter_map(|header| {
            let pair = header.split(';').next()?;
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect();

    let query: HashMap<String, String> = url::Url::parse(&data.url)
        .map(|u| u.query_pairs().into_owned().collect())
        .unwrap_or_default();

    if cookies.is_empty() {
        for key in CONFIRM_COOKIE_KEYS {
            if let Some(value) = query.get(key) {
                cookies.insert(key.to_string(), value.clone());
            }
        }
    }

    let mut session = Session::new(PlatformId::Bilibili, cookies, LoginMethod::QrCode);
    if !data.refresh_token.is_empty() {
        session = session.with_refresh_token(data.refresh_token.clone());
    }
    if let Some(expires_at) = query
        .get("Expires")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    {
        session = session.with_expires_at(expires_at);
    }

    session
        .validate()
        .map_err(|e| ApiError::InvalidResponse(format!("登录凭证不完整: {}", e)))?;
    Ok(session)
}
