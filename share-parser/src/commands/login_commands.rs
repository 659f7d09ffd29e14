//! 扫码登录命令
//!
//! 生成二维码后在后台轮询,状态变化通过事件通道推送给调用方。
//! 同一平台再次发起登录时,旧流程被取消。

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::{LoginEvent, PlatformId, QrLoginSession};
use crate::state::AppState;

/// 事件通道容量
const EVENT_BUFFER: usize = 16;

/// 发起扫码登录
///
/// # 返回值
/// 二维码会话与事件接收端;接收端首先收到 `QrGenerated` 事件,
/// 最后一个事件满足 `is_final()`
///
/// # 错误
/// 平台不支持扫码登录,或二维码生成失败
pub async fn start_login(
    state: &AppState,
    platform: PlatformId,
) -> Result<(QrLoginSession, mpsc::Receiver<LoginEvent>), String> {
    tracing::info!(platform = %platform, "start_login command called");

    if platform != PlatformId::Bilibili {
        return Err(format!("{}暂不支持扫码登录", platform.display_name()));
    }

    let qr = state
        .login
        .generate()
        .await
        .map_err(|e| format!("二维码生成失败: {}", e))?;

    let flow_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    // 通道容量足够,首个事件不会阻塞
    let _ = tx.try_send(LoginEvent::qr_generated(
        flow_id.clone(),
        platform.clone(),
        &qr.login_url,
    ));

    let cancel = CancellationToken::new();
    let login = Arc::clone(&state.login);
    let store = Arc::clone(&state.store);
    let flows = Arc::clone(&state.login_flows);
    let task_qr = qr.clone();
    let task_flow_id = flow_id.clone();
    let task_cancel = cancel.clone();
    let task_platform = platform.clone();

    let handle = tokio::spawn(async move {
        let outcome = login
            .run(&task_flow_id, task_qr, &store, &tx, &task_cancel)
            .await;
        tracing::info!(flow_id = %task_flow_id, outcome = ?outcome, "Login flow finished");
        flows.finish(&task_platform, &task_flow_id).await;
    });

    state
        .login_flows
        .set_current_flow(platform, flow_id, cancel, handle.abort_handle())
        .await;

    Ok((qr, rx))
}

/// 取消平台当前的登录流程
///
/// # 返回值
/// 面向聊天用户的回复文本
pub async fn cancel_login(state: &AppState, platform: PlatformId) -> String {
    if state.login_flows.cancel(&platform).await {
        format!("已取消{}登录", platform.display_name())
    } else {
        format!("{}没有进行中的登录", platform.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LoginEventType, ParserConfig, RetryPolicy};
    use crate::services::BilibiliQrLogin;
    use crate::state::tests::offline_state;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unsupported_platform_rejected() {
        let state = offline_state(ParserConfig::default(), None);
        let err = start_login(&state, PlatformId::Douyin).await.unwrap_err();
        assert!(err.contains("抖音"));
    }

    #[tokio::test]
    async fn test_cancel_without_flow() {
        let state = offline_state(ParserConfig::default(), None);
        assert_eq!(
            cancel_login(&state, PlatformId::Bilibili).await,
            "B站没有进行中的登录"
        );
    }

    #[tokio::test]
    async fn test_flow_streams_events_until_final() {
        let mut server = mockito::Server::new_async().await;
        let _gen = server
            .mock("GET", "/x/passport-login/web/qrcode/generate")
            .with_status(200)
            .with_body(
                r#"{"code":0,"message":"0","data":{"url":"https://account.bilibili.com/h5/account-h5/auth/scan-web?qrcode_key=k1","qrcode_key":"k1"}}"#,
            )
            .create_async()
            .await;
        let _poll = server
            .mock("GET", "/x/passport-login/web/qrcode/poll")
            .match_query(mockito::Matcher::UrlEncoded("qrcode_key".into(), "k1".into()))
            .with_status(200)
            .with_body(
                r#"{"code":0,"message":"0","data":{"url":"","refresh_token":"","timestamp":0,"code":86038,"message":""}}"#,
            )
            .create_async()
            .await;

        let config = ParserConfig::default().with_retry(RetryPolicy::none());
        let mut state = offline_state(config.clone(), None);
        state.login = Arc::new(
            BilibiliQrLogin::new(&config)
                .unwrap()
                .with_base_url(&server.url())
                .with_timing(Duration::from_millis(10), Duration::from_secs(5)),
        );

        let (qr, mut rx) = start_login(&state, PlatformId::Bilibili).await.unwrap();
        assert_eq!(qr.qrcode_key, "k1");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type, LoginEventType::QrCodeGenerated);

        let last = rx.recv().await.unwrap();
        assert_eq!(last.event_type, LoginEventType::QrCodeExpired);
        assert!(last.is_final());
        assert_eq!(last.session_id, first.session_id);
    }
}
