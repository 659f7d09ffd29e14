//! 解析开关命令
//!
//! 白名单语义: 白名单为空时全局开启,否则仅白名单内的会话开启。

use crate::state::AppState;

/// 开启会话的解析
///
/// # 返回值
/// 面向聊天用户的回复文本
pub async fn enable_parsing(state: &AppState, scope: &str) -> Result<String, String> {
    let mut sessions = state.enabled_sessions.write().await;

    if sessions.iter().any(|s| s == scope) {
        return Ok("解析已开启，无需重复开启".to_string());
    }

    sessions.push(scope.to_string());
    persist(state, &sessions)?;

    tracing::info!(scope = %scope, whitelist = sessions.len(), "Parsing enabled");
    Ok("解析已开启".to_string())
}

/// 关闭会话的解析
///
/// 从白名单移除后白名单为空时,解析回到全局开启状态。
pub async fn disable_parsing(state: &AppState, scope: &str) -> Result<String, String> {
    let mut sessions = state.enabled_sessions.write().await;

    let before = sessions.len();
    sessions.retain(|s| s != scope);
    if sessions.len() == before {
        return Ok("解析已关闭，无需重复关闭".to_string());
    }

    persist(state, &sessions)?;
    tracing::info!(scope = %scope, whitelist = sessions.len(), "Parsing disabled");

    if sessions.is_empty() {
        Ok("解析白名单为空时，全局开启解析".to_string())
    } else {
        Ok("解析已关闭".to_string())
    }
}

fn persist(state: &AppState, sessions: &[String]) -> Result<(), String> {
    match &state.config_service {
        Some(service) => service
            .save_enabled_sessions(sessions)
            .map_err(|e| format!("保存解析白名单失败: {}", e)),
        None => Ok(()),
    }
}
