//! 登录流程管理器
//!
//! 职责: 确保每个平台同一时间只有一个活跃的扫码登录流程
//! 策略: 新流程启动时取消同平台的旧流程

use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::models::PlatformId;

/// 活跃流程
struct ActiveFlow {
    flow_id: String,
    cancel: CancellationToken,
    abort: AbortHandle,
}

/// 登录流程管理器
pub struct LoginFlowManager {
    flows: Mutex<HashMap<PlatformId, ActiveFlow>>,
}

impl LoginFlowManager {
    pub fn new() -> Self {
        Self {
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// 登记新流程,取消同平台的旧流程
    ///
    /// 旧流程通过取消令牌结束,在下一次轮询前退出,不会留下半写入的凭证。
    ///
    /// # 参数
    /// - `flow_id`: 新流程ID
    /// - `cancel`: 新流程的取消令牌
    /// - `abort`: 新任务的中止句柄,仅在 `shutdown` 时使用
    pub async fn set_current_flow(
        &self,
        platform: PlatformId,
        flow_id: String,
        cancel: CancellationToken,
        abort: AbortHandle,
    ) {
        let mut flows = self.flows.lock().await;

        if let Some(old) = flows.remove(&platform) {
            tracing::info!(
                platform = %platform,
                old_flow_id = %old.flow_id,
                new_flow_id = %flow_id,
                "Cancelling previous login flow"
            );
            old.cancel.cancel();
        } else {
            tracing::info!(platform = %platform, flow_id = %flow_id, "Starting login flow");
        }

        flows.insert(
            platform,
            ActiveFlow {
                flow_id,
                cancel,
                abort,
            },
        );
    }

    /// 流程结束后移除登记
    ///
    /// 仅当登记的仍是该流程时移除,避免误删已替换它的新流程。
    pub async fn finish(&self, platform: &PlatformId, flow_id: &str) {
        let mut flows = self.flows.lock().await;
        if flows.get(platform).is_some_and(|f| f.flow_id == flow_id) {
            flows.remove(platform);
        }
    }

    /// 取消平台当前的流程
    pub async fn cancel(&self, platform: &PlatformId) -> bool {
        match self.flows.lock().await.remove(platform) {
            Some(flow) => {
                tracing::info!(platform = %platform, flow_id = %flow.flow_id, "Login flow cancelled manually");
                flow.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// 中止全部流程,用于进程退出
    pub async fn shutdown(&self) {
        let mut flows = self.flows.lock().await;
        for (platform, flow) in flows.drain() {
            tracing::info!(platform = %platform, flow_id = %flow.flow_id, "Aborting login flow");
            flow.cancel.cancel();
            flow.abort.abort();
        }
    }

    pub async fn current_flow_id(&self, platform: &PlatformId) -> Option<String> {
        self.flows
            .lock()
            .await
            .get(platform)
            .map(|f| f.flow_id.clone())
    }
}

impl Default for LoginFlowManager {
    fn default() -> Self {
        Self::new()
    }
}
