use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{ConfigError, ParserConfig, SessionBackend};
use crate::services::{
    BilibiliQrLogin, ConfigService, CredentialStore, Debouncer, Dispatcher,
    FileSessionPersistence, LoginFlowManager, RedisService, SessionPersistence,
};

/// 应用全局状态
///
/// 每个字段是一项核心能力的唯一来源:
/// - dispatcher: 解析管线
/// - store: 平台凭证
/// - debouncer: 会话级防抖
/// - login / login_flows: 扫码登录及其唯一性
/// - enabled_sessions: 解析白名单,为空时全局开启
pub struct AppState {
    pub config: ParserConfig,

    pub dispatcher: Arc<Dispatcher>,

    pub store: Arc<CredentialStore>,

    pub debouncer: Arc<Debouncer>,

    pub login: Arc<BilibiliQrLogin>,

    pub login_flows: Arc<LoginFlowManager>,

    pub enabled_sessions: RwLock<Vec<String>>,

    /// 白名单写回的目标,为空时只在内存中生效
    pub config_service: Option<ConfigService>,
}

impl AppState {
    /// 按配置初始化
    ///
    /// # 错误
    /// - `ConfigError::InvalidValue`: Redis 地址无效
    /// - `ConfigError::HttpClient`: HTTP客户端构建失败
    pub fn new(
        config: ParserConfig,
        config_service: Option<ConfigService>,
    ) -> Result<Self, ConfigError> {
        let persistence: Arc<dyn SessionPersistence> = match &config.session_backend {
            SessionBackend::File => Arc::new(FileSessionPersistence::new(config.sessions_dir())),
            SessionBackend::Redis { url } => {
                Arc::new(RedisService::new(url).map_err(|e| ConfigError::InvalidValue {
                    key: "PARSER_REDIS_URL".to_string(),
                    value: e.to_string(),
                })?)
            }
        };

        let store = Arc::new(CredentialStore::from_config(&config, Some(persistence)));
        let dispatcher = Arc::new(Dispatcher::from_config(&config, Arc::clone(&store))?);
        let login = Arc::new(BilibiliQrLogin::new(&config)?);

        tracing::info!(config = %config.summary_for_logging(), "AppState initialized");
        Ok(Self::from_parts(config, dispatcher, login, config_service))
    }

    /// 由已构造的组件组装,凭证存储取自分发器
    pub fn from_parts(
        config: ParserConfig,
        dispatcher: Arc<Dispatcher>,
        login: Arc<BilibiliQrLogin>,
        config_service: Option<ConfigService>,
    ) -> Self {
        Self {
            store: Arc::clone(dispatcher.store()),
            debouncer: Arc::new(Debouncer::new(config.debounce_interval)),
            login_flows: Arc::new(LoginFlowManager::new()),
            enabled_sessions: RwLock::new(config.enabled_sessions.clone()),
            dispatcher,
            login,
            config_service,
            config,
        }
    }

    /// 会话是否开启解析
    pub async fn is_parsing_enabled(&self, scope: &str) -> bool {
        let sessions = self.enabled_sessions.read().await;
        sessions.is_empty() || sessions.iter().any(|s| s == scope)
    }

    /// 恢复短链缓存快照 (尽力而为)
    pub async fn restore(&self) {
        let path = self.config.short_link_snapshot_path();
        if let Err(e) = self.dispatcher.resolver().load_snapshot(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to restore short link cache");
        }
    }

    /// 退出前保存缓存并结束登录流程
    pub async fn shutdown(&self) {
        let path = self.config.short_link_snapshot_path();
        if let Err(e) = self.dispatcher.resolver().save_snapshot(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save short link cache");
        }
        self.login_flows.shutdown().await;
    }
}
