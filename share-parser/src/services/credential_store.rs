//! 登录凭证存储
//!
//! 进程内唯一的平台凭证表。首次访问时从配置 cookie 与持久化后端加载,
//! 之后的读写都在内存完成,写操作同步落盘 (失败仅记录日志)。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

use crate::models::{LoginMethod, ParserConfig, PlatformId, Session, StorageError};

/// 凭证持久化接口
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// 读取全部凭证
    async fn load_all(&self) -> Result<Vec<Session>, StorageError>;

    /// 保存单个平台凭证,整体替换
    async fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// 删除单个平台凭证,不存在时视为成功
    async fn remove(&self, platform: &PlatformId) -> Result<(), StorageError>;
}

/// 文件持久化
///
/// 每个平台一个JSON文件: `<dir>/<platform>.json`。
/// 先写临时文件再重命名,保证不会留下半写入的文件。
pub struct FileSessionPersistence {
    dir: PathBuf,
}

impl FileSessionPersistence {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, platform: &PlatformId) -> PathBuf {
        self.dir.join(format!("{}.json", platform.as_str()))
    }
}

#[async_trait]
impl SessionPersistence for FileSessionPersistence {
    async fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<Session>(&bytes) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping corrupted session file");
                }
            }
        }
        Ok(sessions)
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&session.platform);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, platform: &PlatformId) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(platform)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 凭证存储
pub struct CredentialStore {
    sessions: RwLock<HashMap<PlatformId, Session>>,
    initialized: OnceCell<()>,
    seeds: Vec<Session>,
    persistence: Option<Arc<dyn SessionPersistence>>,
}

impl CredentialStore {
    /// 创建凭证存储
    ///
    /// # 参数
    /// - `seeds`: 配置中的预置凭证,初始化时优先于持久化数据
    /// - `persistence`: 可选的持久化后端
    pub fn new(seeds: Vec<Session>, persistence: Option<Arc<dyn SessionPersistence>>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            initialized: OnceCell::new(),
            seeds,
            persistence,
        }
    }

    /// 仅内存,无预置凭证
    pub fn in_memory() -> Self {
        Self::new(Vec::new(), None)
    }

    /// 根据配置构造
    ///
    /// 配置中格式无效的 cookie 字符串会被跳过并记录警告。
    pub fn from_config(
        config: &ParserConfig,
        persistence: Option<Arc<dyn SessionPersistence>>,
    ) -> Self {
        let seeds = PlatformId::builtin()
            .into_iter()
            .filter_map(|platform| {
                let raw = config.cookies_for(&platform)?;
                match Session::from_cookie_str(platform.clone(), raw) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        tracing::warn!(platform = %platform, error = %e, "Ignoring configured cookies");
                        None
                    }
                }
            })
            .collect();
        Self::new(seeds, persistence)
    }

    async fn ensure_loaded(&self) {
        self.initialized
            .get_or_init(|| async {
                let mut map = self.sessions.write().await;

                if let Some(persistence) = &self.persistence {
                    match persistence.load_all().await {
                        Ok(stored) => {
                            for session in stored {
                                if session.is_expired() {
                                    continue;
                                }
                                let session = session.with_method(LoginMethod::Restored);
                                map.insert(session.platform.clone(), session);
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to load persisted sessions"),
                    }
                }

                for seed in &self.seeds {
                    map.insert(seed.platform.clone(), seed.clone());
                }

                tracing::info!(
                    platforms = ?map.keys().map(|p| p.as_str()).collect::<Vec<_>>(),
                    "Credential store initialized"
                );
            })
            .await;
    }

    /// 获取平台凭证
    ///
    /// 已过期的凭证视为不存在。
    pub async fn get(&self, platform: &PlatformId) -> Option<Session> {
        self.ensure_loaded().await;
        let session = self.sessions.read().await.get(platform).cloned()?;
        if session.is_expired() {
            tracing::info!(platform = %platform, "Session expired");
            self.invalidate(platform).await;
            return None;
        }
        Some(session)
    }

    /// 保存平台凭证,整体替换旧值
    pub async fn put(&self, platform: PlatformId, session: Session) {
        self.ensure_loaded().await;

        tracing::info!(
            platform = %platform,
            method = ?session.obtained_via,
            cookies = %session.sample_for_logging(),
            "Session stored"
        );

        // 持久化与内存更新在同一写锁内完成,与 invalidate 串行
        let mut sessions = self.sessions.write().await;
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(&session).await {
                tracing::warn!(platform = %platform, error = %e, "Failed to persist session");
            }
        }
        sessions.insert(platform, session);
    }

    /// 使平台凭证失效
    pub async fn invalidate(&self, platform: &PlatformId) {
        self.ensure_loaded().await;

        let mut sessions = self.sessions.write().await;
        if sessions.remove(platform).is_some() {
            tracing::warn!(platform = %platform, "Session invalidated");
        }
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.remove(platform).await {
                tracing::warn!(platform = %platform, error = %e, "Failed to remove persisted session");
            }
        }
    }

    /// 已持有有效凭证的平台
    pub async fn platforms(&self) -> Vec<PlatformId> {
        self.ensure_loaded().await;
        let mut platforms: Vec<PlatformId> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, s)| !s.is_expired())
            .map(|(p, _)| p.clone())
            .collect();
        platforms.sort();
        platforms
    }
}
