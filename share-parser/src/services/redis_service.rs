use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::collections::HashMap;

use crate::models::{LoginMethod, PlatformId, Session, StorageError};
use crate::services::credential_store::SessionPersistence;

/// 凭证在Redis中的key前缀
const KEY_PREFIX: &str = "parser:session:";

/// 无过期时间的凭证保留30天
const DEFAULT_EXPIRE_SECONDS: i64 = 30 * 24 * 3600;

/// Redis凭证持久化
///
/// 管理连接池,每个平台一个Hash。
/// 职责单一:仅处理数据持久化,不涉及业务逻辑。
pub struct RedisService {
    pool: Pool,
}

impl RedisService {
    /// 初始化Redis连接池
    ///
    /// # 参数
    /// - `redis_url`: Redis连接URL,格式: `redis://host:port` 或 `redis://host:port/db`
    ///
    /// # 错误
    /// 返回 `StorageError::RedisConnectionFailed` 如果连接池创建失败
    pub fn new(redis_url: &str) -> Result<Self, StorageError> {
        let config = Config::from_url(redis_url);
        let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            tracing::error!(
                redis_url = %redis_url,
                error = %e,
                "Failed to create Redis pool"
            );
            StorageError::RedisConnectionFailed(e.to_string())
        })?;

        tracing::info!(redis_url = %redis_url, "Redis pool created");
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::RedisConnectionFailed(e.to_string()))
    }

    fn redis_key(platform: &PlatformId) -> String {
        format!("{}{}", KEY_PREFIX, platform.as_str())
    }

    /// 凭证转换为Hash字段
    fn to_fields(session: &Session) -> Result<Vec<(&'static str, String)>, StorageError> {
        let mut fields = vec![
            ("platform", session.platform.as_str().to_string()),
            ("cookies", serde_json::to_string(&session.cookies)?),
            ("obtained_at", session.obtained_at.timestamp().to_string()),
            ("obtained_via", serde_json::to_string(&session.obtained_via)?),
        ];
        if let Some(ref token) = session.refresh_token {
            fields.push(("refresh_token", token.clone()));
        }
        if let Some(expires_at) = session.expires_at {
            fields.push(("expires_at", expires_at.timestamp().to_string()));
        }
        Ok(fields)
    }

    /// Hash字段还原为凭证
    fn from_fields(data: &HashMap<String, String>) -> Result<Session, StorageError> {
        let platform = data
            .get("platform")
            .map(|p| PlatformId::from(p.as_str()))
            .ok_or_else(|| StorageError::SerializationError("Missing platform field".into()))?;

        let cookies: HashMap<String, String> = serde_json::from_str(
            data.get("cookies")
                .ok_or_else(|| StorageError::SerializationError("Missing cookies field".into()))?,
        )?;

        let parse_ts = |field: &str| {
            data.get(field)
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        };

        let obtained_at = parse_ts("obtained_at")
            .ok_or_else(|| StorageError::SerializationError("Invalid obtained_at".into()))?;

        let obtained_via: LoginMethod = data
            .get("obtained_via")
            .map(|v| serde_json::from_str(v))
            .transpose()?
            .unwrap_or(LoginMethod::Restored);

        Ok(Session {
            platform,
            cookies,
            refresh_token: data.get("refresh_token").cloned(),
            obtained_at,
            expires_at: parse_ts("expires_at"),
            obtained_via,
        })
    }
}

#[async_trait]
impl SessionPersistence for RedisService {
    /// 扫描所有 `parser:session:*` key 并读取
    ///
    /// 平台数量很少,使用 `KEYS` 命令即可。
    async fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        let mut conn = self.connection().await?;

        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", KEY_PREFIX))
            .query_async(&mut *conn)
            .await?;

        let mut sessions = Vec::with_capacity(keys.len());
        for key in &keys {
            let data: HashMap<String, String> = conn.hgetall(key).await?;
            match Self::from_fields(&data) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!(redis_key = %key, error = %e, "Skipping corrupted session"),
            }
        }

        tracing::debug!(keys = keys.len(), sessions = sessions.len(), "Sessions loaded from Redis");
        Ok(sessions)
    }

    /// 保存凭证
    ///
    /// Redis数据结构:
    /// - 类型: Hash
    /// - Key: `parser:session:{platform}`
    /// - Fields: `platform`, `cookies`, `obtained_at`, `obtained_via`, `refresh_token`, `expires_at`
    /// - TTL: 凭证过期时间,未知时30天
    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let redis_key = Self::redis_key(&session.platform);

        let fields = Self::to_fields(session)?;
        let field_refs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let expire_seconds = session
            .expires_at
            .map(|at| (at - chrono::Utc::now()).num_seconds().max(1))
            .unwrap_or(DEFAULT_EXPIRE_SECONDS);

        // 整体替换: 旧字段不能残留
        redis::pipe()
            .atomic()
            .del(&redis_key)
            .ignore()
            .hset_multiple(&redis_key, &field_refs)
            .ignore()
            .expire(&redis_key, expire_seconds)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;

        tracing::info!(
            platform = %session.platform,
            redis_key = %redis_key,
            cookies = %session.sample_for_logging(),
            "Session saved to Redis"
        );
        Ok(())
    }

    async fn remove(&self, platform: &PlatformId) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let redis_key = Self::redis_key(platform);
        conn.del::<_, ()>(&redis_key).await?;
        tracing::info!(platform = %platform, redis_key = %redis_key, "Session removed from Redis");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_round_trip() {
        let session = Session::from_cookie_str(PlatformId::Bilibili, "SESSDATA=a; bili_jct=b")
            .unwrap()
            .with_refresh_token("refresh".into())
            .with_method(LoginMethod::QrCode);

        let data: HashMap<String, String> = RedisService::to_fields(&session)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert!(!data.contains_key("expires_at"));

        let restored = RedisService::from_fields(&data).unwrap();
        assert_eq!(restored.platform, PlatformId::Bilibili);
        assert_eq!(restored.cookies, session.cookies);
        assert_eq!(restored.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(restored.obtained_via, LoginMethod::QrCode);
        assert_eq!(restored.obtained_at.timestamp(), session.obtained_at.timestamp());
    }

    #[test]
    fn test_from_fields_rejects_corrupted_data() {
        let mut data = HashMap::new();
        data.insert("platform".to_string(), "weibo".to_string());
        data.insert("cookies".to_string(), "invalid json {{{".to_string());
        data.insert("obtained_at".to_string(), "not a timestamp".to_string());
        assert!(matches!(
            RedisService::from_fields(&data),
            Err(StorageError::SerializationError(_))
        ));
    }

    #[test]
    fn test_redis_key_format() {
        assert_eq!(RedisService::redis_key(&PlatformId::Bilibili), "parser:session:bilibili");
    }

    #[test]
    fn test_pool_creation_is_lazy() {
        // 连接池创建不会立即连接
        assert!(RedisService::new("redis://127.0.0.1:1").is_ok());
    }
}
