//! 会话级防抖
//!
//! 同一会话在间隔内重复出现的链接或资源只处理一次。
//! 链接级在解析前判断,资源级在得到规范链接后判断,
//! 因此同一资源的长链与短链也会互相防抖。

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::models::CanonicalLink;

/// 防抖器
pub struct Debouncer {
    interval: Duration,
    /// 会话 → (键 → 首次出现时间)
    buckets: Mutex<HashMap<String, HashMap<String, Instant>>>,
}

impl Debouncer {
    /// 间隔为0时禁用
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// 判断并记录
    ///
    /// # 返回值
    /// `true` 表示在间隔内已出现过,应跳过
    async fn hit(&self, scope: &str, key: String) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(scope.to_string()).or_default();
        bucket.retain(|_, seen_at| now.duration_since(*seen_at) < self.interval);

        if bucket.contains_key(&key) {
            return true;
        }
        bucket.insert(key, now);
        false
    }

    /// 链接级防抖
    pub async fn hit_link(&self, scope: &str, link: &str) -> bool {
        let hit = self.hit(scope, format!("link:{}", link)).await;
        if hit {
            tracing::warn!(scope = %scope, link = %link, "Link debounced");
        }
        hit
    }

    /// 资源级防抖
    pub async fn hit_resource(&self, scope: &str, canonical: &CanonicalLink) -> bool {
        let key = format!("res:{}:{}", canonical.platform, canonical.resource_id);
        let hit = self.hit(scope, key).await;
        if hit {
            tracing::warn!(
                scope = %scope,
                platform = %canonical.platform,
                resource_id = %canonical.resource_id,
                "Resource debounced"
            );
        }
        hit
    }
}
