use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{ConfigError, PlatformId};

/// 单个平台的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// 是否启用该平台的解析器
    pub enabled: bool,

    /// 是否通过代理访问
    pub use_proxy: bool,

    /// 预置的 cookie 字符串 (`k1=v1; k2=v2`)
    pub cookies: Option<String>,
}

impl PlatformSettings {
    fn default_for(platform: &PlatformId) -> Self {
        Self {
            enabled: true,
            use_proxy: matches!(
                platform,
                PlatformId::Youtube | PlatformId::Tiktok | PlatformId::Instagram
            ),
            cookies: None,
        }
    }
}

/// HTTP 重试策略
///
/// 仅对超时、连接失败和5xx重试,退避时长按 `base_delay * 2^n` 增长。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 总尝试次数 (包含首次)
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// 不重试
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// 第 `attempt` 次失败后的等待时长 (从0计)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(10))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// B站视频编码偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    Avc,
    Hevc,
    Av1,
}

impl VideoCodec {
    /// B站 playurl 接口中的 `codecid`
    pub fn bilibili_codecid(&self) -> i64 {
        match self {
            VideoCodec::Avc => 7,
            VideoCodec::Hevc => 12,
            VideoCodec::Av1 => 13,
        }
    }

    fn parse(value: &str) -> Option<VideoCodec> {
        match value.trim().to_lowercase().as_str() {
            "avc" | "h264" => Some(VideoCodec::Avc),
            "hevc" | "h265" => Some(VideoCodec::Hevc),
            "av1" => Some(VideoCodec::Av1),
            _ => None,
        }
    }
}

/// 凭证持久化后端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionBackend {
    /// `<data_dir>/sessions/<platform>.json`
    File,
    Redis { url: String },
}

/// 解析管线配置
///
/// 构造时注入各组件,运行期间只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub data_dir: PathBuf,
    pub platforms: HashMap<PlatformId, PlatformSettings>,
    pub proxy: Option<String>,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub short_link_ttl: Duration,
    pub short_link_capacity: u64,
    /// B站清晰度上限 (qn, 64 = 720P)
    pub bilibili_quality: u32,
    pub bilibili_codec: VideoCodec,
    /// 超过该时长的油管视频只提供封面
    pub max_duration_secs: u64,
    /// 启用解析的会话白名单,为空表示全部启用
    pub enabled_sessions: Vec<String>,
    pub debounce_interval: Duration,
    pub login_poll_interval: Duration,
    pub login_timeout: Duration,
    pub session_backend: SessionBackend,
    pub ytdlp_path: Option<PathBuf>,
    pub youtube_cookies_file: Option<PathBuf>,
    pub instagram_cookies_file: Option<PathBuf>,
    /// gallery-dl 可执行文件,用于 Instagram 图文
    pub gallery_dl_path: Option<PathBuf>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let platforms = PlatformId::builtin()
            .into_iter()
            .map(|p| {
                let settings = PlatformSettings::default_for(&p);
                (p, settings)
            })
            .collect();

        Self {
            data_dir: dirs::data_dir()
                .map(|p| p.join("share-parser"))
                .unwrap_or_else(|| PathBuf::from("data")),
            platforms,
            proxy: None,
            http_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            short_link_ttl: Duration::from_secs(24 * 3600),
            short_link_capacity: 4096,
            bilibili_quality: 64,
            bilibili_codec: VideoCodec::Avc,
            max_duration_secs: 15 * 60,
            enabled_sessions: Vec::new(),
            debounce_interval: Duration::ZERO,
            login_poll_interval: Duration::from_secs(2),
            login_timeout: Duration::from_secs(60),
            session_backend: SessionBackend::File,
            ytdlp_path: None,
            youtube_cookies_file: None,
            instagram_cookies_file: None,
            gallery_dl_path: None,
        }
    }
}

impl ParserConfig {
    /// 从环境变量键值对构造配置
    ///
    /// 读取 `PARSER_` 前缀的变量,未设置的项使用默认值。
    ///
    /// # 错误
    /// 数值或枚举格式错误时返回 `ConfigError::InvalidValue`
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(dir) = get("PARSER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.proxy = get("PARSER_PROXY").map(str::to_string);

        let proxy_platforms: Option<Vec<PlatformId>> = get("PARSER_PROXY_PLATFORMS")
            .map(|list| list.split(',').map(PlatformId::from).collect());

        for (platform, settings) in config.platforms.iter_mut() {
            let segment = platform.env_segment();
            if let Some(value) = get(&format!("PARSER_{}_ENABLED", segment)) {
                settings.enabled = parse_bool(&format!("PARSER_{}_ENABLED", segment), value)?;
            }
            if let Some(cookies) = get(&format!("PARSER_{}_COOKIES", segment)) {
                settings.cookies = Some(cookies.to_string());
            }
            if let Some(ref list) = proxy_platforms {
                settings.use_proxy = list.contains(platform);
            }
        }

        if let Some(v) = get("PARSER_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_num("PARSER_HTTP_TIMEOUT_SECS", v)?);
        }
        if let Some(v) = get("PARSER_RETRY_TIMES") {
            config.retry.max_attempts = parse_num::<u32>("PARSER_RETRY_TIMES", v)?.max(1);
        }
        if let Some(v) = get("PARSER_RETRY_BASE_DELAY_MS") {
            config.retry.base_delay =
                Duration::from_millis(parse_num("PARSER_RETRY_BASE_DELAY_MS", v)?);
        }
        if let Some(v) = get("PARSER_SHORT_LINK_TTL_SECS") {
            config.short_link_ttl =
                Duration::from_secs(parse_num("PARSER_SHORT_LINK_TTL_SECS", v)?);
        }
        if let Some(v) = get("PARSER_SHORT_LINK_CAPACITY") {
            config.short_link_capacity = parse_num("PARSER_SHORT_LINK_CAPACITY", v)?;
        }
        if let Some(v) = get("PARSER_BILIBILI_QUALITY") {
            config.bilibili_quality = parse_num("PARSER_BILIBILI_QUALITY", v)?;
        }
        if let Some(v) = get("PARSER_BILIBILI_CODECS") {
            config.bilibili_codec = VideoCodec::parse(v).ok_or_else(|| ConfigError::InvalidValue {
                key: "PARSER_BILIBILI_CODECS".to_string(),
                value: v.to_string(),
            })?;
        }
        if let Some(v) = get("PARSER_MAX_DURATION_MINUTES") {
            config.max_duration_secs = parse_num::<u64>("PARSER_MAX_DURATION_MINUTES", v)? * 60;
        }
        if let Some(v) = get("PARSER_ENABLED_SESSIONS") {
            config.enabled_sessions = split_list(v);
        }
        if let Some(v) = get("PARSER_DEBOUNCE_SECS") {
            config.debounce_interval = Duration::from_secs(parse_num("PARSER_DEBOUNCE_SECS", v)?);
        }
        if let Some(v) = get("PARSER_LOGIN_POLL_INTERVAL_SECS") {
            config.login_poll_interval =
                Duration::from_secs(parse_num("PARSER_LOGIN_POLL_INTERVAL_SECS", v)?);
        }
        if let Some(v) = get("PARSER_LOGIN_TIMEOUT_SECS") {
            config.login_timeout = Duration::from_secs(parse_num("PARSER_LOGIN_TIMEOUT_SECS", v)?);
        }
        match get("PARSER_SESSION_BACKEND").map(str::to_lowercase).as_deref() {
            None | Some("file") => {}
            Some("redis") => {
                let url = get("PARSER_REDIS_URL").unwrap_or("redis://localhost:6379");
                config.session_backend = SessionBackend::Redis {
                    url: url.to_string(),
                };
            }
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "PARSER_SESSION_BACKEND".to_string(),
                    value: other.to_string(),
                })
            }
        }
        config.ytdlp_path = get("PARSER_YTDLP_PATH").map(PathBuf::from);
        config.youtube_cookies_file = get("PARSER_YOUTUBE_COOKIES_FILE").map(PathBuf::from);
        config.instagram_cookies_file = get("PARSER_INSTAGRAM_COOKIES_FILE").map(PathBuf::from);
        config.gallery_dl_path = get("PARSER_GALLERY_DL_PATH").map(PathBuf::from);

        Ok(config)
    }

    fn settings(&self, platform: &PlatformId) -> Option<&PlatformSettings> {
        self.platforms.get(platform)
    }

    /// 平台是否启用 (未配置的自定义平台默认启用)
    pub fn is_enabled(&self, platform: &PlatformId) -> bool {
        self.settings(platform).map_or(true, |s| s.enabled)
    }

    /// 平台预置的 cookie 字符串
    pub fn cookies_for(&self, platform: &PlatformId) -> Option<&str> {
        self.settings(platform).and_then(|s| s.cookies.as_deref())
    }

    /// 平台应使用的代理地址
    pub fn proxy_for(&self, platform: &PlatformId) -> Option<&str> {
        let use_proxy = self.settings(platform).is_some_and(|s| s.use_proxy);
        if use_proxy {
            self.proxy.as_deref()
        } else {
            None
        }
    }

    /// 凭证文件目录
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// 短链缓存快照文件
    pub fn short_link_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("short_links.json")
    }

    /// 启用或禁用平台 (构建器模式)
    pub fn with_platform_enabled(mut self, platform: PlatformId, enabled: bool) -> Self {
        let settings = self
            .platforms
            .entry(platform.clone())
            .or_insert_with(|| PlatformSettings::default_for(&platform));
        settings.enabled = enabled;
        self
    }

    /// 设置平台预置 cookie (构建器模式)
    pub fn with_platform_cookies(mut self, platform: PlatformId, cookies: &str) -> Self {
        let settings = self
            .platforms
            .entry(platform.clone())
            .or_insert_with(|| PlatformSettings::default_for(&platform));
        settings.cookies = Some(cookies.to_string());
        self
    }

    /// 设置数据目录 (构建器模式)
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    /// 设置重试策略 (构建器模式)
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 获取配置摘要 (用于日志,不包含 cookie 与代理凭据)
    pub fn summary_for_logging(&self) -> String {
        let mut enabled: Vec<&str> = self
            .platforms
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(p, _)| p.as_str())
            .collect();
        enabled.sort();
        format!(
            "data_dir={} enabled=[{}] proxy={} timeout={}s retry={} backend={}",
            self.data_dir.display(),
            enabled.join(","),
            if self.proxy.is_some() { "on" } else { "off" },
            self.http_timeout.as_secs(),
            self.retry.max_attempts,
            match self.session_backend {
                SessionBackend::File => "file",
                SessionBackend::Redis { .. } => "redis",
            }
        )
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// 拆分逗号分隔列表,去除空白与空项
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ParserConfig::from_vars(&HashMap::new()).unwrap();
        for platform in PlatformId::builtin() {
            assert!(config.is_enabled(&platform));
        }
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.bilibili_quality, 64);
        assert_eq!(config.session_backend, SessionBackend::File);
        assert!(config.enabled_sessions.is_empty());
    }

    #[test]
    fn test_platform_overrides() {
        let config = ParserConfig::from_vars(&vars(&[
            ("PARSER_DOUYIN_ENABLED", "false"),
            ("PARSER_BILIBILI_COOKIES", "SESSDATA=abc; bili_jct=def"),
            ("PARSER_ENABLED_SESSIONS", "group_1, group_2,,"),
        ]))
        .unwrap();
        assert!(!config.is_enabled(&PlatformId::Douyin));
        assert!(config.is_enabled(&PlatformId::Twitter));
        assert_eq!(
            config.cookies_for(&PlatformId::Bilibili),
            Some("SESSDATA=abc; bili_jct=def")
        );
        assert_eq!(config.enabled_sessions, vec!["group_1", "group_2"]);
    }

    #[test]
    fn test_proxy_only_for_listed_platforms() {
        let config = ParserConfig::from_vars(&vars(&[("PARSER_PROXY", "http://127.0.0.1:7890")]))
            .unwrap();
        assert_eq!(config.proxy_for(&PlatformId::Youtube), Some("http://127.0.0.1:7890"));
        assert_eq!(config.proxy_for(&PlatformId::Bilibili), None);

        let config = ParserConfig::from_vars(&vars(&[
            ("PARSER_PROXY", "http://127.0.0.1:7890"),
            ("PARSER_PROXY_PLATFORMS", "twitter"),
        ]))
        .unwrap();
        assert_eq!(config.proxy_for(&PlatformId::Youtube), None);
        assert!(config.proxy_for(&PlatformId::Twitter).is_some());
    }

    #[test]
    fn test_invalid_values() {
        let err = ParserConfig::from_vars(&vars(&[("PARSER_RETRY_TIMES", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PARSER_RETRY_TIMES"));

        assert!(ParserConfig::from_vars(&vars(&[("PARSER_WEIBO_ENABLED", "maybe")])).is_err());
        assert!(ParserConfig::from_vars(&vars(&[("PARSER_BILIBILI_CODECS", "vp9")])).is_err());
        assert!(ParserConfig::from_vars(&vars(&[("PARSER_SESSION_BACKEND", "sqlite")])).is_err());
    }

    #[test]
    fn test_redis_backend() {
        let config = ParserConfig::from_vars(&vars(&[
            ("PARSER_SESSION_BACKEND", "redis"),
            ("PARSER_REDIS_URL", "redis://cache:6379/2"),
        ]))
        .unwrap();
        assert_eq!(
            config.session_backend,
            SessionBackend::Redis {
                url: "redis://cache:6379/2".into()
            }
        );
    }

    #[test]
    fn test_retry_delay_doubles() {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = ParserConfig::default()
            .with_platform_cookies(PlatformId::Bilibili, "SESSDATA=secret");
        assert!(!config.summary_for_logging().contains("secret"));
    }
}
