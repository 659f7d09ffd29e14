use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PlatformId;

/// 平台接口调用相关错误
///
/// 解析器访问上游平台时的各种失败场景。
/// 每个错误都包含足够的上下文信息,帮助调试和恢复。
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ApiError {
    /// 网络请求失败
    ///
    /// 可能原因:
    /// - 网络连接中断
    /// - 平台服务器不可达
    /// - 请求超时
    #[error("网络请求失败: {0}")]
    NetworkFailed(String),

    /// 响应格式无效
    ///
    /// 平台返回的数据结构不符合预期,或缺少关键字段
    #[error("响应格式无效: {0}")]
    InvalidResponse(String),

    /// 凭证无效或缺失
    ///
    /// 平台返回401或"未登录"业务码
    #[error("凭证无效或已过期: {0}")]
    Unauthorized(String),

    /// 触发风控
    ///
    /// 平台返回403/418等拒绝访问响应
    #[error("请求被风控拦截: {0}")]
    RiskControl(String),

    /// 内容不可用
    ///
    /// 内容已删除、仅粉丝可见或地区限制
    #[error("内容不可用: {0}")]
    ContentUnavailable(String),

    /// 触发速率限制
    ///
    /// 平台返回429或类似的限流响应
    #[error("请求过于频繁,已被限流")]
    RateLimitExceeded { retry_after: Option<u64> },

    /// JSON解析失败
    #[error("响应数据解析失败: {0}")]
    JsonParseFailed(String),

    /// HTTP状态码错误
    ///
    /// 平台返回了非2xx状态码
    #[error("HTTP错误 {status}: {message}")]
    HttpStatusError { status: u16, message: String },

    /// 外部命令执行失败
    ///
    /// yt-dlp 等外部工具缺失或执行出错
    #[error("外部命令执行失败: {0}")]
    CommandFailed(String),
}

impl ApiError {
    /// 是否值得重试
    ///
    /// 仅网络层失败和服务端5xx错误可重试,4xx一律不重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::NetworkFailed(_) => true,
            ApiError::HttpStatusError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// 链接解析相关错误
///
/// 短链重定向、卡片解包、资源标识提取的失败场景
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ResolutionError {
    /// 目标地址没有返回重定向
    #[error("无法重定向: {url}")]
    NoRedirect { url: String },

    /// 重定向请求失败
    #[error("重定向请求失败 {url}: {reason}")]
    Network { url: String, reason: String },

    /// 重定向后的地址不属于该平台的任何已知链接形式
    #[error("重定向后的链接无法识别: {url}")]
    Unrecognized { url: String },

    /// 超过最大重定向跳数
    #[error("重定向次数过多: {url}")]
    TooManyHops { url: String },

    /// 卡片/小程序数据无效
    #[error("卡片数据无效: {0}")]
    InvalidCard(String),

    /// 无法从链接中提取资源标识
    #[error("无法提取资源标识: {raw}")]
    MissingIdentifier { raw: String },
}

/// 结果规范化错误
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum NormalizationError {
    /// 解析结果不包含任何媒体资源
    #[error("解析结果不包含任何媒体资源")]
    EmptyAssets,

    /// 仅音频模式下没有可用的音频资源
    #[error("解析结果不包含音频资源")]
    NoAudio,
}

/// 单个链接的解析错误
///
/// 分发器对每个提及返回一个独立结果,失败原因归入以下五类。
/// 每类都携带平台标识与原始原因,仅 `AuthRequired` 可由用户登录修复。
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ParseError {
    /// 链接无法解析为规范链接
    #[error("链接解析失败 [{raw}]: {reason}")]
    Resolution {
        platform: PlatformId,
        raw: String,
        reason: String,
    },

    /// 没有已注册的解析器处理该平台
    #[error("不支持的平台 {platform}: {raw}")]
    UnsupportedPlatform { platform: PlatformId, raw: String },

    /// 需要登录凭证
    #[error("{platform} 需要登录: {reason}")]
    AuthRequired { platform: PlatformId, reason: String },

    /// 解析器内容提取失败
    #[error("{platform} 内容提取失败: {cause}")]
    Extraction { platform: PlatformId, cause: ApiError },

    /// 结果规范化失败
    #[error("{platform} 结果规范化失败: {reason}")]
    Normalization { platform: PlatformId, reason: String },
}

impl ParseError {
    /// 错误所属的平台
    pub fn platform(&self) -> &PlatformId {
        match self {
            ParseError::Resolution { platform, .. }
            | ParseError::UnsupportedPlatform { platform, .. }
            | ParseError::AuthRequired { platform, .. }
            | ParseError::Extraction { platform, .. }
            | ParseError::Normalization { platform, .. } => platform,
        }
    }

    /// 是否为需要登录的错误
    pub fn is_auth_required(&self) -> bool {
        matches!(self, ParseError::AuthRequired { .. })
    }

    /// 解析器错误归类
    ///
    /// `Unauthorized` 归入 `AuthRequired`,其余归入 `Extraction`。
    pub fn from_api(platform: PlatformId, err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(reason) => ParseError::AuthRequired { platform, reason },
            cause => ParseError::Extraction { platform, cause },
        }
    }
}

/// Cookies验证相关错误
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ValidationError {
    /// 缺少必需的cookie字段
    #[error("缺少必需的cookie字段: {0}")]
    MissingCookie(String),

    /// Cookies格式无效
    #[error("Cookies格式无效: {0}")]
    InvalidFormat(String),
}

/// 凭证持久化相关错误
///
/// 处理文件或Redis持久化时的失败场景
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum StorageError {
    /// Redis连接失败
    #[error("Redis连接失败: {0}")]
    RedisConnectionFailed(String),

    /// 指定平台的凭证未找到
    #[error("未找到平台 {0} 的凭证")]
    NotFound(String),

    /// 序列化/反序列化失败
    #[error("数据序列化失败: {0}")]
    SerializationError(String),

    /// Redis操作超时
    #[error("Redis操作超时: {0}")]
    OperationTimeout(String),

    /// Redis命令执行失败
    #[error("Redis命令执行失败: {0}")]
    CommandFailed(String),

    /// 文件读写失败
    #[error("文件读写失败: {0}")]
    Io(String),
}

/// 配置相关错误
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ConfigError {
    /// 配置值格式错误
    #[error("配置项 {key} 的值无效: {value}")]
    InvalidValue { key: String, value: String },

    /// 链接签名正则无效
    #[error("链接签名无效: {0}")]
    InvalidPattern(String),

    /// 初始化HTTP客户端失败
    #[error("HTTP客户端初始化失败: {0}")]
    HttpClient(String),

    /// 配置文件读写失败
    #[error("配置文件读写失败: {0}")]
    IoError(String),
}

/// 实现从reqwest::Error到ApiError的转换
impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::NetworkFailed("请求超时".to_string())
        } else if err.is_connect() {
            ApiError::NetworkFailed("无法连接到服务器".to_string())
        } else if err.is_decode() {
            ApiError::JsonParseFailed(err.to_string())
        } else {
            ApiError::NetworkFailed(err.to_string())
        }
    }
}

/// 实现从redis::RedisError到StorageError的转换
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() {
            StorageError::RedisConnectionFailed("连接被拒绝".to_string())
        } else if err.is_timeout() {
            StorageError::OperationTimeout(err.to_string())
        } else {
            StorageError::CommandFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::JsonParseFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err.to_string())
    }
}

impl From<regex::Error> for ConfigError {
    fn from(err: regex::Error) -> Self {
        ConfigError::InvalidPattern(err.to_string())
    }
}

impl From<ApiError> for ConfigError {
    fn from(err: ApiError) -> Self {
        ConfigError::HttpClient(err.to_string())
    }
}
