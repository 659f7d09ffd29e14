use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::errors::ValidationError;
use crate::models::PlatformId;

/// 凭证来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    /// 扫码登录获得
    QrCode,

    /// 配置文件中的 cookie 字符串
    ConfiguredCookies,

    /// 从持久化存储恢复
    Restored,
}

/// 平台登录凭证
///
/// 存储某个平台的登录 cookies,支持过期判断、请求头构造和安全日志。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub platform: PlatformId,

    /// Cookie键值对 (如: SESSDATA, bili_jct, DedeUserID)
    pub cookies: HashMap<String, String>,

    /// 刷新令牌 (B站扫码登录返回)
    pub refresh_token: Option<String>,

    /// 获取时间
    pub obtained_at: DateTime<Utc>,

    /// 过期时间 (未知时为空,视为长期有效)
    pub expires_at: Option<DateTime<Utc>>,

    pub obtained_via: LoginMethod,
}

impl Session {
    /// 创建新的凭证
    ///
    /// # 示例
    /// ```
    /// use std::collections::HashMap;
    /// use share_parser::models::{LoginMethod, PlatformId, Session};
    ///
    /// let mut cookies = HashMap::new();
    /// cookies.insert("SESSDATA".to_string(), "xxx".to_string());
    /// let session = Session::new(PlatformId::Bilibili, cookies, LoginMethod::QrCode);
    /// assert!(session.validate().is_ok());
    /// ```
    pub fn new(
        platform: PlatformId,
        cookies: HashMap<String, String>,
        obtained_via: LoginMethod,
    ) -> Self {
        Self {
            platform,
            cookies,
            refresh_token: None,
            obtained_at: Utc::now(),
            expires_at: None,
            obtained_via,
        }
    }

    /// 从 `k1=v1; k2=v2` 形式的 cookie 字符串构造凭证
    ///
    /// 无法拆分为键值对的片段会被忽略。
    ///
    /// # 错误
    /// 返回 `ValidationError::InvalidFormat` 如果字符串中没有任何有效键值对
    pub fn from_cookie_str(platform: PlatformId, raw: &str) -> Result<Self, ValidationError> {
        let cookies = parse_cookie_str(raw);
        if cookies.is_empty() {
            return Err(ValidationError::InvalidFormat(
                "cookie 字符串中没有有效的键值对".to_string(),
            ));
        }
        Ok(Self::new(platform, cookies, LoginMethod::ConfiguredCookies))
    }

    /// 设置刷新令牌 (构建器模式)
    pub fn with_refresh_token(mut self, refresh_token: String) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    /// 设置过期时间 (构建器模式)
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// 设置来源 (构建器模式)
    pub fn with_method(mut self, method: LoginMethod) -> Self {
        self.obtained_via = method;
        self
    }

    /// 是否已过期
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// 验证必需的cookie字段
    ///
    /// 检查规则:
    /// 1. cookies不为空
    /// 2. 包含平台要求的关键字段 (B站 `SESSDATA`, 微博 `SUB`)
    ///
    /// # 错误
    /// 返回 `ValidationError::MissingCookie` 如果缺少必需字段
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cookies.is_empty() {
            return Err(ValidationError::InvalidFormat("Cookies不能为空".to_string()));
        }

        for &cookie_name in required_cookies(&self.platform) {
            if !self.cookies.contains_key(cookie_name) {
                return Err(ValidationError::MissingCookie(cookie_name.to_string()));
            }
        }

        Ok(())
    }

    /// 获取cookies的样本 (用于日志,不记录值)
    ///
    /// 仅返回cookie的键名,不包含实际值。
    pub fn sample_for_logging(&self) -> String {
        let mut keys: Vec<&String> = self.cookies.keys().collect();
        keys.sort();
        keys.iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 转换为cookie header格式
    ///
    /// 键名排序输出,保证同一凭证生成相同的请求头。
    pub fn to_cookie_header(&self) -> String {
        let mut pairs: Vec<(&String, &String)> = self.cookies.iter().collect();
        pairs.sort();
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// 获取指定cookie的值
    ///
    /// 注意: 仅在内部使用,不应记录到日志。
    pub fn get_cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }

    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }
}

/// 平台要求的关键 cookie
fn required_cookies(platform: &PlatformId) -> &'static [&'static str] {
    match platform {
        PlatformId::Bilibili => &["SESSDATA"],
        PlatformId::Weibo => &["SUB"],
        _ => &[],
    }
}

/// 解析 `k1=v1; k2=v2` 形式的 cookie 字符串
pub fn parse_cookie_str(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
