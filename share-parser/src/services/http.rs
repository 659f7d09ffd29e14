//! 平台共享的HTTP客户端
//!
//! 统一处理超时、代理、重试与状态码归类,解析器只关心平台自身的请求细节。

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::models::{ApiError, ParserConfig, PlatformId, RetryPolicy, Session};

/// 桌面浏览器 UA
pub const COMMON_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// iOS 移动端 UA
pub const IOS_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";

/// Android 移动端 UA
pub const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36";

/// 平台HTTP客户端
///
/// 每个解析器持有一个实例,代理按平台配置决定。
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    platform: PlatformId,
}

impl HttpClient {
    /// 创建平台客户端
    ///
    /// # 错误
    /// 返回 `ApiError::NetworkFailed` 如果代理地址无效或客户端构建失败
    pub fn new(platform: PlatformId, config: &ParserConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(Duration::from_secs(10));

        if let Some(proxy) = config.proxy_for(&platform) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ApiError::NetworkFailed(format!("代理地址无效: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::debug!(platform = %platform, "HTTP client uses proxy");
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            retry: config.retry,
            platform,
        })
    }

    /// 底层 reqwest 客户端,用于构造请求
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn platform(&self) -> &PlatformId {
        &self.platform
    }

    /// 发送请求,按策略重试可重试的失败
    ///
    /// `build` 每次尝试都会被调用以重新构造请求。
    ///
    /// # 错误
    /// - `ApiError::Unauthorized`: 401
    /// - `ApiError::RateLimitExceeded`: 429
    /// - `ApiError::RiskControl`: 403/412/418
    /// - `ApiError::HttpStatusError`: 其他非2xx
    /// - `ApiError::NetworkFailed`: 超时或连接失败 (已重试)
    pub async fn send<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let result = match build(&self.client).send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(ApiError::from(e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        platform = %self.platform,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 0 {
                        tracing::error!(
                            platform = %self.platform,
                            attempts = attempt + 1,
                            error = %e,
                            "Request failed after retries"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// GET 并读取文本
    pub async fn get_text(&self, url: &str, headers: HeaderMap) -> Result<String, ApiError> {
        let response = self.send(|c| c.get(url).headers(headers.clone())).await?;
        Ok(response.text().await?)
    }

    /// GET 并解析JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T, ApiError> {
        let text = self.get_text(url, headers).await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                platform = %self.platform,
                url = %url,
                error = %e,
                "Failed to parse JSON response"
            );
            ApiError::JsonParseFailed(e.to_string())
        })
    }

    /// POST 表单并解析JSON
    pub async fn post_form_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
        form: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self
            .send(|c| c.post(url).headers(headers.clone()).form(form))
            .await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry.delay_for(attempt);
        let jitter_cap = (base.as_millis() as u64) / 4;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }
}

/// 状态码归类
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let url = response.url().to_string();

    match status {
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized(format!("HTTP 401: {}", url))),
        StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimitExceeded { retry_after }),
        StatusCode::FORBIDDEN | StatusCode::PRECONDITION_FAILED => {
            Err(ApiError::RiskControl(format!("HTTP {}: {}", status.as_u16(), url)))
        }
        s if s.as_u16() == 418 => Err(ApiError::RiskControl(format!("HTTP 418: {}", url))),
        _ => {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(200).collect();
            Err(ApiError::HttpStatusError {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// 构造请求头
///
/// 无效的头值会被跳过。
pub fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(value) {
            map.insert(*name, value);
        }
    }
    map
}

/// 仅包含 User-Agent 的请求头
pub fn ua_headers(ua: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(ua) {
        map.insert(USER_AGENT, value);
    }
    map
}

/// 在请求头中附加凭证 cookie
pub fn with_session_cookie(mut map: HeaderMap, session: Option<&Session>) -> HeaderMap {
    if let Some(session) = session {
        if let Ok(value) = HeaderValue::from_str(&session.to_cookie_header()) {
            map.insert(COOKIE, value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Instant;

    fn client(retry: RetryPolicy) -> HttpClient {
        let config = ParserConfig::default().with_retry(retry);
        HttpClient::new(PlatformId::Bilibili, &config).unwrap()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_fails() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/flaky".to_string()))
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let url = format!("{}/flaky", server.url());
        let err = client(fast_retry())
            .get_text(&url, HeaderMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::HttpStatusError { status: 503, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_retry_on_client_errors() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/missing".to_string()))
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/missing", server.url());
        let start = Instant::now();
        let err = client(fast_retry())
            .get_text(&url, HeaderMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::HttpStatusError { status: 404, .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_classification() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("GET", Matcher::Regex(r"^/auth".to_string()))
            .with_status(401)
            .create_async()
            .await;
        let _limit = server
            .mock("GET", Matcher::Regex(r"^/limit".to_string()))
            .with_status(429)
            .with_header("retry-after", "30")
            .create_async()
            .await;
        let _risk = server
            .mock("GET", Matcher::Regex(r"^/risk".to_string()))
            .with_status(418)
            .create_async()
            .await;

        let http = client(RetryPolicy::none());
        let base = server.url();

        let err = http.get_text(&format!("{}/auth", base), HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err = http.get_text(&format!("{}/limit", base), HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimitExceeded { retry_after: Some(30) }));

        let err = http.get_text(&format!("{}/risk", base), HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::RiskControl(_)));
    }

    #[tokio::test]
    async fn test_get_json_and_session_cookie() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/json".to_string()))
            .match_header("cookie", "SESSDATA=abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":0,"data":{"title":"ok"}}"#)
            .create_async()
            .await;

        let session = Session::from_cookie_str(PlatformId::Bilibili, "SESSDATA=abc").unwrap();
        let value: serde_json::Value = client(RetryPolicy::none())
            .get_json(
                &format!("{}/json", server.url()),
                with_session_cookie(HeaderMap::new(), Some(&session)),
            )
            .await
            .unwrap();

        assert_eq!(value["data"]["title"], "ok");
        mock.assert_async().await;
    }

    #[test]
    fn test_header_helpers_skip_invalid_values() {
        let map = headers(&[("referer", "https://www.bilibili.com/"), ("x-bad", "a\nb")]);
        assert_eq!(map.len(), 1);
        assert!(ua_headers(IOS_UA).contains_key(USER_AGENT));
        assert!(with_session_cookie(HeaderMap::new(), None).is_empty());
    }
}
