//! 测试公共模块
//!
//! 提供不访问网络的Mock组件:
//! - MockRedirector: 内存重定向表,统计上游调用次数
//! - MockParser: 固定返回一个视频资源,统计调用次数
//! - 装配函数: 以内置签名加Mock组件构造分发器

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use share_parser::models::{
    ApiError, CanonicalLink, ParserConfig, PlatformId, RawExtraction, RawStream, ResolutionError,
    RetryPolicy, Session,
};
use share_parser::services::parsers::builtin_signatures;
use share_parser::services::{
    AuthRequirement, CredentialStore, Dispatcher, LinkResolver, Parser, ParserRegistry,
    Redirector, SignatureMatcher,
};

/// Mock重定向器
///
/// 表中没有的地址视为非重定向响应。
pub struct MockRedirector {
    hops: HashMap<String, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockRedirector {
    pub fn new() -> Self {
        Self {
            hops: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// 添加一跳重定向 (构建器模式)
    pub fn with_hop(mut self, from: &str, to: &str) -> Self {
        self.hops.insert(from.to_string(), to.to_string());
        self
    }

    /// 模拟上游延迟,用于并发测试
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Redirector for MockRedirector {
    async fn next_hop(&self, url: &str) -> Result<Option<String>, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.hops.get(url).cloned())
    }
}

/// Mock解析器
pub struct MockParser {
    platform: PlatformId,
    title: String,
    calls: AtomicUsize,
}

impl MockParser {
    pub fn new(platform: PlatformId, title: &str) -> Self {
        Self {
            platform,
            title: title.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Parser for MockParser {
    fn platform(&self) -> PlatformId {
        self.platform.clone()
    }

    fn auth_requirement(&self) -> AuthRequirement {
        AuthRequirement::None
    }

    async fn handle(
        &self,
        canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RawExtraction::new()
            .with_title(self.title.as_str())
            .with_author("mock")
            .with_video(RawStream::new(format!(
                "https://cdn.test/{}.mp4",
                canonical.resource_id
            ))))
    }
}

/// 不重试的默认配置
pub fn test_config() -> ParserConfig {
    ParserConfig::default().with_retry(RetryPolicy::none())
}

/// 以内置签名与给定解析器装配分发器
pub fn dispatcher_with(
    redirector: Arc<dyn Redirector>,
    parsers: Vec<Arc<dyn Parser>>,
    store: Arc<CredentialStore>,
) -> Dispatcher {
    let matcher = Arc::new(SignatureMatcher::new(builtin_signatures().unwrap()).unwrap());
    let resolver = Arc::new(LinkResolver::new(
        matcher,
        redirector,
        Duration::from_secs(3600),
        128,
    ));

    let mut registry = ParserRegistry::new();
    for parser in parsers {
        registry.register(parser);
    }

    Dispatcher::new(resolver, Arc::new(registry), store)
}

/// 以内置签名与内置解析器装配分发器,重定向走Mock
pub fn builtin_dispatcher(config: &ParserConfig, redirector: Arc<dyn Redirector>) -> Dispatcher {
    Dispatcher::with_redirector(config, Arc::new(CredentialStore::in_memory()), redirector)
        .unwrap()
}

/// B站视频接口响应
pub const BILI_VIEW_BODY: &str = r#"{"code":0,"message":"0","data":{
    "bvid":"BV17x411w7KC","title":"测试视频","desc":"简介","duration":120,
    "owner":{"name":"UP主","face":"https://i0.hdslb.com/face.jpg"},
    "pic":"https://i0.hdslb.com/pic.jpg","pubdate":1700000000,"cid":279786,
    "pages":[{"cid":279786,"part":"P1","duration":120,"ctime":1700000000}]}}"#;

/// B站播放地址接口响应
pub const BILI_PLAY_BODY: &str = r#"{"code":0,"message":"0","data":{"dash":{
    "video":[{"id":64,"baseUrl":"https://upos.test/v64.m4s","codecid":7,"codecs":"avc1.64001F","bandwidth":1000}],
    "audio":[{"id":30280,"baseUrl":"https://upos.test/a.m4s","codecid":0,"codecs":"mp4a.40.2","bandwidth":320}]}}}"#;
