//! 分发契约测试
//!
//! 验证解析管线对外承诺的性质:
//! - 同一资源的各种形式 (长链/短链/卡片/裸ID) 得到相等的规范链接
//! - 规范链接再次解析得到自身
//! - 结果中至少有一项资源
//! - 未识别的普通URL返回类型化错误
//! - 没有链接字段的卡片返回解析失败
//! - 音频快捷入口只返回一项音频资源

#[path = "../../share-parser/tests/common/mod.rs"]
mod common;

use async_trait::async_trait;
use common::*;
use mockito::{Matcher, Server};
use std::sync::Arc;

use share_parser::models::{
    ApiError, CanonicalLink, MediaAsset, ParseError, PlatformId, RawExtraction, Session,
};
use share_parser::services::parsers::BilibiliParser;
use share_parser::services::{AssetFilter, CredentialStore, Parser};

const SHORT: &str = "https://b23.tv/abc123";

fn bilibili_redirector() -> Arc<MockRedirector> {
    Arc::new(MockRedirector::new().with_hop(SHORT, "https://www.bilibili.com/video/BV17x411w7KC"))
}

#[tokio::test]
async fn test_surface_forms_resolve_to_one_link() {
    let dispatcher = dispatcher_with(
        bilibili_redirector(),
        Vec::new(),
        Arc::new(CredentialStore::in_memory()),
    );

    let card = format!(r#"{{"app":"com.tencent.miniapp","meta":{{"detail_1":{{"qqdocurl":"{}"}}}}}}"#, SHORT);
    let forms = [
        "av170001".to_string(),
        "BV17x411w7KC".to_string(),
        "https://www.bilibili.com/video/BV17x411w7KC?spm_id_from=333".to_string(),
        "https://m.bilibili.com/video/av170001".to_string(),
        SHORT.to_string(),
        card,
    ];

    let mut links: Vec<CanonicalLink> = Vec::new();
    for form in &forms {
        let mentions = dispatcher.detect(form);
        assert_eq!(mentions.len(), 1, "form: {}", form);
        links.push(dispatcher.resolve(&mentions[0]).await.unwrap());
    }

    for link in &links {
        assert_eq!(link, &links[0]);
        assert_eq!(link.platform, PlatformId::Bilibili);
        assert_eq!(link.resource_id, "BV17x411w7KC");
    }
}

#[tokio::test]
async fn test_resolve_is_idempotent() {
    let dispatcher = dispatcher_with(
        bilibili_redirector(),
        Vec::new(),
        Arc::new(CredentialStore::in_memory()),
    );

    let first = dispatcher.resolve_url(&PlatformId::Bilibili, SHORT).await.unwrap();
    let second = dispatcher
        .resolve_url(&PlatformId::Bilibili, &first.canonical_url)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(second.canonical_url, first.canonical_url);
}

struct EmptyParser;

#[async_trait]
impl Parser for EmptyParser {
    fn platform(&self) -> PlatformId {
        PlatformId::Weibo
    }

    async fn handle(
        &self,
        _canonical: &CanonicalLink,
        _session: Option<&Session>,
    ) -> Result<RawExtraction, ApiError> {
        Ok(RawExtraction::new().with_title("只有标题"))
    }
}

#[tokio::test]
async fn test_result_without_assets_is_error() {
    let dispatcher = dispatcher_with(
        Arc::new(MockRedirector::new()),
        vec![Arc::new(EmptyParser) as Arc<dyn Parser>],
        Arc::new(CredentialStore::in_memory()),
    );

    let results = dispatcher.parse("https://weibo.com/1234567890/OabCdEfGh").await;
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(ParseError::Normalization { .. })));
}

#[tokio::test]
async fn test_unrecognised_url_unsupported() {
    let dispatcher = builtin_dispatcher(&test_config(), Arc::new(MockRedirector::new()));

    let results = dispatcher.parse("文档在这 https://docs.example.org/guide/intro").await;
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(ParseError::UnsupportedPlatform { platform, raw }) => {
            assert_eq!(platform, &PlatformId::Custom("docs.example.org".to_string()));
            assert_eq!(raw, "https://docs.example.org/guide/intro");
        }
        other => panic!("expected UnsupportedPlatform, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_links_no_results() {
    let dispatcher = builtin_dispatcher(&test_config(), Arc::new(MockRedirector::new()));
    assert!(dispatcher.parse("今天天气不错").await.is_empty());
}

#[tokio::test]
async fn test_audio_only_yields_single_audio() {
    let mut server = Server::new_async().await;
    let _view = server
        .mock("GET", Matcher::Regex(r"^/x/web-interface/view".to_string()))
        .with_status(200)
        .with_body(BILI_VIEW_BODY)
        .create_async()
        .await;
    let _play = server
        .mock("GET", Matcher::Regex(r"^/x/player/playurl".to_string()))
        .with_status(200)
        .with_body(BILI_PLAY_BODY)
        .create_async()
        .await;

    let store = Arc::new(CredentialStore::in_memory());
    let parser: Arc<dyn Parser> = Arc::new(
        BilibiliParser::new(&test_config(), Arc::clone(&store))
            .unwrap()
            .with_base_url(&server.url()),
    );
    let dispatcher = dispatcher_with(Arc::new(MockRedirector::new()), vec![parser], store);

    let mention = dispatcher.detect("BV17x411w7KC").remove(0);
    let result = dispatcher
        .parse_mention(&mention, AssetFilter::AudioOnly)
        .await
        .unwrap();

    assert_eq!(result.assets.len(), 1);
    match &result.assets[0] {
        MediaAsset::Audio { download_url, .. } => assert_eq!(download_url, "https://upos.test/a.m4s"),
        other => panic!("expected audio asset, got {:?}", other),
    }
}

#[tokio::test]
async fn test_card_without_link_is_resolution_error() {
    let dispatcher = builtin_dispatcher(&test_config(), Arc::new(MockRedirector::new()));

    let card = r#"{"app":"com.tencent.miniapp_01","meta":{"detail_1":{"title":"哔哩哔哩","desc":"视频"}}}"#;
    let results = dispatcher.parse(card).await;

    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(ParseError::Resolution { reason, .. }) => assert!(reason.contains("卡片")),
        other => panic!("expected Resolution, got {:?}", other),
    }
}
