//! 场景2: 一条消息包含多个平台
//!
//! 抖音与推特链接出现在同一条消息中,各自独立得到结果;
//! 抖音被禁用时只有抖音返回类型化错误,推特不受影响。

#[path = "../../share-parser/tests/common/mod.rs"]
mod common;

use common::*;
use std::sync::Arc;

use share_parser::models::{ParseError, PlatformId};
use share_parser::services::{CredentialStore, Parser};

const MESSAGE: &str = "抖音 https://www.douyin.com/video/7381234567890123456 \
                       推特 https://x.com/someone/status/1790000000000000000";

#[tokio::test]
async fn test_two_platforms_independent_results() {
    let douyin = Arc::new(MockParser::new(PlatformId::Douyin, "抖音视频"));
    let twitter = Arc::new(MockParser::new(PlatformId::Twitter, "推文"));
    let dispatcher = dispatcher_with(
        Arc::new(MockRedirector::new()),
        vec![
            douyin.clone() as Arc<dyn Parser>,
            twitter.clone() as Arc<dyn Parser>,
        ],
        Arc::new(CredentialStore::in_memory()),
    );

    let results = dispatcher.parse(MESSAGE).await;
    assert_eq!(results.len(), 2);

    let first = results[0].as_ref().unwrap();
    assert_eq!(first.platform, PlatformId::Douyin);
    assert_eq!(first.title, "抖音视频");
    assert_eq!(first.canonical.resource_id, "video/7381234567890123456");

    let second = results[1].as_ref().unwrap();
    assert_eq!(second.platform, PlatformId::Twitter);
    assert_eq!(second.canonical.resource_id, "1790000000000000000");
    assert_eq!(second.canonical.canonical_url, "https://x.com/i/status/1790000000000000000");

    assert_eq!(douyin.calls(), 1);
    assert_eq!(twitter.calls(), 1);
}

#[tokio::test]
async fn test_disabled_platform_typed_error() {
    let twitter = Arc::new(MockParser::new(PlatformId::Twitter, "推文"));
    let dispatcher = dispatcher_with(
        Arc::new(MockRedirector::new()),
        vec![twitter.clone() as Arc<dyn Parser>],
        Arc::new(CredentialStore::in_memory()),
    );

    let results = dispatcher.parse(MESSAGE).await;
    assert_eq!(results.len(), 2);

    match &results[0] {
        Err(ParseError::UnsupportedPlatform { platform, .. }) => {
            assert_eq!(platform, &PlatformId::Douyin)
        }
        other => panic!("expected UnsupportedPlatform, got {:?}", other),
    }
    assert_eq!(results[1].as_ref().unwrap().platform, PlatformId::Twitter);
    assert_eq!(twitter.calls(), 1);
}

#[tokio::test]
async fn test_disabled_by_configuration() {
    let config = test_config().with_platform_enabled(PlatformId::Douyin, false);
    let dispatcher = builtin_dispatcher(&config, Arc::new(MockRedirector::new()));

    assert!(!dispatcher.registry().supports(&PlatformId::Douyin));
    assert!(dispatcher.registry().supports(&PlatformId::Twitter));

    let mentions = dispatcher.detect(MESSAGE);
    assert_eq!(mentions.len(), 2);

    // 禁用平台的链接仍被识别,分发时返回类型化错误
    let err = dispatcher
        .parse_mention(&mentions[0], share_parser::services::AssetFilter::All)
        .await
        .unwrap_err();
    assert!(matches!(err, ParseError::UnsupportedPlatform { .. }));
    assert!(!err.is_auth_required());
}
