//! 场景1: 短链分享
//!
//! 用户在群里发送 `https://b23.tv/abc123`,短链跟随重定向得到BV号,
//! B站解析器抓取后返回带标题的视频资源。同一短链的并发请求只触发一次上游重定向。

#[path = "../../share-parser/tests/common/mod.rs"]
mod common;

use common::*;
use futures::future::join_all;
use mockito::{Matcher, Server};
use std::sync::Arc;
use std::time::Duration;

use share_parser::models::{MediaAsset, PlatformId};
use share_parser::services::parsers::BilibiliParser;
use share_parser::services::{CredentialStore, Parser};

const SHORT: &str = "https://b23.tv/abc123";
const TARGET: &str = "https://www.bilibili.com/video/BV17x411w7KC?share_source=copy";

#[tokio::test]
async fn test_short_link_to_bilibili_video() {
    let mut server = Server::new_async().await;
    let _view = server
        .mock("GET", Matcher::Regex(r"^/x/web-interface/view".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(BILI_VIEW_BODY)
        .create_async()
        .await;
    let _play = server
        .mock("GET", Matcher::Regex(r"^/x/player/playurl".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(BILI_PLAY_BODY)
        .create_async()
        .await;

    let store = Arc::new(CredentialStore::in_memory());
    let parser: Arc<dyn Parser> = Arc::new(
        BilibiliParser::new(&test_config(), Arc::clone(&store))
            .unwrap()
            .with_base_url(&server.url()),
    );
    let redirector = Arc::new(MockRedirector::new().with_hop(SHORT, TARGET));
    let dispatcher = dispatcher_with(redirector.clone(), vec![parser], store);

    let results = dispatcher
        .parse(&format!("【测试视频-哔哩哔哩】 {}", SHORT))
        .await;

    assert_eq!(results.len(), 1);
    let result = results[0].as_ref().unwrap();
    assert_eq!(result.platform, PlatformId::Bilibili);
    assert_eq!(result.title, "测试视频");
    assert_eq!(result.canonical.resource_id, "BV17x411w7KC");
    assert_eq!(result.canonical.original_url, TARGET);

    match result.video() {
        Some(MediaAsset::Video { download_url, .. }) => assert_eq!(download_url, "https://upos.test/v64.m4s"),
        other => panic!("expected video asset, got {:?}", other),
    }
    assert_eq!(redirector.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_resolution_single_upstream_call() {
    let redirector = Arc::new(
        MockRedirector::new()
            .with_hop(SHORT, TARGET)
            .with_delay(Duration::from_millis(50)),
    );
    let dispatcher = dispatcher_with(
        redirector.clone(),
        Vec::new(),
        Arc::new(CredentialStore::in_memory()),
    );

    let mention = dispatcher.detect(SHORT).remove(0);
    let links = join_all((0..8).map(|_| dispatcher.resolve(&mention))).await;

    for link in &links {
        assert_eq!(link.as_ref().unwrap().resource_id, "BV17x411w7KC");
    }
    assert_eq!(redirector.calls(), 1);

    // 缓存命中不再访问上游
    let again = dispatcher.resolve(&mention).await.unwrap();
    assert_eq!(again.resource_id, "BV17x411w7KC");
    assert_eq!(redirector.calls(), 1);
}
