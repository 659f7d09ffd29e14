//! 场景3: 凭证失效与刷新
//!
//! 上游以401拒绝旧凭证时,凭证在返回 `AuthRequired` 之前已被移除;
//! 存入新凭证后,下一次解析成功。凭证可选的平台同样遵守这一规则。

#[path = "../../share-parser/tests/common/mod.rs"]
mod common;

use common::*;
use mockito::{Matcher, Server};
use std::sync::Arc;

use share_parser::models::{ParseError, PlatformId, Session};
use share_parser::services::parsers::{BilibiliParser, XiaohongshuParser};
use share_parser::services::{CredentialStore, Parser};

const LINK: &str = "https://www.bilibili.com/video/BV17x411w7KC";

#[tokio::test]
async fn test_rejected_session_invalidated_then_refreshed() {
    let mut server = Server::new_async().await;
    let _rejected = server
        .mock("GET", Matcher::Regex(r"^/x/web-interface/view".to_string()))
        .match_header("cookie", Matcher::Regex("SESSDATA=stale".to_string()))
        .with_status(401)
        .create_async()
        .await;
    let _view = server
        .mock("GET", Matcher::Regex(r"^/x/web-interface/view".to_string()))
        .match_header("cookie", Matcher::Regex("SESSDATA=fresh".to_string()))
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
    store
        .put(
            PlatformId::Bilibili,
            Session::from_cookie_str(PlatformId::Bilibili, "SESSDATA=stale; bili_jct=x").unwrap(),
        )
        .await;

    let parser: Arc<dyn Parser> = Arc::new(
        BilibiliParser::new(&test_config(), Arc::clone(&store))
            .unwrap()
            .with_base_url(&server.url()),
    );
    let dispatcher = dispatcher_with(Arc::new(MockRedirector::new()), vec![parser], Arc::clone(&store));

    let results = dispatcher.parse(LINK).await;
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(err @ ParseError::AuthRequired { platform, .. }) => {
            assert_eq!(platform, &PlatformId::Bilibili);
            assert!(err.is_auth_required());
        }
        other => panic!("expected AuthRequired, got {:?}", other),
    }
    assert!(store.get(&PlatformId::Bilibili).await.is_none());

    store
        .put(
            PlatformId::Bilibili,
            Session::from_cookie_str(PlatformId::Bilibili, "SESSDATA=fresh; bili_jct=y").unwrap(),
        )
        .await;

    let results = dispatcher.parse(LINK).await;
    let result = results[0].as_ref().unwrap();
    assert_eq!(result.title, "测试视频");
    assert!(result.video().is_some());
    assert!(store.get(&PlatformId::Bilibili).await.is_some());
}

#[tokio::test]
async fn test_no_session_is_not_an_error_for_optional_auth() {
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

    let results = dispatcher.parse(LINK).await;
    assert_eq!(results[0].as_ref().unwrap().title, "测试视频");
}

#[tokio::test]
async fn test_optional_auth_platform_drops_rejected_session() {
    let mut server = Server::new_async().await;
    let _explore = server
        .mock("GET", Matcher::Regex(r"^/explore/".to_string()))
        .with_status(401)
        .create_async()
        .await;
    let discovery = server
        .mock("GET", Matcher::Regex(r"^/discovery/item/".to_string()))
        .expect(0)
        .create_async()
        .await;

    let store = Arc::new(CredentialStore::in_memory());
    store
        .put(
            PlatformId::Xiaohongshu,
            Session::from_cookie_str(PlatformId::Xiaohongshu, "web_session=stale; a1=x").unwrap(),
        )
        .await;

    let parser: Arc<dyn Parser> = Arc::new(
        XiaohongshuParser::new(&test_config(), Arc::clone(&store))
            .unwrap()
            .with_base_url(&server.url()),
    );
    let dispatcher = dispatcher_with(Arc::new(MockRedirector::new()), vec![parser], Arc::clone(&store));

    let results = dispatcher
        .parse("https://www.xiaohongshu.com/explore/abc123?xsec_token=tok")
        .await;
    assert!(matches!(
        &results[0],
        Err(ParseError::AuthRequired { platform: PlatformId::Xiaohongshu, .. })
    ));
    discovery.assert_async().await;
    assert!(store.get(&PlatformId::Xiaohongshu).await.is_none());
}
