//! 注册表契约测试
//!
//! - 同一平台有多个解析器时,先注册者被选中,结果与调用次数无关
//! - 注册新平台不改变已有平台的选择
//! - 内置解析器按固定顺序注册,禁用的平台不注册

#[path = "../../share-parser/tests/common/mod.rs"]
mod common;

use common::*;
use std::sync::Arc;

use share_parser::models::{CanonicalLink, ParseError, PlatformId};
use share_parser::services::{Parser, ParserRegistry};

fn link(platform: PlatformId, id: &str) -> CanonicalLink {
    CanonicalLink::new(platform, id, format!("https://example.test/{}", id), id)
}

#[tokio::test]
async fn test_first_registered_wins_deterministically() {
    let first = Arc::new(MockParser::new(PlatformId::Douyin, "first"));
    let second = Arc::new(MockParser::new(PlatformId::Douyin, "second"));

    let mut registry = ParserRegistry::new();
    registry.register(first.clone());
    registry.register(second.clone());

    let target = link(PlatformId::Douyin, "video/1");
    for _ in 0..5 {
        let selected = registry.select(&target).unwrap();
        selected.handle(&target, None).await.unwrap();
    }

    assert_eq!(first.calls(), 5);
    assert_eq!(second.calls(), 0);
}

#[tokio::test]
async fn test_new_platform_does_not_change_selection() {
    let douyin = Arc::new(MockParser::new(PlatformId::Douyin, "douyin"));
    let mut registry = ParserRegistry::new();
    registry.register(douyin.clone());

    let target = link(PlatformId::Douyin, "video/1");
    let before = registry.select(&target).unwrap().platform();

    registry.register(Arc::new(MockParser::new(
        PlatformId::Custom("example.org".to_string()),
        "custom",
    )));
    let after = registry.select(&target).unwrap();
    after.handle(&target, None).await.unwrap();

    assert_eq!(before, after.platform());
    assert_eq!(douyin.calls(), 1);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_register_first_overrides() {
    let builtin = Arc::new(MockParser::new(PlatformId::Weibo, "builtin"));
    let preferred = Arc::new(MockParser::new(PlatformId::Weibo, "preferred"));

    let mut registry = ParserRegistry::new();
    registry.register(builtin.clone());
    registry.register_first(preferred.clone());

    let target = link(PlatformId::Weibo, "1/abc");
    registry.select(&target).unwrap().handle(&target, None).await.unwrap();

    assert_eq!(preferred.calls(), 1);
    assert_eq!(builtin.calls(), 0);
}

#[test]
fn test_unregistered_platform_is_typed_error() {
    let registry = ParserRegistry::new();
    assert!(registry.is_empty());

    let err = registry
        .select(&link(PlatformId::Kuaishou, "photo/1"))
        .err()
        .unwrap();
    assert!(matches!(err, ParseError::UnsupportedPlatform { .. }));
    assert_eq!(err.platform(), &PlatformId::Kuaishou);
}

#[tokio::test]
async fn test_builtin_registration_order() {
    let dispatcher = builtin_dispatcher(&test_config(), Arc::new(MockRedirector::new()));
    assert_eq!(dispatcher.registry().platforms(), PlatformId::builtin().to_vec());

    let config = test_config()
        .with_platform_enabled(PlatformId::Youtube, false)
        .with_platform_enabled(PlatformId::Tiktok, false);
    let dispatcher = builtin_dispatcher(&config, Arc::new(MockRedirector::new()));
    let platforms = dispatcher.registry().platforms();

    assert_eq!(platforms.len(), 9);
    assert!(!platforms.contains(&PlatformId::Youtube));
    assert_eq!(platforms.first(), Some(&PlatformId::Bilibili));
    assert_eq!(platforms.last(), Some(&PlatformId::Ncm));
}
