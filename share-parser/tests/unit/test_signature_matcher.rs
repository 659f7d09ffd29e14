//! 内置链接签名单元测试
//!
//! 以全部内置签名构造匹配器,验证真实分享文本中的识别结果。

use share_parser::models::{MentionKind, PlatformId};
use share_parser::services::parsers::builtin_signatures;
use share_parser::services::SignatureMatcher;

fn matcher() -> SignatureMatcher {
    SignatureMatcher::new(builtin_signatures().unwrap()).unwrap()
}

fn detected(text: &str) -> Vec<(PlatformId, Option<String>)> {
    matcher()
        .detect(text)
        .into_iter()
        .map(|m| (m.platform, m.resource_id))
        .collect()
}

#[test]
fn test_each_platform_long_link() {
    let cases = [
        (
            "https://www.xiaohongshu.com/explore/66a1b2c3d4e5f6a7b8c9d0e1?xsec_token=abc",
            PlatformId::Xiaohongshu,
            "66a1b2c3d4e5f6a7b8c9d0e1",
        ),
        (
            "https://www.kuaishou.com/short-video/3xabcdefg123",
            PlatformId::Kuaishou,
            "3xabcdefg123",
        ),
        ("https://www.acfun.cn/v/ac47975011", PlatformId::Acfun, "ac47975011"),
        ("https://youtu.be/dQw4w9WgXcQ?si=share", PlatformId::Youtube, "dQw4w9WgXcQ"),
        (
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10",
            PlatformId::Youtube,
            "dQw4w9WgXcQ",
        ),
        (
            "https://www.tiktok.com/@someone/video/7300000000000000000",
            PlatformId::Tiktok,
            "7300000000000000000",
        ),
        (
            "https://twitter.com/someone/status/1790000000000000000",
            PlatformId::Twitter,
            "1790000000000000000",
        ),
    ];

    for (text, platform, id) in cases {
        assert_eq!(
            detected(text),
            vec![(platform, Some(id.to_string()))],
            "text: {}",
            text
        );
    }
}

#[test]
fn test_short_links_need_resolution() {
    let mentions = matcher().detect(
        "7.94 复制打开抖音 https://v.douyin.com/iRNBho6u/ 快手 https://v.kuaishou.com/2yAnzeZ 小红书 http://xhslink.com/a/bGyXmTOMnHz",
    );
    let platforms: Vec<&PlatformId> = mentions.iter().map(|m| &m.platform).collect();
    assert_eq!(
        platforms,
        vec![&PlatformId::Douyin, &PlatformId::Kuaishou, &PlatformId::Xiaohongshu]
    );
    assert!(mentions.iter().all(|m| m.kind == MentionKind::ShortLink));
    assert!(mentions.iter().all(|m| m.resource_id.is_none()));
}

#[test]
fn test_same_resource_reported_once() {
    let text = "https://www.bilibili.com/video/BV17x411w7KC 再发一次 https://www.bilibili.com/video/BV17x411w7KC";
    assert_eq!(
        detected(text),
        vec![(PlatformId::Bilibili, Some("BV17x411w7KC".to_string()))]
    );
}

#[test]
fn test_spans_point_into_text() {
    let text = "看看 https://www.acfun.cn/v/ac47975011 不错";
    let mentions = matcher().detect(text);
    assert_eq!(mentions.len(), 1);
    assert_eq!(&text[mentions[0].span.clone()], "acfun.cn/v/ac47975011");
}

#[test]
fn test_plain_text_has_no_mentions() {
    assert!(matcher().detect("今天吃什么 BV 号是什么").is_empty());
}

#[test]
fn test_unclaimed_url_alongside_platform_link() {
    let found = detected("https://github.com/rust-lang/rust 和 https://youtu.be/dQw4w9WgXcQ");
    assert_eq!(
        found,
        vec![
            (PlatformId::Custom("github.com".to_string()), None),
            (PlatformId::Youtube, Some("dQw4w9WgXcQ".to_string())),
        ]
    );
}
