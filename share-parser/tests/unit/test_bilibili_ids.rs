//! B站资源标识单元测试
//!
//! av号与BV号互转,以及规范资源标识的解析与还原。

use share_parser::services::parsers::bilibili::{av2bv, bv2av, BiliResource};

#[test]
fn test_known_pairs() {
    let pairs = [
        (170001u64, "BV17x411w7KC"),
        (111298867365120, "BV1L9Uoa9EUx"),
    ];
    for (aid, bvid) in pairs {
        assert_eq!(av2bv(aid).as_deref(), Some(bvid));
        assert_eq!(bv2av(bvid), Some(aid));
    }
}

#[test]
fn test_conversion_is_inverse() {
    for aid in [1u64, 2, 99, 170001, 10_000_000, 999_999_999, 1 << 40] {
        let bvid = av2bv(aid).unwrap();
        assert!(bvid.starts_with("BV1"), "bvid: {}", bvid);
        assert_eq!(bvid.len(), 12);
        assert_eq!(bv2av(&bvid), Some(aid));
    }
}

#[test]
fn test_invalid_inputs() {
    assert_eq!(av2bv(0), None);
    assert_eq!(bv2av(""), None);
    assert_eq!(bv2av("BV17x411w7K"), None);
    assert_eq!(bv2av("av17x411w7KC"), None);
    assert_eq!(bv2av("BV17x411w7K0"), None);
}

#[test]
fn test_resource_parse_and_url() {
    assert_eq!(
        BiliResource::parse("BV17x411w7KC/p3"),
        Some(BiliResource::Video {
            bvid: "BV17x411w7KC".to_string(),
            page: 3
        })
    );
    assert_eq!(
        BiliResource::parse("BV17x411w7KC").map(|r| r.url()).as_deref(),
        Some("https://www.bilibili.com/video/BV17x411w7KC")
    );
    assert_eq!(
        BiliResource::parse("live/23058").map(|r| r.url()).as_deref(),
        Some("https://live.bilibili.com/23058")
    );
    assert_eq!(BiliResource::parse("unknown/1"), None);

    for id in ["BV17x411w7KC/p2", "dynamic/1", "opus/2", "favlist/4", "read/5"] {
        assert_eq!(BiliResource::parse(id).unwrap().resource_id(), id);
    }
}
