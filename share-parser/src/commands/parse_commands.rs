//! 解析命令
//!
//! 聊天消息进入解析管线的入口: 开关检查 → 链接防抖 → 规范化 → 资源防抖 → 抓取。

use futures::future::join_all;

use crate::models::{ParseError, ParseResult, PlatformId, RawMention};
use crate::services::AssetFilter;
use crate::state::AppState;

/// 解析一条聊天消息
///
/// # 参数
/// - `scope`: 会话标识 (群号或私聊标识),用于开关与防抖
/// - `text`: 消息文本或卡片数据
///
/// # 返回值
/// 每个未被防抖的候选一个结果;会话未开启解析时为空
pub async fn parse_message(
    state: &AppState,
    scope: &str,
    text: &str,
) -> Vec<Result<ParseResult, ParseError>> {
    if !state.is_parsing_enabled(scope).await {
        tracing::debug!(scope = %scope, "Parsing disabled for scope");
        return Vec::new();
    }

    let mentions = match state.dispatcher.detect_mentions(text) {
        Ok(mentions) => mentions,
        Err(e) => return vec![Err(e)],
    };
    if mentions.is_empty() {
        return Vec::new();
    }

    tracing::info!(scope = %scope, mentions = mentions.len(), "parse_message called");

    join_all(mentions.iter().map(|m| parse_one(state, scope, m)))
        .await
        .into_iter()
        .flatten()
        .collect()
}

async fn parse_one(
    state: &AppState,
    scope: &str,
    mention: &RawMention,
) -> Option<Result<ParseResult, ParseError>> {
    if state.debouncer.hit_link(scope, &mention.raw).await {
        return None;
    }

    let canonical = match state.dispatcher.resolve(mention).await {
        Ok(canonical) => canonical,
        Err(e) => return Some(Err(e)),
    };

    if state.debouncer.hit_resource(scope, &canonical).await {
        return None;
    }

    Some(state.dispatcher.parse_link(&canonical, AssetFilter::All).await)
}

/// 哔哩哔哩音频 (`bm`)
///
/// 参数可为 BV/av 号或任意哔哩哔哩链接,只返回音频资源。
pub async fn bilibili_audio(state: &AppState, text: &str) -> Result<ParseResult, String> {
    audio_for(state, PlatformId::Bilibili, text).await
}

/// YouTube 音频 (`ym`)
///
/// 不受时长上限影响。
pub async fn youtube_audio(state: &AppState, text: &str) -> Result<ParseResult, String> {
    audio_for(state, PlatformId::Youtube, text).await
}

async fn audio_for(
    state: &AppState,
    platform: PlatformId,
    text: &str,
) -> Result<ParseResult, String> {
    tracing::info!(platform = %platform, "Audio command called");

    let mention = state
        .dispatcher
        .detect(text)
        .into_iter()
        .find(|m| m.platform == platform)
        .ok_or_else(|| format!("未识别到{}链接", platform.display_name()))?;

    state
        .dispatcher
        .parse_mention(&mention, AssetFilter::AudioOnly)
        .await
        .map_err(|e| format!("{}音频解析失败: {}", platform.display_name(), e))
}
