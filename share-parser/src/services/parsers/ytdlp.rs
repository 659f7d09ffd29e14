//! yt-dlp 元数据提取
//!
//! YouTube、TikTok 与 Instagram 不直接对接平台接口,而是调用 `yt-dlp -J` 读取元数据与直链。

use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;

use crate::models::{ApiError, ParserConfig, PlatformId, RawExtraction, RawStream};

/// yt-dlp 输出的单个格式
#[derive(Debug, Clone, Deserialize)]
pub struct YtFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    /// 音频码率 kbps
    #[serde(default)]
    pub abr: Option<f64>,
    /// 总码率 kbps
    #[serde(default)]
    pub tbr: Option<f64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl YtFormat {
    fn has(codec: &Option<String>) -> bool {
        codec.as_deref().is_some_and(|c| c != "none")
    }

    pub fn has_video(&self) -> bool {
        Self::has(&self.vcodec)
    }

    pub fn has_audio(&self) -> bool {
        Self::has(&self.acodec)
    }

    /// HLS/DASH 清单不是可直接下载的文件
    fn is_direct(&self) -> bool {
        self.url.is_some()
            && !self
                .protocol
                .as_deref()
                .is_some_and(|p| p.contains("m3u8") || p.contains("dash"))
    }
}

/// `yt-dlp -J` 输出
#[derive(Debug, Clone, Deserialize)]
pub struct YtVideoInfo {
    pub id: String,
    /// 没有 `formats` 的条目直接给出媒体地址
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub formats: Vec<YtFormat>,
}

impl YtVideoInfo {
    pub fn duration_secs(&self) -> u64 {
        self.duration.map_or(0, |d| d.max(0.0).round() as u64)
    }

    /// 同时含音视频的最高画质直链
    pub fn best_muxed(&self) -> Option<&YtFormat> {
        self.formats
            .iter()
            .filter(|f| f.is_direct() && f.has_video() && f.has_audio())
            .max_by_key(|f| (f.height.unwrap_or(0), f.tbr.unwrap_or(0.0) as u64))
    }

    /// 纯视频直链,优先 H.264,其次分辨率与码率
    pub fn best_video_only(&self) -> Option<&YtFormat> {
        self.formats
            .iter()
            .filter(|f| f.is_direct() && f.has_video() && !f.has_audio())
            .max_by_key(|f| {
                let avc = f
                    .vcodec
                    .as_deref()
                    .is_some_and(|c| c.contains("avc") || c.contains("h264"));
                (avc, f.height.unwrap_or(0), f.tbr.unwrap_or(0.0) as u64)
            })
    }

    /// 条目自身的视频地址 (没有格式列表时)
    pub fn direct_video_url(&self) -> Option<&str> {
        let url = self.url.as_deref().filter(|u| !u.is_empty())?;
        let has_video = self.vcodec.as_deref().is_some_and(|c| c != "none");
        let video_ext = self
            .ext
            .as_deref()
            .is_some_and(|e| matches!(e.to_lowercase().as_str(), "mp4" | "m4v" | "webm"));
        let video_path = [".mp4", ".m4v", ".webm"].iter().any(|e| url.contains(e));
        (has_video || video_ext || video_path).then_some(url)
    }

    /// 最高码率的纯音频直链
    pub fn best_audio(&self) -> Option<&YtFormat> {
        self.formats
            .iter()
            .filter(|f| f.is_direct() && f.has_audio() && !f.has_video())
            .max_by_key(|f| f.abr.or(f.tbr).unwrap_or(0.0) as u64)
    }

    /// 元数据部分 (不含媒体流)
    pub fn base_extraction(&self) -> RawExtraction {
        let mut raw = RawExtraction::new()
            .with_title(self.title.clone())
            .with_duration(self.duration_secs());
        if let Some(author) = self.channel.as_ref().or(self.uploader.as_ref()) {
            raw = raw.with_author(author.clone());
        }
        if let Some(thumbnail) = &self.thumbnail {
            raw = raw.with_cover(thumbnail.clone());
        }
        if let Some(ts) = self.timestamp {
            raw = raw.with_timestamp(ts);
        }
        if let Some(desc) = self.description.as_ref().filter(|d| !d.trim().is_empty()) {
            raw = raw.with_text(desc.clone());
        }
        raw
    }
}

/// `yt-dlp -J` 的播放列表输出 (如 Instagram 多图帖子)
#[derive(Debug, Clone, Deserialize)]
pub struct YtPlaylist {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    pub entries: Vec<YtVideoInfo>,
}

/// 单个视频或播放列表
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum YtOutput {
    Playlist(YtPlaylist),
    Single(YtVideoInfo),
}

impl YtOutput {
    /// 展开为条目列表,播放列表的标题与作者补到缺失的条目上
    pub fn into_entries(self) -> Vec<YtVideoInfo> {
        match self {
            YtOutput::Single(info) => vec![info],
            YtOutput::Playlist(playlist) => playlist
                .entries
                .into_iter()
                .map(|mut entry| {
                    if entry.title.is_empty() {
                        entry.title = playlist.title.clone().unwrap_or_default();
                    }
                    if entry.uploader.is_none() {
                        entry.uploader = playlist.uploader.clone();
                    }
                    entry
                })
                .collect(),
        }
    }
}

/// 纯音频格式转换为音频流
pub fn audio_stream(format: &YtFormat) -> Option<RawStream> {
    let mut stream = RawStream::new(format.url.clone()?);
    if let Some(codec) = &format.acodec {
        stream = stream.with_codec(codec.clone());
    }
    if let Some(size) = format.filesize {
        stream = stream.with_size(size);
    }
    Some(stream)
}

/// 音视频合一格式转换为视频流
pub fn video_stream(format: &YtFormat) -> Option<RawStream> {
    let mut stream = RawStream::new(format.url.clone()?);
    if let Some(height) = format.height {
        stream = stream.with_quality(format!("{}p", height));
    }
    if let Some(codec) = &format.vcodec {
        stream = stream.with_codec(codec.clone());
    }
    if let Some(size) = format.filesize {
        stream = stream.with_size(size);
    }
    Some(stream)
}

/// yt-dlp 调用器
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: Option<PathBuf>,
    cookies_file: Option<PathBuf>,
    proxy: Option<String>,
    playlist: bool,
}

impl YtDlp {
    /// 根据配置定位 yt-dlp
    ///
    /// 配置未指定路径时在 `PATH` 中查找;找不到时不报错,调用时才返回错误。
    pub fn new(config: &ParserConfig, platform: &PlatformId) -> Self {
        let binary = config
            .ytdlp_path
            .clone()
            .or_else(|| which::which("yt-dlp").ok());
        if binary.is_none() {
            tracing::warn!(platform = %platform, "yt-dlp not found, extraction will fail");
        }

        let cookies_file = match platform {
            PlatformId::Youtube => config.youtube_cookies_file.clone(),
            PlatformId::Instagram => config.instagram_cookies_file.clone(),
            _ => None,
        };

        Self {
            binary,
            cookies_file,
            proxy: config.proxy_for(platform).map(str::to_string),
            playlist: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn without_binary() -> Self {
        Self {
            binary: None,
            cookies_file: None,
            proxy: None,
            playlist: false,
        }
    }

    /// 允许输出播放列表 (构建器模式)
    pub fn with_playlist(mut self, playlist: bool) -> Self {
        self.playlist = playlist;
        self
    }

    /// 指定可执行文件 (构建器模式)
    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = Some(binary);
        self
    }

    /// 构造命令行参数
    fn args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            "--no-warnings".to_string(),
            if self.playlist { "--yes-playlist" } else { "--no-playlist" }.to_string(),
        ];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args.push(url.to_string());
        args
    }

    /// 读取视频元数据
    ///
    /// # 错误
    /// - `ApiError::CommandFailed`: 找不到 yt-dlp、进程启动失败或非零退出
    /// - `ApiError::JsonParseFailed`: 输出不是预期的JSON
    pub async fn extract_info(&self, url: &str) -> Result<YtVideoInfo, ApiError> {
        let stdout = self.run(url).await?;
        serde_json::from_slice(&stdout).map_err(|e| {
            tracing::error!(url = %url, error = %e, "Failed to parse yt-dlp output");
            ApiError::JsonParseFailed(e.to_string())
        })
    }

    /// 读取元数据,播放列表展开为条目
    ///
    /// # 错误
    /// 与 `extract_info` 相同
    pub async fn extract_entries(&self, url: &str) -> Result<Vec<YtVideoInfo>, ApiError> {
        let stdout = self.run(url).await?;
        let output: YtOutput = serde_json::from_slice(&stdout).map_err(|e| {
            tracing::error!(url = %url, error = %e, "Failed to parse yt-dlp output");
            ApiError::JsonParseFailed(e.to_string())
        })?;
        Ok(output.into_entries())
    }

    async fn run(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| ApiError::CommandFailed("未找到 yt-dlp 可执行文件".to_string()))?;

        let output = Command::new(binary)
            .args(self.args(url))
            .output()
            .await
            .map_err(|e| {
                tracing::error!(binary = %binary.display(), error = %e, "Failed to execute yt-dlp");
                ApiError::CommandFailed(format!("yt-dlp 启动失败: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(url = %url, stderr = %stderr, "yt-dlp exited with failure");
            let message = stderr.lines().last().unwrap_or("unknown error").to_string();
            if message.contains("Private video") || message.contains("unavailable") {
                return Err(ApiError::ContentUnavailable(message));
            }
            return Err(ApiError::CommandFailed(message));
        }
        Ok(output.stdout)
    }
}
