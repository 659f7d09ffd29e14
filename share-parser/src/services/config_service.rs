use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{ConfigError, ParserConfig};

/// 会话白名单对应的配置键
const ENABLED_SESSIONS_KEY: &str = "PARSER_ENABLED_SESSIONS";

/// 配置服务
///
/// 配置来源为进程环境变量与 `.env` 文件,环境变量优先。
/// 写回时只更新目标字段,保留文件中的注释与其他配置项。
pub struct ConfigService {
    env_path: PathBuf,
}

impl ConfigService {
    pub fn new(env_path: PathBuf) -> Self {
        Self { env_path }
    }

    /// 查找 `.env` 文件
    ///
    /// 查找顺序:
    /// 1. 当前工作目录的 .env
    /// 2. 上层目录 (在 share-parser/ 内执行的情况)
    ///
    /// 都不存在时使用当前目录,首次写入时创建。
    pub fn discover() -> Result<Self, ConfigError> {
        let cwd = env::current_dir()
            .map_err(|e| ConfigError::IoError(format!("无法获取当前目录: {}", e)))?;

        let env_path = cwd.join(".env");
        if env_path.exists() {
            return Ok(Self::new(env_path));
        }

        if let Some(parent) = cwd.parent() {
            let parent_env = parent.join(".env");
            if parent_env.exists() {
                return Ok(Self::new(parent_env));
            }
        }

        Ok(Self::new(env_path))
    }

    pub fn env_path(&self) -> &Path {
        &self.env_path
    }

    /// 读取 `.env` 文件中的变量,文件不存在时为空
    fn file_vars(&self) -> Result<HashMap<String, String>, ConfigError> {
        if !self.env_path.exists() {
            return Ok(HashMap::new());
        }
        let iter = dotenvy::from_path_iter(&self.env_path)
            .map_err(|e| ConfigError::IoError(format!("无法读取 {}: {}", self.env_path.display(), e)))?;
        iter.map(|item| {
            item.map_err(|e| ConfigError::IoError(format!("{} 格式错误: {}", self.env_path.display(), e)))
        })
        .collect()
    }

    /// 加载配置
    ///
    /// # 错误
    /// - `ConfigError::IoError`: `.env` 无法读取或格式错误
    /// - `ConfigError::InvalidValue`: 配置值无效
    pub fn load(&self) -> Result<ParserConfig, ConfigError> {
        let mut vars = self.file_vars()?;
        vars.extend(env::vars().filter(|(k, _)| k.starts_with("PARSER_")));
        let config = ParserConfig::from_vars(&vars)?;

        tracing::info!(
            path = %self.env_path.display(),
            config = %config.summary_for_logging(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// 保存会话白名单
    ///
    /// 仅改写 `PARSER_ENABLED_SESSIONS` 一行,其他内容保持不变。
    pub fn save_enabled_sessions(&self, sessions: &[String]) -> Result<(), ConfigError> {
        let original_content = if self.env_path.exists() {
            fs::read_to_string(&self.env_path)?
        } else {
            String::new()
        };

        let mut updated_vars = HashMap::new();
        updated_vars.insert(ENABLED_SESSIONS_KEY.to_string(), sessions.join(","));

        let new_content = Self::serialize_env_content(&original_content, &updated_vars);
        fs::write(&self.env_path, new_content)?;

        tracing::info!(
            path = %self.env_path.display(),
            sessions = sessions.len(),
            "Enabled sessions saved"
        );
        Ok(())
    }

    /// 更新 `.env` 内容
    ///
    /// 保留原有的注释和空行,仅更新指定的配置项,不存在的追加到末尾
    fn serialize_env_content(
        original_content: &str,
        updated_vars: &HashMap<String, String>,
    ) -> String {
        let mut result = String::new();
        let mut pending: Vec<&String> = updated_vars.keys().collect();
        pending.sort();

        for line in original_content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                result.push_str(line);
                result.push('\n');
                continue;
            }

            if let Some((key, _)) = trimmed.split_once('=') {
                let key = key.trim();
                if let Some(new_value) = updated_vars.get(key) {
                    result.push_str(&format!("{}={}\n", key, new_value));
                    pending.retain(|k| k.as_str() != key);
                    continue;
                }
            }

            result.push_str(line);
            result.push('\n');
        }

        for key in pending {
            if let Some(value) = updated_vars.get(key) {
                result.push_str(&format!("{}={}\n", key, value));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformId;
    use std::time::Duration;

    #[test]
    fn test_serialize_env_content_update_existing() {
        let original = r#"# 解析配置
PARSER_ENABLED_SESSIONS=group_1
PARSER_DEBOUNCE_SECS=30

# 其他配置
RUST_LOG=info
"#;

        let mut updated = HashMap::new();
        updated.insert(ENABLED_SESSIONS_KEY.to_string(), "group_1,group_2".to_string());

        let result = ConfigService::serialize_env_content(original, &updated);

        assert!(result.contains("PARSER_ENABLED_SESSIONS=group_1,group_2\n"));
        assert!(result.contains("PARSER_DEBOUNCE_SECS=30"));
        assert!(result.contains("# 解析配置"));
        assert!(result.contains("RUST_LOG=info"));
        assert_eq!(result.matches("PARSER_ENABLED_SESSIONS").count(), 1);
    }

    #[test]
    fn test_serialize_env_content_add_new() {
        let original = "# 配置\nRUST_LOG=info\n";

        let mut updated = HashMap::new();
        updated.insert(ENABLED_SESSIONS_KEY.to_string(), "group_1".to_string());

        let result = ConfigService::serialize_env_content(original, &updated);
        assert_eq!(result, "# 配置\nRUST_LOG=info\nPARSER_ENABLED_SESSIONS=group_1\n");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "# 测试\nPARSER_DEBOUNCE_SECS=15\nPARSER_DOUYIN_ENABLED=false\nPARSER_BILIBILI_COOKIES=\"SESSDATA=abc; bili_jct=def\"\n",
        )
        .unwrap();

        let config = ConfigService::new(path).load().unwrap();
        assert_eq!(config.debounce_interval, Duration::from_secs(15));
        assert!(!config.is_enabled(&PlatformId::Douyin));
        assert_eq!(
            config.cookies_for(&PlatformId::Bilibili),
            Some("SESSDATA=abc; bili_jct=def")
        );
    }

    #[test]
    fn test_save_then_load_enabled_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let service = ConfigService::new(dir.path().join(".env"));

        service
            .save_enabled_sessions(&["group_1".to_string(), "private_9".to_string()])
            .unwrap();
        let config = service.load().unwrap();
        assert_eq!(config.enabled_sessions, vec!["group_1", "private_9"]);

        service.save_enabled_sessions(&[]).unwrap();
        let config = service.load().unwrap();
        assert!(config.enabled_sessions.is_empty());
    }
}
