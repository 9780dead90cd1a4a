//! 配置管理
//!
//! 支持 TOML 配置文件与 `LIS_` 前缀环境变量覆盖。

use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

/// LIS系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LisConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 报警派发配置
    pub dispatch: DispatchSettings,
    /// 统计配置
    pub stats: StatsConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 检验项目目录种子文件，可选
    pub catalog_file: Option<String>,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 报警派发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// 单条报警最大投递尝试次数，耗尽后升级
    pub max_attempts: u32,
    /// 首次重试退避，毫秒，之后按指数增长
    pub initial_backoff_ms: u64,
    /// 单次投递尝试的超时，毫秒，超时按失败计
    pub attempt_timeout_ms: u64,
}

/// 统计配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// "今日"边界使用的固定UTC偏移，分钟
    pub utc_offset_minutes: i32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
}

impl Default for LisConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            dispatch: DispatchSettings::default(),
            stats: StatsConfig::default(),
            logging: LoggingConfig::default(),
            catalog_file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            attempt_timeout_ms: 2000,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LisConfig {
    /// 加载配置
    ///
    /// 配置文件可选，环境变量 (LIS_*) 始终生效并覆盖文件内容。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("LIS").separator("_"))
            .build()?;

        let config: LisConfig = settings.try_deserialize()?;

        if let Some(path) = config_path {
            info!(path = %path, "配置加载完成");
        } else {
            info!("未指定配置文件，使用默认配置");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LisConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.dispatch.max_attempts, 5);
        assert_eq!(config.stats.utc_offset_minutes, 0);
        assert_eq!(config.logging.level, "info");
        assert!(config.catalog_file.is_none());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = LisConfig::load(None).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.dispatch.initial_backoff_ms, 200);
    }
}
