//! 统一配置中心
//!
//! 提供应用的全局配置管理：默认值 -> 可选的 YAML 文件 ->
//! `CHAT_` 前缀的环境变量，逐层覆盖。

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 默认配置文件路径。
pub const CONFIG_FILE: &str = "chat-server.yaml";

#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(#[from] figment::Error);

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 监听地址
    pub server: ServerConfig,
    /// 持久化网关；`url` 缺省时退化为进程内存储
    pub database: DatabaseConfig,
    /// 连接网关调参
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// 调度任务命令队列容量
    pub command_capacity: usize,
    /// 历史查询的默认分页大小
    pub history_page_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
            },
            gateway: GatewayConfig {
                command_capacity: 256,
                history_page_limit: 50,
            },
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值、工作目录下的 YAML 文件、环境变量。
    ///
    /// 环境变量使用双下划线分隔层级，例如 `CHAT_SERVER__PORT=9000`。
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::figment().extract()?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Env::prefixed("CHAT_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_standalone() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.url.is_none());
        assert_eq!(config.gateway.history_page_limit, 50);
    }

    #[test]
    fn yaml_overlay_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(
            Yaml::string("server:\n  port: 9000\ndatabase:\n  url: postgres://localhost/chat\n"),
        );
        let config: AppConfig = figment.extract().expect("extract");
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/chat")
        );
        // 未覆盖的字段保留默认值
        assert_eq!(config.gateway.command_capacity, 256);
    }
}
