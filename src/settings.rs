//! # 服务设置模块
//!
//! ## 设计思路
//!
//! 部署侧只需要改两类东西：监听地址与域名允许列表。
//! 其余代理参数有经过验证的默认值，通过代码内 `ProxyConfig` 调整。
//!
//! ## 实现思路
//!
//! - 设置文件为 JSON，路径由 `IMAGE_RELAY_CONFIG` 环境变量指定。
//! - 未设置环境变量或文件不存在时回退默认值，保证零配置可启动。
//! - 字段逐个带 `serde(default)`，旧配置文件升级后无需补字段。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::proxy::DomainAllowlist;

/// 设置文件路径的环境变量名。
pub const CONFIG_ENV_VAR: &str = "IMAGE_RELAY_CONFIG";

/// 服务级设置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// HTTP 监听地址。
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// 允许取源的域名列表（含子域）。
    #[serde(default = "DomainAllowlist::default_entries")]
    pub allowed_domains: Vec<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:9800".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_domains: DomainAllowlist::default_entries(),
        }
    }
}

impl ServerSettings {
    /// 按环境变量定位并加载设置，未配置时使用默认值。
    pub fn load() -> Result<Self, AppError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => {
                log::info!("🧩 未设置 {CONFIG_ENV_VAR}，使用默认设置");
                Ok(Self::default())
            }
        }
    }

    /// 从指定 JSON 文件加载设置。
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::Settings(format!(
                "设置文件不存在: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)
            .map_err(|e| AppError::Settings(format!("解析设置文件失败: {e}")))?;

        if settings.allowed_domains.is_empty() {
            return Err(AppError::Settings(
                "allowed_domains 不能为空".to_string(),
            ));
        }

        Ok(settings)
    }

    /// 构造域名允许列表。
    pub fn allowlist(&self) -> DomainAllowlist {
        DomainAllowlist::new(self.allowed_domains.clone())
    }
}
