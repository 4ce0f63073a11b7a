//! # 域名允许列表模块
//!
//! ## 设计思路
//!
//! 这是公开代理端点与任意外发请求之间唯一的安全边界：
//! 只有命中允许列表的主机名才允许取源，防止端点被当作开放中继 / SSRF 跳板。
//!
//! ## 实现思路
//!
//! - 条目在进程启动时加载一次，运行期不可变。
//! - 匹配规则：主机名与条目完全相等，或以 `"." + 条目` 结尾（大小写敏感）。
//! - 协议限定 http/https；端口不参与匹配。

use super::ProxyError;

/// 静态域名允许列表。
///
/// 条目既可以是完整主机名（`avatars.githubusercontent.com`），
/// 也可以是裸后缀（`unsplash.com` 会放行所有子域）。
#[derive(Debug, Clone)]
pub struct DomainAllowlist {
    entries: Vec<String>,
}

impl DomainAllowlist {
    /// 使用显式条目构建列表。
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// 内置默认条目，用于未提供配置文件的场景。
    pub fn default_entries() -> Vec<String> {
        [
            "avatars.githubusercontent.com",
            "raw.githubusercontent.com",
            "images.unsplash.com",
            "i.imgur.com",
            "cdn.jsdelivr.net",
            "gravatar.com",
            "wikimedia.org",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    /// 判断单个主机名是否命中列表。
    pub fn is_allowed_host(&self, host: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| host == entry || host.ends_with(&format!(".{entry}")))
    }

    /// 校验完整 URL：解析 → 协议限定 → 主机匹配。
    ///
    /// 解析失败归入 `MalformedUrl`（对外 500），域名未放行归入
    /// `DomainNotAllowed`（对外 403）。
    ///
    /// # 示例
    /// ```rust
    /// use image_relay::proxy::DomainAllowlist;
    ///
    /// let allowlist = DomainAllowlist::new(vec!["example.com".to_string()]);
    /// assert!(allowlist.validate_url("https://img.example.com/a.png").is_ok());
    /// assert!(allowlist.validate_url("https://evil.example").is_err());
    /// ```
    pub fn validate_url(&self, url: &str) -> Result<reqwest::Url, ProxyError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ProxyError::MalformedUrl(format!("URL 解析失败：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ProxyError::MalformedUrl(format!(
                "仅支持 HTTP/HTTPS，实际为：{}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ProxyError::MalformedUrl("URL 缺少主机地址".to_string()))?;

        if !self.is_allowed_host(host) {
            return Err(ProxyError::DomainNotAllowed(host.to_string()));
        }

        Ok(parsed)
    }

    /// 条目数量，用于启动日志。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DomainAllowlist {
    fn default() -> Self {
        Self::new(Self::default_entries())
    }
}
