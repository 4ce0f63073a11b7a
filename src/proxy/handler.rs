//! # 代理编排模块
//!
//! ## 设计思路
//!
//! `ProxyHandler` 只负责流程编排与配置管理，不直接与 HTTP 框架绑定。
//! 单次请求链路固定为：
//! 1. 读取配置快照
//! 2. 允许列表校验
//! 3. 取源
//! 4. 转码并生成缓存元数据
//!
//! 编排器跨请求无状态，也不做任何重试——重试是客户端加载器的职责，
//! 只有客户端才知道还有哪些候选来源可以切换。
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ProxyConfig>>` 支持运行时调整。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `fetch/transcode/total` 阶段耗时，便于性能诊断。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use super::cache_headers::{build_cache_metadata, CacheMetadata};
use super::transcoder::TranscodeResult;
use super::{DomainAllowlist, ImageRequest, ProxyConfig, ProxyError};

/// 代理处理器。
///
/// 封装允许列表、配置状态与取源短缓存，并编排各子模块实现完整流程。
pub struct ProxyHandler {
    pub(super) allowlist: DomainAllowlist,
    pub(super) config: Arc<RwLock<ProxyConfig>>,
    pub(super) download_cache: Arc<Mutex<HashMap<String, CachedOriginBytes>>>,
}

pub(super) struct CachedOriginBytes {
    pub(super) created_at: Instant,
    pub(super) bytes: Vec<u8>,
}

/// 单次代理请求的完整产物：转码结果 + 缓存元数据。
pub struct ProxyOutcome {
    pub result: TranscodeResult,
    pub metadata: CacheMetadata,
}

impl ProxyHandler {
    /// 根据允许列表与初始配置创建处理器。
    ///
    /// # 示例
    /// ```rust
    /// use image_relay::proxy::{DomainAllowlist, ProxyConfig, ProxyHandler};
    ///
    /// let handler = ProxyHandler::new(DomainAllowlist::default(), ProxyConfig::default())?;
    /// # Ok::<(), image_relay::proxy::ProxyError>(())
    /// ```
    pub fn new(allowlist: DomainAllowlist, config: ProxyConfig) -> Result<Self, ProxyError> {
        config.validate()?;

        Ok(Self {
            allowlist,
            config: Arc::new(RwLock::new(config)),
            download_cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub(super) fn config_snapshot(&self) -> Result<ProxyConfig, ProxyError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ProxyError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 处理主入口：校验 → 取源 → 转码 → 元数据。
    ///
    /// 任一阶段失败即短路返回，由路由层映射为固定 HTTP 形态。
    pub async fn handle(&self, request: &ImageRequest) -> Result<ProxyOutcome, ProxyError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let url = self.allowlist.validate_url(&request.origin_url)?;

        let fetch_start = Instant::now();
        let fetched = self.fetch_origin(&url, &config).await?;
        let fetch_elapsed = fetch_start.elapsed();

        let transcode_start = Instant::now();
        let result = self.transcode(&fetched.bytes, request, &config)?;
        let transcode_elapsed = transcode_start.elapsed();

        let metadata = build_cache_metadata(&result);

        log::info!(
            "✅ 代理完成 - fetch={}ms transcode={}ms total={}ms 输出={}KB",
            fetch_elapsed.as_millis(),
            transcode_elapsed.as_millis(),
            total_start.elapsed().as_millis(),
            result.byte_length() / 1024
        );

        Ok(ProxyOutcome { result, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denied_domain_fails_before_any_fetch() {
        let handler = ProxyHandler::new(
            DomainAllowlist::new(vec!["example.com".to_string()]),
            ProxyConfig::default(),
        )
        .expect("handler init failed");

        let request = ImageRequest::from_query(
            Some("https://blocked-domain.com/x.jpg".to_string()),
            None,
            None,
            None,
            None,
        )
        .expect("request should build");

        let result = handler.handle(&request).await;
        assert!(matches!(result, Err(ProxyError::DomainNotAllowed(_))));
    }

    #[tokio::test]
    async fn malformed_url_fails_validation() {
        let handler = ProxyHandler::new(DomainAllowlist::default(), ProxyConfig::default())
            .expect("handler init failed");

        let request = ImageRequest::from_query(
            Some("not-a-valid-url".to_string()),
            None,
            None,
            None,
            None,
        )
        .expect("request should build");

        let result = handler.handle(&request).await;
        assert!(matches!(result, Err(ProxyError::MalformedUrl(_))));
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = ProxyConfig::default();
        config.fetch_timeout = 0;

        let result = ProxyHandler::new(DomainAllowlist::default(), config);
        assert!(matches!(result, Err(ProxyError::ResourceLimit(_))));
    }
}
