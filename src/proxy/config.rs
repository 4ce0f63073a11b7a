//! # 代理配置模块
//!
//! ## 设计思路
//!
//! 将代理链路的所有“可调策略”集中到 `ProxyConfig`，保证运行时行为可观测、
//! 可调整、可测试。单次请求使用同一配置快照，避免处理中途配置漂移。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置（取源 15 秒硬超时）。
//! - 范围校验集中在 `validate`，非法组合在启动阶段即失败。

use image::imageops::FilterType;

use super::ProxyError;

/// 代理链路配置。
///
/// 字段覆盖取源、解码与转码三个阶段。
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// 取源总超时（秒），超过即判定 `UpstreamTimeout`。
    pub fetch_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 源图允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 缩放滤镜策略（高质量重采样）。
    pub resize_filter: FilterType,
    /// 模糊半径（缩放后应用）。
    pub blur_sigma: f32,
    /// 取源结果短缓存的存活时间（秒），吸收突发重复请求。
    pub download_cache_ttl_secs: u64,
    /// 取源结果短缓存的最大条目数。
    pub download_cache_max_entries: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: 15,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            resize_filter: FilterType::Lanczos3,
            blur_sigma: 8.0,
            download_cache_ttl_secs: 25,
            download_cache_max_entries: 24,
        }
    }
}

impl ProxyConfig {
    /// 校验配置组合是否可用。
    ///
    /// 在启动阶段调用，拒绝明显不合理的取值。
    pub fn validate(&self) -> Result<(), ProxyError> {
        if !(1..=120).contains(&self.fetch_timeout) {
            return Err(ProxyError::ResourceLimit(
                "fetch_timeout 必须在 1~120 秒之间".to_string(),
            ));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ProxyError::ResourceLimit(
                "connect_timeout 必须在 1~120 秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(ProxyError::ResourceLimit(
                "stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(ProxyError::ResourceLimit(
                "stream_chunk_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if self.max_file_size < 64 * 1024 {
            return Err(ProxyError::ResourceLimit(
                "max_file_size 不能小于 64KB".to_string(),
            ));
        }
        if self.max_decoded_bytes < 8 * 1024 * 1024 {
            return Err(ProxyError::ResourceLimit(
                "max_decoded_bytes 不能小于 8MB".to_string(),
            ));
        }
        if self.download_cache_max_entries == 0 {
            return Err(ProxyError::ResourceLimit(
                "download_cache_max_entries 不能为 0".to_string(),
            ));
        }

        Ok(())
    }
}
