//! # 加载配置模块
//!
//! ## 设计思路
//!
//! 将客户端加载链路的所有“可调策略”集中到 `LoadConfig`。
//! 每个编排器实例在启动时取一份快照，运行期修改只影响后续加载。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置（3 次重试，1 秒基础退避）。
//! - 范围校验集中在 `validate`，非法组合在构造加载器时即失败。

use super::LoadError;

/// 客户端加载配置。
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// 是否在低保真候选成功后，后台尝试高保真升级。
    pub enable_quality_upgrade: bool,
    /// 是否对瞬时失败执行退避重试；关闭后每个候选只尝试一次。
    pub enable_smart_retry: bool,
    /// 单个候选允许的最大尝试次数。
    pub max_retries: u32,
    /// 退避基础延迟（毫秒），第 n 次重试前等待 `base × 2^(n-1)`。
    pub base_delay_ms: u64,
    /// 全局并发加载上限。
    pub max_concurrent_loads: usize,
    /// 省流量信号：收紧并发并跳过质量升级。
    pub data_saver: bool,
    /// 代理端点基地址（如 `http://host/image`）；为空则直连候选 URL。
    pub proxy_base: Option<String>,
    /// 单次尝试的硬超时（毫秒）。
    pub attempt_timeout_ms: u64,
    /// 字节缓存容量（条目数）。
    pub cache_capacity: usize,
    /// 慢网络判定阈值：近期平均加载耗时超过该值（毫秒）则收紧并发。
    pub slow_network_threshold_ms: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            enable_quality_upgrade: true,
            enable_smart_retry: true,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_concurrent_loads: 6,
            data_saver: false,
            proxy_base: None,
            attempt_timeout_ms: 10_000,
            cache_capacity: 64,
            slow_network_threshold_ms: 2_500,
        }
    }
}

impl LoadConfig {
    /// 校验配置组合是否可用。
    pub fn validate(&self) -> Result<(), LoadError> {
        if !(1..=10).contains(&self.max_retries) {
            return Err(LoadError::InvalidConfig(
                "max_retries 必须在 1~10 之间".to_string(),
            ));
        }
        if !(10..=60_000).contains(&self.base_delay_ms) {
            return Err(LoadError::InvalidConfig(
                "base_delay_ms 必须在 10~60000 毫秒之间".to_string(),
            ));
        }
        if !(1..=64).contains(&self.max_concurrent_loads) {
            return Err(LoadError::InvalidConfig(
                "max_concurrent_loads 必须在 1~64 之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.attempt_timeout_ms) {
            return Err(LoadError::InvalidConfig(
                "attempt_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(LoadError::InvalidConfig(
                "cache_capacity 不能为 0".to_string(),
            ));
        }

        Ok(())
    }

    /// 实际生效的单候选最大尝试次数。
    ///
    /// 关闭智能重试时退化为单次尝试。
    pub fn effective_max_retries(&self) -> u32 {
        if self.enable_smart_retry {
            self.max_retries
        } else {
            1
        }
    }
}
