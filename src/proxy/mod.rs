//! # 图片代理模块（proxy）
//!
//! ## 设计思路
//!
//! 该模块将“参数解析 → 域名校验 → 取源 → 转码 → 缓存头 → HTTP 暴露”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `routes`：仅做 HTTP 入参/出参适配（薄封装）
//! - `handler`：编排整条代理流水线
//! - `allowlist`：域名允许列表，唯一的出站安全边界
//! - `fetcher`：负责取源下载与流式体积/签名校验
//! - `transcoder`：负责解码、像素限制、缩放与编码
//! - `cache_headers`：负责 Cache-Control / ETag / 诊断头推导
//! - `config/error/request`：配置、错误、请求参数模型
//!
//! ## 实现思路
//!
//! 对外仅暴露必要类型与路由构造函数，内部细节保持 `mod` 私有。
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! GET /image
//!    ↓
//! routes.rs（参数适配 + 固定错误形态）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ allowlist.rs（域名校验，防开放中继/SSRF）
//!    ├─ fetcher.rs（取源 + 体积/签名校验 + 短缓存）
//!    ├─ transcoder.rs（解码 + 限制 + 缩放 + 编码）
//!    └─ cache_headers.rs（缓存与诊断头）
//!    ↓
//! 200 图片字节 / 400·403·500 固定 JSON
//! ```

mod allowlist;
mod cache_headers;
mod config;
mod error;
mod fetcher;
mod handler;
pub mod request;
mod routes;
mod transcoder;

pub use allowlist::DomainAllowlist;
pub use cache_headers::{
    build_cache_metadata, CacheMetadata, CACHE_CONTROL_VALUE, HEADER_IMAGE_QUALITY,
    HEADER_IMAGE_SIZE, HEADER_ORIGINAL_SIZE,
};
pub use config::ProxyConfig;
pub use error::ProxyError;
pub use handler::{ProxyHandler, ProxyOutcome};
pub use request::{ImageQuality, ImageRequest, ImageSize, OutputFormat};
pub use routes::{router, ImageQuery};
pub use transcoder::TranscodeResult;
