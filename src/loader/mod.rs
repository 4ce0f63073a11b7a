//! # 图片加载模块（loader）
//!
//! ## 设计思路
//!
//! 该模块实现客户端侧的多来源图片加载：把“已下载副本 → 原始 URL →
//! 占位图”解析成回退链，按瞬时/致命分类决定重试或推进，最终保证
//! 任何输入都终止在成功态（最差也是占位图）。
//!
//! - `chain`：回退链解析，含代理包装与低/高保真 URL 推导
//! - `retry`：纯函数重试决策与指数退避
//! - `orchestrator`：任务编排、代数取消、并发闸门、质量升级
//! - `cache`：URL → 字节的 LRU 缓存
//! - `placeholder`：按类型提示生成内联 SVG 占位图
//! - `config/error`：配置与失败分类模型
//!
//! ## 实现思路
//!
//! 决策逻辑（链解析、重试决策）全部是纯函数，IO 集中在编排器，
//! 便于对失败路径做穷举测试。
//!
//! ## 新同事快速上手
//!
//! ```text
//! ImageLoader::load(LoadRequest)
//!    ↓
//! chain.rs（解析候选链，链尾恒为占位图）
//!    ↓
//! orchestrator.rs（逐候选尝试，watch 推送状态）
//!    ├─ retry.rs（失败 → 退避重试 / 推进候选）
//!    ├─ cache.rs（成功字节 LRU 缓存）
//!    └─ placeholder.rs（保底内联 SVG）
//!    ↓
//! Success（Downloaded / Original / Placeholder 之一）
//! ```

mod cache;
mod chain;
mod config;
mod error;
mod orchestrator;
mod placeholder;
mod retry;

pub use cache::ImageByteCache;
pub use chain::{resolve_chain, Candidate, CandidateKind, LoadRequest};
pub use config::LoadConfig;
pub use error::{FailureClass, LoadError};
pub use orchestrator::{ImageLoadResult, ImageLoader, LoadHandle, LoadStatus};
pub use placeholder::{placeholder_data_url, ImageTypeHint};
pub use retry::{backoff_delay, next_step, AttemptOutcome, ChainPosition, ChainStep};
