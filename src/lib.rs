//! # 图片中继服务 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        调用方                             │
//! │                                                          │
//! │  页面组件 ──→ loader::ImageLoader（回退链 + 重试 + 升级）  │
//! │                      │                                   │
//! │                      ↓ GET /image?url=…&size=…&quality=… │
//! └──────────────────────┼───────────────────────────────────┘
//!                        ↕ HTTP
//! ┌──────────────────────┼───────────────────────────────────┐
//! │                      ↓      服务端 (Rust)                 │
//! │                                                          │
//! │  ┌─ error ────── AppError（入口级统一错误）               │
//! │  │                                                       │
//! │  ├─ proxy ────── 域名校验 → 取源 → 转码 → 缓存头          │
//! │  │   ├─ allowlist    出站安全边界                         │
//! │  │   ├─ fetcher      流式下载 + 体积/签名校验             │
//! │  │   ├─ transcoder   解码·缩放·模糊·编码                  │
//! │  │   └─ cache_headers  Cache-Control / ETag / 诊断头      │
//! │  │                                                       │
//! │  ├─ loader ───── 多来源回退链、退避重试、质量升级          │
//! │  │   ├─ chain / retry  纯函数决策                         │
//! │  │   ├─ cache          URL → 字节 LRU                    │
//! │  │   └─ placeholder    保底内联 SVG                      │
//! │  │                                                       │
//! │  └─ settings ─── 监听地址 + 域名允许列表（JSON 文件）      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 入口级统一错误类型 `AppError` |
//! | [`proxy`] | 服务端图片代理：校验、取源、转码、缓存头、HTTP 路由 |
//! | [`loader`] | 客户端加载编排：回退链、重试决策、字节缓存、占位图 |
//! | [`settings`] | 服务设置的加载与校验 |

pub mod error;
pub mod loader;
pub mod proxy;
pub mod settings;
