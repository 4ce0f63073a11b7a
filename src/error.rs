//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)` 等不一致模式。
//!
//! 子模块各自维护领域错误（`ProxyError` / `LoadError`），
//! 跨模块边界（入口初始化、设置读写）统一收敛到 `AppError`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为领域错误提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于 JSON 输出。

use serde::Serialize;

use crate::loader::LoadError;
use crate::proxy::ProxyError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 代理流水线错误（校验 / 取源 / 转码）
    #[error("{0}")]
    Proxy(#[from] ProxyError),

    /// 客户端加载链路错误
    #[error("{0}")]
    Load(#[from] LoadError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 设置文件不可用或格式非法
    #[error("设置读取失败: {0}")]
    Settings(String),

    /// 服务启动失败
    #[error("服务启动失败: {0}")]
    Server(String),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
