//! # 代理错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载代理链路（参数校验 → 取源 → 转码 → 响应）中的所有错误来源，
//! 避免字符串拼接式错误处理。通过 `thiserror` 保持人类可读错误，同时让编排层可按分支
//! 决定 HTTP 状态码与对外文案。
//!
//! ## 实现思路
//!
//! - 对外响应只允许三种固定 JSON 文案，由 `client_message` 统一给出，
//!   杜绝内部细节（堆栈、上游报错正文）泄漏给客户端。
//! - `code` / `stage` 提供稳定的诊断标识，仅用于日志与排查。

use axum::http::StatusCode;

/// 代理链路统一错误类型。
///
/// 该类型在路由层被映射为固定的 HTTP 状态码与 JSON 错误体。
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// 请求缺少必要参数（目前只有 `url`）。
    #[error("缺少参数：{0}")]
    MissingParameter(String),

    /// 目标域名不在允许列表内。
    #[error("域名不被允许：{0}")]
    DomainNotAllowed(String),

    /// URL 无法解析或协议不受支持。
    #[error("URL 格式错误：{0}")]
    MalformedUrl(String),

    /// 上游取源超时。
    #[error("上游超时：{0}")]
    UpstreamTimeout(String),

    /// 上游返回非 2xx 状态码。
    #[error("上游 HTTP 错误：{status}")]
    UpstreamHttpError { status: u16 },

    /// DNS / 连接级网络失败。
    #[error("上游网络错误：{0}")]
    UpstreamNetworkError(String),

    /// 字节内容无法识别为图片。
    #[error("不支持的图片：{0}")]
    UnsupportedImage(String),

    /// 转码流程失败，`stage` 记录出错阶段供诊断。
    #[error("转码失败（{stage}）：{message}")]
    TranscodeFailure {
        stage: &'static str,
        message: String,
    },

    /// 体积 / 像素 / 内存等资源上限被触发。
    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl ProxyError {
    /// 稳定错误码，用于日志与诊断，不进入对外响应体。
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "E_MISSING_PARAMETER",
            Self::DomainNotAllowed(_) => "E_DOMAIN_NOT_ALLOWED",
            Self::MalformedUrl(_) => "E_MALFORMED_URL",
            Self::UpstreamTimeout(_) => "E_UPSTREAM_TIMEOUT",
            Self::UpstreamHttpError { .. } => "E_UPSTREAM_HTTP",
            Self::UpstreamNetworkError(_) => "E_UPSTREAM_NETWORK",
            Self::UnsupportedImage(_) => "E_UNSUPPORTED_IMAGE",
            Self::TranscodeFailure { .. } => "E_TRANSCODE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
        }
    }

    /// 出错阶段标识（validate / fetch / transcode）。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) | Self::DomainNotAllowed(_) | Self::MalformedUrl(_) => {
                "validate"
            }
            Self::UpstreamTimeout(_)
            | Self::UpstreamHttpError { .. }
            | Self::UpstreamNetworkError(_) => "fetch",
            Self::UnsupportedImage(_) | Self::TranscodeFailure { .. } | Self::ResourceLimit(_) => {
                "transcode"
            }
        }
    }

    /// 映射到对外 HTTP 状态码。
    ///
    /// 注意：无法解析的 URL 归入 500（历史行为），403 只保留给
    /// “可解析但域名未放行”的情况。
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) => StatusCode::BAD_REQUEST,
            Self::DomainNotAllowed(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 对外固定文案，三种形态之外不暴露任何内部信息。
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "Missing image URL",
            Self::DomainNotAllowed(_) => "Domain not allowed",
            _ => "Failed to proxy image",
        }
    }
}
