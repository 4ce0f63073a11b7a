//! # 加载错误模型模块
//!
//! ## 设计思路
//!
//! 客户端加载链路的失败分两类：瞬时失败（值得退避重试）与致命失败
//! （立即跳到下一候选）。分类逻辑集中在这里，重试控制器只消费分类结果。
//!
//! ## 实现思路
//!
//! - 网络错误与超时一律视为瞬时。
//! - HTTP 状态码按族分类：400/403 是代理的参数/域名拒绝，重试无意义；
//!   其余非 2xx 视为瞬时（上游抖动、5xx 等）。

/// 客户端加载统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// DNS / 连接级网络失败。
    #[error("网络错误：{0}")]
    Network(String),

    /// 单次尝试超时。
    #[error("超时错误：{0}")]
    Timeout(String),

    /// 目标返回非 2xx 状态码。
    #[error("HTTP 错误：{status}")]
    HttpStatus { status: u16 },

    /// 配置不合法。
    #[error("配置错误：{0}")]
    InvalidConfig(String),

    /// 请求在完成前被新一代加载取代。
    #[error("已取消：{0}")]
    Cancelled(String),
}

/// 失败分类：决定重试还是换下一候选。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 值得退避重试。
    Transient,
    /// 重试无意义，立即推进候选链。
    Fatal,
}

impl LoadError {
    /// 判定失败类别。
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Network(_) | Self::Timeout(_) => FailureClass::Transient,
            Self::HttpStatus { status } => match status {
                400 | 403 => FailureClass::Fatal,
                _ => FailureClass::Transient,
            },
            Self::InvalidConfig(_) | Self::Cancelled(_) => FailureClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_timeout_are_transient() {
        assert_eq!(
            LoadError::Network("reset".into()).class(),
            FailureClass::Transient
        );
        assert_eq!(
            LoadError::Timeout("10s".into()).class(),
            FailureClass::Transient
        );
    }

    #[test]
    fn proxy_rejections_are_fatal() {
        assert_eq!(
            LoadError::HttpStatus { status: 400 }.class(),
            FailureClass::Fatal
        );
        assert_eq!(
            LoadError::HttpStatus { status: 403 }.class(),
            FailureClass::Fatal
        );
    }

    #[test]
    fn server_errors_are_transient() {
        for status in [404, 429, 500, 502, 503] {
            assert_eq!(
                LoadError::HttpStatus { status }.class(),
                FailureClass::Transient,
                "status {status} should be transient"
            );
        }
    }
}
