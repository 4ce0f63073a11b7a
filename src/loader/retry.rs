//! # 重试决策模块
//!
//! ## 设计思路
//!
//! 把“失败之后做什么”抽成纯函数：输入当前链位与本次结果，
//! 输出下一步动作（退避重试 / 推进候选 / 终态成功）。
//! 编排器只负责执行动作，决策本身无 IO、可穷举测试。
//!
//! ## 实现思路
//!
//! - 瞬时失败且未达上限：指数退避后在原候选上重试。
//! - 瞬时失败达上限或致命失败：推进到下一候选。
//! - 退避延迟为 `base × 2^(n-1)`，n 为已失败次数。

use std::time::Duration;

use super::FailureClass;

/// 链上的当前位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPosition {
    /// 候选下标（0 起）。
    pub candidate: usize,
    /// 该候选上已完成的尝试次数。
    pub attempt: u32,
}

impl ChainPosition {
    pub fn start() -> Self {
        Self {
            candidate: 0,
            attempt: 0,
        }
    }
}

/// 单次尝试的结果摘要。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed(FailureClass),
}

/// 决策输出：编排器的下一步动作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    /// 在当前候选上退避后重试。
    Retry { position: ChainPosition, delay: Duration },
    /// 推进到下一个候选。
    Advance { position: ChainPosition },
    /// 当前候选成功，链路结束。
    Succeeded { candidate: usize },
}

/// 第 `attempt` 次失败后的退避延迟。
///
/// `attempt` 从 1 起计，移位饱和处理防止大次数溢出。
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let multiplier = 1u64 << exponent;
    Duration::from_millis(base_delay_ms.saturating_mul(multiplier))
}

/// 纯决策函数：根据本次结果给出下一步。
pub fn next_step(
    position: ChainPosition,
    outcome: AttemptOutcome,
    max_retries: u32,
    base_delay_ms: u64,
) -> ChainStep {
    match outcome {
        AttemptOutcome::Success => ChainStep::Succeeded {
            candidate: position.candidate,
        },
        AttemptOutcome::Failed(class) => {
            let failed_attempts = position.attempt + 1;
            let exhausted = failed_attempts >= max_retries;

            if class == FailureClass::Fatal || exhausted {
                ChainStep::Advance {
                    position: ChainPosition {
                        candidate: position.candidate + 1,
                        attempt: 0,
                    },
                }
            } else {
                ChainStep::Retry {
                    position: ChainPosition {
                        candidate: position.candidate,
                        attempt: failed_attempts,
                    },
                    delay: backoff_delay(base_delay_ms, failed_attempts),
                }
            }
        }
    }
}
