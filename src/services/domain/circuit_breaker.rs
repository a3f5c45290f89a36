//! PLC断路器
//!
//! 守护单台设备的失败计数状态机。只有 CLOSED 与 OPEN 两个状态，
//! 没有显式半开态：由于引擎对单台PLC严格串行执行（见操作执行器），
//! 复位窗口过后的第一次操作既是探测也是正常请求；该次探测失败则
//! 立即重新打开，成功则清零计数并关闭。

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::models::operation::BreakerState;

/// 断路器状态机
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    timeout: Duration,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    state: BreakerState,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            timeout,
            failure_count: 0,
            last_failure_time: None,
            state: BreakerState::Closed,
        }
    }

    /// 记录一次成功操作；清零计数，必要时闭合断路器
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        if self.state == BreakerState::Open {
            self.state = BreakerState::Closed;
            info!("断路器恢复闭合");
        }
    }

    /// 记录一次失败操作；连续失败达到阈值时打开断路器
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        debug!(
            "断路器记录失败: {}/{}",
            self.failure_count, self.failure_threshold
        );

        if self.failure_count >= self.failure_threshold {
            if self.state != BreakerState::Open {
                warn!(
                    "断路器打开: 连续失败 {} 次 (复位窗口 {:?})",
                    self.failure_count, self.timeout
                );
            }
            self.state = BreakerState::Open;
        }
    }

    /// 当前是否允许发起尝试
    ///
    /// OPEN 状态下仅当距最近一次失败超过复位窗口时放行一次探测。
    pub fn can_attempt(&self) -> bool {
        if self.state != BreakerState::Open {
            return true;
        }

        let last_failure = match self.last_failure_time {
            Some(t) => t,
            None => return true,
        };

        if last_failure.elapsed() > self.timeout {
            info!("断路器复位窗口已过，允许探测");
            return true;
        }

        false
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}
