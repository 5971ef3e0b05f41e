//! 请求节流。
//!
//! 整个进程共用一个 [`RateLimiter`]：列收藏夹、翻页、取视频信息、取播放地址、
//! 每一次流下载尝试之前都调用 `wait_if_needed`，保证任意两次请求之间至少间隔
//! `request_interval`。

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// 距上次请求不足间隔时阻塞补足，然后把“上次请求时间”更新为现在。
    pub fn wait_if_needed(&self) {
        let mut last = match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "请求节流");
                std::thread::sleep(wait);
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.wait_if_needed();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn consecutive_calls_are_spaced() {
        let interval = Duration::from_millis(60);
        let limiter = RateLimiter::new(interval);
        let mut stamps = Vec::new();
        for _ in 0..4 {
            limiter.wait_if_needed();
            stamps.push(Instant::now());
        }
        for pair in stamps.windows(2) {
            // 允许少量计时误差
            assert!(pair[1] - pair[0] + Duration::from_millis(5) >= interval);
        }
    }

    #[test]
    fn no_wait_when_interval_already_elapsed() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        limiter.wait_if_needed();
        std::thread::sleep(Duration::from_millis(40));
        let start = Instant::now();
        limiter.wait_if_needed();
        assert!(start.elapsed() < Duration::from_millis(15));
    }
}
