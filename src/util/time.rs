//! Time utilities for the tick loop and uptime reporting

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Measures the work done inside one tick against its wall-clock budget
#[derive(Debug, Clone)]
pub struct Timer {
    start: tokio::time::Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Time left of `budget`, never negative
    pub fn remaining(&self, budget: Duration) -> Duration {
        budget.saturating_sub(self.elapsed())
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn remaining_budget_shrinks_and_saturates() {
        let timer = Timer::new();
        let budget = Duration::from_millis(600);
        assert_eq!(timer.remaining(budget), budget);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(timer.remaining(budget), Duration::from_millis(350));

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(timer.remaining(budget), Duration::ZERO);
        assert_eq!(timer.elapsed_ms(), 1250);
    }
}
