use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum gap between reconnect attempts.
#[derive(Debug)]
pub struct RetryThrottle {
    last_attempt: Option<Instant>,
    min_interval: Duration,
}

impl RetryThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self { last_attempt: None, min_interval }
    }

    /// Records an attempt and returns true if one is allowed now.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        if let Some(t) = self.last_attempt {
            if now.duration_since(t) < self.min_interval { return false; }
        }
        self.last_attempt = Some(now);
        true
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_once_per_interval() {
        let mut t = RetryThrottle::new(Duration::from_secs(1));
        assert!(t.allow());
        for _ in 0..10 {
            tokio::time::advance(Duration::from_millis(50)).await;
            assert!(!t.allow());
        }
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(t.allow());
        assert!(!t.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn records_when_allowed() {
        let mut t = RetryThrottle::new(Duration::from_secs(1));
        assert!(t.last_attempt().is_none());
        assert!(t.allow());
        let first = t.last_attempt();
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(!t.allow());
        assert_eq!(t.last_attempt(), first);
    }
}
