use std::time::Duration;

use tokio::time::Instant;

/// A cached value and when it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }

    /// Recomputed from `fetched_at` on every call, so a TTL change applies
    /// to existing entries immediately.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }

    pub fn age_display(&self) -> String {
        let seconds = self.age().as_secs();
        let minutes = seconds / 60;
        if seconds < 10 {
            "just now".to_string()
        } else if minutes < 1 {
            format!("{}s ago", seconds)
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_freshness_is_strictly_less_than_ttl() {
        let entry = CacheEntry::new(1);
        let ttl = Duration::from_millis(1000);
        assert!(entry.is_fresh(ttl));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(entry.is_fresh(ttl));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!entry.is_fresh(ttl));
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_display() {
        let entry = CacheEntry::new("v");
        assert_eq!(entry.age_display(), "just now");

        tokio::time::advance(Duration::from_secs(42)).await;
        assert_eq!(entry.age_display(), "42s ago");

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(entry.age_display(), "5m ago");

        tokio::time::advance(Duration::from_secs(90 * 60)).await;
        assert_eq!(entry.age_display(), "2h ago");
    }
}
