use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// When a wait of `timeout` starting now ends. `None` means never.
pub fn deadline(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Time left until `deadline`, zero once it has passed.
pub fn remaining(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => Duration::MAX,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remaining_saturates() {
        let deadline = Some(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(remaining(deadline), Duration::ZERO);
        assert!(remaining(Some(Instant::now() + Duration::from_secs(60))) > Duration::from_secs(59));
    }

    #[test]
    fn unbounded_timeout_never_expires() {
        assert_eq!(deadline(Duration::MAX), None);
        assert_eq!(remaining(deadline(Duration::MAX)), Duration::MAX);
        assert!(deadline(Duration::from_secs(1)).is_some());
    }
}
