/// Wall-clock source for overlay text and snapshot names.
pub trait Clock {
    /// Local time as `HH:MM:SS`.
    fn now_hms(&self) -> String;
}

/// The system's local time.
pub struct LocalClock;

impl Clock for LocalClock {
    fn now_hms(&self) -> String {
        chrono::Local::now().format("%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_clock_format() {
        let now = LocalClock.now_hms();
        let parts: Vec<&str> = now.split(':').collect();
        assert_eq!(parts.len(), 3, "{now}");
        assert!(parts.iter().all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit())));
    }
}
