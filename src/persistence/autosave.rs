use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub interval_seconds: u64,
}

impl AutosaveConfig {
    pub fn interval(self) -> Option<Duration> {
        if self.interval_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.interval_seconds.max(1)))
        }
    }
}

/// Outcome of one global save. Failures are collected, never retried.
#[derive(Debug, Default)]
pub struct AutosaveReport {
    pub saved_players: usize,
    pub player_errors: Vec<String>,
    pub globals_error: Option<String>,
}

impl AutosaveReport {
    pub fn is_clean(&self) -> bool {
        self.player_errors.is_empty() && self.globals_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_disables_autosave() {
        assert_eq!(AutosaveConfig { interval_seconds: 0 }.interval(), None);
        assert_eq!(
            AutosaveConfig { interval_seconds: 300 }.interval(),
            Some(Duration::from_secs(300))
        );
    }
}
