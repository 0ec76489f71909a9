use std::time::{Duration, Instant};

/// Millisecond timestamp measured from engine start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct GameTick(pub u64);

impl GameTick {
    pub fn after(self, duration: Duration) -> Self {
        let millis = duration.as_millis().min(u64::MAX as u128) as u64;
        GameTick(self.0.saturating_add(millis))
    }
}

/// Engine time source. Production engines read the monotonic clock; tests
/// drive a manual clock forward explicitly.
#[derive(Debug, Clone)]
pub enum GameClock {
    System { started: Instant },
    Manual { now: GameTick },
}

impl GameClock {
    pub fn system() -> Self {
        GameClock::System {
            started: Instant::now(),
        }
    }

    pub fn manual() -> Self {
        GameClock::Manual { now: GameTick(0) }
    }

    pub fn now(&self) -> GameTick {
        match self {
            GameClock::System { started } => {
                let elapsed = started.elapsed().as_millis().min(u64::MAX as u128) as u64;
                GameTick(elapsed)
            }
            GameClock::Manual { now } => *now,
        }
    }

    /// Moves a manual clock forward. System clocks ignore the call.
    pub fn advance(&mut self, duration: Duration) -> GameTick {
        if let GameClock::Manual { now } = self {
            *now = now.after(duration);
        }
        self.now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cooldown {
    ready_at: GameTick,
}

impl Cooldown {
    pub fn new(ready_at: GameTick) -> Self {
        Self { ready_at }
    }

    pub fn ready_at(&self) -> GameTick {
        self.ready_at
    }

    pub fn is_ready(&self, clock: &GameClock) -> bool {
        clock.now() >= self.ready_at
    }

    pub fn remaining(&self, clock: &GameClock) -> Duration {
        Duration::from_millis(self.ready_at.0.saturating_sub(clock.now().0))
    }

    pub fn reset_from_now(&mut self, clock: &GameClock, duration: Duration) {
        self.ready_at = clock.now().after(duration);
    }

    pub fn clear(&mut self) {
        self.ready_at = GameTick(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let mut clock = GameClock::manual();
        assert_eq!(clock.now(), GameTick(0));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), GameTick(250));
    }

    #[test]
    fn cooldown_reports_remaining_time() {
        let mut clock = GameClock::manual();
        let mut cooldown = Cooldown::default();
        assert!(cooldown.is_ready(&clock));

        cooldown.reset_from_now(&clock, Duration::from_millis(400));
        assert!(!cooldown.is_ready(&clock));
        assert_eq!(cooldown.remaining(&clock), Duration::from_millis(400));

        clock.advance(Duration::from_millis(150));
        assert_eq!(cooldown.remaining(&clock), Duration::from_millis(250));

        clock.advance(Duration::from_millis(250));
        assert!(cooldown.is_ready(&clock));
        assert_eq!(cooldown.remaining(&clock), Duration::ZERO);
    }
}
