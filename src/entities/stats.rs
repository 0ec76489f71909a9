#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub health: u32,
    pub max_health: u32,
    pub mana: u32,
    pub max_mana: u32,
}

impl Stats {
    pub fn new(max_health: u32, max_mana: u32) -> Self {
        Self {
            health: max_health,
            max_health,
            mana: max_mana,
            max_mana,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn apply_raw_damage(&mut self, amount: u32) -> u32 {
        let applied = amount.min(self.health);
        self.health = self.health.saturating_sub(applied);
        applied
    }

    pub fn apply_heal(&mut self, amount: u32) -> u32 {
        let before = self.health;
        self.health = before.saturating_add(amount).min(self.max_health);
        self.health.saturating_sub(before)
    }

    /// Adds (or with a negative delta removes) health, clamped to `0..=max_health`.
    pub fn change_health(&mut self, delta: i32) -> u32 {
        if delta >= 0 {
            self.apply_heal(delta.unsigned_abs());
        } else {
            self.apply_raw_damage(delta.unsigned_abs());
        }
        self.health
    }

    pub fn change_mana(&mut self, delta: i32) -> u32 {
        self.mana = if delta >= 0 {
            self.mana.saturating_add(delta.unsigned_abs()).min(self.max_mana)
        } else {
            self.mana.saturating_sub(delta.unsigned_abs())
        };
        self.mana
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_changes_are_clamped() {
        let mut stats = Stats::new(150, 40);
        assert_eq!(stats.change_health(-200), 0);
        assert!(!stats.is_alive());
        assert_eq!(stats.change_health(500), 150);
        assert_eq!(stats.change_mana(-15), 25);
        assert_eq!(stats.change_mana(100), 40);
    }
}
