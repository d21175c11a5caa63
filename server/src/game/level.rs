use shared::LevelUp;

/// Per-level damage bonus.
const MULTIPLIER_STEP: f64 = 0.1;
/// Threshold growth per level gained.
const THRESHOLD_GROWTH: f64 = 1.1;

/// Level record carried by a participant during a match and persisted on the
/// account afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub level: u32,
    pub exp: u32,
    pub next_level: u32,
    pub multiplier: f64,
}

impl Level {
    pub fn multiplier_for(level: u32) -> f64 {
        1.0 + level as f64 * MULTIPLIER_STEP
    }

    /// Adds experience and runs the level-up loop.
    pub fn gain_exp(&mut self, amount: u32) -> Vec<LevelUp> {
        self.exp = self.exp.saturating_add(amount);
        self.check_level_up()
    }

    /// Consumes thresholds while experience covers them, one level each.
    /// Returns one notification per level gained. Afterwards
    /// `exp < next_level` and `multiplier == 1 + level * 0.1`.
    pub fn check_level_up(&mut self) -> Vec<LevelUp> {
        if self.next_level == 0 {
            self.next_level = 1;
        }

        let mut gained = Vec::new();
        while self.exp >= self.next_level {
            self.level += 1;
            self.exp -= self.next_level;
            self.next_level = ((self.next_level as f64 * THRESHOLD_GROWTH) as u32).max(1);
            self.multiplier = Self::multiplier_for(self.level);
            gained.push(self.notification());
        }

        self.multiplier = Self::multiplier_for(self.level);
        gained
    }

    pub fn notification(&self) -> LevelUp {
        LevelUp {
            level: self.level,
            exp: self.exp,
            next_level: self.next_level,
            multiplier: self.multiplier,
        }
    }
}
