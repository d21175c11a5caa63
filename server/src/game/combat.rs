//! Damage and healing rules.

use rand::Rng;
use shared::TowerKind;

/// Chance and factor of a critical hit.
#[derive(Debug, Clone, Copy)]
pub struct CritRule {
    pub chance: f64,
    pub multiplier: f64,
}

impl CritRule {
    /// Returns the crit factor to apply, if this attack crits.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        if rng.gen_bool(self.chance) {
            Some(self.multiplier)
        } else {
            None
        }
    }
}

/// `max(0, floor(base * multiplier [* crit]) - defence)`
pub fn compute_damage(base: i32, multiplier: f64, defence: i32, crit: Option<f64>) -> i32 {
    let mut attack = base as f64 * multiplier;
    if let Some(factor) = crit {
        attack *= factor;
    }
    (attack.floor() as i32 - defence).max(0)
}

/// Health cap a heal can raise a tower to.
pub fn heal_ceiling(kind: TowerKind) -> i32 {
    match kind {
        TowerKind::King => 6000,
        TowerKind::Princess | TowerKind::Guard | TowerKind::Cannon => 2500,
    }
}
