use super::combat::{compute_damage, heal_ceiling, CritRule};
use super::level::Level;
use crate::accounts::Account;
use crate::config::{GameConfig, MatchMode};
use crate::specs::{SpecCatalog, SpecError, TowerSpec};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{GameEnd, GameResult, ServerMessage, StateUpdate, TowerKind, TowerView};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::First, Side::Second];

    pub fn index(self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tower {
    pub name: String,
    pub kind: TowerKind,
    pub health: i32,
    pub damage: i32,
    pub defence: i32,
}

impl Tower {
    pub fn from_spec(spec: &TowerSpec) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.kind,
            health: spec.health,
            damage: spec.damage,
            defence: spec.defence,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.health <= 0
    }

    pub fn view(&self) -> TowerView {
        TowerView {
            name: self.name.clone(),
            kind: self.kind,
            health: self.health,
        }
    }
}

/// Instantiates a side's towers in targeting order: guard, guard, king.
pub fn build_towers(catalog: &SpecCatalog, config: &GameConfig) -> Result<Vec<Tower>, SpecError> {
    [&config.guard_tower, &config.guard_tower, &config.king_tower]
        .into_iter()
        .map(|key| {
            catalog
                .tower(key)
                .map(Tower::from_spec)
                .ok_or_else(|| SpecError::MissingTower(key.clone()))
        })
        .collect()
}

pub type TroopId = u64;

#[derive(Debug, Clone)]
pub struct Troop {
    pub id: TroopId,
    pub key: String,
    pub health: i32,
    pub damage: i32,
    pub defence: i32,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub conn_id: u32,
    pub username: String,
    pub mana: u32,
    pub towers: Vec<Tower>,
    pub troops: Vec<Troop>,
    pub progress: Level,
}

impl Participant {
    pub fn new(conn_id: u32, account: &Account, towers: Vec<Tower>, mana: u32) -> Self {
        Self {
            conn_id,
            username: account.username.clone(),
            mana,
            towers,
            troops: Vec::new(),
            progress: account.progress(),
        }
    }

    pub fn surviving_towers(&self) -> usize {
        self.towers.iter().filter(|t| !t.is_destroyed()).count()
    }

    pub fn king_destroyed(&self) -> bool {
        self.towers
            .iter()
            .any(|t| t.kind.is_king() && t.is_destroyed())
    }

    fn front_tower_mut(&mut self) -> Option<&mut Tower> {
        self.towers.iter_mut().find(|t| !t.is_destroyed())
    }

    fn weakest_tower_mut(&mut self) -> Option<&mut Tower> {
        self.towers
            .iter_mut()
            .filter(|t| !t.is_destroyed())
            .min_by_key(|t| t.health)
    }

    fn tower_views(&self) -> Vec<TowerView> {
        self.towers
            .iter()
            .filter(|t| !t.is_destroyed())
            .map(Tower::view)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    KingDestroyed,
    Timeout,
    Forfeit(Side),
    Aborted,
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub reason: EndReason,
    pub results: [GameResult; 2],
    pub progress: Vec<(String, Level)>,
}

impl MatchOutcome {
    pub fn result_for(&self, side: Side) -> GameResult {
        self.results[side.index()]
    }
}

/// Why a deploy request was dropped. The message is sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployRejection {
    #[error("unknown troop `{0}`")]
    UnknownTroop(String),

    #[error("not enough mana for {troop}: costs {cost}, have {mana}")]
    InsufficientMana { troop: String, cost: u32, mana: u32 },

    #[error("not your turn")]
    NotYourTurn,

    #[error("match is over")]
    MatchOver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployed {
    /// A persistent troop that needs its own attack activity.
    Spawned(TroopId),
    Healed { tower: Option<String> },
    /// Turn-based: one immediate attack, no persistent troop.
    Struck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TroopStatus {
    Active,
    Gone,
}

/// Messages produced inside a critical section, delivered after the lock is
/// released.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(Side, ServerMessage)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, side: Side, message: ServerMessage) {
        self.messages.push((side, message));
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Side, ServerMessage)> {
        self.messages.iter()
    }
}

impl IntoIterator for Outbox {
    type Item = (Side, ServerMessage);
    type IntoIter = std::vec::IntoIter<(Side, ServerMessage)>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Ended,
}

/// Everything a match mutates. Every method is one critical section: the
/// engine calls it with the match lock held and sends the outbox afterwards.
pub struct MatchState {
    id: u64,
    participants: [Participant; 2],
    catalog: Arc<SpecCatalog>,
    config: Arc<GameConfig>,
    crit: CritRule,
    rng: StdRng,
    phase: Phase,
    fallen_king: Option<Side>,
    just_destroyed_tower: bool,
    turn: Side,
    next_troop_id: TroopId,
}

impl MatchState {
    pub fn new(
        id: u64,
        participants: [Participant; 2],
        catalog: Arc<SpecCatalog>,
        config: Arc<GameConfig>,
    ) -> Self {
        Self::with_rng(id, participants, catalog, config, StdRng::from_entropy())
    }

    pub fn with_rng(
        id: u64,
        participants: [Participant; 2],
        catalog: Arc<SpecCatalog>,
        config: Arc<GameConfig>,
        mut rng: StdRng,
    ) -> Self {
        let turn = if rng.gen_bool(0.5) {
            Side::First
        } else {
            Side::Second
        };
        let crit = CritRule {
            chance: config.crit_chance,
            multiplier: config.crit_multiplier,
        };

        Self {
            id,
            participants,
            catalog,
            config,
            crit,
            rng,
            phase: Phase::Running,
            fallen_king: None,
            just_destroyed_tower: false,
            turn,
            next_troop_id: 1,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn participant(&self, side: Side) -> &Participant {
        &self.participants[side.index()]
    }

    pub fn participant_mut(&mut self, side: Side) -> &mut Participant {
        &mut self.participants[side.index()]
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// The side whose king fell first, if any.
    pub fn fallen_king(&self) -> Option<Side> {
        self.fallen_king
    }

    /// Side to move. Only meaningful in turn-based mode.
    pub fn turn(&self) -> Option<Side> {
        match self.config.mode {
            MatchMode::TurnBased => Some(self.turn),
            MatchMode::Realtime => None,
        }
    }

    pub fn snapshot(&self, side: Side) -> StateUpdate {
        let own = self.participant(side);
        let foe = self.participant(side.opponent());
        StateUpdate {
            your_mana: own.mana,
            opponent_mana: foe.mana,
            your_towers: own.tower_views(),
            opponent_towers: foe.tower_views(),
        }
    }

    /// Mana regeneration, tower-vs-troop combat, then a snapshot to each side.
    pub fn tick(&mut self, outbox: &mut Outbox) {
        if !self.is_running() {
            return;
        }

        let cap = self.config.mana_cap;
        for participant in self.participants.iter_mut() {
            participant.mana = (participant.mana + 1).min(cap);
        }

        for side in Side::BOTH {
            self.towers_fire(side);
        }

        for side in Side::BOTH {
            outbox.push(side, ServerMessage::StateUpdate(self.snapshot(side)));
        }
    }

    /// Each surviving tower of `side` hits the first troop in the opponent's
    /// active list.
    fn towers_fire(&mut self, side: Side) {
        let match_id = self.id;
        let crit = self.crit;
        let rng = &mut self.rng;
        let (own, foe) = split_sides(&mut self.participants, side);
        let multiplier = own.progress.multiplier;

        for tower in own.towers.iter().filter(|t| !t.is_destroyed()) {
            let Some(target) = foe.troops.first_mut() else {
                break;
            };

            let damage = compute_damage(tower.damage, multiplier, target.defence, crit.roll(rng));
            target.health -= damage;
            if target.health <= 0 {
                debug!(
                    "Match {}: {}'s {} destroyed troop {} ({})",
                    match_id, own.username, tower.name, target.id, target.key
                );
                foe.troops.remove(0);
            }
        }
    }

    /// Validates and applies a deploy request from `side`.
    pub fn deploy(
        &mut self,
        side: Side,
        key: &str,
        outbox: &mut Outbox,
    ) -> Result<Deployed, DeployRejection> {
        if !self.is_running() {
            return Err(DeployRejection::MatchOver);
        }
        if self.config.mode == MatchMode::TurnBased && side != self.turn {
            return Err(DeployRejection::NotYourTurn);
        }

        let spec = self
            .catalog
            .troop(key)
            .ok_or_else(|| DeployRejection::UnknownTroop(key.to_string()))?;
        let (cost, health, damage, defence) = (spec.cost, spec.health, spec.damage, spec.defence);

        let participant = &mut self.participants[side.index()];
        if participant.mana < cost {
            return Err(DeployRejection::InsufficientMana {
                troop: key.to_string(),
                cost,
                mana: participant.mana,
            });
        }
        participant.mana -= cost;

        let deployed = if key == self.config.healer_troop {
            let tower = self.heal_weakest(side);
            Deployed::Healed { tower }
        } else if self.config.mode == MatchMode::TurnBased {
            self.strike(side, damage, outbox);
            Deployed::Struck
        } else {
            let id = self.next_troop_id;
            self.next_troop_id += 1;
            self.participants[side.index()].troops.push(Troop {
                id,
                key: key.to_string(),
                health,
                damage,
                defence,
            });
            Deployed::Spawned(id)
        };

        if self.config.mode == MatchMode::TurnBased && !self.just_destroyed_tower {
            self.turn = side.opponent();
        }

        debug!(
            "Match {}: {} deployed {} ({:?})",
            self.id, self.participants[side.index()].username, key, deployed
        );
        Ok(deployed)
    }

    fn heal_weakest(&mut self, side: Side) -> Option<String> {
        let amount = self.config.heal_amount;
        let tower = self.participants[side.index()].weakest_tower_mut()?;
        tower.health = (tower.health + amount).min(heal_ceiling(tower.kind));
        Some(tower.name.clone())
    }

    /// One attack period of a persistent troop.
    pub fn troop_attack(&mut self, side: Side, troop: TroopId, outbox: &mut Outbox) -> TroopStatus {
        if !self.is_running() {
            return TroopStatus::Gone;
        }

        let damage = match self.participants[side.index()]
            .troops
            .iter()
            .find(|t| t.id == troop)
        {
            Some(t) if t.health > 0 => t.damage,
            _ => return TroopStatus::Gone,
        };

        self.strike(side, damage, outbox);
        TroopStatus::Active
    }

    /// Hits the opponent's front tower. Awards tower-kill experience and
    /// records a fallen king.
    fn strike(&mut self, side: Side, base_damage: i32, outbox: &mut Outbox) {
        let crit = self.crit.roll(&mut self.rng);
        let (own, foe) = split_sides(&mut self.participants, side);

        let Some(tower) = foe.front_tower_mut() else {
            self.just_destroyed_tower = false;
            return;
        };

        let damage = compute_damage(base_damage, own.progress.multiplier, tower.defence, crit);
        tower.health -= damage;
        if !tower.is_destroyed() {
            self.just_destroyed_tower = false;
            return;
        }

        tower.health = 0;
        let kind = tower.kind;
        let tower_name = tower.name.clone();
        info!(
            "Match {}: {} destroyed {}'s {}",
            self.id, own.username, foe.username, tower_name
        );

        for level_up in own.progress.gain_exp(tower_exp(&self.config, kind)) {
            outbox.push(side, ServerMessage::LevelUp(level_up));
        }

        self.just_destroyed_tower = true;
        if kind.is_king() && self.fallen_king.is_none() {
            self.fallen_king = Some(side.opponent());
        }
    }

    /// Ends the match. Only the first call evaluates and produces `game_end`;
    /// later calls return `None`.
    pub fn conclude(&mut self, reason: EndReason, outbox: &mut Outbox) -> Option<MatchOutcome> {
        if !self.is_running() {
            return None;
        }
        self.phase = Phase::Ended;

        let results = self.evaluate(reason);
        let mut progress = Vec::with_capacity(2);

        for side in Side::BOTH {
            let result = results[side.index()];
            let exp = match result {
                GameResult::Win => self.config.win_exp,
                GameResult::Loss => self.config.loss_exp,
                GameResult::Draw => self.config.draw_exp,
            };

            let participant = &mut self.participants[side.index()];
            for level_up in participant.progress.gain_exp(exp) {
                outbox.push(side, ServerMessage::LevelUp(level_up));
            }
            outbox.push(side, ServerMessage::GameEnd(GameEnd { result, exp }));
            progress.push((participant.username.clone(), participant.progress));
        }

        info!(
            "Match {} ended ({:?}): {} {:?}, {} {:?}",
            self.id,
            reason,
            self.participants[0].username,
            results[0],
            self.participants[1].username,
            results[1]
        );

        Some(MatchOutcome {
            reason,
            results,
            progress,
        })
    }

    fn evaluate(&self, reason: EndReason) -> [GameResult; 2] {
        let loser = match (self.fallen_king, reason) {
            (Some(side), _) => Some(side),
            (None, EndReason::Forfeit(side)) => Some(side),
            _ => None,
        };

        if let Some(loser) = loser {
            let mut results = [GameResult::Win; 2];
            results[loser.index()] = GameResult::Loss;
            return results;
        }

        let first = self.participants[0].surviving_towers();
        let second = self.participants[1].surviving_towers();
        match first.cmp(&second) {
            std::cmp::Ordering::Greater => [GameResult::Win, GameResult::Loss],
            std::cmp::Ordering::Less => [GameResult::Loss, GameResult::Win],
            std::cmp::Ordering::Equal => [GameResult::Draw, GameResult::Draw],
        }
    }
}

fn tower_exp(config: &GameConfig, kind: TowerKind) -> u32 {
    match kind {
        TowerKind::King => config.king_exp,
        TowerKind::Princess => config.princess_exp,
        TowerKind::Guard => config.guard_exp,
        TowerKind::Cannon => config.cannon_exp,
    }
}

fn split_sides(participants: &mut [Participant; 2], side: Side) -> (&mut Participant, &mut Participant) {
    let (first, second) = participants.split_at_mut(1);
    match side {
        Side::First => (&mut first[0], &mut second[0]),
        Side::Second => (&mut second[0], &mut first[0]),
    }
}
