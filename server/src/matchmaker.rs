//! FIFO pairing of logged-in players.
//!
//! Sessions push [`QueuedPlayer`]s into a bounded queue; the matchmaker takes
//! them two at a time in arrival order and starts one match per pair. It runs
//! as its own task, so the accept loop never waits on pairing. A player whose
//! connection died while queued is dropped instead of paired.

use crate::accounts::AccountStore;
use crate::config::GameConfig;
use crate::game::{build_towers, Match, MatchState, Participant};
use crate::session::QueuedPlayer;
use crate::specs::SpecCatalog;
use log::{error, info, warn};
use shared::{GameStart, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};

pub fn queue(capacity: usize) -> (mpsc::Sender<QueuedPlayer>, mpsc::Receiver<QueuedPlayer>) {
    mpsc::channel(capacity)
}

#[derive(Debug, Clone)]
pub struct MatchSummary {
    pub players: [String; 2],
    pub started: Instant,
}

/// Matches currently being played, keyed by match id.
#[derive(Debug, Default)]
pub struct MatchRegistry {
    matches: RwLock<HashMap<u64, MatchSummary>>,
}

impl MatchRegistry {
    pub async fn insert(&self, id: u64, summary: MatchSummary) {
        self.matches.write().await.insert(id, summary);
    }

    pub async fn remove(&self, id: u64) -> Option<MatchSummary> {
        self.matches.write().await.remove(&id)
    }

    pub async fn active_matches(&self) -> usize {
        self.matches.read().await.len()
    }

    pub async fn get(&self, id: u64) -> Option<MatchSummary> {
        self.matches.read().await.get(&id).cloned()
    }
}

/// Aborts running matches, used on server shutdown.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    signal: Arc<watch::Sender<bool>>,
    registry: Arc<MatchRegistry>,
}

impl AbortHandle {
    /// Ends every running match (and any started later) as aborted, then
    /// waits up to `grace` for them to deliver `game_end` and save progress.
    /// Returns `false` if some were still running when `grace` ran out.
    pub async fn abort_all(&self, grace: Duration) -> bool {
        self.signal.send_replace(true);
        let drained = timeout(grace, async {
            while self.registry.active_matches().await > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        drained.is_ok()
    }
}

pub struct Matchmaker {
    queue: mpsc::Receiver<QueuedPlayer>,
    catalog: Arc<SpecCatalog>,
    store: Arc<AccountStore>,
    config: Arc<GameConfig>,
    registry: Arc<MatchRegistry>,
    abort: Arc<watch::Sender<bool>>,
    next_match_id: u64,
}

impl Matchmaker {
    pub fn new(
        queue: mpsc::Receiver<QueuedPlayer>,
        catalog: Arc<SpecCatalog>,
        store: Arc<AccountStore>,
        config: Arc<GameConfig>,
    ) -> Self {
        Self {
            queue,
            catalog,
            store,
            config,
            registry: Arc::new(MatchRegistry::default()),
            abort: Arc::new(watch::channel(false).0),
            next_match_id: 1,
        }
    }

    pub fn registry(&self) -> Arc<MatchRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            signal: Arc::clone(&self.abort),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Pairs players until every queue sender is gone. A waiting player is
    /// checked again every heartbeat interval and dropped once gone, which
    /// also frees the account for a new login.
    pub async fn run(mut self) {
        info!("Matchmaker waiting for players");

        let mut waiting: Option<QueuedPlayer> = None;
        let mut sweep = interval(self.config.heartbeat_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                player = self.queue.recv() => {
                    let Some(player) = player else {
                        break;
                    };
                    if player.is_gone() {
                        info!("{} left the queue before pairing", player.account.username);
                        continue;
                    }
                    match waiting.take() {
                        Some(first) if first.is_gone() => {
                            info!("{} left the queue before pairing", first.account.username);
                            waiting = Some(player);
                        }
                        Some(first) => self.start_match(first, player).await,
                        None => waiting = Some(player),
                    }
                }

                _ = sweep.tick() => {
                    if waiting.as_ref().is_some_and(QueuedPlayer::is_gone) {
                        if let Some(gone) = waiting.take() {
                            info!("{} left the queue before pairing", gone.account.username);
                        }
                    }
                }
            }
        }

        if let Some(player) = waiting {
            warn!(
                "Matchmaking queue closed with {} still waiting",
                player.account.username
            );
        }
        info!("Matchmaker stopped");
    }

    async fn start_match(&mut self, first: QueuedPlayer, second: QueuedPlayer) {
        let id = self.next_match_id;
        self.next_match_id += 1;

        let (first_conn, first_account, first_presence) = first.mark_paired().await;
        let (second_conn, second_account, second_presence) = second.mark_paired().await;

        let towers = match build_towers(&self.catalog, &self.config) {
            Ok(towers) => towers,
            Err(e) => {
                error!("Match {}: cannot build towers: {}", id, e);
                let notice = ServerMessage::error("match could not be started");
                first_conn.send(&notice);
                second_conn.send(&notice);
                return;
            }
        };

        let mana = self.config.initial_mana;
        let participants = [
            Participant::new(first_conn.id(), &first_account, towers.clone(), mana),
            Participant::new(second_conn.id(), &second_account, towers, mana),
        ];

        info!(
            "Match {}: {} vs {}",
            id, first_account.username, second_account.username
        );
        self.registry
            .insert(
                id,
                MatchSummary {
                    players: [first_account.username, second_account.username],
                    started: Instant::now(),
                },
            )
            .await;

        let start = ServerMessage::GameStart(GameStart {
            players: [first_conn.id(), second_conn.id()],
        });
        first_conn.send(&start);
        second_conn.send(&start);

        let state = MatchState::new(
            id,
            participants,
            Arc::clone(&self.catalog),
            Arc::clone(&self.config),
        );
        let game = Match::new(
            state,
            [first_conn, second_conn],
            Arc::clone(&self.store),
            Arc::clone(&self.config),
        )
        .abort_on(self.abort.subscribe());

        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            game.run().await;
            // Both accounts stay claimed until their progress is saved.
            drop((first_presence, second_presence));
            if let Some(summary) = registry.remove(id).await {
                info!(
                    "Match {} finished after {:.1}s",
                    id,
                    summary.started.elapsed().as_secs_f64()
                );
            }
        });
    }
}
