//! Async match runner.
//!
//! One match runs these activities concurrently:
//! - a receive task per connection, turning `deploy` messages into commands
//!   and a read failure into a forfeit
//! - the main loop, racing the tick, the deploy queue, termination triggers,
//!   the match deadline and an optional abort signal
//! - one attack task per deployed troop
//!
//! All of them mutate the same [`MatchState`] under a single mutex, one
//! critical section at a time. Messages produced inside a critical section
//! are delivered after the lock is released.

use super::state::{Deployed, EndReason, MatchOutcome, MatchState, Outbox, Side, TroopId, TroopStatus};
use crate::accounts::AccountStore;
use crate::config::GameConfig;
use crate::connection::{Connection, Outbound};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ProtocolError, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

const DEPLOY_QUEUE_CAPACITY: usize = 100;

#[derive(Debug)]
struct DeployCommand {
    side: Side,
    troop: String,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    KingDestroyed,
    Forfeit(Side),
}

pub struct Match {
    id: u64,
    state: Arc<Mutex<MatchState>>,
    connections: [Connection; 2],
    store: Arc<AccountStore>,
    config: Arc<GameConfig>,
    abort: Option<watch::Receiver<bool>>,
}

impl Match {
    pub fn new(
        state: MatchState,
        connections: [Connection; 2],
        store: Arc<AccountStore>,
        config: Arc<GameConfig>,
    ) -> Self {
        Self {
            id: state.id(),
            state: Arc::new(Mutex::new(state)),
            connections,
            store,
            config,
            abort: None,
        }
    }

    /// Ends the match with [`EndReason::Aborted`] as soon as `signal` reads
    /// `true`, including when it already does at start.
    pub fn abort_on(mut self, signal: watch::Receiver<bool>) -> Self {
        self.abort = Some(signal);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> Arc<Mutex<MatchState>> {
        Arc::clone(&self.state)
    }

    /// Plays the match to the end, then writes both players' progress to the
    /// account store.
    pub async fn run(self) -> Option<MatchOutcome> {
        let Match {
            id,
            state,
            connections,
            store,
            config,
            mut abort,
        } = self;

        let outbound = [connections[0].outbound(), connections[1].outbound()];
        let (deploy_tx, mut deploy_rx) = mpsc::channel(DEPLOY_QUEUE_CAPACITY);
        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let [first, second] = connections;
        let receivers = [
            tokio::spawn(receive_loop(id, Side::First, first, deploy_tx.clone(), trigger_tx.clone())),
            tokio::spawn(receive_loop(id, Side::Second, second, deploy_tx, trigger_tx.clone())),
        ];
        let mut troops: Vec<JoinHandle<()>> = Vec::new();

        let mut ticker = interval(config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        let deadline = sleep(config.match_duration());
        tokio::pin!(deadline);

        info!("Match {} started ({:?})", id, config.mode);

        let reason = loop {
            tokio::select! {
                _ = &mut deadline => break EndReason::Timeout,

                _ = abort_requested(&mut abort) => break EndReason::Aborted,

                Some(trigger) = trigger_rx.recv() => match trigger {
                    Trigger::KingDestroyed => break EndReason::KingDestroyed,
                    Trigger::Forfeit(side) => break EndReason::Forfeit(side),
                },

                Some(command) = deploy_rx.recv() => {
                    let mut outbox = Outbox::new();
                    let (result, fallen) = {
                        let mut state = state.lock().await;
                        let result = state.deploy(command.side, &command.troop, &mut outbox);
                        (result, state.fallen_king())
                    };
                    deliver(&outbound, outbox);

                    match result {
                        Ok(Deployed::Spawned(troop)) => {
                            troops.push(tokio::spawn(troop_loop(
                                id,
                                Arc::clone(&state),
                                command.side,
                                troop,
                                config.troop_attack_interval(),
                                outbound.clone(),
                                trigger_tx.clone(),
                                shutdown_rx.clone(),
                            )));
                        }
                        Ok(_) => {}
                        Err(rejection) => {
                            debug!("Match {}: dropped deploy of {}: {}", id, command.troop, rejection);
                            outbound[command.side.index()]
                                .send(&ServerMessage::error(rejection.to_string()));
                        }
                    }

                    if fallen.is_some() {
                        break EndReason::KingDestroyed;
                    }
                }

                _ = ticker.tick() => {
                    let mut outbox = Outbox::new();
                    let fallen = {
                        let mut state = state.lock().await;
                        state.tick(&mut outbox);
                        state.fallen_king()
                    };
                    deliver(&outbound, outbox);

                    if fallen.is_some() {
                        break EndReason::KingDestroyed;
                    }
                }
            }
        };

        let mut outbox = Outbox::new();
        let outcome = state.lock().await.conclude(reason, &mut outbox);

        let _ = shutdown_tx.send(true);
        for task in receivers.iter().chain(troops.iter()) {
            task.abort();
        }

        deliver(&outbound, outbox);

        if let Some(outcome) = &outcome {
            if let Err(e) = store.record_progress(&outcome.progress).await {
                error!("Match {}: failed to save progress: {}", id, e);
            }
        }
        outcome
    }
}

/// Resolves once the abort signal reads `true`. Without a signal, or once its
/// sender is gone, it never resolves.
async fn abort_requested(signal: &mut Option<watch::Receiver<bool>>) {
    if let Some(signal) = signal {
        loop {
            if *signal.borrow_and_update() {
                return;
            }
            if signal.changed().await.is_err() {
                break;
            }
        }
    }
    std::future::pending::<()>().await
}

/// Sends each message to its side. A closed connection is skipped here; its
/// receive task reports the disconnect.
fn deliver(outbound: &[Outbound; 2], outbox: Outbox) {
    for (side, message) in outbox {
        let target = &outbound[side.index()];
        if !target.send(&message) {
            debug!("Connection {}: dropped {}", target.id(), message.tag());
        }
    }
}

async fn receive_loop(
    match_id: u64,
    side: Side,
    mut connection: Connection,
    deploys: mpsc::Sender<DeployCommand>,
    triggers: mpsc::UnboundedSender<Trigger>,
) {
    loop {
        let envelope = match connection.recv().await {
            Ok(envelope) => envelope,
            Err(e) => {
                if e.is_disconnect() {
                    info!("Match {}: connection {} left, forfeiting", match_id, connection.id());
                } else {
                    warn!("Match {}: connection {} failed: {}", match_id, connection.id(), e);
                }
                let _ = triggers.send(Trigger::Forfeit(side));
                return;
            }
        };

        match ClientMessage::from_envelope(envelope) {
            Ok(ClientMessage::Deploy(request)) => {
                let command = DeployCommand {
                    side,
                    troop: request.troop,
                };
                if deploys.send(command).await.is_err() {
                    return;
                }
            }
            Ok(other) => {
                let msg = format!("{} is not allowed during a match", other.tag());
                connection.send(&ServerMessage::error(msg));
            }
            Err(ProtocolError::UnknownType(_)) => {
                connection.send(&ServerMessage::error("unknown message type"));
            }
            Err(e) => {
                connection.send(&ServerMessage::error(e.to_string()));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn troop_loop(
    match_id: u64,
    state: Arc<Mutex<MatchState>>,
    side: Side,
    troop: TroopId,
    every: Duration,
    outbound: [Outbound; 2],
    triggers: mpsc::UnboundedSender<Trigger>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let mut outbox = Outbox::new();
        let (status, fallen) = {
            let mut state = state.lock().await;
            let status = state.troop_attack(side, troop, &mut outbox);
            (status, state.fallen_king())
        };
        deliver(&outbound, outbox);

        if fallen.is_some() {
            let _ = triggers.send(Trigger::KingDestroyed);
        }
        if status == TroopStatus::Gone {
            debug!("Match {}: troop {} stopped", match_id, troop);
            break;
        }
    }
}
