//! Pre-match connection handling: registration, login and the pending
//! heartbeat.

use crate::accounts::{Account, AccountStore, AuthError, Presence};
use crate::connection::{Connection, Outbound};
use log::{debug, error, info, warn};
use shared::{AuthResponse, ClientMessage, ProtocolError, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// A logged-in player waiting for an opponent.
pub struct QueuedPlayer {
    pub connection: Connection,
    pub account: Account,
    presence: Presence,
    paired: oneshot::Sender<()>,
    heartbeat: JoinHandle<()>,
}

impl QueuedPlayer {
    /// True once the connection's writer has stopped. A peer that went away
    /// while queued is noticed the next time a heartbeat fails to write.
    pub fn is_gone(&self) -> bool {
        self.connection.outbound().is_closed()
    }

    /// Stops the pending heartbeat and waits for it to finish, so no
    /// `match_pending` can follow what the matchmaker sends next.
    pub async fn mark_paired(self) -> (Connection, Account, Presence) {
        let _ = self.paired.send(());
        if let Err(e) = self.heartbeat.await {
            debug!("Heartbeat task for {} ended abnormally: {}", self.account.username, e);
        }
        (self.connection, self.account, self.presence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Enqueued,
    Disconnected,
}

pub struct SessionContext {
    pub store: Arc<AccountStore>,
    pub queue: mpsc::Sender<QueuedPlayer>,
    pub heartbeat_interval: Duration,
}

/// Runs the authentication loop until the client is enqueued for
/// matchmaking or goes away.
pub async fn run_session(mut connection: Connection, ctx: Arc<SessionContext>) -> SessionOutcome {
    let id = connection.id();
    info!("Connection {} from {} awaiting credentials", id, connection.peer());

    loop {
        let envelope = match connection.recv().await {
            Ok(envelope) => envelope,
            Err(e) => {
                if e.is_disconnect() {
                    info!("Connection {} closed before login", id);
                } else {
                    warn!("Connection {} dropped: {}", id, e);
                }
                return SessionOutcome::Disconnected;
            }
        };

        let message = match ClientMessage::from_envelope(envelope) {
            Ok(message) => message,
            Err(ProtocolError::UnknownType(tag)) => {
                debug!("Connection {} sent unknown type `{}`", id, tag);
                connection.send(&ServerMessage::error("unknown message type"));
                continue;
            }
            Err(e) => {
                connection.send(&ServerMessage::error(e.to_string()));
                continue;
            }
        };

        match message {
            ClientMessage::Register(creds) => {
                let status = match ctx.store.register(&creds.username, &creds.secret).await {
                    Ok(()) => AuthResponse::ok(),
                    Err(e) => {
                        info!("Connection {}: register {} failed: {}", id, creds.username, e);
                        AuthResponse::err(e.code())
                    }
                };
                connection.send(&ServerMessage::RegisterResp(status));
            }

            ClientMessage::Login(creds) => {
                let (account, presence) = match ctx.store.login(&creds.username, &creds.secret).await {
                    Ok(login) => login,
                    Err(e) => {
                        info!("Connection {}: login {} failed: {}", id, creds.username, e);
                        connection.send(&ServerMessage::LoginResp(AuthResponse::err(e.code())));
                        continue;
                    }
                };

                let permit = match ctx.queue.try_reserve() {
                    Ok(permit) => permit,
                    Err(e) => {
                        if matches!(e, mpsc::error::TrySendError::Closed(_)) {
                            error!("Matchmaking queue is closed");
                        }
                        warn!("Connection {}: queue full, rejecting {}", id, account.username);
                        let code = AuthError::ServerFull.code();
                        connection.send(&ServerMessage::LoginResp(AuthResponse::err(code)));
                        continue;
                    }
                };

                connection.send(&ServerMessage::LoginResp(AuthResponse::ok()));
                info!("Connection {} logged in as {}, waiting for a match", id, account.username);

                let (paired, paired_rx) = oneshot::channel();
                let heartbeat = tokio::spawn(pending_heartbeat(
                    connection.outbound(),
                    paired_rx,
                    ctx.heartbeat_interval,
                ));

                permit.send(QueuedPlayer {
                    connection,
                    account,
                    presence,
                    paired,
                    heartbeat,
                });
                return SessionOutcome::Enqueued;
            }

            ClientMessage::Deploy(_) => {
                connection.send(&ServerMessage::error("not logged in"));
            }
        }
    }
}

/// Sends `match_pending` every `every` until paired or the peer is gone.
async fn pending_heartbeat(outbound: Outbound, mut paired: oneshot::Receiver<()>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = &mut paired => break,
            _ = ticker.tick() => {
                if !outbound.send(&ServerMessage::MatchPending) {
                    debug!("Connection {}: heartbeat stopped, peer gone", outbound.id());
                    break;
                }
            }
        }
    }
}
