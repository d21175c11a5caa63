//! TCP listener: accepts connections and hands each one to a session task.

use crate::accounts::AccountStore;
use crate::config::GameConfig;
use crate::connection::{Connection, ConnectionId};
use crate::matchmaker::{self, AbortHandle, MatchRegistry, Matchmaker};
use crate::session::{run_session, SessionContext};
use crate::specs::SpecCatalog;
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Accept loop plus the matchmaker it feeds.
pub struct Server {
    listener: TcpListener,
    sessions: Arc<SessionContext>,
    matchmaker: Matchmaker,
    registry: Arc<MatchRegistry>,
    next_connection_id: ConnectionId,
}

impl Server {
    pub async fn bind(
        addr: &str,
        store: Arc<AccountStore>,
        catalog: Arc<SpecCatalog>,
        config: Arc<GameConfig>,
    ) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (queue_tx, queue_rx) = matchmaker::queue(config.max_players);
        let sessions = Arc::new(SessionContext {
            store: Arc::clone(&store),
            queue: queue_tx,
            heartbeat_interval: config.heartbeat_interval(),
        });
        let matchmaker = Matchmaker::new(queue_rx, catalog, store, config);
        let registry = matchmaker.registry();

        Ok(Self {
            listener,
            sessions,
            matchmaker,
            registry,
            next_connection_id: 1,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<MatchRegistry> {
        Arc::clone(&self.registry)
    }

    /// Handle for ending running matches once [`Server::run`] is dropped.
    pub fn abort_handle(&self) -> AbortHandle {
        self.matchmaker.abort_handle()
    }

    /// Starts the matchmaker and accepts connections forever.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Server {
            listener,
            sessions,
            matchmaker,
            mut next_connection_id,
            ..
        } = self;

        tokio::spawn(matchmaker.run());
        info!("Server started successfully");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let id = next_connection_id;
                    next_connection_id = next_connection_id.wrapping_add(1);
                    debug!("Accepted connection {} from {}", id, addr);

                    let connection = Connection::from_tcp(id, stream);
                    tokio::spawn(run_session(connection, Arc::clone(&sessions)));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}
