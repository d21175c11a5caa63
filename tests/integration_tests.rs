//! End-to-end tests over real TCP connections.
//!
//! Each test starts its own server on an ephemeral port with short timings
//! and drives it through the terminal client's network layer.

use client::network::Client;
use server::accounts::{AccountDefaults, AccountStore};
use server::config::GameConfig;
use server::network::Server;
use server::specs::SpecCatalog;
use shared::{
    AuthResponse, ClientMessage, Credentials, DeployRequest, Envelope, GameEnd, GameResult,
    ServerMessage,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const SPECS: &str = r#"{
    "troops": {
        "knight": { "name": "Knight", "type": "melee",  "health": 500, "damage": 40, "defence": 0, "range": 1.0, "speed": 1.0, "attack_speed": 1.0, "cost": 5, "target": "ground" },
        "queen":  { "name": "Queen",  "type": "healer", "health": 100, "damage": 0,  "defence": 0, "range": 3.0, "speed": 1.0, "attack_speed": 1.0, "cost": 5, "target": "both" }
    },
    "towers": {
        "guard_tower": { "name": "Guard Tower", "type": "guard", "health": 100, "damage": 0, "defence": 0, "range": 5.0, "attack_speed": 1.0, "target": "both" },
        "king_tower":  { "name": "King Tower",  "type": "king",  "health": 100, "damage": 0, "defence": 0, "range": 6.0, "attack_speed": 1.0, "target": "both" }
    }
}"#;

const WAIT: Duration = Duration::from_secs(10);

struct TestServer {
    addr: String,
    accounts: PathBuf,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.accounts);
    }
}

async fn start_server(tag: &str, match_duration_secs: u64) -> TestServer {
    let config = GameConfig {
        tick_interval_ms: 50,
        troop_attack_interval_ms: 50,
        match_duration_secs,
        crit_chance: 0.0,
        ..GameConfig::default()
    };

    let accounts = std::env::temp_dir().join(format!(
        "tc-it-{}-{}.json",
        tag,
        std::process::id()
    ));
    std::fs::write(&accounts, "{}").unwrap();

    let catalog = SpecCatalog::from_json(SPECS, &["guard_tower", "king_tower"]).unwrap();
    let store = AccountStore::load(&accounts, AccountDefaults::default()).unwrap();

    let server = Server::bind(
        "127.0.0.1:0",
        Arc::new(store),
        Arc::new(catalog),
        Arc::new(config),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    TestServer { addr, accounts }
}

fn creds(username: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        secret: format!("{}-secret", username),
    }
}

/// Reads messages until one satisfies `want`, skipping everything else.
async fn expect<F>(client: &mut Client, want: F) -> ServerMessage
where
    F: Fn(&ServerMessage) -> bool,
{
    timeout(WAIT, async {
        loop {
            match client.next_message().await {
                Some(message) if want(&message) => return message,
                Some(_) => continue,
                None => panic!("Connection closed while waiting"),
            }
        }
    })
    .await
    .expect("Timed out waiting for message")
}

async fn registered_player(addr: &str, username: &str) -> Client {
    let mut client = Client::connect(addr).await.unwrap();
    client
        .send(&ClientMessage::Register(creds(username)))
        .await
        .unwrap();
    assert_eq!(
        client.next_message().await,
        Some(ServerMessage::RegisterResp(AuthResponse::ok()))
    );
    client
}

async fn login(client: &mut Client, username: &str) {
    client
        .send(&ClientMessage::Login(creds(username)))
        .await
        .unwrap();
    assert_eq!(
        client.next_message().await,
        Some(ServerMessage::LoginResp(AuthResponse::ok()))
    );
}

async fn paired_players(addr: &str) -> (Client, Client) {
    let mut alice = registered_player(addr, "alice").await;
    let mut bob = registered_player(addr, "bob").await;
    login(&mut alice, "alice").await;
    login(&mut bob, "bob").await;

    for client in [&mut alice, &mut bob] {
        expect(client, |m| matches!(m, ServerMessage::GameStart(_))).await;
    }
    (alice, bob)
}

fn is_game_end(message: &ServerMessage) -> bool {
    matches!(message, ServerMessage::GameEnd(_))
}

/// AUTHENTICATION TESTS
mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let server = start_server("dup", 5).await;
        let mut client = registered_player(&server.addr, "alice").await;

        client
            .send(&ClientMessage::Register(creds("alice")))
            .await
            .unwrap();
        assert_eq!(
            client.next_message().await,
            Some(ServerMessage::RegisterResp(AuthResponse::err("UserExists")))
        );
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let server = start_server("badlogin", 5).await;
        let mut client = registered_player(&server.addr, "alice").await;

        let wrong = Credentials {
            username: "alice".to_string(),
            secret: "nope".to_string(),
        };
        client.send(&ClientMessage::Login(wrong)).await.unwrap();
        assert_eq!(
            client.next_message().await,
            Some(ServerMessage::LoginResp(AuthResponse::err(
                "InvalidCredential"
            )))
        );
    }

    #[tokio::test]
    async fn same_account_cannot_log_in_twice() {
        let server = start_server("twice", 5).await;
        let mut first = registered_player(&server.addr, "alice").await;
        login(&mut first, "alice").await;

        let mut second = Client::connect(&server.addr).await.unwrap();
        second
            .send(&ClientMessage::Login(creds("alice")))
            .await
            .unwrap();
        assert_eq!(
            second.next_message().await,
            Some(ServerMessage::LoginResp(AuthResponse::err(
                "AlreadyLoggedIn"
            )))
        );
    }

    #[tokio::test]
    async fn deploy_requires_login() {
        let server = start_server("nologin", 5).await;
        let mut client = Client::connect(&server.addr).await.unwrap();

        let deploy = ClientMessage::Deploy(DeployRequest {
            troop: "knight".to_string(),
        });
        client.send(&deploy).await.unwrap();
        assert_eq!(
            client.next_message().await,
            Some(ServerMessage::error("not logged in"))
        );
    }

    #[tokio::test]
    async fn unknown_message_type_is_reported() {
        let server = start_server("unknown", 5).await;
        let mut stream = tokio::net::TcpStream::connect(&server.addr).await.unwrap();

        let envelope = Envelope::new("dance", serde_json::json!({ "style": "waltz" }));
        shared::write_envelope(&mut stream, &envelope).await.unwrap();
        let reply = shared::read_envelope(&mut stream).await.unwrap();
        assert_eq!(
            ServerMessage::from_envelope(reply).unwrap(),
            ServerMessage::error("unknown message type")
        );
    }
}

/// MATCH FLOW TESTS
mod match_tests {
    use super::*;

    #[tokio::test]
    async fn king_kill_wins_and_persists_progress() {
        let server = start_server("kingkill", 30).await;
        let (mut alice, mut bob) = paired_players(&server.addr).await;

        alice
            .send(&ClientMessage::Deploy(DeployRequest {
                troop: "knight".to_string(),
            }))
            .await
            .unwrap();

        expect(&mut alice, |m| matches!(m, ServerMessage::LevelUp(_))).await;
        let alice_end = expect(&mut alice, is_game_end).await;
        let bob_end = expect(&mut bob, is_game_end).await;

        assert_eq!(
            alice_end,
            ServerMessage::GameEnd(GameEnd {
                result: GameResult::Win,
                exp: 30
            })
        );
        assert_eq!(
            bob_end,
            ServerMessage::GameEnd(GameEnd {
                result: GameResult::Loss,
                exp: 5
            })
        );

        // Connections are closed once the match is over.
        assert_eq!(timeout(WAIT, alice.next_message()).await.unwrap(), None);

        let stored = AccountStore::load(&server.accounts, AccountDefaults::default()).unwrap();
        let alice_account = stored.get("alice").await.unwrap();
        let bob_account = stored.get("bob").await.unwrap();
        assert!(alice_account.level > 1);
        assert_eq!(bob_account.level, 1);
        assert_eq!(bob_account.exp, 5);
    }

    #[tokio::test]
    async fn timeout_with_equal_towers_is_a_draw() {
        let server = start_server("draw", 1).await;
        let (mut alice, mut bob) = paired_players(&server.addr).await;

        let update = expect(&mut alice, |m| matches!(m, ServerMessage::StateUpdate(_))).await;
        if let ServerMessage::StateUpdate(update) = update {
            assert_eq!(update.your_towers.len(), 3);
            assert_eq!(update.opponent_towers.len(), 3);
        }

        let draw = ServerMessage::GameEnd(GameEnd {
            result: GameResult::Draw,
            exp: 10,
        });
        assert_eq!(expect(&mut alice, is_game_end).await, draw);
        assert_eq!(expect(&mut bob, is_game_end).await, draw);
    }

    #[tokio::test]
    async fn invalid_deploy_is_reported_and_ignored() {
        let server = start_server("invalid", 1).await;
        let (mut alice, _bob) = paired_players(&server.addr).await;

        alice
            .send(&ClientMessage::Deploy(DeployRequest {
                troop: "dragon".to_string(),
            }))
            .await
            .unwrap();

        let error = expect(&mut alice, |m| matches!(m, ServerMessage::Error(_))).await;
        assert_eq!(error, ServerMessage::error("unknown troop `dragon`"));

        expect(&mut alice, |m| matches!(m, ServerMessage::StateUpdate(_))).await;
        assert_eq!(alice.state().mana(), Some(10));
    }

    #[tokio::test]
    async fn disconnect_forfeits_the_match() {
        let server = start_server("forfeit", 30).await;
        let (mut alice, bob) = paired_players(&server.addr).await;
        drop(bob);

        assert_eq!(
            expect(&mut alice, is_game_end).await,
            ServerMessage::GameEnd(GameEnd {
                result: GameResult::Win,
                exp: 30
            })
        );
    }

    #[tokio::test]
    async fn third_player_keeps_waiting() {
        let server = start_server("third", 2).await;
        let (_alice, _bob) = paired_players(&server.addr).await;

        let mut carol = registered_player(&server.addr, "carol").await;
        login(&mut carol, "carol").await;

        let started = timeout(Duration::from_millis(500), async {
            while let Some(message) = carol.next_message().await {
                if matches!(message, ServerMessage::GameStart(_)) {
                    return true;
                }
            }
            false
        })
        .await;
        assert!(started.is_err(), "carol should not be paired alone");
    }
}
