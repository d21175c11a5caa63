//! Persistent player accounts.
//!
//! The store owns the username -> account map behind one async mutex. Every
//! mutation (registration, end-of-match progress) happens under that mutex and
//! is saved before the mutex is released, so concurrent registrations of
//! different usernames cannot lose each other's writes.
//!
//! A successful login also hands out a [`Presence`] for the username. While it
//! is held the same account cannot log in again, so an account is never in
//! two matches whose write-backs would overwrite each other.

use crate::game::Level;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("account store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Authentication failures. Reported to the client, never fatal.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username already registered")]
    UserExists,

    #[error("unknown username or wrong secret")]
    InvalidCredential,

    #[error("could not persist account: {0}")]
    SaveFailed(#[source] StoreError),

    #[error("matchmaking queue is full")]
    ServerFull,

    #[error("account is already logged in")]
    AlreadyLoggedIn,
}

impl AuthError {
    /// Stable code carried in `register_resp` / `login_resp` statuses.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::UserExists => "UserExists",
            AuthError::InvalidCredential => "InvalidCredential",
            AuthError::SaveFailed(_) => "SaveFailed",
            AuthError::ServerFull => "ServerFull",
            AuthError::AlreadyLoggedIn => "AlreadyLoggedIn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    #[serde(alias = "password_hash")]
    pub secret: String,
    pub level: u32,
    pub exp: u32,
    #[serde(alias = "next_level")]
    pub next_level: u32,
    pub multiplier: f64,
}

impl Account {
    pub fn progress(&self) -> Level {
        Level {
            level: self.level,
            exp: self.exp,
            next_level: self.next_level,
            multiplier: self.multiplier,
        }
    }

    pub fn set_progress(&mut self, level: &Level) {
        self.level = level.level;
        self.exp = level.exp;
        self.next_level = level.next_level;
        self.multiplier = level.multiplier;
    }
}

/// Starting values for freshly registered accounts.
#[derive(Debug, Clone, Copy)]
pub struct AccountDefaults {
    pub next_level: u32,
    pub multiplier: f64,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            next_level: 100,
            multiplier: 1.0,
        }
    }
}

type OnlineSet = Arc<std::sync::Mutex<HashSet<String>>>;

/// Claim on a username while its player is queued or playing. Dropping it
/// frees the name for the next login.
#[derive(Debug)]
pub struct Presence {
    username: String,
    online: OnlineSet,
}

impl Presence {
    fn claim(online: &OnlineSet, username: &str) -> Option<Self> {
        let mut names = online.lock().unwrap_or_else(PoisonError::into_inner);
        if !names.insert(username.to_string()) {
            return None;
        }
        Some(Self {
            username: username.to_string(),
            online: Arc::clone(online),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Drop for Presence {
    fn drop(&mut self) {
        let mut names = self.online.lock().unwrap_or_else(PoisonError::into_inner);
        names.remove(&self.username);
        debug!("{} is offline", self.username);
    }
}

pub struct AccountStore {
    path: Option<PathBuf>,
    accounts: Mutex<HashMap<String, Account>>,
    online: OnlineSet,
    defaults: AccountDefaults,
}

impl AccountStore {
    /// Loads the store from `path`. A missing or malformed file is an error.
    pub fn load(path: impl AsRef<Path>, defaults: AccountDefaults) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let accounts: HashMap<String, Account> = serde_json::from_str(&data)?;
        info!("Loaded {} accounts from {}", accounts.len(), path.display());

        Ok(Self::new(Some(path.to_path_buf()), accounts, defaults))
    }

    /// Builds a store around an existing map. With `path` unset nothing is
    /// ever written to disk.
    pub fn new(
        path: Option<PathBuf>,
        accounts: HashMap<String, Account>,
        defaults: AccountDefaults,
    ) -> Self {
        Self {
            path,
            accounts: Mutex::new(accounts),
            online: OnlineSet::default(),
            defaults,
        }
    }

    pub fn in_memory(defaults: AccountDefaults) -> Self {
        Self::new(None, HashMap::new(), defaults)
    }

    /// Creates a level-1 account. On a failed save the new entry is removed
    /// again, leaving the username free.
    pub async fn register(&self, username: &str, secret: &str) -> Result<(), AuthError> {
        if username.is_empty() || secret.is_empty() {
            return Err(AuthError::InvalidCredential);
        }

        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(username) {
            return Err(AuthError::UserExists);
        }

        let account = Account {
            username: username.to_string(),
            secret: secret.to_string(),
            level: 1,
            exp: 0,
            next_level: self.defaults.next_level,
            multiplier: self.defaults.multiplier,
        };
        accounts.insert(username.to_string(), account);

        if let Err(e) = self.save(&accounts).await {
            accounts.remove(username);
            error!("Rolled back registration of {}: {}", username, e);
            return Err(AuthError::SaveFailed(e));
        }

        info!("Registered account {}", username);
        Ok(())
    }

    /// Checks credentials and returns a snapshot of the account together
    /// with the claim on its username.
    pub async fn login(&self, username: &str, secret: &str) -> Result<(Account, Presence), AuthError> {
        let accounts = self.accounts.lock().await;
        let account = match accounts.get(username) {
            Some(account) if account.secret == secret => account.clone(),
            _ => return Err(AuthError::InvalidCredential),
        };
        let presence = Presence::claim(&self.online, username).ok_or(AuthError::AlreadyLoggedIn)?;
        Ok((account, presence))
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(username)
    }

    /// Writes end-of-match progress for each `(username, level)` and saves.
    pub async fn record_progress(&self, results: &[(String, Level)]) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().await;
        for (username, level) in results {
            if let Some(account) = accounts.get_mut(username) {
                account.set_progress(level);
            }
        }
        self.save(&accounts).await
    }

    pub async fn get(&self, username: &str) -> Option<Account> {
        self.accounts.lock().await.get(username).cloned()
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }

    async fn save(&self, accounts: &HashMap<String, Account>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let data = serde_json::to_vec_pretty(accounts)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tc-accounts-{}-{}.json", tag, std::process::id()))
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let store = AccountStore::in_memory(AccountDefaults::default());
        store.register("alice", "pw").await.unwrap();

        let (account, _presence) = store.login("alice", "pw").await.unwrap();
        assert_eq!(account.level, 1);
        assert_eq!(account.exp, 0);
        assert_eq!(account.next_level, 100);
        assert_eq!(account.multiplier, 1.0);
    }

    #[tokio::test]
    async fn test_duplicate_register_keeps_first_account() {
        let store = AccountStore::in_memory(AccountDefaults::default());
        store.register("alice", "first").await.unwrap();

        let err = store.register("alice", "second").await.unwrap_err();
        assert!(matches!(err, AuthError::UserExists));
        assert_eq!(err.code(), "UserExists");

        let account = store.get("alice").await.unwrap();
        assert_eq!(account.secret, "first");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let store = AccountStore::in_memory(AccountDefaults::default());
        store.register("alice", "pw").await.unwrap();

        assert!(matches!(
            store.login("alice", "nope").await,
            Err(AuthError::InvalidCredential)
        ));
        assert!(matches!(
            store.login("bob", "pw").await,
            Err(AuthError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn test_second_login_rejected_while_online() {
        let store = AccountStore::in_memory(AccountDefaults::default());
        store.register("alice", "pw").await.unwrap();

        let (_, presence) = store.login("alice", "pw").await.unwrap();
        assert_eq!(presence.username(), "alice");
        assert!(store.is_online("alice"));

        let err = store.login("alice", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyLoggedIn));
        assert_eq!(err.code(), "AlreadyLoggedIn");

        // A wrong secret is still reported as such.
        assert!(matches!(
            store.login("alice", "nope").await,
            Err(AuthError::InvalidCredential)
        ));

        drop(presence);
        assert!(!store.is_online("alice"));
        assert!(store.login("alice", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_progress_from_one_match_at_a_time() {
        let store = AccountStore::in_memory(AccountDefaults::default());
        store.register("alice", "pw").await.unwrap();

        let (account, presence) = store.login("alice", "pw").await.unwrap();
        assert!(store.login("alice", "pw").await.is_err());

        let mut progress = account.progress();
        progress.gain_exp(30);
        store
            .record_progress(&[("alice".to_string(), progress)])
            .await
            .unwrap();
        drop(presence);

        // The next match starts from what the previous one stored.
        let (account, _presence) = store.login("alice", "pw").await.unwrap();
        let mut progress = account.progress();
        progress.gain_exp(30);
        store
            .record_progress(&[("alice".to_string(), progress)])
            .await
            .unwrap();

        assert_eq!(store.get("alice").await.unwrap().exp, 60);
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let path = std::env::temp_dir()
            .join(format!("tc-missing-dir-{}", std::process::id()))
            .join("accounts.json");
        let store = AccountStore::new(Some(path), HashMap::new(), AccountDefaults::default());

        let err = store.register("alice", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::SaveFailed(_)));
        assert_eq!(err.code(), "SaveFailed");
        assert!(store.get("alice").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let path = temp_path("reload");
        std::fs::write(&path, "{}").unwrap();

        let store = AccountStore::load(&path, AccountDefaults::default()).unwrap();
        store.register("alice", "pw").await.unwrap();
        store
            .record_progress(&[(
                "alice".to_string(),
                Level {
                    level: 3,
                    exp: 7,
                    next_level: 121,
                    multiplier: 1.3,
                },
            )])
            .await
            .unwrap();

        let reloaded = AccountStore::load(&path, AccountDefaults::default()).unwrap();
        let account = reloaded.get("alice").await.unwrap();
        assert_eq!(account.level, 3);
        assert_eq!(account.exp, 7);
        assert_eq!(account.next_level, 121);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("nextLevel"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reads_legacy_field_names() {
        let json = r#"{ "old": { "username": "old", "password_hash": "pw", "level": 2,
                        "exp": 40, "next_level": 110, "multiplier": 1.2 } }"#;
        let accounts: HashMap<String, Account> = serde_json::from_str(json).unwrap();
        let account = &accounts["old"];
        assert_eq!(account.secret, "pw");
        assert_eq!(account.next_level, 110);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = temp_path("absent");
        assert!(matches!(
            AccountStore::load(&path, AccountDefaults::default()),
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_all_land() {
        let path = temp_path("concurrent");
        std::fs::write(&path, "{}").unwrap();
        let store = std::sync::Arc::new(
            AccountStore::load(&path, AccountDefaults::default()).unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.register(&format!("user{}", i), "pw").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reloaded = AccountStore::load(&path, AccountDefaults::default()).unwrap();
        assert_eq!(reloaded.len().await, 8);

        std::fs::remove_file(&path).unwrap();
    }
}
