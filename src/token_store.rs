//! Persisted Session record.
//!
//! Each Session field lives under its own key in the `auth` tree, JSON
//! encoded, so a partially written record is detectable on load.

use crate::error::Result;
use crate::models::{AuthMode, Session, User};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const KEY_ACCESS_TOKEN: &str = "accessToken";
pub const KEY_USER: &str = "user";
pub const KEY_AUTH_TIMESTAMP: &str = "authTimestamp";
pub const KEY_PERSISTENT_LOGIN: &str = "persistentLogin";
pub const KEY_AUTH_MODE: &str = "authMode";

pub const SESSION_KEYS: &[&str] = &[
    KEY_ACCESS_TOKEN,
    KEY_USER,
    KEY_PERSISTENT_LOGIN,
    KEY_AUTH_TIMESTAMP,
    KEY_AUTH_MODE,
];

const AUTH_TREE: &str = "auth";

#[derive(Clone)]
pub struct TokenStore {
    tree: sled::Tree,
}

impl TokenStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(AUTH_TREE)?,
        })
    }

    /// Throwaway store backed by a temporary database.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::open(&db)
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.tree.insert(key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    /// Returns the stored Session, or `None` if no complete one is present.
    ///
    /// A missing timestamp reads as the epoch, so such a record is always
    /// treated as expired.
    pub fn load(&self) -> Result<Option<Session>> {
        let access_token: Option<String> = self.get(KEY_ACCESS_TOKEN)?;
        let user: Option<User> = self.get(KEY_USER)?;
        let (Some(access_token), Some(user)) = (access_token, user) else {
            return Ok(None);
        };

        let millis: i64 = self.get(KEY_AUTH_TIMESTAMP)?.unwrap_or(0);
        let auth_timestamp: DateTime<Utc> = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default();

        Ok(Some(Session {
            access_token,
            user,
            auth_timestamp,
            persistent_login: self.get(KEY_PERSISTENT_LOGIN)?.unwrap_or(false),
            auth_mode: self.get(KEY_AUTH_MODE)?.unwrap_or(AuthMode::Production),
        }))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        self.put(KEY_ACCESS_TOKEN, &session.access_token)?;
        self.put(KEY_USER, &session.user)?;
        self.put(KEY_AUTH_TIMESTAMP, &session.auth_timestamp.timestamp_millis())?;
        self.put(KEY_PERSISTENT_LOGIN, &session.persistent_login)?;
        self.put(KEY_AUTH_MODE, &session.auth_mode)?;
        self.tree.flush()?;
        Ok(())
    }

    /// Remove the Session keys only.
    pub fn clear(&self) -> Result<()> {
        for key in SESSION_KEYS {
            self.tree.remove(key)?;
        }
        self.tree.flush()?;
        Ok(())
    }

    /// Wipe every key in the auth tree.
    pub fn clear_all(&self) -> Result<()> {
        self.tree.clear()?;
        self.tree.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.tree.contains_key(key)?)
    }

    pub fn is_empty(&self) -> bool {
        SESSION_KEYS
            .iter()
            .all(|key| !self.tree.contains_key(key).unwrap_or(true))
    }

    /// Overwrite the stored timestamp, leaving the rest of the record alone.
    pub fn set_auth_timestamp(&self, at: DateTime<Utc>) -> Result<()> {
        self.put(KEY_AUTH_TIMESTAMP, &at.timestamp_millis())
    }
}
