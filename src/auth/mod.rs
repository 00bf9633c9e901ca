//! Credentials, tokens and sessions for the Host identity server.

use std::collections::HashMap;
use std::sync::RwLock;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::UserProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user: &UserRecord, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("JWT generation error: {0}")]
    Generation(String),

    #[error("Invalid JWT token: {0}")]
    Invalid(String),

    #[error("JWT secret not configured")]
    MissingSecret,
}

pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| TokenError::Generation(e.to_string()))
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| TokenError::Invalid(e.to_string()))?;

    Ok(token_data.claims)
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Argon2id PHC string for `password`, with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Check `password` against a stored PHC string. A malformed hash never
/// verifies.
pub fn verify_password(password: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
}

impl UserRecord {
    pub fn profile(&self) -> UserProfile {
        let mut profile = UserProfile::new(self.id);
        profile.first_name = Some(self.username.clone());
        profile
            .extra
            .insert("username".to_string(), self.username.clone().into());
        profile
    }
}

/// Fixed set of accounts loaded from configuration. Passwords are hashed
/// once at load and never kept in clear.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserRecord>,
}

impl UserDirectory {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, PasswordError> {
        let mut users = HashMap::with_capacity(pairs.len());
        for (i, (username, password)) in pairs.iter().enumerate() {
            let record = UserRecord {
                id: i as u64 + 1,
                username: username.clone(),
                password_hash: hash_password(password)?,
            };
            users.insert(username.clone(), record);
        }
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// CPU-bound; call from a blocking task inside request handlers.
    pub fn verify(&self, username: &str, password: &str) -> Option<&UserRecord> {
        let user = self.users.get(username)?;
        verify_password(password, &user.password_hash).then_some(user)
    }

    pub fn by_id(&self, id: u64) -> Option<&UserRecord> {
        self.users.values().find(|u| u.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub user_id: u64,
    pub created_at: DateTime<Utc>,
}

/// Cookie sessions, keyed by an opaque random id. Entries older than the
/// registry's lifetime are treated as gone and pruned on the next login.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(&self, entry: &SessionEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at >= self.ttl
    }

    pub fn create(&self, user_id: u64) -> String {
        let now = Utc::now();
        let sid = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_expired(entry, now));
        if sessions.len() < before {
            tracing::debug!("Pruned {} expired sessions", before - sessions.len());
        }
        sessions.insert(
            sid.clone(),
            SessionEntry {
                user_id,
                created_at: now,
            },
        );
        sid
    }

    pub fn get(&self, sid: &str) -> Option<SessionEntry> {
        let entry = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(sid)
            .cloned()?;
        if self.is_expired(&entry, Utc::now()) {
            self.remove(sid);
            return None;
        }
        Some(entry)
    }

    pub fn remove(&self, sid: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(sid)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
