use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::error::{MutationError, MutationResult};
use crate::models::{Authored, Id};

/// Who is looking at the forum right now.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub logged_in: bool,
    pub user_id: Id,
    #[serde(default)]
    pub username: String,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self { logged_in: false, user_id: -1, username: String::new() }
    }

    pub fn logged_in(user_id: Id, username: impl Into<String>) -> Self {
        Self { logged_in: true, user_id, username: username.into() }
    }

    pub fn owns<A: Authored>(&self, item: &A) -> bool {
        self.logged_in && item.created_by() == self.user_id
    }

    /// Reads the identity carried by a session token. Anything that does not
    /// decode (or has expired) counts as logged out.
    pub fn from_token(token: &str) -> Self {
        match decode_claims(token) {
            Ok(claims) => Self::logged_in(claims.user_id, claims.username),
            Err(e) => {
                log::debug!("session token rejected: {e}");
                Self::anonymous()
            }
        }
    }
}

/// Claims of the forum's session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Id,
    pub exp: usize,
    #[serde(default)]
    pub username: String,
}

/// Decodes the session token's claims. The signing key stays on the server,
/// so only the structure and the expiry are checked here.
pub fn decode_claims(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Read-only view of the current session.
pub trait SessionOracle: Send + Sync {
    fn current_identity(&self) -> Identity;
}

/// Session held in memory; swapped on login/logout.
#[derive(Debug)]
pub struct StaticSession {
    identity: RwLock<Identity>,
}

impl Default for StaticSession {
    fn default() -> Self {
        Self::new(Identity::anonymous())
    }
}

impl StaticSession {
    pub fn new(identity: Identity) -> Self {
        Self { identity: RwLock::new(identity) }
    }

    pub fn from_token(token: &str) -> Self {
        Self::new(Identity::from_token(token))
    }

    pub fn set(&self, identity: Identity) {
        *self.identity.write().unwrap_or_else(|e| e.into_inner()) = identity;
    }

    pub fn clear(&self) {
        self.set(Identity::anonymous());
    }
}

impl SessionOracle for StaticSession {
    fn current_identity(&self) -> Identity {
        self.identity.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// The current identity, or `NotLoggedIn`.
pub fn require_login(oracle: &dyn SessionOracle) -> MutationResult<Identity> {
    let identity = oracle.current_identity();
    if !identity.logged_in {
        return Err(MutationError::NotLoggedIn);
    }
    Ok(identity)
}

pub fn require_owner<A: Authored>(oracle: &dyn SessionOracle, item: &A) -> MutationResult<Identity> {
    let identity = require_login(oracle)?;
    if !identity.owns(item) {
        return Err(MutationError::NotOwner);
    }
    Ok(identity)
}
