use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::auth;
use crate::error::{ApiError, Result};
use crate::models::{RegisterRequest, RegisteredUser, SessionUser};

/// The persisted credential pair. This file is the only client-side state
/// that outlives the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// File-backed storage for the token pair, read and written whole on each
/// access. Any unreadable or unparsable file counts as no session.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        TokenStore { path }
    }

    pub fn load(&self) -> Option<TokenPair> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, pair: &TokenPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(pair).map_err(|e| {
            ApiError::Io(std::io::Error::other(e))
        })?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Holds the signed-in identity for the lifetime of the process.
///
/// Unauthenticated --sign_in--> Authenticated --sign_out/expiry-->
/// Unauthenticated. Constructed once at startup and passed to whatever needs
/// to gate on the current user.
pub struct SessionManager {
    api: ApiClient,
    user: Option<SessionUser>,
}

impl SessionManager {
    /// Decode any persisted token synchronously so the app starts in the
    /// right state instead of flashing unauthenticated. A token that fails
    /// to decode or is past expiry is discarded on the spot.
    pub fn restore(api: ApiClient) -> Self {
        let user = match api.store().load() {
            Some(pair) => match auth::decode_user(&pair.token) {
                Ok(user) => {
                    log::debug!("restored session for {}", user.email);
                    Some(user)
                }
                Err(e) => {
                    log::debug!("stored token rejected: {e}");
                    let _ = api.store().clear();
                    None
                }
            },
            None => None,
        };
        SessionManager { api, user }
    }

    pub fn current_user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<SessionUser> {
        let resp = self.api.login(email, password).await?;
        self.api.store().save(&TokenPair {
            token: resp.token.clone(),
            refresh_token: resp.refresh_token.clone(),
        })?;

        let mut user = auth::decode_user(&resp.token)?;
        // canReportBugs is authoritative on the login response itself.
        user.can_report_bugs = resp.can_report_bugs;
        if user.email.is_empty() {
            user.email = email.to_string();
        }
        self.user = Some(user.clone());
        Ok(user)
    }

    /// Tell the server to revoke the refresh token, best effort, then drop
    /// all local session state either way.
    pub async fn sign_out(&mut self) {
        if let Some(pair) = self.api.store().load() {
            if let Err(e) = self.api.logout(&pair.refresh_token).await {
                log::warn!("logout call failed: {e}");
            }
        }
        let _ = self.api.store().clear();
        self.user = None;
    }

    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
        role_id: u32,
    ) -> Result<RegisteredUser> {
        validate_registration(name, email, password, confirm_password)?;
        self.api
            .register(&RegisterRequest {
                user_name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                role_id,
            })
            .await
    }
}

/// Same checks the registration form runs before submitting.
pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ApiError::Invalid("Name is required".into()));
    }
    if email.trim().is_empty() {
        return Err(ApiError::Invalid("Email is required".into()));
    }
    if !plausible_email(email) {
        return Err(ApiError::Invalid("Please enter a valid email address".into()));
    }
    if password.len() < 6 {
        return Err(ApiError::Invalid(
            "Password must be at least 6 characters".into(),
        ));
    }
    if password != confirm_password {
        return Err(ApiError::Invalid("Passwords do not match".into()));
    }
    Ok(())
}

fn plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
