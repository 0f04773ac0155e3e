use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::models::{SessionUser, UserRole};

/// Claims as the backend issues them. Identity claims come in two spellings
/// depending on the token framework in use server-side, so each has a
/// fallback. `canReportBugs` arrives as the string "true"/"false".
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub nameid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unique_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "canReportBugs")]
    pub can_report_bugs: Option<String>,
    pub exp: i64,
}

/// Decode the access token payload into a session identity.
///
/// The client never holds the signing key; like any browser client it reads
/// the payload without verifying the signature and trusts the server to have
/// rejected forged tokens. An expired, malformed, or incomplete token is
/// treated exactly like no token at all.
pub fn decode_user(token: &str) -> Result<SessionUser> {
    let claims = decode_claims(token)?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(ApiError::Unauthenticated("session expired".into()));
    }

    let id = claims
        .nameid
        .or(claims.sub)
        .ok_or_else(|| ApiError::Unauthenticated("token has no user id".into()))?;
    let name = claims
        .name
        .or(claims.unique_name)
        .ok_or_else(|| ApiError::Unauthenticated("token has no user name".into()))?;
    let role: UserRole = claims
        .role
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(ApiError::Unauthenticated)?;

    Ok(SessionUser {
        id,
        name,
        email: claims.email.unwrap_or_default(),
        role,
        can_report_bugs: claims.can_report_bugs.as_deref() == Some("true"),
    })
}

fn decode_claims(token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    // accept whatever the server signs with; we never check the signature
    validation.algorithms = vec![
        Algorithm::HS256,
        Algorithm::HS384,
        Algorithm::HS512,
        Algorithm::RS256,
        Algorithm::RS384,
        Algorithm::RS512,
        Algorithm::ES256,
        Algorithm::ES384,
    ];
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| ApiError::Unauthenticated(format!("bad token: {e}")))?;
    Ok(data.claims)
}

#[cfg(test)]
pub(crate) fn make_token(claims: &Claims) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};
    encode(&Header::default(), claims, &EncodingKey::from_secret(b"test")).unwrap()
}
