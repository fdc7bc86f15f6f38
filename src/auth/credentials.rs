//! `Authorization` header parsing and client identification.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("missing authorization header")]
    Missing,
    #[error("malformed authorization header")]
    Malformed,
}

/// Bearer token from `Authorization: Bearer <token>`.
///
/// # Errors
/// `Missing` without a header; `Malformed` for another scheme, an empty
/// token, any whitespace around or inside the token, or a non-ASCII value.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, CredentialError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(CredentialError::Missing)?
        .to_str()
        .map_err(|_| CredentialError::Malformed)?;

    let (scheme, token) = value.split_once(' ').ok_or(CredentialError::Malformed)?;
    if scheme != "Bearer" {
        return Err(CredentialError::Malformed);
    }
    // Exactly one space after the scheme, nothing else
    if token.is_empty() || token.contains(|c: char| c.is_ascii_whitespace()) {
        return Err(CredentialError::Malformed);
    }
    Ok(token)
}

/// Decoded `Authorization: Basic <base64(user:pass)>`.
pub struct BasicCredentials {
    pub username: String,
    pub password: SecretString,
}

/// # Errors
/// `Missing` without a header; `Malformed` for another scheme or a value
/// that is not base64 of `user:pass`.
pub fn basic_credentials(headers: &HeaderMap) -> Result<BasicCredentials, CredentialError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(CredentialError::Missing)?
        .to_str()
        .map_err(|_| CredentialError::Malformed)?;

    let (scheme, encoded) = value.split_once(' ').ok_or(CredentialError::Malformed)?;
    if scheme != "Basic" {
        return Err(CredentialError::Malformed);
    }
    let decoded = Base64::decode_vec(encoded.trim()).map_err(|_| CredentialError::Malformed)?;
    let decoded = String::from_utf8(decoded).map_err(|_| CredentialError::Malformed)?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or(CredentialError::Malformed)?;

    Ok(BasicCredentials {
        username: username.to_string(),
        password: SecretString::from(password.to_string()),
    })
}

/// Operator credentials for basic-auth protected routes.
#[derive(Clone, Debug)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: SecretString,
}

impl BasicAuthConfig {
    /// Constant-time comparison of both fields.
    #[must_use]
    pub fn matches(&self, presented: &BasicCredentials) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(presented.username.as_bytes());
        let pass_ok = self
            .password
            .expose_secret()
            .as_bytes()
            .ct_eq(presented.password.expose_secret().as_bytes());
        (user_ok & pass_ok).into()
    }
}

/// Rate-limit key: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// peer address.
#[must_use]
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(forwarded) = forwarded {
        return forwarded.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
