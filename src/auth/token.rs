//! HS256 bearer tokens.
//!
//! Compact JWS: `base64url(header).base64url(claims).base64url(mac)` where the
//! MAC is HMAC-SHA256 over the first two segments with the shared secret.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const ALG_HS256: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALG_HS256.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BearerClaims {
    pub sub: i64,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not valid yet")]
    NotYetValid,
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("invalid signing key")]
    InvalidKey,
    #[error("token could not be encoded: {0}")]
    Encoding(String),
}

/// Issues and verifies bearer tokens.
pub trait TokenAuthenticator: Send + Sync {
    /// # Errors
    /// Fails only when the claims cannot be serialized.
    fn generate_token(&self, claims: &BearerClaims) -> Result<String, TokenError>;

    /// # Errors
    /// Any [`TokenError`] describing why the token was refused.
    fn validate_token(&self, token: &str) -> Result<BearerClaims, TokenError>;

    /// Sign a fresh claim set for `user_id`.
    ///
    /// # Errors
    /// Fails only when the claims cannot be serialized.
    fn issue_for(&self, user_id: i64) -> Result<String, TokenError>;
}

#[derive(Clone)]
pub struct JwtAuthenticator {
    mac: HmacSha256,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Encoding(e.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

impl JwtAuthenticator {
    /// Issuer and audience are both set to `service`, the configured service name.
    ///
    /// # Errors
    /// `TokenError::InvalidKey` if the secret is empty.
    pub fn new(secret: &SecretString, service: &str, ttl: Duration) -> Result<Self, TokenError> {
        let key = secret.expose_secret().as_bytes();
        if key.is_empty() {
            return Err(TokenError::InvalidKey);
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|_| TokenError::InvalidKey)?;
        Ok(Self {
            mac,
            issuer: service.to_string(),
            audience: service.to_string(),
            ttl,
        })
    }

    /// Validate against a caller-supplied clock, in Unix seconds.
    ///
    /// # Errors
    /// Any [`TokenError`] describing why the token was refused.
    pub fn validate_token_at(&self, token: &str, now: i64) -> Result<BearerClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let sig_b64 = parts.next().ok_or(TokenError::Malformed)?;
        if parts.next().is_some() {
            return Err(TokenError::Malformed);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG_HS256 {
            return Err(TokenError::InvalidSignature);
        }

        let signature =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::InvalidSignature)?;
        let mut mac = self.mac.clone();
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        // verify_slice compares in constant time
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: BearerClaims = b64d_json(claims_b64)?;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        if claims.iss != self.issuer {
            return Err(TokenError::IssuerMismatch);
        }
        if claims.aud != self.audience {
            return Err(TokenError::AudienceMismatch);
        }

        Ok(claims)
    }

    /// Claim set for `user_id` issued at `now`.
    #[must_use]
    pub fn claims_for(&self, user_id: i64, now: i64) -> BearerClaims {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        BearerClaims {
            sub: user_id,
            iat: now,
            nbf: now,
            exp: now.saturating_add(ttl),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        }
    }
}

impl TokenAuthenticator for JwtAuthenticator {
    fn generate_token(&self, claims: &BearerClaims) -> Result<String, TokenError> {
        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    fn validate_token(&self, token: &str) -> Result<BearerClaims, TokenError> {
        self.validate_token_at(token, Utc::now().timestamp())
    }

    fn issue_for(&self, user_id: i64) -> Result<String, TokenError> {
        let claims = self.claims_for(user_id, Utc::now().timestamp());
        self.generate_token(&claims)
    }
}
