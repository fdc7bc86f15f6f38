//! # Agora
//!
//! Backend for a small social platform. The interesting part is the request
//! pipeline in front of every protected operation:
//!
//! 1. **Admission**: a fixed-window limiter keyed by client address rejects
//!    floods with `429` before any other work happens.
//! 2. **Authentication**: the `Authorization: Bearer` token is an HS256 JWT
//!    whose signature, time window, issuer and audience are all checked.
//! 3. **Principal resolution**: the token subject is turned into a [`store::User`]
//!    through a cache-aside lookup (Redis or in-process), with bounded retries
//!    against the database.
//! 4. **Authorization**: owners may always act on their own resources; anyone
//!    else needs a role whose level meets the route's minimum.
//!
//! Accounts are created inactive and activated through a single-use invitation
//! token. Only its SHA-256 digest is ever stored.

pub mod agora;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
