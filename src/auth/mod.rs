//! Request-authentication pipeline.
//!
//! A protected request passes, in order:
//!
//! 1. [`rate_limit`]: fixed-window admission per client address.
//! 2. [`credentials`]: `Authorization: Bearer <token>` parsing.
//! 3. [`token`]: HS256 signature and claim checks.
//! 4. [`resolver`]: cache-aside lookup of the principal named by `sub`.
//! 5. [`authorizer`]: ownership short-circuit, then role-level comparison,
//!    for mutations of resources owned by someone else.
//!
//! Account activation goes through [`invitation`], which hands out a
//! one-time token and stores only its SHA-256 digest.

pub mod authorizer;
pub mod credentials;
pub mod invitation;
pub mod password;
pub mod rate_limit;
pub mod resolver;
pub mod token;

pub use authorizer::{AuthorizeError, RoleAuthorizer};
pub use credentials::{BasicAuthConfig, CredentialError};
pub use invitation::{InvitationError, InvitationManager};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use resolver::{CacheFailurePolicy, ResolveError, UserResolver};
pub use token::{BearerClaims, JwtAuthenticator, TokenAuthenticator, TokenError};
