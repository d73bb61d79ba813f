//! # Stockpile (Verification & Session Authority)
//!
//! `stockpile` is the authentication core of the Stockpile inventory backend. It
//! issues verification references, delivers one-time codes out of band, and
//! validates the bearer tokens every other endpoint relies on.
//!
//! ## Verification References
//!
//! A reference is a persisted, short-lived record bound to one user and one
//! objective (`access-session`, `set-password`, ...). It starts `INACTIVE`, gains
//! a delivery channel and a one-time code, and becomes `ACTIVE` exactly once when
//! the code is confirmed. Expiry always wins over status: a reference past its
//! `expires_at` never authorizes anything, and revocation only moves `expires_at`
//! backwards.
//!
//! ## Tokens
//!
//! Two HS256 token shapes are minted and never decode as one another:
//!
//! - **Access tokens** (`Authorization: Bearer`) carry `{ref, role, exp}` and back
//!   an ongoing session.
//! - **Action tokens** (`X-Action-Token`) carry `{ref, objective, exp}` and
//!   authorize one privileged step such as setting a password.
//!
//! Every request re-validates the token against the stored reference and the
//! owning user, so logout and account deactivation take effect immediately. The
//! role embedded in an access token is trusted for the token's lifetime.

pub mod accounts;
pub mod api;
pub mod cli;
pub mod error;
pub mod gate;
pub mod notify;
pub mod token;
pub mod verification;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
