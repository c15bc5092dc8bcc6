//! # Bodega (Inventory & Billing API)
//!
//! `bodega` is a multi-tenant inventory and billing backend. Shop owners
//! register with email + password, prove control of their address with a
//! one-time code, and then manage shops (optionally nested under a parent
//! shop they own) and the products inside them.
//!
//! ## Tenant Model (Shops & Products)
//!
//! Shops are the tenant boundary. A shop may reference a parent shop, but
//! only if the parent exists and belongs to the same owner; the ownership
//! check and the insert happen in one transaction so a shop can never be
//! created pointing at someone else's parent.
//!
//! ## Authentication
//!
//! - **Registration** creates a `pending_verification` user plus a 6-digit
//!   OTP challenge delivered by email. Verification flips the user to
//!   `active`; login before that returns a `complete-verification` action
//!   instead of a session.
//! - **Password reset** runs the same challenge machinery with a separate
//!   purpose: code entry authorizes the reset, the final password write
//!   consumes the challenge.
//! - **Google sign-in** verifies the ID token against Google, links the
//!   subject to a local account, and asks password-less accounts to set
//!   one through a pre-authorized reset challenge bound to a one-time
//!   token returned with the `set-password` action.
//!
//! Sessions are stateless: a signed, time-limited token carried in an
//! `HttpOnly` cookie. Validity is purely signature + expiry.

pub mod api;
pub mod cli;
pub mod flow;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
