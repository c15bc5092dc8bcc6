//! Small helpers for auth validation and OTP handling.

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Number of digits in a one-time code.
pub(super) const OTP_LENGTH: usize = 6;

/// Length of a set-password token (see `generate_reset_token`).
pub(super) const RESET_TOKEN_LENGTH: usize = 32;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"));

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_REGEX.is_match(email_normalized)
}

/// Password strength policy: at least 8 characters with lowercase,
/// uppercase, and a digit.
pub(super) fn strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Generate a 6-digit numeric one-time code.
///
/// The raw code is only sent to the user; the database stores a hash.
pub(super) fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{code:0width$}", width = OTP_LENGTH)
}

/// Generate an opaque set-password token for pre-authorized resets.
///
/// Long enough that guessing is hopeless within a challenge's lifetime;
/// stored hashed, like the numeric codes.
pub(super) fn generate_reset_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a one-time code so raw codes never touch the database.
pub(super) fn hash_otp(code: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.finalize().to_vec()
}

/// Syntactic check before hashing a submitted code.
pub(super) fn well_formed_otp(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

/// Shape check for the reset endpoint's secret, which is either an emailed
/// 6-digit code or a set-password token.
pub(super) fn well_formed_reset_secret(secret: &str) -> bool {
    well_formed_otp(secret)
        || (secret.len() == RESET_TOKEN_LENGTH && secret.chars().all(|c| c.is_ascii_alphanumeric()))
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
