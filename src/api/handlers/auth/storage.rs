//! Database helpers for users and verification challenges.
//!
//! Challenge rows implement the OTP state machine: `Pending` (live row) ->
//! `Verified`/`ResetAuthorized` (consumed or authorized) with attempt and
//! expiry bookkeeping. Every verify path locks the row with
//! `SELECT ... FOR UPDATE`, so exactly one of N concurrent attempts can
//! consume a challenge; the rest find no live row and fail.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::google::GoogleIdentity;
use super::state::AuthConfig;
use super::utils::{generate_otp, generate_reset_token, hash_otp, is_unique_violation};

/// Challenge purpose; one live challenge is allowed per (user, purpose).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum ChallengePurpose {
    Register,
    Reset,
}

impl ChallengePurpose {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Reset => "reset",
        }
    }

    fn email_template(self) -> &'static str {
        match self {
            Self::Register => "register_otp",
            Self::Reset => "reset_otp",
        }
    }
}

#[derive(Debug)]
pub(super) struct UserRecord {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) name: String,
    pub(super) password_hash: Option<String>,
    pub(super) status: String,
}

impl UserRecord {
    pub(super) fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Outcome when attempting to create a new user + register challenge.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created { user_id: Uuid },
    AlreadyRegistered,
    PendingVerification,
}

/// Outcome of submitting a code against a live challenge.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ChallengeOutcome {
    Verified,
    /// Wrong code; the challenge stays live until attempts run out.
    Mismatch { attempts_left: i32 },
    /// Too many wrong codes; the challenge was invalidated.
    Exhausted,
    /// Challenge past its expiry; correct codes are irrelevant.
    Expired,
    /// No live challenge (never issued, replaced, or already consumed).
    Missing,
}

/// Outcome of the final password write in the reset flow.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ResetOutcome {
    Done,
    NotAuthorized,
    Expired,
    CodeMismatch,
}

#[derive(Debug)]
pub(super) enum ResendOutcome {
    Queued { user_id: Uuid },
    Cooldown,
    Noop,
}

#[derive(Debug)]
pub(super) enum InitiateResetOutcome {
    Started { user_id: Uuid },
    Cooldown,
    UnknownEmail,
}

#[derive(Debug)]
pub(super) struct GoogleUser {
    pub(super) user_id: Uuid,
    pub(super) email: String,
    pub(super) name: String,
    pub(super) has_password: bool,
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(super) async fn lookup_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, name, password_hash, status
        FROM users
        WHERE email = $1
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup user by email")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        status: row.get("status"),
    }))
}

pub(super) async fn lookup_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, name, password_hash, status
        FROM users
        WHERE id = $1
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup user by id")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        status: row.get("status"),
    }))
}

/// Create a `pending_verification` user plus their register challenge.
///
/// User insert, challenge insert, and email outbox row share a transaction
/// so a half-registered account can never exist.
pub(super) async fn create_pending_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    password_hash: &str,
    config: &AuthConfig,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = "SELECT status FROM users WHERE email = $1 LIMIT 1";
    let existing = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to check existing user")?;

    if let Some(row) = existing {
        let status: String = row.get("status");
        let _ = tx.rollback().await;
        if status == "active" {
            return Ok(SignupOutcome::AlreadyRegistered);
        }
        return Ok(SignupOutcome::PendingVerification);
    }

    let query = r"
        INSERT INTO users (email, name, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let row = sqlx::query(query)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            // Lost a race with a concurrent signup for the same email.
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::AlreadyRegistered);
            }
            return Err(err).context("failed to insert user");
        }
    };

    issue_challenge(&mut tx, user_id, email, ChallengePurpose::Register, config).await?;

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created { user_id })
}

/// Replace any live challenge for (user, purpose) with a fresh code and
/// enqueue the delivery email. The raw code never leaves the transaction.
pub(super) async fn issue_challenge(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    email: &str,
    purpose: ChallengePurpose,
    config: &AuthConfig,
) -> Result<()> {
    retire_live_challenge(tx, user_id, purpose).await?;

    let code = generate_otp();
    let query = r"
        INSERT INTO verification_challenges (user_id, purpose, otp_hash, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(hash_otp(&code))
        .bind(config.otp_ttl_seconds())
        .execute(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert verification challenge")?;

    let payload = json!({
        "email": email,
        "code": code,
        "ttl_minutes": config.otp_ttl_seconds() / 60,
    });
    let payload_text = serde_json::to_string(&payload).context("failed to serialize otp email")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    sqlx::query(query)
        .bind(email)
        .bind(purpose.email_template())
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert email outbox row")?;

    Ok(())
}

/// Create an already-authorized reset challenge with no code delivery.
/// Used after Google sign-in proves the identity out-of-band.
///
/// Returns the one-time set-password token. Only its hash is stored, and
/// `reset_password` demands the token back, so the grant is bound to the
/// client that completed the Google sign-in rather than to the user id.
pub(super) async fn preauthorize_reset_challenge(
    pool: &PgPool,
    user_id: Uuid,
    config: &AuthConfig,
) -> Result<String> {
    let mut tx = pool.begin().await.context("begin preauthorize transaction")?;

    retire_live_challenge(&mut tx, user_id, ChallengePurpose::Reset).await?;

    let token = generate_reset_token();
    let query = r"
        INSERT INTO verification_challenges
            (user_id, purpose, otp_hash, otp_required, authorized_at, expires_at)
        VALUES ($1, 'reset', $2, FALSE, NOW(), NOW() + ($3 * INTERVAL '1 second'))
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(hash_otp(&token))
        .bind(config.otp_ttl_seconds())
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert preauthorized challenge")?;

    tx.commit().await.context("commit preauthorize transaction")?;
    Ok(token)
}

async fn retire_live_challenge(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    purpose: ChallengePurpose,
) -> Result<()> {
    // Replaced codes stop working immediately; at most one live row remains.
    let query = r"
        UPDATE verification_challenges
        SET consumed_at = NOW()
        WHERE user_id = $1
          AND purpose = $2
          AND consumed_at IS NULL
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&mut **tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to retire previous challenge")?;
    Ok(())
}

/// Submit a code for the register flow. On success the challenge is
/// consumed and the user flips to `active` in the same transaction.
pub(super) async fn verify_register_challenge(
    pool: &PgPool,
    user_id: Uuid,
    code: &str,
    config: &AuthConfig,
) -> Result<ChallengeOutcome> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;
    let outcome = check_challenge(&mut tx, user_id, ChallengePurpose::Register, code, config).await?;

    if outcome == ChallengeOutcome::Verified {
        let query = r"
            UPDATE verification_challenges
            SET consumed_at = NOW()
            WHERE user_id = $1 AND purpose = 'register' AND consumed_at IS NULL
        ";
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to consume register challenge")?;

        let query = r"
            UPDATE users
            SET status = 'active', updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to activate user")?;
    }

    tx.commit().await.context("commit verify transaction")?;
    Ok(outcome)
}

/// Submit a code for the forgot-password flow. On success the challenge is
/// marked authorized (not consumed); the password write consumes it.
pub(super) async fn authorize_reset_challenge(
    pool: &PgPool,
    user_id: Uuid,
    code: &str,
    config: &AuthConfig,
) -> Result<ChallengeOutcome> {
    let mut tx = pool.begin().await.context("begin authorize transaction")?;
    let outcome = check_challenge(&mut tx, user_id, ChallengePurpose::Reset, code, config).await?;

    if outcome == ChallengeOutcome::Verified {
        let query = r"
            UPDATE verification_challenges
            SET authorized_at = NOW()
            WHERE user_id = $1 AND purpose = 'reset' AND consumed_at IS NULL
        ";
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to authorize reset challenge")?;
    }

    tx.commit().await.context("commit authorize transaction")?;
    Ok(outcome)
}

/// Lock the live challenge row and classify the submitted code.
///
/// Expiry and attempt exhaustion retire the row so later submissions see
/// `Missing` instead of re-running the same checks.
async fn check_challenge(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    purpose: ChallengePurpose,
    code: &str,
    config: &AuthConfig,
) -> Result<ChallengeOutcome> {
    let query = r"
        SELECT id, otp_hash, attempts,
               (expires_at <= NOW()) AS expired
        FROM verification_challenges
        WHERE user_id = $1
          AND purpose = $2
          AND consumed_at IS NULL
        LIMIT 1
        FOR UPDATE
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .fetch_optional(&mut **tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lock challenge row")?;

    let Some(row) = row else {
        return Ok(ChallengeOutcome::Missing);
    };

    let challenge_id: Uuid = row.get("id");
    let expired: bool = row.get("expired");
    if expired {
        consume_challenge_row(tx, challenge_id).await?;
        return Ok(ChallengeOutcome::Expired);
    }

    let stored_hash: Vec<u8> = row.get("otp_hash");
    if stored_hash == hash_otp(code) {
        return Ok(ChallengeOutcome::Verified);
    }

    let attempts: i32 = row.get("attempts");
    let attempts = attempts.saturating_add(1);
    if attempts >= config.max_otp_attempts() {
        consume_challenge_row(tx, challenge_id).await?;
        return Ok(ChallengeOutcome::Exhausted);
    }

    let query = "UPDATE verification_challenges SET attempts = $2 WHERE id = $1";
    sqlx::query(query)
        .bind(challenge_id)
        .bind(attempts)
        .execute(&mut **tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to record failed attempt")?;

    Ok(ChallengeOutcome::Mismatch {
        attempts_left: config.max_otp_attempts() - attempts,
    })
}

async fn consume_challenge_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    challenge_id: Uuid,
) -> Result<()> {
    let query = "UPDATE verification_challenges SET consumed_at = NOW() WHERE id = $1";
    sqlx::query(query)
        .bind(challenge_id)
        .execute(&mut **tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to consume challenge")?;
    Ok(())
}

/// Final step of the reset flow: requires an authorized, unexpired, live
/// challenge; writes the new password and consumes the challenge atomically.
///
/// The submitted secret (emailed code or set-password token) is always
/// re-checked against the stored hash. A user id alone never suffices.
pub(super) async fn reset_password(
    pool: &PgPool,
    user_id: Uuid,
    submitted_code: &str,
    new_password_hash: &str,
) -> Result<ResetOutcome> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = r"
        SELECT id, otp_hash,
               (authorized_at IS NOT NULL) AS authorized,
               (expires_at <= NOW()) AS expired
        FROM verification_challenges
        WHERE user_id = $1
          AND purpose = 'reset'
          AND consumed_at IS NULL
        LIMIT 1
        FOR UPDATE
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lock reset challenge")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(ResetOutcome::NotAuthorized);
    };

    let authorized: bool = row.get("authorized");
    if !authorized {
        let _ = tx.rollback().await;
        return Ok(ResetOutcome::NotAuthorized);
    }

    let expired: bool = row.get("expired");
    if expired {
        let challenge_id: Uuid = row.get("id");
        consume_challenge_row(&mut tx, challenge_id).await?;
        tx.commit().await.context("commit expired reset")?;
        return Ok(ResetOutcome::Expired);
    }

    let stored_hash: Vec<u8> = row.get("otp_hash");
    if hash_otp(submitted_code) != stored_hash {
        let _ = tx.rollback().await;
        return Ok(ResetOutcome::CodeMismatch);
    }

    let challenge_id: Uuid = row.get("id");
    consume_challenge_row(&mut tx, challenge_id).await?;

    let query = r"
        UPDATE users
        SET password_hash = $2, updated_at = NOW()
        WHERE id = $1
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to update password")?;

    tx.commit().await.context("commit reset transaction")?;
    Ok(ResetOutcome::Done)
}

/// Start the forgot-password flow for an email.
///
/// Shares the resend cooldown, so re-initiating cannot be used to send
/// codes faster than an explicit resend would.
pub(super) async fn initiate_reset(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<InitiateResetOutcome> {
    let Some(user) = lookup_user_by_email(pool, email).await? else {
        return Ok(InitiateResetOutcome::UnknownEmail);
    };

    let mut tx = pool.begin().await.context("begin forgot transaction")?;

    if resend_cooldown_active(
        &mut tx,
        user.id,
        ChallengePurpose::Reset,
        config.resend_cooldown_seconds(),
    )
    .await?
    {
        let _ = tx.rollback().await;
        return Ok(InitiateResetOutcome::Cooldown);
    }

    issue_challenge(&mut tx, user.id, &user.email, ChallengePurpose::Reset, config).await?;
    tx.commit().await.context("commit forgot transaction")?;

    Ok(InitiateResetOutcome::Started { user_id: user.id })
}

/// Reissue the register code for a pending account, honoring the cooldown.
pub(super) async fn resend_register_challenge(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<ResendOutcome> {
    let Some(user) = lookup_user_by_email(pool, email).await? else {
        return Ok(ResendOutcome::Noop);
    };
    if user.is_active() {
        return Ok(ResendOutcome::Noop);
    }
    resend_challenge(pool, &user, ChallengePurpose::Register, config).await
}

/// Reissue the reset code for a user id, honoring the cooldown.
pub(super) async fn resend_reset_challenge(
    pool: &PgPool,
    user_id: Uuid,
    config: &AuthConfig,
) -> Result<ResendOutcome> {
    let Some(user) = lookup_user_by_id(pool, user_id).await? else {
        return Ok(ResendOutcome::Noop);
    };
    resend_challenge(pool, &user, ChallengePurpose::Reset, config).await
}

async fn resend_challenge(
    pool: &PgPool,
    user: &UserRecord,
    purpose: ChallengePurpose,
    config: &AuthConfig,
) -> Result<ResendOutcome> {
    let mut tx = pool.begin().await.context("begin resend transaction")?;

    if resend_cooldown_active(&mut tx, user.id, purpose, config.resend_cooldown_seconds()).await? {
        let _ = tx.rollback().await;
        return Ok(ResendOutcome::Cooldown);
    }

    issue_challenge(&mut tx, user.id, &user.email, purpose, config).await?;
    tx.commit().await.context("commit resend transaction")?;

    Ok(ResendOutcome::Queued { user_id: user.id })
}

async fn resend_cooldown_active(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    purpose: ChallengePurpose,
    cooldown_seconds: i64,
) -> Result<bool> {
    // Cooldown keys off the last issued code, consumed or not.
    let query = r"
        SELECT 1 AS one
        FROM verification_challenges
        WHERE user_id = $1
          AND purpose = $2
          AND created_at > NOW() - ($3 * INTERVAL '1 second')
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(cooldown_seconds)
        .fetch_optional(&mut **tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to check resend cooldown")?;
    Ok(row.is_some())
}

/// Find or create the local account for a verified Google identity.
/// Newly created accounts are active immediately; Google proved the email.
pub(super) async fn ensure_google_user(
    pool: &PgPool,
    identity: &GoogleIdentity,
) -> Result<GoogleUser> {
    let mut tx = pool.begin().await.context("begin google transaction")?;

    let query = r"
        SELECT id, email, name, password_hash
        FROM users
        WHERE google_subject = $1
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(&identity.subject)
        .fetch_optional(&mut *tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup google subject")?;

    if let Some(row) = row {
        let password_hash: Option<String> = row.get("password_hash");
        let user = GoogleUser {
            user_id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            has_password: password_hash.is_some(),
        };
        tx.commit().await.context("commit google lookup")?;
        return Ok(user);
    }

    let query = r"
        SELECT id, email, name, password_hash
        FROM users
        WHERE email = $1
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(&identity.email)
        .fetch_optional(&mut *tx)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup google email")?;

    if let Some(row) = row {
        let user_id: Uuid = row.get("id");
        // Link the subject and activate: Google verified this address.
        let query = r"
            UPDATE users
            SET google_subject = $2, status = 'active', updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(&identity.subject)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to link google subject")?;

        let password_hash: Option<String> = row.get("password_hash");
        let user = GoogleUser {
            user_id,
            email: row.get("email"),
            name: row.get("name"),
            has_password: password_hash.is_some(),
        };
        tx.commit().await.context("commit google link")?;
        return Ok(user);
    }

    let name = identity
        .name
        .clone()
        .unwrap_or_else(|| identity.email.clone());
    let query = r"
        INSERT INTO users (email, name, status, google_subject)
        VALUES ($1, $2, 'active', $3)
        RETURNING id
    ";
    let row = sqlx::query(query)
        .bind(&identity.email)
        .bind(&name)
        .bind(&identity.subject)
        .fetch_one(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert google user")?;

    let user = GoogleUser {
        user_id: row.get("id"),
        email: identity.email.clone(),
        name,
        has_password: false,
    };
    tx.commit().await.context("commit google insert")?;
    Ok(user)
}

/// Availability probe backing the register form's email check.
pub(super) async fn email_availability(pool: &PgPool, email: &str) -> Result<(bool, bool)> {
    let user = lookup_user_by_email(pool, email).await?;
    match user {
        None => Ok((true, false)),
        Some(user) => Ok((false, !user.is_active())),
    }
}
