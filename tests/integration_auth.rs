//! Database-backed tests for the challenge lifecycle and ownership rules.
//!
//! These drive the real handlers against a live Postgres. Set
//! `BODEGA_TEST_DSN` to a database the suite may write to (the schema is
//! applied on first use); without it every test skips.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::Extension;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::SecretString;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use bodega::api::handlers::auth::google::{GoogleIdentity, GoogleTokenVerifier, GoogleVerifyError};
use bodega::api::handlers::auth::token::TokenService;
use bodega::api::handlers::auth::types::{
    ForgotInitiateRequest, ForgotResetRequest, GoogleLoginRequest, LoginRequest,
    RegisterInitiateRequest, RegisterResendRequest, RegisterVerifyRequest,
};
use bodega::api::handlers::auth::{forgot, login, register, AuthConfig, AuthState};
use bodega::api::handlers::shops::shops;
use bodega::api::handlers::shops::types::CreateShopRequest;

const SCHEMA: &str = include_str!("../db/sql/01_bodega.sql");
const SCHEMA_LOCK: i64 = 428_515;

async fn test_pool() -> Option<PgPool> {
    let dsn = std::env::var("BODEGA_TEST_DSN").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&dsn)
        .await
        .ok()?;
    apply_schema(&pool).await.ok()?;
    Some(pool)
}

async fn apply_schema(pool: &PgPool) -> Result<()> {
    // Tests run concurrently; serialize DDL behind an advisory lock.
    let mut conn = pool.acquire().await?;
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(SCHEMA_LOCK)
        .execute(&mut *conn)
        .await?;
    let applied = sqlx::raw_sql(SCHEMA).execute(&mut *conn).await;
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(SCHEMA_LOCK)
        .execute(&mut *conn)
        .await?;
    applied?;
    Ok(())
}

fn test_state(config: AuthConfig) -> Arc<AuthState> {
    Arc::new(AuthState::new(
        config,
        TokenService::new(SecretString::from("integration-secret".to_string()), 3600),
        None,
    ))
}

fn default_config() -> AuthConfig {
    AuthConfig::new("http://localhost:3000".to_string())
}

fn unique_email(tag: &str) -> String {
    format!("{tag}-{}@bodega.test", Uuid::new_v4().simple())
}

async fn body_json(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Pull the most recently queued code for an address out of the outbox.
async fn latest_code(pool: &PgPool, email: &str) -> Result<String> {
    let row = sqlx::query(
        r"
        SELECT payload_json->>'code' AS code
        FROM email_outbox
        WHERE to_email = $1
        ORDER BY created_at DESC
        LIMIT 1
    ",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(row.get("code"))
}

fn wrong_code(code: &str) -> String {
    let first = code.as_bytes()[0];
    let flipped = if first == b'9' { b'0' } else { first + 1 };
    let mut out = code.to_string();
    out.replace_range(0..1, std::str::from_utf8(&[flipped]).unwrap());
    out
}

async fn start_registration(
    pool: &PgPool,
    state: &Arc<AuthState>,
    email: &str,
) -> Result<String> {
    let response = register::initiate(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(RegisterInitiateRequest {
            name: "Tester".to_string(),
            email: email.to_string(),
            password: "P@ssw0rd1".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await?;
    Ok(body["userId"].as_str().unwrap().to_string())
}

async fn submit_register_code(
    pool: &PgPool,
    state: &Arc<AuthState>,
    user_id: &str,
    otp: &str,
) -> Response {
    register::verify(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(RegisterVerifyRequest {
            user_id: user_id.to_string(),
            otp: otp.to_string(),
        })),
    )
    .await
    .into_response()
}

async fn insert_active_user(pool: &PgPool, email: &str) -> Result<Uuid> {
    let row = sqlx::query(
        "INSERT INTO users (email, name, status) VALUES ($1, 'Tester', 'active') RETURNING id",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

fn bearer_headers(state: &AuthState, user_id: Uuid) -> Result<HeaderMap> {
    let token = state.tokens().issue(user_id)?;
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, format!("Bearer {token}").parse()?);
    Ok(headers)
}

#[tokio::test]
async fn concurrent_verifies_consume_exactly_once() -> Result<()> {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: BODEGA_TEST_DSN not set");
        return Ok(());
    };
    let state = test_state(default_config());

    let email = unique_email("concurrent");
    let user_id = start_registration(&pool, &state, &email).await?;
    let code = latest_code(&pool, &email).await?;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let state = state.clone();
        let user_id = user_id.clone();
        let code = code.clone();
        tasks.push(tokio::spawn(async move {
            submit_register_code(&pool, &state, &user_id, &code)
                .await
                .status()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await? == StatusCode::OK {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "exactly one verify may win");
    Ok(())
}

#[tokio::test]
async fn expiry_beats_a_correct_code() -> Result<()> {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: BODEGA_TEST_DSN not set");
        return Ok(());
    };
    let state = test_state(default_config().with_otp_ttl_seconds(0));

    let email = unique_email("expired");
    let user_id = start_registration(&pool, &state, &email).await?;
    let code = latest_code(&pool, &email).await?;

    let response = submit_register_code(&pool, &state, &user_id, &code).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert!(body["error"].as_str().unwrap().contains("expired"));
    Ok(())
}

#[tokio::test]
async fn attempt_exhaustion_invalidates_the_challenge() -> Result<()> {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: BODEGA_TEST_DSN not set");
        return Ok(());
    };
    let state = test_state(default_config().with_max_otp_attempts(2));

    let email = unique_email("exhaust");
    let user_id = start_registration(&pool, &state, &email).await?;
    let code = latest_code(&pool, &email).await?;
    let bad = wrong_code(&code);

    let response = submit_register_code(&pool, &state, &user_id, &bad).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert!(body["error"].as_str().unwrap().contains("1 attempts left"));

    let response = submit_register_code(&pool, &state, &user_id, &bad).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert!(body["error"].as_str().unwrap().contains("Too many"));

    // The correct code is useless once the challenge was invalidated.
    let response = submit_register_code(&pool, &state, &user_id, &code).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn resend_cooldown_covers_resend_and_reinitiate() -> Result<()> {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: BODEGA_TEST_DSN not set");
        return Ok(());
    };
    let state = test_state(default_config());

    // Register resend right after initiate hits the cooldown.
    let email = unique_email("cooldown");
    start_registration(&pool, &state, &email).await?;
    let response = register::resend(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(RegisterResendRequest {
            email: email.clone(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Forgot initiate is subject to the same cooldown: re-initiating must
    // not mint codes faster than resend would.
    let email = unique_email("forgot-cooldown");
    insert_active_user(&pool, &email).await?;
    let forgot_initiate = |email: String| {
        let pool = pool.clone();
        let state = state.clone();
        async move {
            forgot::initiate(
                Extension(pool),
                Extension(state),
                Some(Json(ForgotInitiateRequest { email })),
            )
            .await
            .into_response()
        }
    };
    let response = forgot_initiate(email.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = forgot_initiate(email.clone()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn register_verify_login_end_to_end() -> Result<()> {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: BODEGA_TEST_DSN not set");
        return Ok(());
    };
    let state = test_state(default_config());

    let email = unique_email("e2e");
    let user_id = start_registration(&pool, &state, &email).await?;
    let code = latest_code(&pool, &email).await?;

    let response = submit_register_code(&pool, &state, &user_id, &code).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["user"]["email"], email.as_str());

    let response = login::login(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email: email.clone(),
            password: "P@ssw0rd1".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with("bodega_session="));
    Ok(())
}

#[tokio::test]
async fn rejected_parent_leaves_no_shop_row() -> Result<()> {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: BODEGA_TEST_DSN not set");
        return Ok(());
    };
    let state = test_state(default_config());

    let owner = insert_active_user(&pool, &unique_email("owner")).await?;
    let intruder = insert_active_user(&pool, &unique_email("intruder")).await?;

    let new_shop = |name: &str, parent: Option<String>| CreateShopRequest {
        name: Some(name.to_string()),
        description: None,
        domain: None,
        contact_email: None,
        address: None,
        parent,
    };

    let response = shops::create(
        bearer_headers(&state, owner)?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(new_shop("Main", None))),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await?;
    let parent_id = body["shop"]["id"].as_str().unwrap().to_string();

    let response = shops::create(
        bearer_headers(&state, intruder)?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(new_shop("Branch", Some(parent_id)))),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The ownership check and insert share a transaction; nothing partial.
    let row = sqlx::query("SELECT COUNT(*) AS n FROM shops WHERE owner_id = $1")
        .bind(intruder)
        .fetch_one(&pool)
        .await?;
    let count: i64 = row.get("n");
    assert_eq!(count, 0);
    Ok(())
}

struct StaticVerifier {
    identity: GoogleIdentity,
}

#[async_trait::async_trait]
impl GoogleTokenVerifier for StaticVerifier {
    async fn verify(&self, _id_token: &str) -> Result<GoogleIdentity, GoogleVerifyError> {
        Ok(self.identity.clone())
    }
}

#[tokio::test]
async fn set_password_grant_demands_its_token() -> Result<()> {
    let Some(pool) = test_pool().await else {
        eprintln!("skipping: BODEGA_TEST_DSN not set");
        return Ok(());
    };

    let email = unique_email("google");
    let verifier = StaticVerifier {
        identity: GoogleIdentity {
            subject: format!("sub-{}", Uuid::new_v4().simple()),
            email: email.clone(),
            name: Some("Googler".to_string()),
        },
    };
    let state = Arc::new(AuthState::new(
        default_config(),
        TokenService::new(SecretString::from("integration-secret".to_string()), 3600),
        Some(Arc::new(verifier)),
    ));

    let response = login::google(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(GoogleLoginRequest {
            token: "stub-id-token".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["action"], "set-password");
    let user_id = body["userId"].as_str().unwrap().to_string();
    let reset_token = body["resetToken"].as_str().unwrap().to_string();

    let submit_reset = |otp: Option<String>| {
        let pool = pool.clone();
        let state = state.clone();
        let user_id = user_id.clone();
        async move {
            forgot::reset(
                Extension(pool),
                Extension(state),
                Some(Json(ForgotResetRequest {
                    user_id,
                    password: "N3wP@ssword".to_string(),
                    otp,
                })),
            )
            .await
            .into_response()
        }
    };

    // A user id plus a new password is not enough.
    let response = submit_reset(None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Neither is a guessed secret of the right shape.
    let response = submit_reset(Some("A".repeat(32))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The token handed out with the action redeems the grant.
    let response = submit_reset(Some(reset_token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = login::login(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email,
            password: "N3wP@ssword".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
