use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::{
        clear_session_cookie, create_session_token, session_cookie, OptionalAuthUser,
    },
    models::{LoginRequest, SignupRequest, User, WalletNonceRequest, WalletVerifyRequest},
    state::AppState,
    wallet,
};

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (email, password) = match (req.email, req.password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => return Err(AppError::Validation("Email and password are required".into())),
    };

    let password_hash =
        hash(&password, DEFAULT_COST).map_err(|e| AppError::Internal(e.to_string()))?;

    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return AppError::UserExists;
            }
        }
        AppError::Database(e)
    })?;

    let token = create_session_token(&user_id, &state.config)?;

    Ok((
        jar.add(session_cookie(token)),
        Json(json!({
            "user": { "id": user_id, "email": email }
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (email, password) = match (req.email, req.password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => return Err(AppError::Validation("Email and password are required".into())),
    };

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    // wallet-only accounts have no password hash and cannot log in this way
    let password_hash = user.password_hash.as_deref().ok_or(AppError::InvalidCredentials)?;

    if !verify(&password, password_hash).map_err(|e| AppError::Internal(e.to_string()))? {
        return Err(AppError::InvalidCredentials);
    }

    let token = create_session_token(&user.id, &state.config)?;

    Ok((
        jar.add(session_cookie(token)),
        Json(json!({
            "user": { "id": user.id, "email": user.email, "walletAddress": user.wallet_address }
        })),
    ))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.add(clear_session_cookie()),
        Json(json!({ "message": "Logged out successfully" })),
    )
}

pub async fn me(
    State(state): State<AppState>,
    OptionalAuthUser(user_id): OptionalAuthUser,
) -> Result<Json<Value>, AppError> {
    let Some(user_id) = user_id else {
        return Ok(Json(json!({ "user": null })));
    };

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&state.pool)
        .await?;

    Ok(Json(match user {
        Some(user) => json!({
            "user": { "id": user.id, "email": user.email, "walletAddress": user.wallet_address }
        }),
        None => json!({ "user": null }),
    }))
}

pub async fn wallet_nonce(
    State(state): State<AppState>,
    Json(req): Json<WalletNonceRequest>,
) -> Result<Json<Value>, AppError> {
    let address = req
        .address
        .as_deref()
        .and_then(wallet::normalize_address)
        .ok_or_else(|| AppError::Validation("Missing or invalid address".into()))?;

    let nonce = wallet::generate_nonce();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO users (id, wallet_address, wallet_nonce, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (wallet_address)
        DO UPDATE SET wallet_nonce = excluded.wallet_nonce, updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&address)
    .bind(&nonce)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    Ok(Json(json!({ "nonce": nonce })))
}

pub async fn wallet_verify(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<WalletVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(address), Some(signature)) = (req.address.as_deref(), req.signature.as_deref())
    else {
        return Err(AppError::Validation("Missing address or signature".into()));
    };
    let address = wallet::normalize_address(address)
        .ok_or_else(|| AppError::Validation("Missing or invalid address".into()))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE wallet_address = ?")
        .bind(&address)
        .fetch_optional(&state.pool)
        .await?;

    let Some(user) = user else {
        return Err(AppError::Validation(
            "Wallet not registered or nonce missing".into(),
        ));
    };
    let Some(nonce) = user.wallet_nonce.clone() else {
        return Err(AppError::Validation(
            "Wallet not registered or nonce missing".into(),
        ));
    };

    let recovered = wallet::recover_address(&wallet::login_message(&nonce), signature)?;
    if recovered != address {
        return Err(AppError::SignatureMismatch);
    }

    // single use: only clear the nonce value that was just verified
    let cleared = sqlx::query(
        "UPDATE users SET wallet_nonce = NULL, updated_at = ? WHERE id = ? AND wallet_nonce = ?",
    )
    .bind(Utc::now())
    .bind(&user.id)
    .bind(&nonce)
    .execute(&state.pool)
    .await?;

    if cleared.rows_affected() == 0 {
        return Err(AppError::Validation(
            "Wallet not registered or nonce missing".into(),
        ));
    }

    let token = create_session_token(&user.id, &state.config)?;

    Ok((
        jar.add(session_cookie(token)),
        Json(json!({
            "user": { "id": user.id, "walletAddress": user.wallet_address }
        })),
    ))
}
