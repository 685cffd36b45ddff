use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "session";

const SESSION_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn create_session_token(user_id: &str, config: &Config) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(SESSION_TTL_DAYS)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify_session_token(token: &str, config: &Config) -> Option<String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
    .ok()
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

fn session_user_id(parts: &Parts, state: &AppState) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar.get(SESSION_COOKIE)?.value().to_owned();
    verify_session_token(&token, &state.config)
}

pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        session_user_id(parts, state)
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

pub struct OptionalAuthUser(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(session_user_id(parts, state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: "sqlite::memory:".into(),
            jwt_secret: "test-secret".into(),
        }
    }

    #[test]
    fn token_round_trip() {
        let config = test_config();
        let token = create_session_token("user-1", &config).unwrap();
        assert_eq!(verify_session_token(&token, &config).as_deref(), Some("user-1"));
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let config = test_config();
        let other = Config {
            jwt_secret: "other-secret".into(),
            ..test_config()
        };
        let token = create_session_token("user-1", &config).unwrap();
        assert_eq!(verify_session_token(&token, &other), None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = test_config();
        let now = Utc::now();
        let claims = Claims {
            sub: "user-1".to_string(),
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();
        assert_eq!(verify_session_token(&token, &config), None);
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert_eq!(verify_session_token("not-a-jwt", &test_config()), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("tok".into()).to_string();
        assert!(cookie.starts_with("session=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=604800"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie().to_string();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("Max-Age=0"));
    }
}
