use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::types::models::UserId;

/// Claims carried by the session provider's access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub role: Option<String>,
}

/// A signed-in user as reported by the session provider.
///
/// The token is decoded without checking its signature: the provider's
/// signing secret never reaches the client, and every store call forwards
/// the raw token so the provider re-verifies it server-side.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
    access_token: String,
}

impl Session {
    pub fn from_access_token(token: &str) -> AppResult<Self> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = true;
        validation.validate_aud = false;

        let data = decode::<SessionClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::new(ErrorCode::SessionExpired, "session has expired")
                }
                _ => AppError::new(ErrorCode::SessionInvalid, format!("invalid session token: {e}")),
            })?;

        let claims = data.claims;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::new(ErrorCode::SessionInvalid, "invalid expiry claim"))?;

        Ok(Self {
            user_id: claims.sub,
            email: claims.email,
            expires_at,
            access_token: token.to_string(),
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub password: String,
}

/// Registration is limited to one institutional email domain.
pub fn check_institutional_email(email: &str, domain: &str) -> AppResult<()> {
    let suffix = format!("@{}", domain.trim_start_matches('@').to_lowercase());
    if !email.trim().to_lowercase().ends_with(&suffix) {
        return Err(AppError::new(
            ErrorCode::EmailDomainNotAllowed,
            format!("must use an {suffix} email"),
        ));
    }
    Ok(())
}

impl SignUpRequest {
    pub fn check(&self, domain: &str) -> AppResult<()> {
        check_institutional_email(&self.email, domain)?;
        self.validate()
            .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
        if self.password != self.confirm_password {
            return Err(AppError::new(ErrorCode::PasswordMismatch, "passwords do not match"));
        }
        Ok(())
    }
}

impl SignInRequest {
    pub fn check(&self, domain: &str) -> AppResult<()> {
        check_institutional_email(&self.email, domain)?;
        self.validate()
            .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))
    }
}

/// Email confirmation codes are exactly six digits.
pub fn check_one_time_code(code: &str) -> AppResult<()> {
    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::new(
            ErrorCode::OneTimeCodeInvalid,
            "enter the 6-digit code from your email",
        ));
    }
    Ok(())
}
