//! ABOUTME: Authentication utilities for password hashing and JWT operations
//! ABOUTME: Argon2 password verification, access/refresh token issuance and checks

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use cx_core::{Error, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

use crate::models::{Claims, TOKEN_TYPE_ACCESS, TOKEN_TYPE_REFRESH};

/// Password hashing utilities
pub struct PasswordAuth;

impl PasswordAuth {
    /// Hash a password using Argon2
    #[instrument(skip(password))]
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a hash
    #[instrument(skip(password, hash))]
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Internal(format!("Invalid password hash format: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

/// JWT token utilities
pub struct JwtAuth;

impl JwtAuth {
    /// Create an access/refresh token pair for a user
    #[instrument(skip(security))]
    pub fn create_token_pair(
        user_id: &str,
        email: &str,
        role: &str,
        security: &cx_config::SecurityConfig,
    ) -> Result<(String, String)> {
        let access = Self::create_token(
            user_id,
            email,
            role,
            TOKEN_TYPE_ACCESS,
            security.access_token_ttl_secs,
            &security.jwt_secret,
        )?;
        let refresh = Self::create_token(
            user_id,
            email,
            role,
            TOKEN_TYPE_REFRESH,
            security.refresh_token_ttl_secs,
            &security.jwt_secret,
        )?;
        Ok((access, refresh))
    }

    fn create_token(
        user_id: &str,
        email: &str,
        role: &str,
        token_type: &str,
        ttl_secs: u64,
        secret: &str,
    ) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Internal(format!("Time error: {}", e)))?
            .as_secs() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            token_type: token_type.to_string(),
            exp: now + ttl_secs as usize,
            iat: now,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .map_err(|e| Error::Internal(format!("Failed to create JWT: {}", e)))?;

        debug!(user = %user_id, token_type = %token_type, "JWT issued");
        Ok(token)
    }

    /// Verify and decode a JWT token of either type
    pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|e| Error::Unauthorized(format!("Invalid JWT: {}", e)))?;

        Ok(token_data.claims)
    }

    /// Verify a refresh token specifically; an access token here is rejected
    pub fn verify_refresh_token(token: &str, secret: &str) -> Result<Claims> {
        let claims = Self::verify_token(token, secret)?;
        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(Error::Unauthorized(
                "Refresh token required".to_string(),
            ));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security() -> cx_config::SecurityConfig {
        cx_config::SecurityConfig {
            jwt_secret: "test_secret_key_32_characters_ok".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604800,
        }
    }

    #[test]
    fn test_password_hash_and_verify() {
        let password = "correct horse battery staple";

        let hash = PasswordAuth::hash_password(password).expect("Should hash password");
        assert!(hash.starts_with("$argon2"));

        assert!(PasswordAuth::verify_password(password, &hash).unwrap());
        assert!(!PasswordAuth::verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_token_pair_types_and_expiry() {
        let security = security();
        let (access, refresh) =
            JwtAuth::create_token_pair("user_1", "a@example.com", "student", &security).unwrap();

        let access_claims = JwtAuth::verify_token(&access, &security.jwt_secret).unwrap();
        assert_eq!(access_claims.token_type, TOKEN_TYPE_ACCESS);
        assert_eq!(access_claims.sub, "user_1");
        assert_eq!(access_claims.exp - access_claims.iat, 900);

        let refresh_claims = JwtAuth::verify_token(&refresh, &security.jwt_secret).unwrap();
        assert_eq!(refresh_claims.token_type, TOKEN_TYPE_REFRESH);
        assert_eq!(refresh_claims.exp - refresh_claims.iat, 604800);
    }

    #[test]
    fn test_refresh_verification_rejects_access_token() {
        let security = security();
        let (access, refresh) =
            JwtAuth::create_token_pair("user_1", "a@example.com", "student", &security).unwrap();

        assert!(JwtAuth::verify_refresh_token(&refresh, &security.jwt_secret).is_ok());
        assert!(JwtAuth::verify_refresh_token(&access, &security.jwt_secret).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let security = security();
        let (access, _) =
            JwtAuth::create_token_pair("user_1", "a@example.com", "student", &security).unwrap();

        assert!(JwtAuth::verify_token(&access, "another_secret_32_characters_xx").is_err());
    }
}
