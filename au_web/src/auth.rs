//! ABOUTME: Authentication utilities for OTP codes, phone numbers and JWT operations
//! ABOUTME: Argon2-hashed one-time codes and HS256 access tokens

use crate::models::Claims;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use au_core::{unix_now, Error, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use rand_core::OsRng;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, instrument};

/// Normalize a phone number to E.164
///
/// Spaces, dashes, dots and parentheses are stripped before matching
/// `^\+[1-9][0-9]{7,14}$`.
pub fn normalize_phone(input: &str) -> Result<String> {
    static E164: OnceLock<Regex> = OnceLock::new();
    let pattern = match E164.get() {
        Some(pattern) => pattern,
        None => {
            let compiled = Regex::new(r"^\+[1-9][0-9]{7,14}$")
                .map_err(|e| Error::Config(format!("Invalid phone pattern: {}", e)))?;
            E164.get_or_init(|| compiled)
        }
    };

    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if pattern.is_match(&cleaned) {
        Ok(cleaned)
    } else {
        Err(Error::Validation(
            "Phone number must be in E.164 format, e.g. +15551234567".to_string(),
        ))
    }
}

/// One-time passcode generation and hashing
pub struct OtpCodes;

impl OtpCodes {
    /// `length` random decimal digits from the OS RNG
    pub fn generate(length: usize) -> String {
        let mut rng = OsRng;
        (0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    #[instrument(skip(code))]
    pub fn hash(code: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(code.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Config(format!("Failed to hash code: {}", e)))
    }

    #[instrument(skip(code, hash))]
    pub fn verify(code: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("Invalid code hash format: {}", e)))?;

        let matches = Argon2::default()
            .verify_password(code.as_bytes(), &parsed)
            .is_ok();
        debug!(matches, "Verified one-time code");
        Ok(matches)
    }
}

/// JWT token utilities
pub struct JwtAuth;

impl JwtAuth {
    #[instrument(skip(secret))]
    pub fn create_token(user_id: &str, phone: &str, secret: &str, ttl_seconds: u64) -> Result<String> {
        let now = unix_now().max(0) as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            phone: phone.to_string(),
            exp: now + ttl_seconds as usize,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| Error::Config(format!("Failed to create JWT: {}", e)))
    }

    #[instrument(skip(token, secret))]
    pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| Error::Unauthorized(format!("Invalid JWT: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_32_characters_minimum";

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(normalize_phone(" +447911123456 ").unwrap(), "+447911123456");
        assert!(normalize_phone("5551234567").is_err());
        assert!(normalize_phone("+0123456789").is_err());
        assert!(normalize_phone("+1234").is_err());
        assert!(normalize_phone("+1555abc4567").is_err());
    }

    #[test]
    fn test_generate_code() {
        let code = OtpCodes::generate(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(OtpCodes::generate(8).len(), 8);
    }

    #[test]
    fn test_code_hash_and_verify() {
        let hash = OtpCodes::hash("123456").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(OtpCodes::verify("123456", &hash).unwrap());
        assert!(!OtpCodes::verify("654321", &hash).unwrap());
    }

    #[test]
    fn test_jwt_create_and_verify() {
        let token = JwtAuth::create_token("user_123", "+15551234567", SECRET, 3600).unwrap();
        let claims = JwtAuth::verify_token(&token, SECRET).unwrap();

        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.phone, "+15551234567");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_jwt_invalid_secret() {
        let token = JwtAuth::create_token("user_123", "+15551234567", SECRET, 3600).unwrap();
        assert!(matches!(
            JwtAuth::verify_token(&token, "wrong_secret"),
            Err(Error::Unauthorized(_))
        ));
    }
}
