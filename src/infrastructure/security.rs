// Credential handling - password hashing, token minting and account field validation

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;

use crate::config::SecurityConfig;
use crate::error::{AppError, AppResult};

pub const USERNAME_MAX_LEN: usize = 150;
const TOKEN_BYTES: usize = 30;

static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));

#[derive(Debug, Clone)]
pub struct SecurityService {
    config: SecurityConfig,
}

impl SecurityService {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Hash password securely using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(password_hash.to_string())
    }

    /// Verify password against hash
    pub fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Opaque API token, URL-safe.
    pub fn generate_token(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn validate_password(&self, password: &str) -> AppResult<()> {
        if password.chars().count() < self.config.password_min_length {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                self.config.password_min_length
            )));
        }
        Ok(())
    }

    pub fn validate_username(&self, username: &str) -> AppResult<()> {
        if username.is_empty() {
            return Err(AppError::Validation("Username is required".to_string()));
        }
        if username.chars().count() > USERNAME_MAX_LEN {
            return Err(AppError::Validation(format!(
                "Username must be at most {} characters",
                USERNAME_MAX_LEN
            )));
        }
        if !USERNAME_PATTERN.is_match(username) {
            return Err(AppError::Validation(
                "Username may contain only letters, numbers, and @/./+/-/_ characters".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_email(&self, email: &str) -> AppResult<()> {
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(AppError::Validation("Invalid email format".to_string())),
        }
    }
}

/// Pull the token out of an `Authorization` header value.
/// Accepts `Token <key>` and `Bearer <key>`.
pub fn parse_authorization(value: &str) -> Option<&str> {
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        Some(key)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SecurityService {
        SecurityService::new(SecurityConfig::default())
    }

    #[test]
    fn test_password_hash_round_trip() {
        let security = service();
        let hash = security.hash_password("correct horse").unwrap();
        assert_ne!(hash, "correct horse");
        assert!(security.verify_password("correct horse", &hash).unwrap());
        assert!(!security.verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_tokens_are_unique() {
        let security = service();
        let a = security.generate_token();
        let b = security.generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn test_password_min_length() {
        let security = SecurityService::new(SecurityConfig {
            password_min_length: 10,
        });
        assert!(security.validate_password("short").is_err());
        assert!(security.validate_password("long enough!").is_ok());
    }

    #[test]
    fn test_username_rules() {
        let security = service();
        assert!(security.validate_username("alice.b+c@d-e_f").is_ok());
        assert!(security.validate_username("").is_err());
        assert!(security.validate_username("has space").is_err());
        assert!(security.validate_username(&"a".repeat(151)).is_err());
    }

    #[test]
    fn test_email_rules() {
        let security = service();
        assert!(security.validate_email("a@b.c").is_ok());
        assert!(security.validate_email("nope").is_err());
        assert!(security.validate_email("@b.c").is_err());
    }

    #[test]
    fn test_parse_authorization() {
        assert_eq!(parse_authorization("Token abc"), Some("abc"));
        assert_eq!(parse_authorization("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("bearer  abc "), Some("abc"));
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("Token"), None);
    }
}
