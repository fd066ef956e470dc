use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::shared::enums::UserRole;

const OAUTH_STATE_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "ticketdesk".into(),
            audience: "ticketdesk-api".into(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 7,
            leeway_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Access,
    Refresh,
    OAuthState,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::OAuthState => "oauth_state",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Claims {
    pub fn new(
        subject: String,
        issuer: &str,
        audience: &str,
        token_type: TokenType,
        expiry: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: subject,
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: token_type.as_str().to_string(),
            email: None,
            name: None,
            role: None,
            provider: None,
        }
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid user ID in claims: {e}"))
    }

    pub fn is_type(&self, token_type: TokenType) -> bool {
        self.token_type == token_type.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// Identity baked into issued tokens.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    // jti -> exp timestamp
    revoked: Arc<RwLock<HashMap<String, i64>>>,
}

impl JwtManager {
    pub fn new(config: JwtConfig, secret: &str) -> Result<Self> {
        if secret.len() < 32 {
            return Err(anyhow!("JWT secret must be at least 32 characters"));
        }
        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            revoked: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn from_secret(secret: &str) -> Result<Self> {
        Self::new(JwtConfig::default(), secret)
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode token: {e}"))
    }

    pub fn generate_token_pair(&self, subject: &TokenSubject) -> Result<TokenPair> {
        let now = Utc::now();
        let access_expiry = now + Duration::minutes(self.config.access_token_expiry_minutes);
        let refresh_expiry = now + Duration::days(self.config.refresh_token_expiry_days);

        let access_claims = Claims::new(
            subject.user_id.to_string(),
            &self.config.issuer,
            &self.config.audience,
            TokenType::Access,
            access_expiry,
        )
        .with_email(subject.email.clone())
        .with_name(subject.name.clone())
        .with_role(subject.role);

        let refresh_claims = Claims::new(
            subject.user_id.to_string(),
            &self.config.issuer,
            &self.config.audience,
            TokenType::Refresh,
            refresh_expiry,
        );

        Ok(TokenPair {
            access_token: self.sign(&access_claims)?,
            refresh_token: self.sign(&refresh_claims)?,
            token_type: "Bearer".into(),
            expires_in: self.config.access_token_expiry_minutes * 60,
            refresh_expires_in: self.config.refresh_token_expiry_days * 24 * 60 * 60,
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = self.config.leeway_seconds;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| anyhow!("Token validation failed: {e}"))
    }

    pub async fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?;
        if !claims.is_type(TokenType::Access) {
            return Err(anyhow!("Token is not an access token"));
        }
        if self.is_revoked(&claims.jti).await {
            return Err(anyhow!("Token has been revoked"));
        }
        Ok(claims)
    }

    /// Validates a refresh token and revokes it so it cannot be replayed.
    pub async fn consume_refresh_token(&self, token: &str) -> Result<Uuid> {
        let claims = self.validate_token(token)?;
        if !claims.is_type(TokenType::Refresh) {
            return Err(anyhow!("Token is not a refresh token"));
        }
        if self.is_revoked(&claims.jti).await {
            return Err(anyhow!("Refresh token has been revoked"));
        }
        let user_id = claims.user_id()?;
        self.revoke(&claims.jti, claims.exp).await;
        debug!("Consumed refresh token for user {user_id}");
        Ok(user_id)
    }

    pub fn issue_oauth_state(&self, provider: &str) -> Result<String> {
        let mut claims = Claims::new(
            Uuid::new_v4().to_string(),
            &self.config.issuer,
            &self.config.audience,
            TokenType::OAuthState,
            Utc::now() + Duration::minutes(OAUTH_STATE_MINUTES),
        );
        claims.provider = Some(provider.to_string());
        self.sign(&claims)
    }

    pub fn verify_oauth_state(&self, state: &str, provider: &str) -> Result<()> {
        let claims = self.validate_token(state)?;
        if !claims.is_type(TokenType::OAuthState) {
            return Err(anyhow!("Invalid OAuth state"));
        }
        if claims.provider.as_deref() != Some(provider) {
            return Err(anyhow!("OAuth state was issued for another provider"));
        }
        Ok(())
    }

    pub async fn revoke(&self, jti: &str, exp: i64) {
        let mut revoked = self.revoked.write().await;
        revoked.insert(jti.to_string(), exp);
        debug!("Revoked token {jti}");
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.read().await.contains_key(jti)
    }

    /// Drops revocation entries whose tokens have expired anyway.
    pub async fn cleanup_revoked(&self) -> usize {
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().await;
        let before = revoked.len();
        revoked.retain(|_, exp| *exp > now);
        let removed = before - revoked.len();
        if removed > 0 {
            info!("Cleaned up {removed} entries from token revocation list");
        }
        removed
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_manager() -> JwtManager {
        JwtManager::from_secret("this-is-a-very-long-secret-key-for-testing-purposes-only")
            .expect("Failed to create manager")
    }

    fn subject(role: UserRole) -> TokenSubject {
        TokenSubject {
            user_id: Uuid::new_v4(),
            email: "agent@example.com".into(),
            name: "Agent".into(),
            role,
        }
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtManager::from_secret("too-short").is_err());
    }

    #[tokio::test]
    async fn test_access_token_carries_identity() {
        let manager = create_test_manager();
        let subject = subject(UserRole::Admin);

        let pair = manager.generate_token_pair(&subject).expect("Failed to generate");
        assert_eq!(pair.token_type, "Bearer");

        let claims = manager
            .validate_access_token(&pair.access_token)
            .await
            .expect("Validation failed");
        assert_eq!(claims.user_id().expect("Invalid user ID"), subject.user_id);
        assert_eq!(claims.email.as_deref(), Some("agent@example.com"));
        assert_eq!(claims.role, Some(UserRole::Admin));
    }

    #[tokio::test]
    async fn test_wrong_token_type() {
        let manager = create_test_manager();
        let pair = manager
            .generate_token_pair(&subject(UserRole::User))
            .expect("Failed to generate");

        assert!(manager.validate_access_token(&pair.refresh_token).await.is_err());
        assert!(manager.consume_refresh_token(&pair.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_token_single_use() {
        let manager = create_test_manager();
        let subject = subject(UserRole::User);
        let pair = manager.generate_token_pair(&subject).expect("Failed to generate");

        let user_id = manager
            .consume_refresh_token(&pair.refresh_token)
            .await
            .expect("First use should succeed");
        assert_eq!(user_id, subject.user_id);
        assert!(manager.consume_refresh_token(&pair.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_revoked_access_token() {
        let manager = create_test_manager();
        let pair = manager
            .generate_token_pair(&subject(UserRole::User))
            .expect("Failed to generate");
        let claims = manager.validate_token(&pair.access_token).expect("valid");

        manager.revoke(&claims.jti, claims.exp).await;
        assert!(manager.validate_access_token(&pair.access_token).await.is_err());
        assert_eq!(manager.cleanup_revoked().await, 0);
    }

    #[test]
    fn test_invalid_token() {
        let manager = create_test_manager();
        assert!(manager.validate_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_oauth_state_is_bound_to_provider() {
        let manager = create_test_manager();
        let state = manager.issue_oauth_state("github").expect("state");
        assert!(manager.verify_oauth_state(&state, "github").is_ok());
        assert!(manager.verify_oauth_state(&state, "google").is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic abc123"), None);
    }
}
