//! OAuth2 code flow for Google and GitHub sign-in.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

use crate::core::config::{OAuthClient, OAuthConfig};

const USER_AGENT: &str = "ticketdesk/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub userinfo_url: &'static str,
    pub scopes: &'static [&'static str],
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Profile fields common to every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthUserInfo {
    pub provider: OAuthProvider,
    pub provider_id: String,
    /// Only set when the provider vouches for the address.
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl OAuthProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "google" => Some(Self::Google),
            "github" => Some(Self::GitHub),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }

    pub fn endpoints(&self) -> ProviderEndpoints {
        match self {
            Self::Google => ProviderEndpoints {
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
                token_url: "https://oauth2.googleapis.com/token",
                userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo",
                scopes: &["openid", "email", "profile"],
            },
            Self::GitHub => ProviderEndpoints {
                auth_url: "https://github.com/login/oauth/authorize",
                token_url: "https://github.com/login/oauth/access_token",
                userinfo_url: "https://api.github.com/user",
                scopes: &["read:user", "user:email"],
            },
        }
    }

    /// Client credentials, if this provider is configured.
    pub fn client<'a>(&self, config: &'a OAuthConfig) -> Option<&'a OAuthClient> {
        match self {
            Self::Google => config.google.as_ref(),
            Self::GitHub => config.github.as_ref(),
        }
    }

    pub fn redirect_uri(&self, config: &OAuthConfig) -> String {
        format!(
            "{}/api/auth/oauth/{}/callback",
            config.redirect_base,
            self.as_str()
        )
    }

    pub fn build_auth_url(&self, client: &OAuthClient, redirect_uri: &str, state: &str) -> String {
        let endpoints = self.endpoints();
        let scopes = endpoints.scopes.join(" ");

        let mut params = vec![
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("state", state),
            ("scope", scopes.as_str()),
        ];
        if *self == Self::Google {
            params.push(("access_type", "online"));
            params.push(("prompt", "select_account"));
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", endpoints.auth_url, query)
    }

    pub async fn exchange_code(
        &self,
        client: &OAuthClient,
        redirect_uri: &str,
        code: &str,
        http: &Client,
    ) -> Result<OAuthTokenResponse> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("client_id", client.client_id.as_str());
        params.insert("client_secret", client.client_secret.as_str());

        let response = http
            .post(self.endpoints().token_url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .form(&params)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to exchange code: {e}"))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Token exchange failed: {error_text}"));
        }

        // GitHub answers 200 with an `error` field on bad codes.
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse token response: {e}"))?;
        if let Some(error) = raw.get("error").and_then(|e| e.as_str()) {
            return Err(anyhow!("Token exchange failed: {error}"));
        }
        serde_json::from_value(raw).map_err(|e| anyhow!("Failed to parse token response: {e}"))
    }

    pub async fn fetch_user_info(&self, access_token: &str, http: &Client) -> Result<OAuthUserInfo> {
        let raw = get_json(http, self.endpoints().userinfo_url, access_token).await?;
        let mut info = self.parse_user_info(&raw)?;

        // The `/user` email is just the public profile field; only `/user/emails` says what is verified.
        if *self == Self::GitHub {
            let emails = get_json(http, "https://api.github.com/user/emails", access_token).await?;
            info.email = primary_github_email(&emails);
        }

        Ok(info)
    }

    pub fn parse_user_info(&self, raw: &serde_json::Value) -> Result<OAuthUserInfo> {
        let provider_id = match &raw["id"] {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return Err(anyhow!("{self} profile has no id")),
        };

        let info = match self {
            Self::Google => OAuthUserInfo {
                provider: *self,
                provider_id,
                email: raw["email"]
                    .as_str()
                    .filter(|_| google_email_verified(raw))
                    .map(String::from),
                name: raw["name"].as_str().map(String::from),
                avatar_url: raw["picture"].as_str().map(String::from),
            },
            Self::GitHub => OAuthUserInfo {
                provider: *self,
                provider_id,
                email: None,
                name: raw["name"]
                    .as_str()
                    .or_else(|| raw["login"].as_str())
                    .map(String::from),
                avatar_url: raw["avatar_url"].as_str().map(String::from),
            },
        };
        Ok(info)
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

async fn get_json(http: &Client, url: &str, access_token: &str) -> Result<serde_json::Value> {
    let response = http
        .get(url)
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| anyhow!("Failed to fetch user info: {e}"))?;

    if !response.status().is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(anyhow!("Failed to fetch user info: {error_text}"));
    }

    response
        .json()
        .await
        .map_err(|e| anyhow!("Failed to parse user info: {e}"))
}

/// The v2 userinfo endpoint says `verified_email`, the OpenID one `email_verified`.
fn google_email_verified(raw: &serde_json::Value) -> bool {
    raw["verified_email"]
        .as_bool()
        .or_else(|| raw["email_verified"].as_bool())
        .unwrap_or(false)
}

/// Picks the primary verified address from GitHub's `/user/emails` list.
pub fn primary_github_email(emails: &serde_json::Value) -> Option<String> {
    let entries = emails.as_array()?;
    let verified = |e: &&serde_json::Value| e["verified"].as_bool().unwrap_or(false);
    entries
        .iter()
        .filter(verified)
        .find(|e| e["primary"].as_bool().unwrap_or(false))
        .or_else(|| entries.iter().find(verified))
        .and_then(|e| e["email"].as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> OAuthClient {
        OAuthClient {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
        }
    }

    #[test]
    fn test_parse_provider() {
        assert_eq!(OAuthProvider::parse("GitHub"), Some(OAuthProvider::GitHub));
        assert_eq!(OAuthProvider::parse("google"), Some(OAuthProvider::Google));
        assert_eq!(OAuthProvider::parse("facebook"), None);
    }

    #[test]
    fn test_build_auth_url() {
        let url = OAuthProvider::Google.build_auth_url(
            &client(),
            "http://localhost:8080/api/auth/oauth/google/callback",
            "state-token",
        );
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=state-token"));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fauth%2Foauth%2Fgoogle%2Fcallback"
        ));
    }

    #[test]
    fn test_redirect_uri_and_client_lookup() {
        let config = OAuthConfig {
            google: None,
            github: Some(client()),
            redirect_base: "https://desk.example.com".into(),
        };
        assert_eq!(
            OAuthProvider::GitHub.redirect_uri(&config),
            "https://desk.example.com/api/auth/oauth/github/callback"
        );
        assert!(OAuthProvider::GitHub.client(&config).is_some());
        assert!(OAuthProvider::Google.client(&config).is_none());
    }

    #[test]
    fn test_parse_github_profile_with_numeric_id() {
        let raw = json!({"id": 583231, "login": "octocat", "name": null, "email": null,
            "avatar_url": "https://avatars.githubusercontent.com/u/583231"});
        let info = OAuthProvider::GitHub.parse_user_info(&raw).unwrap();
        assert_eq!(info.provider_id, "583231");
        assert_eq!(info.name.as_deref(), Some("octocat"));
        assert!(info.email.is_none());
    }

    #[test]
    fn test_parse_google_profile() {
        let raw = json!({"id": "1087", "email": "ana@example.com", "verified_email": true,
            "name": "Ana", "picture": "https://lh3.googleusercontent.com/a"});
        let info = OAuthProvider::Google.parse_user_info(&raw).unwrap();
        assert_eq!(info.email.as_deref(), Some("ana@example.com"));
        assert!(OAuthProvider::Google.parse_user_info(&json!({})).is_err());
    }

    #[test]
    fn test_unverified_google_email_is_dropped() {
        let unverified = json!({"id": "1", "email": "victim@example.com", "verified_email": false});
        let info = OAuthProvider::Google.parse_user_info(&unverified).unwrap();
        assert!(info.email.is_none());

        let missing_flag = json!({"id": "2", "email": "victim@example.com"});
        assert!(OAuthProvider::Google.parse_user_info(&missing_flag).unwrap().email.is_none());

        let openid = json!({"sub": "3", "id": "3", "email": "ana@example.com", "email_verified": true});
        assert_eq!(
            OAuthProvider::Google.parse_user_info(&openid).unwrap().email.as_deref(),
            Some("ana@example.com")
        );
    }

    #[test]
    fn test_github_public_email_is_not_trusted() {
        let raw = json!({"id": 7, "login": "mallory", "email": "victim@example.com"});
        let info = OAuthProvider::GitHub.parse_user_info(&raw).unwrap();
        assert!(info.email.is_none());
    }

    #[test]
    fn test_primary_github_email() {
        let emails = json!([
            {"email": "old@example.com", "primary": false, "verified": true},
            {"email": "main@example.com", "primary": true, "verified": true},
        ]);
        assert_eq!(primary_github_email(&emails).as_deref(), Some("main@example.com"));

        let unverified_primary = json!([
            {"email": "main@example.com", "primary": true, "verified": false},
            {"email": "alt@example.com", "primary": false, "verified": true},
        ]);
        assert_eq!(
            primary_github_email(&unverified_primary).as_deref(),
            Some("alt@example.com")
        );
        assert_eq!(primary_github_email(&json!([])), None);
    }
}
