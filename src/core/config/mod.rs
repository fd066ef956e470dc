use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;

pub type Config = AppConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub jwt: JwtSettings,
    pub uploads: UploadConfig,
    pub oauth: OAuthConfig,
    pub llm: LlmConfig,
    pub admin_emails: Vec<String>,
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub static_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
    pub clamscan_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug, Default)]
pub struct OAuthConfig {
    pub google: Option<OAuthClient>,
    pub github: Option<OAuthClient>,
    pub redirect_base: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

const MIN_JWT_SECRET_LEN: usize = 32;

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| map.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("Missing required setting {key}"));

        let database_url = required("DATABASE_URL")?;
        let secret = required("JWT_SECRET")?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(anyhow!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters"
            ));
        }

        let port = parse_or(get("SERVER_PORT"), "SERVER_PORT", 8080u16)?;
        let frontend_url = get("FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();
        let host = get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let oauth_client = |prefix: &str| {
            match (get(&format!("{prefix}_CLIENT_ID")), get(&format!("{prefix}_CLIENT_SECRET"))) {
                (Some(client_id), Some(client_secret)) => Some(OAuthClient {
                    client_id,
                    client_secret,
                }),
                _ => None,
            }
        };

        Ok(Self {
            server: ServerConfig {
                host,
                port,
                frontend_url,
                static_dir: get("STATIC_DIR").map(PathBuf::from),
            },
            database_url,
            jwt: JwtSettings {
                secret,
                access_token_minutes: parse_or(get("JWT_ACCESS_MINUTES"), "JWT_ACCESS_MINUTES", 60)?,
                refresh_token_days: parse_or(get("JWT_REFRESH_DAYS"), "JWT_REFRESH_DAYS", 7)?,
            },
            uploads: UploadConfig {
                dir: PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string())),
                max_bytes: parse_or(get("UPLOAD_MAX_BYTES"), "UPLOAD_MAX_BYTES", 20 * 1024 * 1024)?,
                clamscan_path: get("CLAMSCAN_PATH").map(PathBuf::from),
            },
            oauth: OAuthConfig {
                google: oauth_client("GOOGLE"),
                github: oauth_client("GITHUB"),
                redirect_base: get("OAUTH_REDIRECT_BASE")
                    .unwrap_or_else(|| format!("http://localhost:{port}"))
                    .trim_end_matches('/')
                    .to_string(),
            },
            llm: LlmConfig {
                api_key: get("LLM_API_KEY"),
                base_url: get("LLM_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: get("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                max_retries: parse_or(get("LLM_MAX_RETRIES"), "LLM_MAX_RETRIES", 3)?,
                timeout_secs: parse_or(get("LLM_TIMEOUT_SECS"), "LLM_TIMEOUT_SECS", 60)?,
            },
            admin_emails: split_list(get("ADMIN_EMAILS"))
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            cors_origins: split_list(get("CORS_ORIGINS")),
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: {v}")),
        None => Ok(default),
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
