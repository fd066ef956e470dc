use crate::chat::ChatProvider;
use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
use crate::security::antivirus::{ScannerConfig, UploadScanner};
use crate::security::jwt::{JwtConfig, JwtManager};
use crate::security::password::PasswordService;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Shared handles every request handler reaches through `State<Arc<AppState>>`.
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub jwt: Arc<JwtManager>,
    pub passwords: Arc<PasswordService>,
    pub chat: Option<Arc<dyn ChatProvider>>,
    pub scanner: Arc<UploadScanner>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        conn: DbPool,
        passwords: PasswordService,
        chat: Option<Arc<dyn ChatProvider>>,
    ) -> Result<Self> {
        let jwt = JwtManager::new(
            JwtConfig {
                access_token_expiry_minutes: config.jwt.access_token_minutes,
                refresh_token_expiry_days: config.jwt.refresh_token_days,
                ..JwtConfig::default()
            },
            &config.jwt.secret,
        )?;

        let scanner = UploadScanner::new(ScannerConfig {
            max_file_size: config.uploads.max_bytes,
            clamscan_path: config.uploads.clamscan_path.clone(),
            ..ScannerConfig::default()
        });

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            conn,
            config,
            jwt: Arc::new(jwt),
            passwords: Arc::new(passwords),
            chat,
            scanner: Arc::new(scanner),
            http,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("bind", &self.config.bind_address())
            .field("chat_enabled", &self.chat.is_some())
            .finish_non_exhaustive()
    }
}
