use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use ticketdesk::chat::{ChatProvider, OpenAiClient};
use ticketdesk::core::config::AppConfig;
use ticketdesk::core::shared::state::AppState;
use ticketdesk::core::shared::utils::{create_pool, run_migrations};
use ticketdesk::main_module::run_server;
use ticketdesk::security::password::PasswordService;

const DB_POOL_SIZE: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    info!("Starting ticketdesk {}", env!("CARGO_PKG_VERSION"));

    let pool = create_pool(&config.database_url, DB_POOL_SIZE)?;
    let migrations_pool = pool.clone();
    let applied = tokio::task::spawn_blocking(move || run_migrations(&migrations_pool)).await??;
    if applied.is_empty() {
        info!("Database schema is up to date");
    } else {
        info!("Applied migrations: {}", applied.join(", "));
    }

    let chat: Option<Arc<dyn ChatProvider>> = match &config.llm.api_key {
        Some(key) => match OpenAiClient::new(key.clone(), &config.llm) {
            Ok(client) => {
                info!("Chat assistant enabled with model {}", config.llm.model);
                Some(Arc::new(client))
            }
            Err(e) => {
                error!("Failed to build LLM client, chat disabled: {e}");
                None
            }
        },
        None => {
            warn!("LLM_API_KEY not set, chat assistant disabled");
            None
        }
    };

    let passwords = PasswordService::with_defaults()?;
    let state = Arc::new(AppState::new(config, pool, passwords, chat)?);

    if let Err(e) = run_server(state).await {
        error!("Server stopped with error: {e}");
        return Err(e.into());
    }
    info!("Server stopped");
    Ok(())
}
