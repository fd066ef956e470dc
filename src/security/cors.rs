use axum::http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ],
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    pub fn with_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    fn origin_values(&self) -> Vec<HeaderValue> {
        self.allowed_origins
            .iter()
            .filter_map(|o| match o.trim_end_matches('/').parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {o:?}");
                    None
                }
            })
            .collect()
    }

    /// An empty origin list means any origin, without credentials.
    pub fn build(self) -> CorsLayer {
        let headers = [header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];
        let cors = CorsLayer::new()
            .allow_methods(self.allowed_methods.clone())
            .allow_headers(headers)
            .expose_headers([header::CONTENT_DISPOSITION])
            .max_age(Duration::from_secs(self.max_age_secs));

        let origins = self.origin_values();
        if origins.is_empty() {
            info!("CORS allows any origin");
            cors.allow_origin(Any)
        } else {
            info!("CORS configured with {} allowed origins", origins.len());
            cors.allow_origin(AllowOrigin::list(origins))
                .allow_credentials(true)
        }
    }
}

pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    CorsConfig::default().with_origins(origins.to_vec()).build()
}
