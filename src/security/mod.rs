pub mod antivirus;
pub mod auth;
pub mod cors;
pub mod jwt;
pub mod password;

pub use antivirus::{ScanVerdict, ScannerConfig, ThreatKind, UploadScanner};
pub use auth::{AdminUser, AuthenticatedUser};
pub use cors::{create_cors_layer, CorsConfig};
pub use jwt::{extract_bearer_token, Claims, JwtConfig, JwtManager, TokenPair};
pub use password::{PasswordIssue, PasswordService};
