pub mod api_key;
pub mod auth;
pub mod response;
pub mod telemetry;

pub use api_key::{api_key_middleware, KeyGuard};
pub use auth::{admin_auth_middleware, AdminIdentity};
pub use response::{ApiResponse, ApiResult};
pub use telemetry::telemetry_middleware;
