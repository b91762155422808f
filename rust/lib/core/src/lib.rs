pub mod config;
pub mod error;
pub mod principal;
pub mod types;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use principal::{ANONYMOUS_PRINCIPAL, Principal};
pub use types::{new_id, now_rfc3339};
