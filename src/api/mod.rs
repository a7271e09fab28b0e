pub mod admin;
pub mod error;
pub mod models;

pub use admin::AdminClient;
pub use error::ApiError;
pub use models::*;
