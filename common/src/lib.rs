pub mod alerts;
pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod utils;

pub use config::Config;
pub use error::ApiError;
pub use utils::setup_tracing;
