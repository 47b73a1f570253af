//! WordPress edge stack library.

pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod offload;
pub mod output;

pub use config::schema::StackConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
