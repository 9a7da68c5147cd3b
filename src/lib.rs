// Epson Connect client - Library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;

pub use auth::{AuthContext, Credentials};
pub use error::{Error, Result};
pub use http_client::BasicAuth;
