pub mod checker;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod providers;
pub mod server;
pub mod types;

pub use error::RelayError;
pub type Result<T> = std::result::Result<T, RelayError>;
