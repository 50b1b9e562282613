//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → sections handed to acceptor, multiplexer, sessions, dispatch
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the server is restarted to change it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    DispatchConfig, ListenerConfig, LogFormat, MultiplexerConfig, ObservabilityConfig, ServerConfig,
    SessionConfig,
};
pub use validation::{validate_config, ValidationError};
