//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks, every problem reported at once)
//!     → InterceptorConfig (validated, immutable)
//!     → schema.rs builders: TracingOptions / LoggingOptions / MetricsOptions
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    DurationFieldFormat, FilterConfig, InterceptorConfig, LogFormat, LoggingConfig, MetricsConfig,
    TracerBackend, TracingConfig,
};
pub use validation::{validate_config, ValidationError};
