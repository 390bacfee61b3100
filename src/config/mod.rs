//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → startup wiring
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → static destinations re-proposed to the reconciliation controller
//! ```
//!
//! # Design Decisions
//! - Only the destination list is hot-reloaded; ports and timeouts need a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{AdminConfig, ForwardConfig, HealthCheckConfig, ObservabilityConfig, RelayConfig};
