//! Core loading layer for the yarforge rule builder.
//!
//! Provides the build configuration, the macro and variable context
//! loaders, the rule document loader, and the shared error taxonomy. All
//! loaded state is immutable once constructed; the rendering pipeline in
//! `yarforge-render` consumes it read-only.

pub mod config;
pub mod context;
pub mod error;
pub mod ruleset;

pub use config::{BuildConfig, CONFIG_FILE};
pub use context::{ContextMap, load_context_dir};
pub use error::BuildError;
pub use ruleset::{CONDITION_KEY, RuleRecord, STRINGS_KEY, load_ruleset};

/// File extension, without the dot, identifying YAML documents during
/// macro, variable and rule discovery.
pub const YAML_SUFFIX: &str = "yml";
