use thiserror::Error;

/// Errors that can occur while loading build inputs or rendering rules.
///
/// Every variant is fatal for the current build run. There is no partial
/// failure mode and no skip-and-continue: a single bad rule or macro
/// invalidates the whole batch so that content authors fix the source data.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration file is missing, malformed, or lacks a valid
    /// `macros_split_limit`.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A macro or variable document failed to load as a mapping.
    #[error("context load error: {0}")]
    ContextLoad(String),

    /// The named rule template could not be resolved.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// The rules path is invalid or a rule document has the wrong shape.
    #[error("rule load error: {0}")]
    RuleLoad(String),

    /// A macro holds more values than one generated regular expression may
    /// carry. The macro usage must be re-authored with a string name so the
    /// values can be split across multiple string definitions.
    #[error(
        "macro holds {count} values, more than the configured split limit \
         of {limit}; pass a string name so the values can be split across \
         multiple string definitions"
    )]
    TooManyMacroValues {
        /// Number of values supplied to the filter.
        count: usize,
        /// The configured `macros_split_limit`.
        limit: usize,
    },

    /// Macro pre-rendering was requested for a field that is not one of the
    /// two designated rule sections. This indicates a caller bug, not a
    /// content-authoring problem.
    #[error("unsupported rule field: {0}")]
    UnsupportedField(String),

    /// Any other template engine failure, such as a syntax error in a rule
    /// template or in a macro-bearing rule section.
    #[error("template render error: {0}")]
    Render(String),
}
