//! Filter library and rendering pipeline for the yarforge rule builder.

pub mod builder;
pub mod filters;

pub use builder::{
    BuilderPaths, RULE_MACRO_DIR, RULE_TEMPLATE_DIR, RULE_TEMPLATE_SUFFIX, RuleBuilder,
    RuleOutput, TemplateEntry, VARS_DIR,
};
pub use filters::{RegexpAltOptions, alternation, list_as_meta, regexpalt, register_filters};
