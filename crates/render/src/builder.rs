//! The two-pass rule rendering pipeline.
//!
//! A [`RuleBuilder`] is constructed once: it loads the macro and variable
//! contexts, prepares two MiniJinja environments, and resolves the named
//! rule template. Each rule record is then rendered in two passes. The
//! macro pre-render pass expands macro references inside the
//! `rule_strings` and `rule_condition` sections against the macro context
//! alone. The full render pass feeds the updated record, overlaid on the
//! global variable context, through the rule template.

use std::path::{Path, PathBuf};

use minijinja::value::Value as TemplateValue;
use minijinja::{Environment, ErrorKind, path_loader};
use serde_yaml_ng::Value;
use tracing::{debug, info};

use yarforge_core::{
    BuildConfig, BuildError, CONDITION_KEY, ContextMap, RuleRecord, STRINGS_KEY,
    load_context_dir, load_ruleset,
};

/// Directory holding rule templates.
pub const RULE_TEMPLATE_DIR: &str = "templates";

/// Directory holding variable documents for the global context.
pub const VARS_DIR: &str = "vars";

/// Directory holding macro documents.
pub const RULE_MACRO_DIR: &str = "vars/macros";

/// Suffix appended to a template name to form its file name.
pub const RULE_TEMPLATE_SUFFIX: &str = "yar.tmpl";

/// Filesystem locations consumed by [`RuleBuilder::new`].
#[derive(Debug, Clone)]
pub struct BuilderPaths {
    /// Rule template directory.
    pub templates_dir: PathBuf,
    /// Variable document directory.
    pub vars_dir: PathBuf,
    /// Macro document directory.
    pub macros_dir: PathBuf,
}

impl Default for BuilderPaths {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from(RULE_TEMPLATE_DIR),
            vars_dir: PathBuf::from(VARS_DIR),
            macros_dir: PathBuf::from(RULE_MACRO_DIR),
        }
    }
}

impl BuilderPaths {
    /// The default layout resolved under an explicit root directory.
    pub fn rooted(root: &Path) -> Self {
        Self {
            templates_dir: root.join(RULE_TEMPLATE_DIR),
            vars_dir: root.join(VARS_DIR),
            macros_dir: root.join(RULE_MACRO_DIR),
        }
    }
}

/// A template discovered in the templates directory, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    /// The name a caller may pass as the template option.
    pub name: String,
    /// The template file name.
    pub file: String,
}

/// YARA rule builder over YAML rule records.
///
/// All state is loaded at construction and immutable afterwards; a
/// builder may run [`RuleBuilder::build_rules`] any number of times.
#[derive(Debug)]
pub struct RuleBuilder {
    template_name: String,
    template_file: String,
    config: BuildConfig,
    macro_context: ContextMap,
    global_context: ContextMap,
    rule_env: Environment<'static>,
    macro_env: Environment<'static>,
    templates_dir: PathBuf,
}

impl RuleBuilder {
    /// Create a builder rendering with the named template.
    ///
    /// Loads the macro and variable contexts, registers the filter
    /// library into both rendering environments, and resolves
    /// `<template_name>.yar.tmpl` from the templates directory.
    pub fn new(
        config: BuildConfig,
        template_name: &str,
        paths: &BuilderPaths,
    ) -> Result<Self, BuildError> {
        let macro_context = load_context_dir(&paths.macros_dir)?;
        debug!(entries = macro_context.len(), "macros context loaded");
        let global_context = load_context_dir(&paths.vars_dir)?;
        debug!(entries = global_context.len(), "global context loaded");

        let split_limit = config.macros_split_limit;

        let mut rule_env = Environment::new();
        rule_env.set_loader(path_loader(&paths.templates_dir));
        crate::filters::register_filters(&mut rule_env, split_limit);
        for (name, value) in &global_context {
            rule_env.add_global(name.clone(), TemplateValue::from_serialize(value));
        }

        let mut macro_env = Environment::new();
        crate::filters::register_filters(&mut macro_env, split_limit);

        let template_file = format!("{template_name}.{RULE_TEMPLATE_SUFFIX}");
        rule_env.get_template(&template_file).map_err(|e| {
            if e.kind() == ErrorKind::TemplateNotFound {
                BuildError::TemplateNotFound(format!(
                    "{template_file} in {}",
                    paths.templates_dir.display()
                ))
            } else {
                BuildError::Render(e.to_string())
            }
        })?;

        Ok(Self {
            template_name: template_name.to_string(),
            template_file,
            config,
            macro_context,
            global_context,
            rule_env,
            macro_env,
            templates_dir: paths.templates_dir.clone(),
        })
    }

    /// List the templates available in the configured templates directory.
    pub fn list_rule_templates(&self) -> Result<Vec<TemplateEntry>, BuildError> {
        let entries = std::fs::read_dir(&self.templates_dir).map_err(|e| {
            BuildError::TemplateNotFound(format!(
                "cannot read templates directory {}: {e}",
                self.templates_dir.display()
            ))
        })?;

        let suffix = format!(".{RULE_TEMPLATE_SUFFIX}");
        let mut templates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                BuildError::TemplateNotFound(format!("directory entry error: {e}"))
            })?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let file = entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = file.strip_suffix(&suffix) {
                templates.push(TemplateEntry {
                    name: name.to_string(),
                    file,
                });
            }
        }
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    /// Load the ruleset at `rules_path` and return the lazy output
    /// sequence: the optional import preamble lines followed by each
    /// rule's rendered text, in ruleset order.
    ///
    /// The sequence is a single forward pass; rerunning requires another
    /// `build_rules` call, which reloads the ruleset.
    pub fn build_rules(&self, rules_path: &Path) -> Result<RuleOutput<'_>, BuildError> {
        info!(path = %rules_path.display(), "preparing to build ruleset");
        let ruleset = load_ruleset(rules_path)?;
        debug!(count = ruleset.len(), "will build rule(s)");
        let preamble = self.preamble(ruleset.len());
        Ok(RuleOutput {
            builder: self,
            preamble: preamble.into_iter(),
            records: ruleset.into_iter(),
        })
    }

    /// Render one rule record through both passes.
    pub fn render_rule(&self, mut record: RuleRecord) -> Result<String, BuildError> {
        self.apply_macros(&mut record, "strings")?;
        self.apply_macros(&mut record, "condition")?;
        let template = self
            .rule_env
            .get_template(&self.template_file)
            .map_err(|e| BuildError::Render(e.to_string()))?;
        template
            .render(TemplateValue::from_serialize(&record))
            .map_err(render_error)
    }

    /// Expand macro references inside one designated rule section.
    ///
    /// `field` must be `strings` or `condition`; anything else is a
    /// caller bug. A missing or empty section is left untouched. The
    /// section body is rendered against the macro context only, so
    /// global variables are not visible during this pass.
    fn apply_macros(&self, record: &mut RuleRecord, field: &str) -> Result<(), BuildError> {
        let key = match field {
            "strings" => STRINGS_KEY,
            "condition" => CONDITION_KEY,
            other => return Err(BuildError::UnsupportedField(other.to_string())),
        };
        let body = match record.get(key) {
            Some(Value::String(body)) if !body.is_empty() => body.clone(),
            _ => return Ok(()),
        };
        let rendered = self
            .macro_env
            .render_str(&body, &self.macro_context)
            .map_err(render_error)?;
        record.insert(key.to_string(), Value::String(rendered));
        Ok(())
    }

    fn preamble(&self, ruleset_len: usize) -> Vec<String> {
        if ruleset_len == 0 || !self.import_auto() || !self.is_full_template() {
            return Vec::new();
        }
        let modules = self.import_modules();
        if modules.is_empty() {
            return Vec::new();
        }
        let mut lines: Vec<String> = modules
            .iter()
            .map(|module| format!("import \"{module}\""))
            .collect();
        lines.push(String::new());
        lines
    }

    fn import_auto(&self) -> bool {
        self.global_context
            .get("import_all_modules_auto")
            .and_then(Value::as_bool)
            .unwrap_or(self.config.import_all_modules_auto)
    }

    fn import_modules(&self) -> Vec<String> {
        match self
            .global_context
            .get("import_modules_list")
            .and_then(Value::as_sequence)
        {
            Some(modules) => modules
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect(),
            None => self.config.import_modules_list.clone(),
        }
    }

    fn is_full_template(&self) -> bool {
        match self
            .global_context
            .get("rule_full_templates")
            .and_then(Value::as_sequence)
        {
            Some(templates) => templates
                .iter()
                .any(|t| t.as_str() == Some(self.template_name.as_str())),
            None => self
                .config
                .rule_full_templates
                .iter()
                .any(|t| t == &self.template_name),
        }
    }
}

/// Recover a filter-raised [`BuildError`] from a MiniJinja error chain.
fn render_error(err: minijinja::Error) -> BuildError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(&err);
    while let Some(cause) = source {
        if let Some(BuildError::TooManyMacroValues { count, limit }) =
            cause.downcast_ref::<BuildError>()
        {
            return BuildError::TooManyMacroValues {
                count: *count,
                limit: *limit,
            };
        }
        source = cause.source();
    }
    BuildError::Render(err.to_string())
}

/// Lazy, finite, single-pass sequence of build output.
///
/// Yields the preamble lines first, then one rendered rule per record.
pub struct RuleOutput<'a> {
    builder: &'a RuleBuilder,
    preamble: std::vec::IntoIter<String>,
    records: std::vec::IntoIter<RuleRecord>,
}

impl Iterator for RuleOutput<'_> {
    type Item = Result<String, BuildError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(line) = self.preamble.next() {
            return Some(Ok(line));
        }
        self.records
            .next()
            .map(|record| self.builder.render_rule(record))
    }
}
