//! Template filters for macro expansion.
//!
//! Two filters are registered into every rendering environment:
//!
//! - `list_as_meta` turns a list of values into uniquely keyed YARA
//!   metadata entries.
//! - `regexpalt` turns a list of literal strings into one or more YARA
//!   regular-expression definitions, splitting oversized value lists into
//!   multiple string definitions so a single alternation never exceeds the
//!   engine's complexity limit.
//!
//! The filters are pure functions; the MiniJinja glue at the bottom of
//! this module adapts argument conversion and error mapping.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use minijinja::value::{Kwargs, Value};
use minijinja::{Environment, ErrorKind};

use yarforge_core::BuildError;

/// Options accepted by [`regexpalt`].
#[derive(Debug, Clone)]
pub struct RegexpAltOptions {
    /// Base name for generated string definitions. Required whenever the
    /// value list does not fit into a single alternation expression.
    pub strname: Option<String>,
    /// YARA pattern modifiers appended to each generated definition.
    pub modifiers: Vec<String>,
    /// Surround multi-value alternations with word-boundary assertions.
    pub boundaries: bool,
    /// Trim surrounding whitespace from each value before processing.
    pub strip: bool,
}

impl Default for RegexpAltOptions {
    fn default() -> Self {
        Self {
            strname: None,
            modifiers: Vec::new(),
            boundaries: true,
            strip: true,
        }
    }
}

/// Convert a list of values into uniquely keyed YARA metadata entries.
///
/// The i-th key (1-indexed) is the trimmed `prefix` followed by the
/// zero-padded two-digit decimal representation of i, so the output holds
/// exactly one entry per input value. Values are trimmed of surrounding
/// whitespace.
pub fn list_as_meta(values: &[String], prefix: &str) -> BTreeMap<String, String> {
    let prefix = prefix.trim();
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            (
                format!("{prefix}{index:02}", index = i + 1),
                value.trim().to_string(),
            )
        })
        .collect()
}

/// Join escaped literal values into one alternation regular expression.
///
/// A single value stays a bare escaped string with no grouping and no
/// boundary assertions. Content authors may use macros that hold one value
/// today but are expected to grow; the bare form keeps such expressions
/// readable and avoids a needless capture group. Two or more values are
/// wrapped in a capturing group, with `\b` assertions on both sides when
/// `boundaries` is set.
pub fn alternation(values: &[String], boundaries: bool) -> String {
    let joined = values
        .iter()
        .map(|value| regex::escape(value))
        .collect::<Vec<_>>()
        .join("|");
    if values.len() > 1 {
        if boundaries {
            format!("\\b({joined})\\b")
        } else {
            format!("({joined})")
        }
    } else {
        joined
    }
}

/// Convert a list of literal strings into YARA regular-expression output.
///
/// The value list is partitioned, in original order, into contiguous
/// chunks of at most `limit` values. With a single chunk and no
/// `strname`, the result is the bare alternation expression. With a
/// `strname`, each chunk becomes one string definition line
/// `$<strname>_<NN> = /<expression>/ <modifiers>`, joined with newlines in
/// chunk order. More than one chunk without a `strname` fails with
/// [`BuildError::TooManyMacroValues`] rather than emitting an expression
/// the rule engine would reject.
pub fn regexpalt(
    values: &[String],
    limit: NonZeroUsize,
    options: &RegexpAltOptions,
) -> Result<String, BuildError> {
    let trimmed: Vec<String>;
    let values = if options.strip {
        trimmed = values.iter().map(|v| v.trim().to_string()).collect();
        &trimmed
    } else {
        values
    };

    let chunks: Vec<&[String]> = values.chunks(limit.get()).collect();
    match &options.strname {
        None => {
            if chunks.len() > 1 {
                return Err(BuildError::TooManyMacroValues {
                    count: values.len(),
                    limit: limit.get(),
                });
            }
            Ok(chunks
                .first()
                .map_or_else(String::new, |chunk| alternation(chunk, options.boundaries)))
        }
        Some(strname) => {
            let strname = strname.trim();
            let lines: Vec<String> = chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| {
                    let expression = alternation(chunk, options.boundaries);
                    let mut line =
                        format!("${strname}_{index:02} = /{expression}/", index = i + 1);
                    if !options.modifiers.is_empty() {
                        line.push(' ');
                        line.push_str(&options.modifiers.join(" "));
                    }
                    line
                })
                .collect();
            Ok(lines.join("\n"))
        }
    }
}

/// Register both filters into a rendering environment.
///
/// The split limit is captured by the `regexpalt` closure at registration
/// time; no ambient state is involved.
pub fn register_filters(env: &mut Environment<'_>, split_limit: NonZeroUsize) {
    env.add_filter("list_as_meta", list_as_meta_filter);
    env.add_filter(
        "regexpalt",
        move |values: Vec<Value>, kwargs: Kwargs| regexpalt_filter(split_limit, &values, &kwargs),
    );
}

fn value_text(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), ToString::to_string)
}

fn list_as_meta_filter(values: Vec<Value>, prefix: String) -> Value {
    let values: Vec<String> = values.iter().map(value_text).collect();
    Value::from_serialize(list_as_meta(&values, &prefix))
}

fn regexpalt_filter(
    limit: NonZeroUsize,
    values: &[Value],
    kwargs: &Kwargs,
) -> Result<String, minijinja::Error> {
    let strname: Option<String> = kwargs.get("strname")?;
    let modifiers: Option<Vec<String>> = kwargs.get("modifiers")?;
    let boundaries: Option<bool> = kwargs.get("boundaries")?;
    let strip: Option<bool> = kwargs.get("strip")?;
    kwargs.assert_all_used()?;

    let options = RegexpAltOptions {
        strname,
        modifiers: modifiers.unwrap_or_default(),
        boundaries: boundaries.unwrap_or(true),
        strip: strip.unwrap_or(true),
    };
    let values: Vec<String> = values.iter().map(value_text).collect();
    regexpalt(&values, limit, &options).map_err(|e| {
        minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()).with_source(e)
    })
}
