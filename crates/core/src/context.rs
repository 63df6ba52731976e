//! Macro and variable context loading.
//!
//! Macro documents and variable documents share one shape: a directory of
//! YAML files, each decoding to a flat mapping of names to values. The
//! files are merged into a single context with last-wins semantics on key
//! collision. Discovery order is sorted lexicographically by path so that
//! merges are reproducible across platforms.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml_ng::Value;
use tracing::debug;

use crate::YAML_SUFFIX;
use crate::error::BuildError;

/// A flat mapping of names to scalar or list values, used both for the
/// macro context and for the template-global variable context.
pub type ContextMap = BTreeMap<String, Value>;

/// Merge every YAML mapping document in `dir` into one context.
///
/// The scan is non-recursive. Only regular files with the `yml` extension
/// participate; directories and symlinks are skipped. Matched files are
/// merged in lexicographic path order, later files winning on key
/// collision.
pub fn load_context_dir(dir: &Path) -> Result<ContextMap, BuildError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        BuildError::ContextLoad(format!("cannot read directory {}: {e}", dir.display()))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| BuildError::ContextLoad(format!("directory entry error: {e}")))?;
        let file_type = entry
            .file_type()
            .map_err(|e| BuildError::ContextLoad(format!("directory entry error: {e}")))?;
        // file_type() does not follow symlinks, so symlinked files are
        // excluded along with directories.
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(YAML_SUFFIX) {
            files.push(path);
        }
    }
    files.sort();

    let mut merged = ContextMap::new();
    for path in files {
        debug!(path = %path.display(), "loading context from file");
        let text = std::fs::read_to_string(&path).map_err(|e| {
            BuildError::ContextLoad(format!("cannot read {}: {e}", path.display()))
        })?;
        let document: ContextMap = serde_yaml_ng::from_str(&text).map_err(|e| {
            BuildError::ContextLoad(format!(
                "{} does not decode to a mapping: {e}",
                path.display()
            ))
        })?;
        merged.extend(document);
    }
    debug!(dir = %dir.display(), entries = merged.len(), "merged context");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn merges_files_in_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.yml", "shared: from_b\nonly_b: 2\n");
        write(dir.path(), "a.yml", "shared: from_a\nonly_a: 1\n");

        let context = load_context_dir(dir.path()).unwrap();
        assert_eq!(context.len(), 3);
        // b.yml sorts after a.yml, so its value wins the collision.
        assert_eq!(context["shared"], Value::from("from_b"));
        assert_eq!(context["only_a"], Value::from(1));
        assert_eq!(context["only_b"], Value::from(2));
    }

    #[test]
    fn ignores_other_extensions_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "vars.yml", "key: value\n");
        write(dir.path(), "notes.txt", "not yaml\n");
        write(dir.path(), "vars.yaml", "other: 1\n");
        fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir.path().join("nested"), "more.yml", "nested: true\n");

        let context = load_context_dir(dir.path()).unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context["key"], Value::from("value"));
    }

    #[test]
    fn list_values_survive_merging() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "macros.yml", "domains:\n  - foo.com\n  - bar.net\n");

        let context = load_context_dir(dir.path()).unwrap();
        let domains = context["domains"].as_sequence().unwrap();
        assert_eq!(domains.len(), 2);
    }

    #[test]
    fn non_mapping_document_is_context_load_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.yml", "- just\n- a\n- list\n");

        let err = load_context_dir(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::ContextLoad(_)));
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn missing_directory_is_context_load_error() {
        let err = load_context_dir(Path::new("/nonexistent/vars")).unwrap_err();
        assert!(matches!(err, BuildError::ContextLoad(_)));
    }

    #[test]
    fn empty_directory_yields_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let context = load_context_dir(dir.path()).unwrap();
        assert!(context.is_empty());
    }
}
