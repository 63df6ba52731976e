//! Rule document discovery and parsing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml_ng::Value;
use tracing::{debug, info};

use crate::YAML_SUFFIX;
use crate::error::BuildError;

/// One rule as authored in YAML.
///
/// The rendering pipeline recognizes the [`STRINGS_KEY`] and
/// [`CONDITION_KEY`] entries; every other key passes through untouched to
/// the rule template.
pub type RuleRecord = BTreeMap<String, Value>;

/// Record key holding the rule's strings section.
pub const STRINGS_KEY: &str = "rule_strings";

/// Record key holding the rule's condition section.
pub const CONDITION_KEY: &str = "rule_condition";

/// Load rule records from a YAML file or a directory tree of YAML files.
///
/// A file must decode to a sequence of rule mappings. A directory is
/// walked recursively for files with the `yml` extension; the matched
/// documents are parsed and concatenated in lexicographic path order.
pub fn load_ruleset(path: &Path) -> Result<Vec<RuleRecord>, BuildError> {
    debug!(path = %path.display(), "configured rules path");
    let mut files = Vec::new();
    if path.is_file() {
        if path.extension().and_then(|ext| ext.to_str()) != Some(YAML_SUFFIX) {
            return Err(BuildError::RuleLoad(format!(
                "{} is not a YAML rules file",
                path.display()
            )));
        }
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        walk_rules_dir(path, &mut files)?;
        files.sort();
    } else {
        return Err(BuildError::RuleLoad(format!(
            "{} is neither a rules file nor a rules directory",
            path.display()
        )));
    }

    info!(count = files.len(), "found YAML rule file(s) to process");
    let mut ruleset = Vec::new();
    for file in files {
        debug!(path = %file.display(), "loading rules from file");
        let text = std::fs::read_to_string(&file).map_err(|e| {
            BuildError::RuleLoad(format!("cannot read {}: {e}", file.display()))
        })?;
        let records: Vec<RuleRecord> = serde_yaml_ng::from_str(&text).map_err(|e| {
            BuildError::RuleLoad(format!(
                "{} does not decode to a sequence of rule mappings: {e}",
                file.display()
            ))
        })?;
        ruleset.extend(records);
    }
    Ok(ruleset)
}

fn walk_rules_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), BuildError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        BuildError::RuleLoad(format!("cannot read directory {}: {e}", dir.display()))
    })?;
    for entry in entries {
        let entry =
            entry.map_err(|e| BuildError::RuleLoad(format!("directory entry error: {e}")))?;
        let file_type = entry
            .file_type()
            .map_err(|e| BuildError::RuleLoad(format!("directory entry error: {e}")))?;
        let path = entry.path();
        if file_type.is_dir() {
            walk_rules_dir(&path, files)?;
        } else if file_type.is_file()
            && path.extension().and_then(|ext| ext.to_str()) == Some(YAML_SUFFIX)
        {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const TWO_RULES: &str = "\
- rule_name: first
  rule_strings: '$a = \"x\"'
  rule_condition: any of them
- rule_name: second
  rule_condition: 'true'
";

    #[test]
    fn load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(&path, TWO_RULES).unwrap();

        let ruleset = load_ruleset(&path).unwrap();
        assert_eq!(ruleset.len(), 2);
        assert_eq!(ruleset[0]["rule_name"], Value::from("first"));
        assert_eq!(ruleset[1]["rule_name"], Value::from("second"));
    }

    #[test]
    fn extra_keys_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(
            &path,
            "- rule_name: tagged\n  rule_condition: 'true'\n  tags:\n    - apt\n    - loader\n",
        )
        .unwrap();

        let ruleset = load_ruleset(&path).unwrap();
        let tags = ruleset[0]["tags"].as_sequence().unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn directory_walk_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(
            dir.path().join("sub").join("extra.yml"),
            "- rule_name: nested\n  rule_condition: 'true'\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.yml"),
            "- rule_name: from_b\n  rule_condition: 'true'\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.yml"),
            "- rule_name: from_a\n  rule_condition: 'true'\n",
        )
        .unwrap();
        fs::write(dir.path().join("readme.md"), "not rules\n").unwrap();

        let ruleset = load_ruleset(dir.path()).unwrap();
        let names: Vec<&str> = ruleset
            .iter()
            .map(|r| r["rule_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["from_a", "from_b", "nested"]);
    }

    #[test]
    fn missing_path_is_rule_load_error() {
        let err = load_ruleset(Path::new("/nonexistent/rules")).unwrap_err();
        assert!(matches!(err, BuildError::RuleLoad(_)));
    }

    #[test]
    fn non_yaml_file_is_rule_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, "[]").unwrap();

        let err = load_ruleset(&path).unwrap_err();
        assert!(matches!(err, BuildError::RuleLoad(_)));
    }

    #[test]
    fn wrong_document_shape_is_rule_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(&path, "rule_name: not_a_sequence\n").unwrap();

        let err = load_ruleset(&path).unwrap_err();
        assert!(matches!(err, BuildError::RuleLoad(_)));
        assert!(err.to_string().contains("rules.yml"));
    }

    #[test]
    fn empty_directory_yields_empty_ruleset() {
        let dir = tempfile::tempdir().unwrap();
        let ruleset = load_ruleset(dir.path()).unwrap();
        assert!(ruleset.is_empty());
    }
}
