use std::num::NonZeroUsize;
use std::path::Path;

use serde::Deserialize;

use crate::error::BuildError;

/// Default file name for the build configuration, resolved relative to the
/// working directory.
pub const CONFIG_FILE: &str = "yarforge.yml";

/// Build configuration, loaded once from a YAML file at startup.
///
/// `macros_split_limit` bounds how many alternation values may appear in one
/// generated regular expression before the `regexpalt` filter refuses to
/// produce a single oversized expression. The import keys act as defaults
/// for the corresponding global-context variables when the variable
/// documents do not define them.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Maximum number of alternation values per generated regular
    /// expression. Must be positive.
    pub macros_split_limit: NonZeroUsize,

    /// Whether to emit an import preamble before the first rule.
    #[serde(default)]
    pub import_all_modules_auto: bool,

    /// Module names to import, in emission order.
    #[serde(default)]
    pub import_modules_list: Vec<String>,

    /// Names of templates that render a complete rule file and therefore
    /// qualify for the import preamble.
    #[serde(default)]
    pub rule_full_templates: Vec<String>,
}

impl BuildConfig {
    /// Load the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BuildError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_yaml_ng::from_str(&text).map_err(|e| {
            BuildError::Configuration(format!("cannot parse {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), ?config, "loaded build configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn load_full_config() {
        let (_dir, path) = write_config(
            "macros_split_limit: 10\n\
             import_all_modules_auto: true\n\
             import_modules_list:\n  - pe\n  - math\n\
             rule_full_templates:\n  - default\n",
        );
        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.macros_split_limit.get(), 10);
        assert!(config.import_all_modules_auto);
        assert_eq!(config.import_modules_list, vec!["pe", "math"]);
        assert_eq!(config.rule_full_templates, vec!["default"]);
    }

    #[test]
    fn optional_keys_default() {
        let (_dir, path) = write_config("macros_split_limit: 25\n");
        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.macros_split_limit.get(), 25);
        assert!(!config.import_all_modules_auto);
        assert!(config.import_modules_list.is_empty());
        assert!(config.rule_full_templates.is_empty());
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = BuildConfig::load(Path::new("/nonexistent/yarforge.yml")).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn missing_split_limit_is_rejected() {
        let (_dir, path) = write_config("import_all_modules_auto: true\n");
        let err = BuildConfig::load(&path).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
        assert!(err.to_string().contains("macros_split_limit"));
    }

    #[test]
    fn zero_split_limit_is_rejected() {
        let (_dir, path) = write_config("macros_split_limit: 0\n");
        let err = BuildConfig::load(&path).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn negative_split_limit_is_rejected() {
        let (_dir, path) = write_config("macros_split_limit: -3\n");
        let err = BuildConfig::load(&path).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let (_dir, path) = write_config("macros_split_limit: [[[\n");
        let err = BuildConfig::load(&path).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }
}
