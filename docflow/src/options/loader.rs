//! Layered option loading from files and the environment.

use super::flatten::render_value;
use super::Options;
use crate::errors::DocflowError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment prefix used when none is given.
pub const DEFAULT_ENV_PREFIX: &str = "DOCFLOW";

/// Per-directory option files, loaded in this order.
pub const DOTFILES: [&str; 2] = [".docflow.json", ".docflow.yaml"];

/// Options and feature names collected from one or more layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedOptions {
    /// Flattened options.
    pub options: Options,
    /// Feature names to enable, first occurrence first.
    ///
    /// A layer read from a file may also carry `-name` entries; they are
    /// resolved against earlier layers by [`LoadedOptions::merge`].
    pub features: Vec<String>,
}

impl LoadedOptions {
    /// Applies `other` on top of this layer.
    ///
    /// Option keys in `other` overwrite existing ones. A feature entry of
    /// the form `-name` disables a previously enabled `name`.
    pub fn merge(&mut self, other: Self) {
        self.options.merge(other.options);
        self.apply_features(other.features);
    }

    fn apply_features(&mut self, features: Vec<String>) {
        for feature in features {
            if let Some(disabled) = feature.strip_prefix('-') {
                self.features.retain(|f| f != disabled);
            } else if !self.features.contains(&feature) {
                self.features.push(feature);
            }
        }
    }

    /// Records the raw entries of one layer, keeping `-name` markers.
    ///
    /// Each name is kept once, as whichever of `name` or `-name` came
    /// last, so merging the result has the same effect as merging the
    /// entries one by one.
    fn record_features(&mut self, features: Vec<String>) {
        for feature in features {
            let opposite = match feature.strip_prefix('-') {
                Some(name) => name.to_string(),
                None => format!("-{feature}"),
            };
            self.features.retain(|f| *f != opposite);
            if !self.features.contains(&feature) {
                self.features.push(feature);
            }
        }
    }
}

/// Loads an options file (YAML, or JSON as a YAML subset).
///
/// `features` and `include` keys are lifted out of the options. Include
/// paths are resolved relative to the including file.
pub fn load_options_from_file(path: impl AsRef<Path>) -> Result<LoadedOptions, DocflowError> {
    let mut stack = Vec::new();
    load_file(path.as_ref(), &mut stack)
}

/// Parses options text; includes are resolved against `base_dir`.
pub fn load_options_from_str(text: &str, base_dir: &Path) -> Result<LoadedOptions, DocflowError> {
    let mut stack = Vec::new();
    load_text(text, base_dir, &mut stack)
}

fn load_file(path: &Path, stack: &mut Vec<PathBuf>) -> Result<LoadedOptions, DocflowError> {
    let canonical = fs::canonicalize(path)
        .map_err(|e| DocflowError::Config(format!("{}: {e}", path.display())))?;

    if stack.contains(&canonical) {
        return Err(DocflowError::Config(format!(
            "include cycle through {}",
            canonical.display()
        )));
    }

    let text = fs::read_to_string(&canonical)
        .map_err(|e| DocflowError::Config(format!("{}: {e}", path.display())))?;
    let base_dir = canonical
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    debug!(path = %canonical.display(), "Loading options file");

    stack.push(canonical);
    let loaded = load_text(&text, &base_dir, stack);
    stack.pop();
    loaded
}

fn load_text(
    text: &str,
    base_dir: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<LoadedOptions, DocflowError> {
    let value: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(text)?
    };

    let mut options = Options::from_value(value);
    let features = take_string_list(&mut options, "features")?;
    let includes = take_string_list(&mut options, "include")?;

    let mut loaded = LoadedOptions {
        options,
        features: Vec::new(),
    };
    loaded.record_features(features);

    for include in includes {
        let included = load_file(&base_dir.join(include), stack)?;
        loaded.options.merge(included.options);
        loaded.record_features(included.features);
    }

    Ok(loaded)
}

fn take_string_list(options: &mut Options, key: &str) -> Result<Vec<String>, DocflowError> {
    match options.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.iter().map(render_value).collect()),
        Some(Value::String(item)) => Ok(vec![item]),
        Some(other) => Err(DocflowError::Config(format!(
            "'{key}' must be a list, got {other}"
        ))),
    }
}

/// Collects options from `<PREFIX>_OPTIONS_FILE<N>` environment variables.
///
/// Files load in ascending `N` on top of the given defaults. `{VAR}`
/// placeholders in a variable's value are expanded from the environment.
pub fn features_options_from_env(
    prefix: Option<&str>,
    default_features: &[String],
    default_options: Options,
) -> Result<LoadedOptions, DocflowError> {
    features_options_from_vars(std::env::vars(), prefix, default_features, default_options)
}

pub(crate) fn features_options_from_vars(
    vars: impl IntoIterator<Item = (String, String)>,
    prefix: Option<&str>,
    default_features: &[String],
    default_options: Options,
) -> Result<LoadedOptions, DocflowError> {
    let prefix = prefix.unwrap_or(DEFAULT_ENV_PREFIX);
    let env: HashMap<String, String> = vars.into_iter().collect();

    let pattern = Regex::new(&format!(r"^{}_OPTIONS_FILE(\d+)$", regex::escape(prefix)))
        .map_err(|e| DocflowError::Internal(e.to_string()))?;

    let mut files: Vec<(u64, String)> = Vec::new();
    for (name, value) in &env {
        let Some(index) = pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };
        files.push((index, expand_placeholders(value, &env)?));
    }
    files.sort_by_key(|(index, _)| *index);

    let mut loaded = LoadedOptions {
        options: default_options,
        features: Vec::new(),
    };
    loaded.apply_features(default_features.to_vec());

    for (_, file) in files {
        loaded.merge(load_options_from_file(&file)?);
    }

    Ok(loaded)
}

fn expand_placeholders(value: &str, env: &HashMap<String, String>) -> Result<String, DocflowError> {
    let placeholder = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| DocflowError::Internal(e.to_string()))?;

    if let Some(missing) = placeholder
        .captures_iter(value)
        .filter_map(|caps| caps.get(1))
        .find(|name| !env.contains_key(name.as_str()))
    {
        return Err(DocflowError::Config(format!(
            "unknown environment variable '{}' in '{value}'",
            missing.as_str()
        )));
    }

    Ok(placeholder
        .replace_all(value, |caps: &regex::Captures<'_>| {
            env.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

/// Builder applying configuration layers in increasing priority.
///
/// Layers apply in call order; per-call overrides always apply last.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayers {
    loaded: LoadedOptions,
    overrides: Options,
}

impl ConfigLayers {
    /// Creates an empty layer stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies built-in defaults.
    #[must_use]
    pub fn with_defaults(
        mut self,
        features: impl IntoIterator<Item = impl Into<String>>,
        options: Options,
    ) -> Self {
        self.loaded.merge(LoadedOptions {
            options,
            features: features.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Applies option files named by `<PREFIX>_OPTIONS_FILE<N>` variables.
    pub fn with_env(mut self, prefix: Option<&str>) -> Result<Self, DocflowError> {
        let from_env = features_options_from_env(prefix, &[], Options::new())?;
        self.loaded.merge(from_env);
        Ok(self)
    }

    /// Applies whichever of [`DOTFILES`] exist in `dir`.
    pub fn with_dotfiles(mut self, dir: impl AsRef<Path>) -> Result<Self, DocflowError> {
        for name in DOTFILES {
            let path = dir.as_ref().join(name);
            if path.is_file() {
                self.loaded.merge(load_options_from_file(&path)?);
            }
        }
        Ok(self)
    }

    /// Applies an explicit options file.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, DocflowError> {
        self.loaded.merge(load_options_from_file(path)?);
        Ok(self)
    }

    /// Sets per-call overrides.
    #[must_use]
    pub fn with_overrides(mut self, options: Options) -> Self {
        self.overrides.merge(options);
        self
    }

    /// Produces the merged result.
    #[must_use]
    pub fn build(mut self) -> LoadedOptions {
        self.loaded.options.merge(self.overrides);
        self.loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_flattens_and_lifts_features() {
        let loaded = load_options_from_str(
            "features: [DraftMode, MarkdownMetadata, DraftMode]\ntheme:\n  color: red\n  font:\n    name: Arial\n",
            Path::new("."),
        )
        .unwrap();

        assert_eq!(loaded.features, vec!["DraftMode", "MarkdownMetadata"]);
        assert_eq!(loaded.options.get("theme.font.name"), Some(&json!("Arial")));
        assert!(!loaded.options.contains("features"));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "opts.json", r#"{"output": "docx", "toc": {"depth": 2}}"#);

        let loaded = load_options_from_file(&path).unwrap();
        assert_eq!(loaded.options.get_str("output"), Some("docx".to_string()));
        assert_eq!(loaded.options.get("toc.depth"), Some(&json!(2)));
    }

    #[test]
    fn test_includes_merge_after_including_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "base.yaml", "output: pdf\nfeatures: [Included]\n");
        let main = write(
            dir.path(),
            "main.yaml",
            "output: docx\nreference: ref.docx\ninclude: [base.yaml]\n",
        );

        let loaded = load_options_from_file(&main).unwrap();
        assert_eq!(loaded.options.get_str("output"), Some("pdf".to_string()));
        assert_eq!(loaded.options.get_str("reference"), Some("ref.docx".to_string()));
        assert_eq!(loaded.features, vec!["Included"]);
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "include: [b.yaml]\n");
        write(dir.path(), "b.yaml", "include: [a.yaml]\n");

        let err = load_options_from_file(dir.path().join("a.yaml")).unwrap_err();
        assert!(matches!(err, DocflowError::Config(msg) if msg.contains("include cycle")));
    }

    #[test]
    fn test_env_files_in_index_order_with_removal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one.yaml", "features: [A, B]\noutput: pdf\n");
        write(dir.path(), "two.yaml", "features: [-A, C]\noutput: docx\n");

        let vars = vec![
            ("DOCFLOW_OPTIONS_FILE2".to_string(), "{CONF_DIR}/two.yaml".to_string()),
            ("DOCFLOW_OPTIONS_FILE1".to_string(), "{CONF_DIR}/one.yaml".to_string()),
            ("CONF_DIR".to_string(), dir.path().display().to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];

        let loaded = features_options_from_vars(vars, None, &[], Options::new()).unwrap();
        assert_eq!(loaded.features, vec!["B", "C"]);
        assert_eq!(loaded.options.get_str("output"), Some("docx".to_string()));
    }

    #[test]
    fn test_removal_markers_kept_until_merge() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "extra.yaml", "features: [-B, D]\n");
        let layer = write(
            dir.path(),
            "layer.yaml",
            "features: [-A, C, A, -A]\ninclude: [extra.yaml]\n",
        );

        let loaded = load_options_from_file(&layer).unwrap();
        assert_eq!(loaded.features, vec!["C", "-A", "-B", "D"]);

        let mut running = LoadedOptions {
            options: Options::new(),
            features: vec!["A".to_string(), "B".to_string(), "E".to_string()],
        };
        running.merge(loaded);
        assert_eq!(running.features, vec!["E", "C", "D"]);
    }

    #[test]
    fn test_config_layers_remove_default_feature() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "opts.yaml", "features: [-DraftMode, MarkdownMetadata]\n");

        let loaded = ConfigLayers::new()
            .with_defaults(["DraftMode"], Options::new())
            .with_file(&file)
            .unwrap()
            .build();

        assert_eq!(loaded.features, vec!["MarkdownMetadata"]);
    }

    #[test]
    fn test_env_unknown_placeholder() {
        let vars = vec![("DOCFLOW_OPTIONS_FILE1".to_string(), "{NOPE}/x.yaml".to_string())];
        assert!(features_options_from_vars(vars, None, &[], Options::new()).is_err());
    }

    #[test]
    fn test_config_layers_priority() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".docflow.yaml", "output: docx\nreference: dot.docx\n");
        let explicit = write(dir.path(), "explicit.yaml", "reference: explicit.docx\n");

        let defaults: Options = [("output", "pdf"), ("toc.depth", "3")].into_iter().collect();
        let overrides: Options = [("toc.depth", "1")].into_iter().collect();

        let loaded = ConfigLayers::new()
            .with_overrides(overrides)
            .with_defaults(["DraftMode"], defaults)
            .with_dotfiles(dir.path())
            .unwrap()
            .with_file(&explicit)
            .unwrap()
            .build();

        assert_eq!(loaded.options.get_str("output"), Some("docx".to_string()));
        assert_eq!(loaded.options.get_str("reference"), Some("explicit.docx".to_string()));
        assert_eq!(loaded.options.get_str("toc.depth"), Some("1".to_string()));
        assert_eq!(loaded.features, vec!["DraftMode"]);
    }
}
