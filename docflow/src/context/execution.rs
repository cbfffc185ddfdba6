//! The per-run context.

use super::{AttributeBag, TempArea};
use crate::core::StageTiming;
use crate::errors::DocflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::options::Options;
use crate::plugins::{Feature, FeatureInstance, FeatureRef, FeatureType, PluginRegistry};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Mutable state for one document build.
///
/// Declared feature types and their instances are kept in two parallel
/// lists that always have the same length and order. The temporary area
/// is released by [`Context::end_run`], and at the latest when the context
/// is dropped.
pub struct Context {
    run_id: Uuid,
    srcfile: Option<PathBuf>,
    explicit_output: Option<PathBuf>,
    output_override: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    srcfile_format: Option<String>,
    reference_doc: Option<PathBuf>,
    options: Options,
    feature_types: Vec<Arc<FeatureType>>,
    features: Vec<FeatureInstance>,
    /// Document metadata gathered during `collect_metadata`.
    pub metadata: IndexMap<String, Value>,
    /// Dynamic attributes exchanged between stages and handlers.
    pub attrs: AttributeBag,
    timing: Vec<StageTiming>,
    temp: TempArea,
    event_sink: Arc<dyn EventSink>,
}

impl Context {
    /// Creates a context for building `srcfile`, optionally into an explicit
    /// output file.
    #[must_use]
    pub fn new(srcfile: Option<PathBuf>, output_file: Option<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            srcfile,
            explicit_output: output_file,
            output_override: None,
            working_dir: None,
            srcfile_format: None,
            reference_doc: None,
            options: Options::new(),
            feature_types: Vec::new(),
            features: Vec::new(),
            metadata: IndexMap::new(),
            attrs: AttributeBag::new(),
            timing: Vec::new(),
            temp: TempArea::new(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Sets the directory derived output files are placed in. Without one
    /// they are relative to the process working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The source document.
    #[must_use]
    pub fn srcfile(&self) -> Option<&Path> {
        self.srcfile.as_deref()
    }

    /// The run's options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Mutable access to the run's options.
    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    // --- features ---

    /// Resolves a feature, declares it and instantiates it.
    pub fn add_feature(
        &mut self,
        registry: &PluginRegistry,
        feature: impl Into<FeatureRef>,
    ) -> Result<(), DocflowError> {
        let ty = registry.resolve(feature)?;
        let instance = ty.instantiate();
        debug!(run_id = %self.run_id, feature = %ty.name(), "Feature added");
        self.feature_types.push(ty);
        self.features.push(instance);
        Ok(())
    }

    /// Returns true if a feature with this group name is declared.
    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        self.feature_types.iter().any(|ty| ty.name() == name)
    }

    /// The declared feature types, in declaration order.
    #[must_use]
    pub fn feature_types(&self) -> &[Arc<FeatureType>] {
        &self.feature_types
    }

    /// Pairs each declared type with its instance.
    pub fn features(&self) -> impl Iterator<Item = (&Arc<FeatureType>, &FeatureInstance)> {
        self.feature_types.iter().zip(&self.features)
    }

    /// Reads the first instance of `F`.
    ///
    /// Returns `None` if `F` is not declared. Must not be called from one of
    /// `F`'s own handlers, which already hold the instance.
    pub fn with_feature<F: Feature, R>(&self, read: impl FnOnce(&F) -> R) -> Option<R> {
        let (_, instance) = self.features().find(|(ty, _)| ty.is::<F>())?;
        let state = instance.lock();
        state.downcast_ref::<F>().map(read)
    }

    // --- options ---

    /// Gets an option value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Gets an option value rendered as a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.options.get_str(key)
    }

    /// Gets an option value, failing if it is absent.
    pub fn require(&self, key: &str) -> Result<&Value, DocflowError> {
        self.options.require(key)
    }

    /// Gets an option as a boolean token.
    pub fn get_boolean(&self, key: &str, default: Option<bool>) -> Result<bool, DocflowError> {
        self.options.get_boolean(key, default)
    }

    /// Gets every option under `<prefix>.`, prefix stripped.
    #[must_use]
    pub fn get_namespaced(&self, prefix: &str) -> Vec<(String, Value)> {
        self.options.get_namespaced(prefix)
    }

    /// Sets an option, flattening nested mappings.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.set(key, value);
    }

    // --- timing ---

    /// Appends a stage timing entry.
    pub fn record_timing(&mut self, stage: &str, duration: Duration, started_at: DateTime<Utc>) {
        self.timing.push(StageTiming::new(stage, duration, started_at));
    }

    /// The timing log, in completion order.
    #[must_use]
    pub fn timing(&self) -> &[StageTiming] {
        &self.timing
    }

    /// The timing log as `{stage: seconds}`.
    #[must_use]
    pub fn timing_json(&self) -> Value {
        let entries = self
            .timing
            .iter()
            .map(|entry| (entry.stage.clone(), Value::from(entry.seconds())))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(entries)
    }

    // --- temporary area ---

    /// Creates the run's temporary area.
    pub fn begin_run(&mut self) -> Result<(), DocflowError> {
        let dir = self.temp.begin()?;
        debug!(run_id = %self.run_id, tmpdir = %dir.display(), "Run started");
        Ok(())
    }

    /// Closes tracked descriptors and removes the temporary area. Calling
    /// it again is a no-op.
    pub fn end_run(&mut self) -> Result<(), DocflowError> {
        if self.temp.is_active() {
            debug!(run_id = %self.run_id, "Releasing temporary area");
        }
        self.temp.end()
    }

    /// The temporary directory, while the run is active.
    #[must_use]
    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp.path()
    }

    /// Allocates a file in the temporary area.
    pub fn allocate_temp_file(
        &mut self,
        suffix: Option<&str>,
        content: Option<&[u8]>,
    ) -> Result<PathBuf, DocflowError> {
        self.temp.allocate(suffix, content)
    }

    /// Returns true if `name` exists in the temporary area.
    #[must_use]
    pub fn exists_in_temp_area(&self, name: impl AsRef<Path>) -> bool {
        self.temp.contains(name)
    }

    /// Number of temp file descriptors still open.
    #[must_use]
    pub fn open_temp_descriptors(&self) -> usize {
        self.temp.open_descriptors()
    }

    // --- events ---

    /// Emits a lifecycle event to the run's sink.
    pub fn emit(&self, event_type: &str, data: Option<Value>) {
        self.event_sink.emit(event_type, data);
    }

    // --- derived values ---

    /// The target format: option `output`, default `pdf`.
    #[must_use]
    pub fn output_format(&self) -> String {
        self.get_str("output").unwrap_or_else(|| "pdf".to_string())
    }

    /// Returns true if the caller named the output file.
    #[must_use]
    pub fn has_explicit_output(&self) -> bool {
        self.explicit_output.is_some()
    }

    /// The output file: explicit, else overridden, else the source file
    /// name with the output format's extension, in the working directory.
    ///
    /// The source's own directory is never part of a derived name.
    #[must_use]
    pub fn output_file(&self) -> PathBuf {
        if let Some(path) = self.explicit_output.as_ref().or(self.output_override.as_ref()) {
            return path.clone();
        }

        let format = self.output_format();
        let name = match self.srcfile.as_deref().and_then(Path::file_stem) {
            Some(stem) => {
                let mut name = stem.to_os_string();
                name.push(".");
                name.push(&format);
                PathBuf::from(name)
            }
            None => PathBuf::from(format!("output.{format}")),
        };
        match &self.working_dir {
            Some(dir) => dir.join(name),
            None => name,
        }
    }

    /// Overrides the derived output file. An explicit output still wins.
    pub fn set_output_file(&mut self, path: impl Into<PathBuf>) {
        self.output_override = Some(path.into());
    }

    /// The source format: override, option `srcfile_format`, the source
    /// extension, or `md`.
    #[must_use]
    pub fn srcfile_format(&self) -> String {
        self.srcfile_format
            .clone()
            .or_else(|| self.get_str("srcfile_format"))
            .or_else(|| {
                self.srcfile
                    .as_deref()
                    .and_then(Path::extension)
                    .and_then(|ext| ext.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "md".to_string())
    }

    /// Overrides the source format.
    pub fn set_srcfile_format(&mut self, format: impl Into<String>) {
        self.srcfile_format = Some(format.into());
    }

    /// The reference document: override, or option `reference` as an
    /// existing path or as a file in the temporary area.
    #[must_use]
    pub fn reference_doc(&self) -> Option<PathBuf> {
        if let Some(path) = &self.reference_doc {
            return Some(path.clone());
        }

        let reference = PathBuf::from(self.get_str("reference")?);
        if reference.exists() {
            return Some(reference);
        }
        if self.exists_in_temp_area(&reference) {
            return self.temp_dir().map(|dir| dir.join(&reference));
        }
        None
    }

    /// Overrides the reference document.
    pub fn set_reference_doc(&mut self, path: impl Into<PathBuf>) {
        self.reference_doc = Some(path.into());
    }

    /// The finished artifact for the output format: the source for `md`,
    /// attribute `finalized_docx` for `docx`, `finalized_pdf` otherwise.
    pub fn finalized(&self) -> Result<PathBuf, DocflowError> {
        match self.output_format().as_str() {
            "md" => self
                .srcfile
                .clone()
                .ok_or_else(|| DocflowError::missing_attribute("srcfile")),
            "docx" => self.attrs.require_path("finalized_docx"),
            _ => self.attrs.require_path("finalized_pdf"),
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(err) = self.end_run() {
            warn!(run_id = %self.run_id, error = %err, "Failed to release temporary area");
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("run_id", &self.run_id)
            .field("srcfile", &self.srcfile)
            .field("working_dir", &self.working_dir)
            .field("features", &self.feature_types.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("options", &self.options.len())
            .field("timing", &self.timing)
            .field("tmpdir", &self.temp.path())
            .finish_non_exhaustive()
    }
}
