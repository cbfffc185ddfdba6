//! The document build pipeline.

use super::{Converter, ConverterArgs, CopyConverter};
use crate::context::Context;
use crate::core::{Halt, HookResult, StageTiming};
use crate::errors::DocflowError;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::hooks::{HookDispatcher, Scheduler, Stage};
use crate::options::{LoadedOptions, Options};
use crate::plugins::{FeatureType, HackRegistry, PluginRegistry};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Conversion attempts when `converter.retries` is unset or zero.
pub const DEFAULT_CONVERTER_RETRIES: u32 = 3;

/// One document build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// The source document.
    pub srcfile: Option<PathBuf>,
    /// Where to write the result; derived from the source when unset.
    pub output_file: Option<PathBuf>,
    /// Directory for a derived output file; the process working directory
    /// when unset.
    pub working_dir: Option<PathBuf>,
    /// Features declared for this build only, after the driver's own.
    pub features: Vec<String>,
    /// Options applied over the driver's options.
    pub options: Options,
}

impl BuildRequest {
    /// Creates a request for `srcfile`.
    #[must_use]
    pub fn new(srcfile: impl Into<PathBuf>) -> Self {
        Self {
            srcfile: Some(srcfile.into()),
            ..Self::default()
        }
    }

    /// Sets the output file.
    #[must_use]
    pub fn with_output_file(mut self, output_file: impl Into<PathBuf>) -> Self {
        self.output_file = Some(output_file.into());
        self
    }

    /// Sets the directory a derived output file is written to.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Declares an extra feature.
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    /// Sets a call-specific option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.set(key, value);
        self
    }
}

/// The result of a build that did not fail.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The run identifier.
    pub run_id: Uuid,
    /// The output file, if one exists when the run ends.
    pub output: Option<PathBuf>,
    /// The abort reason, if a handler stopped the run early.
    pub aborted: Option<String>,
    /// The run's timing log.
    pub timing: Vec<StageTiming>,
}

impl BuildOutcome {
    /// Returns true if the run stopped early.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// The stages that ran a body, in order.
    #[must_use]
    pub fn stages(&self) -> Vec<&str> {
        self.timing.iter().map(|t| t.stage.as_str()).collect()
    }
}

/// Runs the fixed stage sequence that builds one document.
///
/// ```text
/// initialize → setup_tmpdir → collect_metadata
///   → convert_to_docx → save_docx → finalize_docx      (output ≠ md)
///   → convert_to_pdf → finalize_pdf                     (output ∉ {md, docx})
///   → finalize → cleanup_tmpdir
/// ```
///
/// An abort skips to `cleanup_tmpdir` and reports success. Any other
/// failure releases the temporary area, then propagates.
pub struct Docmaker {
    dispatcher: HookDispatcher,
    features: Vec<Arc<FeatureType>>,
    options: Options,
    converter: Arc<dyn Converter>,
    event_sink: Arc<dyn EventSink>,
}

impl Docmaker {
    /// Creates a driver over the given registries.
    #[must_use]
    pub fn new(plugins: Arc<PluginRegistry>, hacks: Arc<HackRegistry>) -> Self {
        Self {
            dispatcher: HookDispatcher::new(Scheduler::new(plugins, hacks)),
            features: Vec::new(),
            options: Options::new(),
            converter: Arc::new(CopyConverter),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a driver with the built-in features and no hacks.
    #[must_use]
    pub fn with_builtin() -> Self {
        Self::new(
            Arc::new(PluginRegistry::with_builtin()),
            Arc::new(HackRegistry::new()),
        )
    }

    /// Declares features for every build; names are resolved now.
    pub fn with_features<I, S>(mut self, features: I) -> Result<Self, DocflowError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for feature in features {
            let ty = self.plugins().resolve(feature.as_ref())?;
            self.features.push(ty);
        }
        Ok(self)
    }

    /// Sets the options every build starts from.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Applies loaded options and their feature list.
    ///
    /// `-name` entries left in the list only remove features; they never
    /// resolve to one.
    pub fn with_loaded_options(self, loaded: LoadedOptions) -> Result<Self, DocflowError> {
        let mut resolved = LoadedOptions::default();
        resolved.merge(loaded);
        let LoadedOptions { options, features } = resolved;
        self.with_options(options).with_features(features)
    }

    /// Sets the converter.
    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = converter;
        self
    }

    /// Sets the event sink each run reports to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// The feature registry.
    #[must_use]
    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        self.dispatcher.scheduler().plugins()
    }

    /// The stage dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &HookDispatcher {
        &self.dispatcher
    }

    /// Builds `srcfile` and returns the output file, if any.
    pub fn run(
        &self,
        srcfile: impl Into<PathBuf>,
        output_file: Option<PathBuf>,
    ) -> Result<Option<PathBuf>, DocflowError> {
        let mut request = BuildRequest::new(srcfile);
        request.output_file = output_file;
        Ok(self.build(request)?.output)
    }

    /// Creates the context for a request.
    pub fn context(&self, request: BuildRequest) -> Result<Context, DocflowError> {
        let BuildRequest {
            srcfile,
            output_file,
            working_dir,
            features,
            options: overrides,
        } = request;

        let mut options = self.options.clone();
        options.merge(overrides);

        let mut ctx = Context::new(srcfile, output_file)
            .with_options(options)
            .with_event_sink(Arc::clone(&self.event_sink));
        if let Some(dir) = working_dir {
            ctx = ctx.with_working_dir(dir);
        }
        for ty in &self.features {
            ctx.add_feature(self.plugins(), ty)?;
        }
        for name in &features {
            ctx.add_feature(self.plugins(), name)?;
        }
        Ok(ctx)
    }

    /// Runs one build.
    pub fn build(&self, request: BuildRequest) -> Result<BuildOutcome, DocflowError> {
        let mut ctx = self.context(request)?;
        let run_id = ctx.run_id();

        info!(
            run_id = %run_id,
            srcfile = ?ctx.srcfile(),
            output_format = %ctx.output_format(),
            "Build started"
        );
        ctx.emit(
            names::RUN_STARTED,
            Some(json!({
                "run_id": run_id.to_string(),
                "srcfile": ctx.srcfile().map(|p| p.display().to_string()),
                "features": ctx.feature_types().iter().map(|t| t.name()).collect::<Vec<_>>(),
            })),
        );

        let aborted = match self.run_stages(&mut ctx) {
            Ok(()) => None,
            Err(Halt::Abort { reason }) => {
                info!(run_id = %run_id, reason = %reason, "Build aborted");
                ctx.emit(names::RUN_ABORTED, Some(json!({ "reason": reason })));
                Some(reason)
            }
            Err(Halt::Fail(err)) => {
                warn!(run_id = %run_id, error = %err, "Build failed");
                ctx.emit(names::RUN_FAILED, Some(json!({ "error": err.to_string() })));
                if let Err(cleanup_err) = ctx.end_run() {
                    warn!(run_id = %run_id, error = %cleanup_err, "Failed to release temporary area");
                }
                return Err(err);
            }
        };

        self.cleanup(&mut ctx)?;

        let output = Some(ctx.output_file()).filter(|path| path.exists());
        ctx.emit(
            names::RUN_COMPLETED,
            Some(json!({
                "output": output.as_ref().map(|p| p.display().to_string()),
                "timing": ctx.timing_json(),
            })),
        );

        Ok(BuildOutcome {
            run_id,
            output,
            aborted,
            timing: ctx.timing().to_vec(),
        })
    }

    fn run_stages(&self, ctx: &mut Context) -> HookResult {
        let dispatcher = &self.dispatcher;

        dispatcher.run_stage(ctx, &Stage::new("initialize"), |_ctx| Ok(()))?;
        dispatcher.run_stage(ctx, &Stage::new("setup_tmpdir"), |ctx| Ok(ctx.begin_run()?))?;
        dispatcher.run_stage(ctx, &Stage::new("collect_metadata"), collect_metadata)?;

        let format = ctx.output_format();
        if format != "md" {
            let stage = Stage::new("convert_to_docx")
                .with_default_factory("docxfile", temp_file(".docx"));
            dispatcher.run_stage(ctx, &stage, |ctx| self.convert_to_docx(ctx))?;

            let stage = Stage::new("save_docx").with_default_factory("docxfile", temp_file(".docx"));
            dispatcher.run_stage(ctx, &stage, |ctx| self.save_docx(ctx))?;

            let stage = Stage::new("finalize_docx")
                .with_default_factory("finalized_docx", temp_file(".docx"));
            dispatcher.run_stage(ctx, &stage, |ctx| {
                copy_attr(ctx, "docxfile", "finalized_docx")
            })?;

            if format != "docx" {
                let stage = Stage::new("convert_to_pdf")
                    .with_default_factory("pdffile", temp_file(".pdf"));
                dispatcher.run_stage(ctx, &stage, |ctx| self.convert_to_pdf(ctx))?;

                let stage = Stage::new("finalize_pdf")
                    .with_default_factory("finalized_pdf", temp_file(".pdf"));
                dispatcher.run_stage(ctx, &stage, |ctx| copy_attr(ctx, "pdffile", "finalized_pdf"))?;
            }
        }

        dispatcher.run_stage(ctx, &Stage::new("finalize"), finalize)
    }

    fn cleanup(&self, ctx: &mut Context) -> Result<(), DocflowError> {
        let result = self
            .dispatcher
            .run_stage(ctx, &Stage::new("cleanup_tmpdir"), |ctx| Ok(ctx.end_run()?));
        let released = ctx.end_run();

        match result {
            Ok(()) => released,
            Err(Halt::Abort { reason }) => {
                debug!(reason = %reason, "Abort during cleanup ignored");
                released
            }
            Err(Halt::Fail(err)) => Err(err),
        }
    }

    fn convert_to_docx(&self, ctx: &mut Context) -> HookResult {
        let srcfile = ctx
            .srcfile()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow::anyhow!("No source file provided"))?;

        let stage = Stage::new("collect_converter_args").with_default("converter_args", json!({}));
        self.dispatcher
            .run_stage(ctx, &stage, |ctx| self.collect_converter_args(ctx))?;

        let args: ConverterArgs = serde_json::from_value(ctx.attrs.require("converter_args")?.clone())?;
        let docxfile = ctx.attrs.require_path("docxfile")?;
        debug!(srcfile = %srcfile.display(), args = ?args, "Converting to docx");

        self.converter.convert_to_docx(&srcfile, &docxfile, &args)?;
        ctx.attrs.set("converted_docx", path_value(&docxfile));
        Ok(())
    }

    fn collect_converter_args(&self, ctx: &mut Context) -> HookResult {
        let stage = Stage::new("collect_extra_args").with_default("extra_args", json!([]));
        self.dispatcher.run_stage(ctx, &stage, collect_extra_args)?;

        let format = ctx
            .get_str("converter.format")
            .unwrap_or_else(|| ctx.srcfile_format());
        let extra_args = ctx.attrs.require("extra_args")?.clone();

        let mut args = match ctx.attrs.remove("converter_args") {
            Some(Value::Object(args)) => args,
            _ => serde_json::Map::new(),
        };
        args.insert("format".to_string(), Value::from(format));
        args.insert("to".to_string(), Value::from("docx"));
        args.insert("extra_args".to_string(), extra_args);
        ctx.attrs.set("converter_args", Value::Object(args));
        Ok(())
    }

    fn save_docx(&self, ctx: &mut Context) -> HookResult {
        let converted = ctx.attrs.require_path("converted_docx")?;
        let docxfile = ctx.attrs.require_path("docxfile")?;
        self.converter.save_docx(&converted, &docxfile)?;
        Ok(())
    }

    fn convert_to_pdf(&self, ctx: &mut Context) -> HookResult {
        let retries = match ctx.get_str("converter.retries") {
            Some(value) => value.parse::<u32>().map_err(|_| {
                DocflowError::Config(format!("converter.retries: {value} is not a number"))
            })?,
            None => 0,
        };
        let retries = if retries == 0 { DEFAULT_CONVERTER_RETRIES } else { retries };

        let docxfile = ctx.attrs.require_path("finalized_docx")?;
        let pdffile = ctx.attrs.require_path("pdffile")?;
        let format = ctx.output_format();

        let mut last_error = None;
        for attempt in 1..=retries {
            match self.converter.convert_to_pdf(&docxfile, &pdffile, &format) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, retries, error = %err, "Conversion to {} failed", format);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .map_or_else(
                || DocflowError::Internal("conversion was never attempted".to_string()),
                DocflowError::Runtime,
            )
            .into())
    }
}

impl std::fmt::Debug for Docmaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Docmaker")
            .field("features", &self.features.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("options", &self.options.len())
            .finish_non_exhaustive()
    }
}

fn path_value(path: &Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

fn temp_file(suffix: &'static str) -> impl Fn(&mut Context) -> HookResult<Value> + Send + Sync {
    move |ctx: &mut Context| {
        let path = ctx.allocate_temp_file(Some(suffix), None)?;
        Ok(path_value(&path))
    }
}

fn copy_attr(ctx: &mut Context, from: &str, to: &str) -> HookResult {
    let source = ctx.attrs.require_path(from)?;
    let target = ctx.attrs.require_path(to)?;
    fs::copy(source, target)?;
    Ok(())
}

fn collect_metadata(ctx: &mut Context) -> HookResult {
    for (key, value) in ctx.get_namespaced("metadata") {
        ctx.metadata.insert(key, value);
    }
    Ok(())
}

fn collect_extra_args(ctx: &mut Context) -> HookResult {
    let mut extra_args = match ctx.attrs.remove("extra_args") {
        Some(Value::Array(args)) => args,
        _ => Vec::new(),
    };

    if let Some(reference) = ctx.reference_doc() {
        extra_args.push(Value::from(format!("--reference-doc={}", reference.display())));
    }
    if let Some(Value::Array(configured)) = ctx.get("converter.extra_args") {
        extra_args.extend(configured.iter().cloned());
    }

    ctx.attrs.set("extra_args", Value::Array(extra_args));
    Ok(())
}

fn finalize(ctx: &mut Context) -> HookResult {
    let finalized = ctx.finalized()?;
    let output = ctx.output_file();

    if same_file(&finalized, &output) {
        debug!(output = %output.display(), "Output is the finalized file, nothing to copy");
    } else {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&finalized, &output)?;
    }

    info!(run_id = %ctx.run_id(), timing = %ctx.timing_json(), "Build timing");
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
