//! Marks drafts in the coverpage title and the output filename.

use crate::context::Context;
use crate::core::HookResult;
use crate::plugins::{Feature, FeatureHooks};
use std::ffi::OsString;
use tracing::debug;

/// Environment variable that switches draft mode on for a run.
pub const DRAFT_MODE_ENV: &str = "DOCFLOW_DRAFT_MODE";

const DEFAULT_PREFIX: &str = "DRAFT";

/// Prefixes drafts so they cannot be mistaken for final documents.
///
/// Options:
/// - `draft_mode.is_draft`: boolean, default false
/// - `draft_mode.prefix`: default `DRAFT`
/// - `draft_mode.coverpage_title_field`: default `title`
#[derive(Debug, Default)]
pub struct DraftMode;

impl Feature for DraftMode {
    const NAME: &'static str = "DraftMode";

    fn register_hooks(hooks: &mut FeatureHooks<Self>) {
        hooks
            .on("post_initialize", "set_is_draft_from_env", |_draft, ctx| {
                Self::apply_environment(ctx, std::env::var_os(DRAFT_MODE_ENV));
                Ok(())
            })
            .when(|_ctx| Ok(std::env::var_os(DRAFT_MODE_ENV).is_some()));

        hooks
            .on("pre_convert_to_docx", "add_draft_to_coverpage_title", |_draft, ctx| {
                Self::prefix_coverpage_title(ctx)
            })
            .before("Coverpage")
            .when(|ctx| Ok(ctx.has_feature("Coverpage")))
            .when(is_draft);

        hooks
            .on("pre_finalize", "add_draft_to_output_filename", |_draft, ctx| {
                Self::prefix_output_file(ctx);
                Ok(())
            })
            .when(|ctx| Ok(!ctx.has_explicit_output()))
            .when(is_draft);
    }
}

fn is_draft(ctx: &Context) -> HookResult<bool> {
    Ok(ctx.get_boolean("draft_mode.is_draft", Some(false))?)
}

impl DraftMode {
    fn prefix(ctx: &Context) -> String {
        ctx.get_str("draft_mode.prefix")
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string())
    }

    fn apply_environment(ctx: &mut Context, value: Option<OsString>) {
        if let Some(value) = value {
            let value = value.to_string_lossy().into_owned();
            debug!(is_draft = %value, "Draft mode set from environment");
            ctx.set("draft_mode.is_draft", value);
        }
    }

    fn prefix_coverpage_title(ctx: &mut Context) -> HookResult {
        let field = ctx
            .get_str("draft_mode.coverpage_title_field")
            .unwrap_or_else(|| "title".to_string());
        let key = format!("coverpage.{field}");

        if let Some(title) = ctx.get_str(&key).filter(|t| !t.is_empty()) {
            let prefixed = format!("{} {title}", Self::prefix(ctx));
            ctx.set(key, prefixed);
        }
        Ok(())
    }

    fn prefix_output_file(ctx: &mut Context) {
        let output = ctx.output_file();
        let Some(filename) = output.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };

        let prefixed = output.with_file_name(format!("{}_{filename}", Self::prefix(ctx)));
        debug!(output = %prefixed.display(), "Draft output file");
        ctx.set_output_file(prefixed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_apply_environment() {
        let mut ctx = Context::new(None, None);
        DraftMode::apply_environment(&mut ctx, None);
        assert!(ctx.get("draft_mode.is_draft").is_none());

        DraftMode::apply_environment(&mut ctx, Some(OsString::from("yes")));
        assert!(is_draft(&ctx).unwrap());
    }

    #[test]
    fn test_prefix_coverpage_title() {
        let mut ctx = Context::new(None, None);
        ctx.set("coverpage.title", "Annual Report");
        DraftMode::prefix_coverpage_title(&mut ctx).unwrap();
        assert_eq!(ctx.get_str("coverpage.title").as_deref(), Some("DRAFT Annual Report"));

        ctx.set("draft_mode.coverpage_title_field", "heading");
        ctx.set("draft_mode.prefix", "WIP");
        ctx.set("coverpage.heading", "Budget");
        DraftMode::prefix_coverpage_title(&mut ctx).unwrap();
        assert_eq!(ctx.get_str("coverpage.heading").as_deref(), Some("WIP Budget"));
    }

    #[test]
    fn test_missing_title_is_left_alone() {
        let mut ctx = Context::new(None, None);
        DraftMode::prefix_coverpage_title(&mut ctx).unwrap();
        assert!(ctx.get("coverpage.title").is_none());
    }

    #[test]
    fn test_prefix_output_file() {
        let mut ctx = Context::new(Some(PathBuf::from("docs/report.md")), None);
        DraftMode::prefix_output_file(&mut ctx);
        assert_eq!(ctx.output_file(), PathBuf::from("DRAFT_report.pdf"));
    }
}
