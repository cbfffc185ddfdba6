//! Front matter as document metadata.

use crate::errors::DocflowError;
use crate::plugins::{Feature, FeatureHooks};
use serde_json::Value;
use tracing::debug;

/// Reads YAML front matter from Markdown sources into the run's metadata.
///
/// Sources without front matter, or with front matter that is not a YAML
/// mapping, contribute nothing.
#[derive(Debug, Default)]
pub struct MarkdownMetadata;

impl Feature for MarkdownMetadata {
    const NAME: &'static str = "MarkdownMetadata";

    fn register_hooks(hooks: &mut FeatureHooks<Self>) {
        hooks
            .on("pre_collect_metadata", "parse_front_matter", |_feature, ctx| {
                let Some(srcfile) = ctx.srcfile().map(ToOwned::to_owned) else {
                    return Ok(());
                };
                let source = std::fs::read_to_string(&srcfile).map_err(DocflowError::from)?;

                let Some(yaml) = split_front_matter(&source) else {
                    return Ok(());
                };
                match serde_yaml::from_str::<Value>(yaml) {
                    Ok(Value::Object(entries)) => ctx.metadata.extend(entries),
                    Ok(_) => debug!(srcfile = %srcfile.display(), "Front matter is not a mapping"),
                    Err(err) => {
                        debug!(srcfile = %srcfile.display(), error = %err, "Ignoring malformed front matter");
                    }
                }
                Ok(())
            })
            .when(|ctx| Ok(ctx.srcfile_format() == "md"));
    }
}

/// Returns the YAML between a leading `---` line and the next `---` or
/// `...` line.
#[must_use]
pub fn split_front_matter(source: &str) -> Option<&str> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut lines = source.split_inclusive('\n');
    let opening = lines.next()?;
    if opening.trim_end() != "---" {
        return None;
    }

    let start = opening.len();
    let mut offset = start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Some(&source[start..offset]);
        }
        offset += line.len();
    }
    None
}
