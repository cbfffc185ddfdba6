//! Features shipped with docflow.
//!
//! | Feature | Hook | Reads | Writes |
//! |---|---|---|---|
//! | [`DraftMode`] | `post_initialize` | `DOCFLOW_DRAFT_MODE` | option `draft_mode.is_draft` |
//! | [`DraftMode`] | `pre_convert_to_docx` | `draft_mode.*` | option `coverpage.<title field>` |
//! | [`DraftMode`] | `pre_finalize` | `draft_mode.*` | the derived output file |
//! | [`MarkdownMetadata`] | `pre_collect_metadata` | the source file | `Context::metadata` |

mod draft_mode;
mod markdown_metadata;

pub use draft_mode::{DraftMode, DRAFT_MODE_ENV};
pub use markdown_metadata::{split_front_matter, MarkdownMetadata};

use crate::plugins::FeatureTable;

/// Registers the built-in features.
pub fn register_builtin(table: &mut FeatureTable) {
    table.add::<DraftMode>().add::<MarkdownMetadata>();
}
