//! The pipeline driver.
//!
//! [`Docmaker`] runs the fixed stage sequence of one build, each stage
//! wrapped by the [`HookDispatcher`](crate::hooks::HookDispatcher).
//!
//! Attributes exchanged through [`Context::attrs`](crate::context::Context):
//!
//! | Attribute | Written by | Read by |
//! |---|---|---|
//! | `docxfile` | default of `convert_to_docx`, again of `save_docx` | `convert_to_docx`, `save_docx`, `finalize_docx`, handlers post-processing the docx |
//! | `converter_args` | default of `collect_converter_args`, its body | `convert_to_docx`, `pre_`/`post_collect_converter_args` handlers |
//! | `extra_args` | default of `collect_extra_args`, its body | `collect_converter_args`, `post_collect_extra_args` handlers |
//! | `converted_docx` | `convert_to_docx` | `save_docx` |
//! | `finalized_docx` | default of `finalize_docx` | `convert_to_pdf`, `finalize` (docx output) |
//! | `pdffile` | default of `convert_to_pdf` | `finalize_pdf` |
//! | `finalized_pdf` | default of `finalize_pdf` | `finalize` (pdf output) |
//!
//! Options read by the driver: `output`, `srcfile_format`, `reference`,
//! `metadata.*`, `converter.format`, `converter.extra_args`,
//! `converter.retries`, `hacks.disable_<name>`.

mod batch;
mod converter;
mod docmaker;
#[cfg(test)]
mod integration_tests;

pub use converter::{Converter, ConverterArgs, CopyConverter};
pub use docmaker::{BuildOutcome, BuildRequest, Docmaker, DEFAULT_CONVERTER_RETRIES};
