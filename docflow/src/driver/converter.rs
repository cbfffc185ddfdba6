//! The seam for format conversion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Arguments handed to [`Converter::convert_to_docx`].
///
/// Assembled in the `collect_converter_args` stage from the
/// `converter_args` and `extra_args` attributes; keys handlers add beyond
/// the known ones are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConverterArgs {
    /// Source format, e.g. `md`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Target format.
    #[serde(default)]
    pub to: String,
    /// Extra command-line style arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Anything else handlers put into `converter_args`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Turns sources into page-layout documents.
///
/// The engine only sequences these calls; what a conversion does is up to
/// the implementation.
pub trait Converter: Send + Sync {
    /// Converts the source into a docx file.
    fn convert_to_docx(
        &self,
        srcfile: &Path,
        docxfile: &Path,
        args: &ConverterArgs,
    ) -> anyhow::Result<()>;

    /// Writes the post-processed docx. Copies by default.
    fn save_docx(&self, converted: &Path, docxfile: &Path) -> anyhow::Result<()> {
        fs::copy(converted, docxfile)?;
        Ok(())
    }

    /// Renders the finalized docx into `format` (usually `pdf`).
    fn convert_to_pdf(&self, docxfile: &Path, pdffile: &Path, format: &str) -> anyhow::Result<()>;
}

/// Copies bytes through unchanged; for dry runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyConverter;

impl Converter for CopyConverter {
    fn convert_to_docx(
        &self,
        srcfile: &Path,
        docxfile: &Path,
        _args: &ConverterArgs,
    ) -> anyhow::Result<()> {
        fs::copy(srcfile, docxfile)?;
        Ok(())
    }

    fn convert_to_pdf(&self, docxfile: &Path, pdffile: &Path, _format: &str) -> anyhow::Result<()> {
        fs::copy(docxfile, pdffile)?;
        Ok(())
    }
}
