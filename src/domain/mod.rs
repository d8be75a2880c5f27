//! Core request model and failure taxonomy for the render pipeline.

pub mod error;
pub mod types;

pub use error::{FailureKind, RenderFailure};
pub use types::TargetFormat;

use std::path::Path;

use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

const DEFAULT_REPORT_NAME: &str = "document";
const DEFAULT_TEMPLATE_EXT: &str = "odt";
const MAX_TEMPLATE_EXT_LEN: usize = 8;

/// One inbound render job, fixed at the transport boundary.
///
/// The `id` is generated at admission and is the only value ever used as a
/// storage key; client-supplied names are display metadata.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub id: Uuid,
    pub template: Bytes,
    pub template_ext: String,
    pub data: Value,
    pub format: TargetFormat,
    pub report_name: String,
}

impl RenderRequest {
    pub fn new(
        template: Bytes,
        original_name: Option<&str>,
        data: Value,
        format: TargetFormat,
        report_name: Option<String>,
    ) -> Self {
        let template_ext = original_name
            .and_then(template_extension)
            .unwrap_or_else(|| DEFAULT_TEMPLATE_EXT.to_string());
        let report_name = report_name
            .as_deref()
            .or(original_name)
            .map(display_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_REPORT_NAME.to_string());

        Self {
            id: Uuid::new_v4(),
            template,
            template_ext,
            data,
            format,
            report_name,
        }
    }

    /// Download filename presented to the client.
    pub fn attachment_name(&self) -> String {
        format!("{}.{}", self.report_name, self.format.extension())
    }
}

/// Rendered artifact handed to the transport boundary for transmission.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: String,
}

/// Extract a container-type hint from the uploaded filename.
///
/// Only a short lowercase alphanumeric extension survives; everything else in
/// the client name is ignored so it can never influence storage layout.
fn template_extension(original: &str) -> Option<String> {
    let ext = Path::new(original).extension()?.to_str()?;
    let ext = ext.trim_matches('.').to_ascii_lowercase();
    if ext.is_empty()
        || ext.len() > MAX_TEMPLATE_EXT_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext)
}

/// Reduce a client-supplied name to a safe display stem.
fn display_name(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or(original);
    stem.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_ids_are_unique_for_identical_client_names() {
        let a = RenderRequest::new(
            Bytes::from_static(b"one"),
            Some("invoice.odt"),
            json!({}),
            TargetFormat::Pdf,
            None,
        );
        let b = RenderRequest::new(
            Bytes::from_static(b"two"),
            Some("invoice.odt"),
            json!({}),
            TargetFormat::Pdf,
            None,
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn report_name_prefers_explicit_name_over_filename() {
        let request = RenderRequest::new(
            Bytes::new(),
            Some("upload.docx"),
            json!(null),
            TargetFormat::Pdf,
            Some("Quarterly Report".to_string()),
        );
        assert_eq!(request.report_name, "Quarterly Report");
        assert_eq!(request.attachment_name(), "Quarterly Report.pdf");
        assert_eq!(request.template_ext, "docx");
    }

    #[test]
    fn hostile_filenames_never_reach_storage_metadata() {
        let request = RenderRequest::new(
            Bytes::new(),
            Some("../../etc/passwd"),
            json!(null),
            TargetFormat::Pdf,
            None,
        );
        assert_eq!(request.template_ext, "odt");
        assert!(!request.report_name.contains('/'));
        assert!(!request.report_name.contains(".."));
    }

    #[test]
    fn missing_names_fall_back_to_defaults() {
        let request =
            RenderRequest::new(Bytes::new(), None, json!(null), TargetFormat::Docx, None);
        assert_eq!(request.report_name, "document");
        assert_eq!(request.template_ext, "odt");
        assert_eq!(request.attachment_name(), "document.docx");
    }
}
