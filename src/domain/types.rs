//! Shared domain enumerations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output formats the conversion engine is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    Pdf,
    Docx,
    Odt,
    Xlsx,
    Html,
    Txt,
}

#[derive(Debug, Error)]
#[error("unsupported target format `{value}`")]
pub struct UnsupportedFormat {
    pub value: String,
}

impl TargetFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetFormat::Pdf => "pdf",
            TargetFormat::Docx => "docx",
            TargetFormat::Odt => "odt",
            TargetFormat::Xlsx => "xlsx",
            TargetFormat::Html => "html",
            TargetFormat::Txt => "txt",
        }
    }

    /// File extension of the rendered artifact; identical to the wire name.
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// MIME type used for the binary response.
    pub fn content_type(self) -> String {
        mime_guess::from_ext(self.extension())
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    pub fn parse(value: &str) -> Result<Self, UnsupportedFormat> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(TargetFormat::Pdf),
            "docx" => Ok(TargetFormat::Docx),
            "odt" => Ok(TargetFormat::Odt),
            "xlsx" => Ok(TargetFormat::Xlsx),
            "html" => Ok(TargetFormat::Html),
            "txt" => Ok(TargetFormat::Txt),
            other => Err(UnsupportedFormat {
                value: other.to_string(),
            }),
        }
    }
}
