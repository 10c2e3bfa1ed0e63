// Upload intake boundary - file-kind sniffing, size cap, extraction seam
//
// Optical/AI extraction of invoice fields is an external collaborator; this
// module owns the boundary contract only. Uploaded bytes never travel past
// the `FieldExtractor` seam, and loose typing never travels past the
// normalizer.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LedgerError;

/// Maximum accepted upload size (10 MiB), enforced before any processing.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

// ============================================================================
// FILE KINDS
// ============================================================================

/// Accepted upload formats, identified by content sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Jpeg,
    Png,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Jpeg => "jpeg",
            FileKind::Png => "png",
        }
    }

    /// MIME types the intake accepts for this kind.
    pub fn content_types(&self) -> &'static [&'static str] {
        match self {
            FileKind::Pdf => &["application/pdf"],
            FileKind::Jpeg => &["image/jpeg", "image/jpg"],
            FileKind::Png => &["image/png"],
        }
    }
}

impl std::str::FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(FileKind::Pdf),
            "jpeg" => Ok(FileKind::Jpeg),
            "png" => Ok(FileKind::Png),
            other => Err(format!("unknown file kind: {other}")),
        }
    }
}

/// Identify the file kind from leading magic bytes.
pub fn detect_file_kind(bytes: &[u8]) -> Option<FileKind> {
    if bytes.starts_with(b"%PDF") {
        Some(FileKind::Pdf)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(FileKind::Jpeg)
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(FileKind::Png)
    } else {
        None
    }
}

/// Reference to the uploaded source file an invoice was extracted from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFileRef {
    pub filename: String,
    pub kind: FileKind,
    pub size_bytes: u64,
}

/// Validate an upload and produce its source-file reference.
///
/// Checks, in order: non-empty filename, size cap, declared content type
/// against the accepted list, magic bytes against a known kind.
pub fn check_upload(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<SourceFileRef, LedgerError> {
    if filename.trim().is_empty() {
        return Err(LedgerError::validation("file", "no filename provided"));
    }

    if bytes.is_empty() {
        return Err(LedgerError::validation("file", "empty upload"));
    }

    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(LedgerError::validation(
            "file",
            format!(
                "upload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                MAX_UPLOAD_BYTES
            ),
        ));
    }

    let kind = detect_file_kind(bytes).ok_or_else(|| {
        LedgerError::validation("file", "unrecognized file type; upload PDF, JPEG, or PNG")
    })?;

    if let Some(declared) = content_type {
        if !kind.content_types().contains(&declared) {
            return Err(LedgerError::validation(
                "file",
                format!(
                    "declared content type {declared} does not match detected {} content",
                    kind.as_str()
                ),
            ));
        }
    }

    Ok(SourceFileRef {
        filename: filename.to_string(),
        kind,
        size_bytes: bytes.len() as u64,
    })
}

// ============================================================================
// EXTRACTION SEAM
// ============================================================================

/// Untyped invoice fields as delivered by extraction. The normalizer is the
/// only consumer; it converts this into a strongly-typed `Invoice`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInvoice {
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl RawInvoice {
    pub fn new(fields: Map<String, Value>) -> Self {
        RawInvoice { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String view of a field, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }
}

/// Seam to the external field-extraction collaborator.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], kind: FileKind) -> Result<RawInvoice, LedgerError>;
}

/// Deterministic placeholder extraction, used when no real extractor is
/// wired and in tests. Produces the same shape a real extractor would.
pub struct FallbackExtractor;

impl FieldExtractor for FallbackExtractor {
    fn extract(&self, _bytes: &[u8], _kind: FileKind) -> Result<RawInvoice, LedgerError> {
        let mut raw = RawInvoice::default();
        raw.set(
            "date",
            Value::String(Utc::now().date_naive().format("%Y-%m-%d").to_string()),
        );
        raw.set("supplier", Value::String("Auto-detected Supplier".to_string()));
        raw.set("amount", Value::from(100.00));
        raw.set(
            "description",
            Value::String("Invoice processing - extraction unavailable".to_string()),
        );
        raw.set("currency", Value::String("USD".to_string()));
        Ok(raw)
    }
}

// ============================================================================
// TESTS
// ============================================================================
