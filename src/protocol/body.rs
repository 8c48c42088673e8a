//! Request bodies.
//!
//! A request carries either nothing, a JSON-able payload, or a multipart
//! form. Forms are split into a metadata map (text fields) plus at most one
//! [`Attachment`] holding the file bytes.
//!
//! # Example
//!
//! ```ignore
//! use sim_msgrouter::{Body, FileUpload, FormData};
//!
//! let body = Body::Form(
//!     FormData::new()
//!         .text("simulationType", "srw")
//!         .text("file_type", "undulatorTable")
//!         .file("file", FileUpload::from_path("/tmp/magnet.zip")?),
//! );
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use rmpv::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::frame::Attachment;

// ============================================================================
// Constants
// ============================================================================

/// The only form field name allowed to hold a file.
pub const FILE_FIELD: &str = "file";

// ============================================================================
// Body
// ============================================================================

/// Payload of a request.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// No payload; encoded as msgpack nil.
    #[default]
    Empty,
    /// JSON-able payload.
    Json(serde_json::Value),
    /// Multipart form with at most one file.
    Form(FormData),
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<FormData> for Body {
    fn from(form: FormData) -> Self {
        Self::Form(form)
    }
}

// ============================================================================
// FormData
// ============================================================================

/// Ordered multipart form fields.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    fields: Vec<(String, FormValue)>,
}

/// Value of one form field.
#[derive(Debug, Clone)]
pub enum FormValue {
    /// Plain text field.
    Text(String),
    /// File field.
    File(FileUpload),
}

impl FormData {
    /// Creates an empty form.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field.
    #[inline]
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), FormValue::Text(value.into())));
        self
    }

    /// Adds a file field.
    #[inline]
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, upload: FileUpload) -> Self {
        self.fields.push((name.into(), FormValue::File(upload)));
        self
    }

    /// Returns the number of fields.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the form has no fields.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Splits the form into metadata and the optional file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUpload`] if the form has more than one file
    /// field or its file field is not named `file`.
    pub fn split(self) -> Result<SplitForm> {
        let mut meta = Vec::with_capacity(self.fields.len());
        let mut file = None;

        for (name, value) in self.fields {
            match value {
                FormValue::Text(text) => {
                    meta.push((Value::from(name), Value::from(text)));
                }
                FormValue::File(upload) => {
                    if file.is_some() {
                        return Err(Error::invalid_upload(
                            "only one file field is allowed per request",
                        ));
                    }
                    if name != FILE_FIELD {
                        return Err(Error::invalid_upload(format!(
                            "file field must be named \"{FILE_FIELD}\", got \"{name}\""
                        )));
                    }
                    file = Some(upload);
                }
            }
        }

        Ok(SplitForm {
            meta: Value::Map(meta),
            file,
        })
    }
}

/// A form split for the wire.
#[derive(Debug, Clone)]
pub struct SplitForm {
    /// Text fields as a msgpack map.
    pub meta: Value,
    /// The file field, if present.
    pub file: Option<FileUpload>,
}

// ============================================================================
// FileUpload
// ============================================================================

/// A file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    name: String,
    source: FileSource,
}

/// Where the upload bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Already in memory.
    Bytes(Vec<u8>),
    /// Read from disk when the request is sent.
    Path(PathBuf),
}

impl FileUpload {
    /// Creates an upload from in-memory bytes.
    #[inline]
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Bytes(bytes),
        }
    }

    /// Creates an upload from a file on disk.
    ///
    /// The file name sent to the server is the path's final component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUpload`] if the path has no file name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::invalid_upload(format!("no file name in path: {}", path.display()))
            })?;

        Ok(Self {
            name: name.to_string(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Returns the file name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the bytes are available without IO.
    #[inline]
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        matches!(self.source, FileSource::Bytes(_))
    }

    /// Converts an in-memory upload without IO.
    ///
    /// Returns the upload back unchanged if it must be read from disk.
    pub fn try_into_attachment(self) -> std::result::Result<Attachment, Self> {
        match self.source {
            FileSource::Bytes(bytes) => Ok(Attachment::new(self.name, bytes)),
            FileSource::Path(_) => Err(self),
        }
    }

    /// Reads the file into an attachment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub async fn into_attachment(self) -> Result<Attachment> {
        match self.source {
            FileSource::Bytes(bytes) => Ok(Attachment::new(self.name, bytes)),
            FileSource::Path(path) => {
                let bytes = tokio::fs::read(&path).await?;
                debug!(path = %path.display(), size = bytes.len(), "Read upload file");
                Ok(Attachment::new(self.name, bytes))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_split_text_only() {
        let split = FormData::new()
            .text("simulationId", "abc")
            .text("simulationType", "srw")
            .split()
            .expect("split");

        assert!(split.file.is_none());
        let meta = split.meta.as_map().expect("map");
        assert_eq!(meta.len(), 2);
        assert_eq!(meta[0].0.as_str(), Some("simulationId"));
        assert_eq!(meta[1].1.as_str(), Some("srw"));
    }

    #[test]
    fn test_split_one_file() {
        let split = FormData::new()
            .text("file_type", "undulatorTable")
            .file("file", FileUpload::from_bytes("magnet.zip", vec![1, 2, 3]))
            .split()
            .expect("split");

        let file = split.file.expect("file");
        assert_eq!(file.name(), "magnet.zip");
        assert_eq!(split.meta.as_map().map(Vec::len), Some(1));
    }

    #[test]
    fn test_split_two_files_fails() {
        let result = FormData::new()
            .file("file", FileUpload::from_bytes("a", vec![]))
            .file("file", FileUpload::from_bytes("b", vec![]))
            .split();

        assert!(matches!(result, Err(Error::InvalidUpload { .. })));
    }

    #[test]
    fn test_split_misnamed_file_fails() {
        let result = FormData::new()
            .file("upload", FileUpload::from_bytes("a", vec![]))
            .split();

        let err = result.expect_err("misnamed file field");
        assert!(err.is_usage_error());
        assert!(err.to_string().contains("upload"));
    }

    #[test]
    fn test_try_into_attachment() {
        let attachment = FileUpload::from_bytes("x.txt", b"hi".to_vec())
            .try_into_attachment()
            .expect("in memory");
        assert_eq!(attachment, Attachment::new("x.txt", b"hi".to_vec()));

        let on_disk = FileUpload::from_path("/tmp/x.txt").expect("path");
        assert!(!on_disk.is_in_memory());
        assert!(on_disk.try_into_attachment().is_err());
    }

    #[test]
    fn test_from_path_requires_file_name() {
        assert!(FileUpload::from_path("/").is_err());
    }

    #[tokio::test]
    async fn test_into_attachment_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"0.5 1.5\n").expect("write");

        let upload = FileUpload::from_path(file.path()).expect("path");
        let expected_name = upload.name().to_string();
        let attachment = upload.into_attachment().await.expect("read");

        assert_eq!(attachment.filename, expected_name);
        assert_eq!(attachment.blob, b"0.5 1.5\n");
    }

    #[tokio::test]
    async fn test_into_attachment_missing_file() {
        let upload = FileUpload::from_path("/nonexistent/beam.dat").expect("path");
        assert!(matches!(
            upload.into_attachment().await,
            Err(Error::Io(_))
        ));
    }
}
