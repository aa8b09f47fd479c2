//! Multipart upload request types

use reqwest::multipart::{Form, Part};
use tillgrid_domain::{ApiError, Result};

/// One binary part of a multipart upload
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadPart {
    pub fn new(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

/// A multipart upload: scalar fields plus binary parts.
///
/// Parts are buffered in memory so every retry attempt can rebuild the form
/// from scratch.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    fields: Vec<(String, String)>,
    parts: Vec<UploadPart>,
}

impl UploadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar form field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a binary part
    pub fn part(mut self, part: UploadPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Materialize a fresh multipart form for one network attempt
    pub(crate) fn to_form(&self) -> Result<Form> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for part in &self.parts {
            let built = Part::bytes(part.bytes.clone())
                .file_name(part.file_name.clone())
                .mime_str(&part.mime_type)
                .map_err(|err| {
                    ApiError::Config(format!("invalid mime type {:?}: {err}", part.mime_type))
                })?;
            form = form.part(part.name.clone(), built);
        }
        Ok(form)
    }
}
