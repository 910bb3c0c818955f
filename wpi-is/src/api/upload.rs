//! Multipart form collection shared by the upload endpoints

use axum::extract::Multipart;
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Every part of a multipart body: file parts and text fields
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read the whole body, rejecting any file larger than `max_file_bytes`
    pub async fn read(mut multipart: Multipart, max_file_bytes: usize) -> ApiResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);

            if file_name.is_some() {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if bytes.len() > max_file_bytes {
                    return Err(ApiError::BadRequest(format!(
                        "File '{}' exceeds the upload limit of {} bytes",
                        file_name.as_deref().unwrap_or(&name),
                        max_file_bytes
                    )));
                }
                form.files.push(UploadedFile {
                    field: name,
                    file_name,
                    bytes: bytes.to_vec(),
                });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    /// Trimmed, non-empty text field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Parse a text field, `None` when absent
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> ApiResult<Option<T>> {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| ApiError::BadRequest(format!("Invalid value '{}' for {}", raw, name)))
            })
            .transpose()
    }

    /// Boolean field accepting `true/false`, `1/0`, `yes/no`, `on/off`
    pub fn flag(&self, name: &str, default: bool) -> ApiResult<bool> {
        match self.text(name).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(other) => Err(ApiError::BadRequest(format!(
                "Invalid value '{}' for {}",
                other, name
            ))),
        }
    }

    /// The single file sent under `field`
    pub fn take_file(&mut self, field: &str) -> ApiResult<UploadedFile> {
        let index = self
            .files
            .iter()
            .position(|f| f.field == field)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing file field '{}'", field)))?;
        Ok(self.files.remove(index))
    }
}
