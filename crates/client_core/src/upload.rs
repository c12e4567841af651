use std::path::Path;

use anyhow::Context;
use shared::error::ServiceError;

pub const ACCEPTED_EXTENSIONS: [&str; 3] = [".fasta", ".fas", ".fa"];

/// A FASTA file staged for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl FastaUpload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a file from disk. The name and on-disk size are checked before
    /// any content is loaded.
    pub async fn read(path: &Path, max_bytes: u64) -> anyhow::Result<Self> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("'{}' has no usable file name", path.display()))?
            .to_string();
        check_name(&filename)?;
        let size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("failed to stat '{}'", path.display()))?
            .len();
        check_size(&filename, size, max_bytes)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        Ok(Self { filename, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Checks run before anything is sent: accepted extension
    /// (case-insensitive) and size limit.
    pub fn validate(&self, max_bytes: u64) -> Result<(), ServiceError> {
        check_name(&self.filename)?;
        check_size(&self.filename, self.size(), max_bytes)
    }
}

fn check_name(filename: &str) -> Result<(), ServiceError> {
    let name = filename.trim();
    if name.is_empty() {
        return Err(ServiceError::validation("no file selected"));
    }

    let lower = name.to_ascii_lowercase();
    if !ACCEPTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(ServiceError::validation(format!(
            "'{name}' is not a FASTA file (expected {})",
            ACCEPTED_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}

fn check_size(filename: &str, size: u64, max_bytes: u64) -> Result<(), ServiceError> {
    if size > max_bytes {
        return Err(ServiceError::validation(format!(
            "'{}' is {size} bytes; the limit is {max_bytes} bytes",
            filename.trim()
        )));
    }
    Ok(())
}
