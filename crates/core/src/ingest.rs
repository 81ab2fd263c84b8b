use crate::{DocumentFingerprint, IngestError, PdfUpload};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_pdf(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Expands folders into the PDFs they contain and reads every file, keeping
/// the order in which the paths were given.
pub async fn load_uploads(paths: &[PathBuf]) -> Result<Vec<PdfUpload>, IngestError> {
    if paths.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no input paths were given".to_string(),
        ));
    }

    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let found = discover_pdf_files(path);
            if found.is_empty() {
                return Err(IngestError::InvalidArgument(format!(
                    "no pdf files found in {}",
                    path.display()
                )));
            }
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::InvalidArgument(format!("path has no file name: {}", path.display()))
            })?
            .to_string();
        let bytes = tokio::fs::read(&path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "loaded upload");
        uploads.push(PdfUpload { name, bytes });
    }

    Ok(uploads)
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn fingerprint(upload: &PdfUpload) -> DocumentFingerprint {
    DocumentFingerprint {
        name: upload.name.clone(),
        checksum: digest_bytes(&upload.bytes),
        size_bytes: upload.bytes.len() as u64,
    }
}
