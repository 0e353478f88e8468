//! Upload checks applied before a file reaches the cleaning pipeline.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Leading bytes read when checking file content against its extension.
const SNIFF_BYTES: usize = 2048;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const OLE2_SIGNATURE: &[u8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Limits for accepted input files, read from the `[upload]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    /// Largest accepted file, in megabytes.
    pub max_file_size_mb: u64,
    /// Largest accepted dataset, in data rows.
    pub max_rows: usize,
    /// Comma-separated extensions, without dots.
    pub allowed_extensions: String,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size_mb: 10,
            max_rows: 10_000,
            allowed_extensions: "csv,xlsx,xls".to_string(),
        }
    }
}

impl UploadLimits {
    /// Load the `[upload]` section from the same layered sources as the pipeline config.
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        datawash_core::config::figment(Some(workspace))
            .focus("upload")
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load upload limits: {}", e))
    }

    pub fn allowed_extensions_list(&self) -> Vec<String> {
        self.allowed_extensions
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Check extension, size and content signature. Returns the file size in bytes.
    pub fn validate_file(&self, path: &Path) -> anyhow::Result<u64> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        if !metadata.is_file() {
            anyhow::bail!("{} is not a file", path.display());
        }

        let allowed = self.allowed_extensions_list();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !allowed.contains(&extension) {
            anyhow::bail!("File type not allowed. Allowed types: {}", allowed.join(", "));
        }

        let size = metadata.len();
        if size > self.max_file_size_mb * 1024 * 1024 {
            anyhow::bail!(
                "File too large. Maximum size: {}MB",
                self.max_file_size_mb
            );
        }

        let mut header = Vec::with_capacity(SNIFF_BYTES);
        std::fs::File::open(path)
            .and_then(|f| f.take(SNIFF_BYTES as u64).read_to_end(&mut header))
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        if !content_matches_extension(&header, &extension) {
            anyhow::bail!(
                "File content doesn't match extension. Possible file corruption or security risk."
            );
        }
        Ok(size)
    }

    pub fn check_rows(&self, rows: usize) -> anyhow::Result<()> {
        if rows > self.max_rows {
            anyhow::bail!(
                "Too many rows: {} (maximum {})",
                rows,
                self.max_rows
            );
        }
        Ok(())
    }
}

/// Whether the leading bytes of a file are plausible for its extension. Workbooks must
/// carry their container signature; delimited text must not contain NUL bytes unless it
/// opens with a UTF-16 byte order mark.
fn content_matches_extension(header: &[u8], extension: &str) -> bool {
    match extension {
        "xlsx" | "xlsm" | "ods" => header.starts_with(ZIP_SIGNATURE),
        // Legacy workbooks are OLE2 compound files; some exporters write xlsx under .xls.
        "xls" => header.starts_with(OLE2_SIGNATURE) || header.starts_with(ZIP_SIGNATURE),
        _ => {
            header.starts_with(b"\xFF\xFE")
                || header.starts_with(b"\xFE\xFF")
                || !header.contains(&0)
        }
    }
}
