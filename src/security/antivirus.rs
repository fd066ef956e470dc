//! Upload scanning.
//!
//! Every uploaded file goes through [`UploadScanner::scan`] before it touches
//! the upload directory. The built-in checks are cheap (size, extension,
//! EICAR signature); a configured `clamscan` binary adds a real engine pass.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

const EICAR_SIGNATURE: &[u8] = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";

const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "bat", "cmd", "com", "scr", "msi", "ps1", "vbs", "js", "jar", "sh",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    TooLarge,
    BlockedExtension,
    Signature,
    Engine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanVerdict {
    Clean,
    Rejected { kind: ThreatKind, reason: String },
}

impl ScanVerdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    fn rejected(kind: ThreatKind, reason: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub max_file_size: usize,
    pub clamscan_path: Option<PathBuf>,
    pub blocked_extensions: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
            clamscan_path: None,
            blocked_extensions: BLOCKED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadScanner {
    config: ScannerConfig,
}

impl UploadScanner {
    pub fn new(config: ScannerConfig) -> Self {
        if config.clamscan_path.is_none() {
            info!("No clamscan binary configured, using built-in upload checks only");
        }
        Self { config }
    }

    pub fn max_file_size(&self) -> usize {
        self.config.max_file_size
    }

    /// Checks that need only the file name and bytes.
    pub fn quick_scan(&self, file_name: &str, data: &[u8]) -> ScanVerdict {
        if data.len() > self.config.max_file_size {
            return ScanVerdict::rejected(
                ThreatKind::TooLarge,
                format!(
                    "file is {} bytes, limit is {}",
                    data.len(),
                    self.config.max_file_size
                ),
            );
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        if let Some(ext) = extension {
            if self.config.blocked_extensions.iter().any(|b| *b == ext) {
                return ScanVerdict::rejected(
                    ThreatKind::BlockedExtension,
                    format!("extension .{ext} is not allowed"),
                );
            }
        }

        if data
            .windows(EICAR_SIGNATURE.len())
            .any(|w| w == EICAR_SIGNATURE)
        {
            return ScanVerdict::rejected(ThreatKind::Signature, "EICAR test signature");
        }

        ScanVerdict::Clean
    }

    pub async fn scan(&self, file_name: &str, data: &[u8]) -> Result<ScanVerdict> {
        let verdict = self.quick_scan(file_name, data);
        if !verdict.is_clean() {
            warn!("Upload {file_name} rejected: {verdict:?}");
            return Ok(verdict);
        }

        match &self.config.clamscan_path {
            Some(clamscan) => self.run_clamscan(clamscan, data).await,
            None => Ok(ScanVerdict::Clean),
        }
    }

    async fn run_clamscan(&self, clamscan: &Path, data: &[u8]) -> Result<ScanVerdict> {
        let temp_path = std::env::temp_dir().join(format!("upload-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp_path, data)
            .await
            .context("Failed to write scan buffer")?;

        let output = Command::new(clamscan)
            .arg("--infected")
            .arg("--no-summary")
            .arg(&temp_path)
            .output()
            .await;
        let _ = tokio::fs::remove_file(&temp_path).await;
        let output = output.context("Failed to run clamscan")?;

        // clamscan: 0 clean, 1 infected, 2 error
        match output.status.code() {
            Some(0) => Ok(ScanVerdict::Clean),
            Some(1) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let signature = stdout
                    .lines()
                    .find_map(|line| line.rsplit_once(": ").map(|(_, s)| s.trim_end_matches(" FOUND")))
                    .unwrap_or("malware")
                    .to_string();
                warn!("clamscan flagged upload: {signature}");
                Ok(ScanVerdict::rejected(ThreatKind::Engine, signature))
            }
            _ => Err(anyhow::anyhow!(
                "clamscan failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> UploadScanner {
        UploadScanner::new(ScannerConfig {
            max_file_size: 64,
            ..ScannerConfig::default()
        })
    }

    #[test]
    fn test_clean_file() {
        assert!(scanner().quick_scan("report.pdf", b"%PDF-1.7 hello").is_clean());
    }

    #[test]
    fn test_size_limit() {
        let verdict = scanner().quick_scan("big.txt", &[b'a'; 65]);
        assert!(matches!(
            verdict,
            ScanVerdict::Rejected { kind: ThreatKind::TooLarge, .. }
        ));
    }

    #[test]
    fn test_blocked_extension_is_case_insensitive() {
        let verdict = scanner().quick_scan("setup.EXE", b"MZ");
        assert!(matches!(
            verdict,
            ScanVerdict::Rejected { kind: ThreatKind::BlockedExtension, .. }
        ));
    }

    #[test]
    fn test_eicar_signature() {
        let data = b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
        let verdict = UploadScanner::new(ScannerConfig::default()).quick_scan("notes.txt", data);
        assert!(matches!(
            verdict,
            ScanVerdict::Rejected { kind: ThreatKind::Signature, .. }
        ));
    }

    #[tokio::test]
    async fn test_scan_without_engine() {
        let verdict = scanner().scan("a.txt", b"plain").await.expect("scan");
        assert_eq!(verdict, ScanVerdict::Clean);
    }
}
