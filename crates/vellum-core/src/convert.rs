/*
 * convert.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! External document conversion.
//!
//! Converting rendered output to a fixed format (PDF, HTML) is delegated to
//! an external office-document renderer. This is the only blocking work in
//! the system: it is time-bounded, cancelled by killing the process on
//! timeout, and runs under a per-operation working directory that is
//! released on every exit path (success, failure, or timeout), because the
//! directory is a [`tempfile::TempDir`] dropped with the call frame.
//!
//! The converter binary is discovered from the `VELLUM_CONVERTER`
//! environment variable first, then as `soffice` on `PATH`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Target formats for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertFormat {
    Pdf,
    Html,
}

impl ConvertFormat {
    /// The file extension (and converter filter name) for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConvertFormat::Pdf => "pdf",
            ConvertFormat::Html => "html",
        }
    }

    /// Parse a format name as given on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pdf" => Some(ConvertFormat::Pdf),
            "html" => Some(ConvertFormat::Html),
            _ => None,
        }
    }
}

/// Conversion failures.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no converter binary found (set VELLUM_CONVERTER or install soffice)")]
    ConverterNotFound,

    #[error("conversion timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("converter exited with {status}: {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("converter produced no output file")]
    MissingOutput,

    #[error("conversion I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts rendered document bytes to a target format.
pub trait DocumentConverter: Send + Sync {
    /// Convert `input` (written under `input_name` in the working
    /// directory) to `format`, returning the converted bytes.
    fn convert(
        &self,
        input: &[u8],
        input_name: &str,
        format: ConvertFormat,
    ) -> Result<Vec<u8>, ConvertError>;
}

/// Shells out to an office-document renderer (`soffice --headless
/// --convert-to ...`).
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    binary: PathBuf,
    timeout: Duration,
}

impl OfficeConverter {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Discover the converter binary: `VELLUM_CONVERTER` first, then
    /// `soffice` on `PATH`.
    pub fn discover(timeout: Duration) -> Result<Self, ConvertError> {
        let binary = std::env::var_os("VELLUM_CONVERTER")
            .map(PathBuf::from)
            .or_else(|| which::which("soffice").ok())
            .ok_or(ConvertError::ConverterNotFound)?;
        Ok(Self::new(binary, timeout))
    }

    /// How often to poll the child while waiting for it to exit.
    const POLL_INTERVAL: Duration = Duration::from_millis(50);
}

impl DocumentConverter for OfficeConverter {
    fn convert(
        &self,
        input: &[u8],
        input_name: &str,
        format: ConvertFormat,
    ) -> Result<Vec<u8>, ConvertError> {
        // The TempDir guards the whole operation: dropped (and deleted) on
        // every return path below, including timeout and kill.
        let workdir = tempfile::TempDir::new()?;
        let input_path = workdir.path().join(input_name);
        std::fs::File::create(&input_path)?.write_all(input)?;

        // Stderr goes to a file rather than a pipe so a chatty converter
        // cannot deadlock against an unread pipe while we poll.
        let stderr_path = workdir.path().join("converter.log");
        let stderr_file = std::fs::File::create(&stderr_path)?;

        tracing::debug!(binary = %self.binary.display(), format = format.extension(), "starting converter");
        let mut child = Command::new(&self.binary)
            .arg("--headless")
            .arg("--convert-to")
            .arg(format.extension())
            .arg("--outdir")
            .arg(workdir.path())
            .arg(&input_path)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr_file)
            .spawn()?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                child.kill()?;
                child.wait()?;
                tracing::warn!(timeout = ?self.timeout, "converter killed on timeout");
                return Err(ConvertError::Timeout {
                    timeout: self.timeout,
                });
            }
            std::thread::sleep(Self::POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = std::fs::read_to_string(&stderr_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            return Err(ConvertError::Failed { status, stderr });
        }

        let output_path = converted_path(&input_path, format);
        match std::fs::read(&output_path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConvertError::MissingOutput)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// The converter writes its result next to the input, with the target
/// extension.
fn converted_path(input: &Path, format: ConvertFormat) -> PathBuf {
    input.with_extension(format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_extensions() {
        assert_eq!(ConvertFormat::Pdf.extension(), "pdf");
        assert_eq!(ConvertFormat::Html.extension(), "html");
        assert_eq!(ConvertFormat::parse("pdf"), Some(ConvertFormat::Pdf));
        assert_eq!(ConvertFormat::parse("docx"), None);
    }

    #[test]
    fn test_converted_path() {
        let path = converted_path(Path::new("/work/document.xml"), ConvertFormat::Pdf);
        assert_eq!(path, Path::new("/work/document.pdf"));
    }

    #[cfg(unix)]
    fn fake_converter(dir: &Path, script_body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-soffice");
        std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_conversion() {
        // Args: --headless --convert-to <ext> --outdir <dir> <input>
        let dir = tempfile::tempdir().unwrap();
        let script = fake_converter(
            dir.path(),
            r#"printf 'converted' > "$5/$(basename "$6" .xml).$3""#,
        );

        let converter = OfficeConverter::new(script, Duration::from_secs(5));
        let output = converter
            .convert(b"<w:p/>", "document.xml", ConvertFormat::Pdf)
            .unwrap();
        assert_eq!(output, b"converted");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_converter() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_converter(dir.path(), "sleep 30");

        let converter = OfficeConverter::new(script, Duration::from_millis(200));
        let started = Instant::now();
        let err = converter
            .convert(b"<w:p/>", "document.xml", ConvertFormat::Pdf)
            .unwrap_err();

        assert!(matches!(err, ConvertError::Timeout { .. }));
        // Killed promptly, not after the child's own 30 seconds.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_converter(dir.path(), "echo 'no filter found' >&2; exit 3");

        let converter = OfficeConverter::new(script, Duration::from_secs(5));
        let err = converter
            .convert(b"<w:p/>", "document.xml", ConvertFormat::Pdf)
            .unwrap_err();

        let ConvertError::Failed { stderr, .. } = err else {
            panic!("expected Failed, got {err:?}");
        };
        assert_eq!(stderr, "no filter found");
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_output_detected() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_converter(dir.path(), "exit 0");

        let converter = OfficeConverter::new(script, Duration::from_secs(5));
        let err = converter
            .convert(b"<w:p/>", "document.xml", ConvertFormat::Pdf)
            .unwrap_err();
        assert!(matches!(err, ConvertError::MissingOutput));
    }
}
