//! Translation pipeline: external translator invocation with live progress.
//!
//! The translator is driven as a subprocess (`<bin> input.pdf -s <service>
//! -o <out_dir> -t <threads>`) with stdout and stderr merged into one scan
//! stream. Output is consumed live — not only at exit — so progress can be
//! reported mid-run: segments are cut on `\r`/`\n` boundaries
//! ([`capture::SegmentBuffer`]), scanned by recognizers with a monotonic gate
//! ([`progress::ProgressScanner`]), and optionally appended to a transcript
//! log.
//!
//! Key rules:
//!
//! - A zero exit code is required; non-zero attaches the last 40 captured
//!   segments to the error.
//! - The primary ("mono") output name is version-dependent; a small set of
//!   candidates is probed and all of them are listed when none exists.
//! - The bilingual ("dual") output is deleted unless the caller keeps it;
//!   deletion failure is logged, not fatal.
//! - A final `1.0` is emitted on completion, distinct from whatever terminal
//!   status the caller records.
//! - No built-in timeout: a stuck translator must be terminated out-of-band.

pub mod capture;
pub mod progress;

pub use capture::{CaptureMode, SegmentBuffer};
pub use progress::{ProgressScanner, extract_progress};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};

use folio_core::config::TranslatorConfig;

use crate::errors::TranslateError;

/// Segments retained for failure reporting.
const TAIL_MAX: usize = 80;
/// Segments attached to a non-zero-exit error.
const TAIL_ERROR_LINES: usize = 40;

/// How to invoke the translator.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    /// Executable name or path.
    pub bin: String,
    /// Translation service selector (`-s`).
    pub service: String,
    /// Worker thread count (`-t`).
    pub threads: u32,
    /// Keep the bilingual side-by-side output.
    pub keep_dual: bool,
    /// Write the full captured transcript here.
    pub log_path: Option<PathBuf>,
    /// Output segmentation mode.
    pub capture: CaptureMode,
}

impl TranslateOptions {
    /// Options derived from configuration, with no transcript and full
    /// capture fidelity.
    #[must_use]
    pub fn from_config(translator: &TranslatorConfig) -> Self {
        Self {
            bin: translator.bin.clone(),
            service: translator.service.clone(),
            threads: translator.threads,
            keep_dual: translator.keep_dual,
            log_path: None,
            capture: CaptureMode::Interleaved,
        }
    }
}

/// Where a successful run left its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateOutput {
    /// Single-language translated PDF.
    pub mono_path: PathBuf,
    /// Bilingual PDF, when present and kept.
    pub dual_path: Option<PathBuf>,
    /// Transcript log, when requested.
    pub transcript_path: Option<PathBuf>,
}

/// Run the translator over `input_pdf`, writing outputs into `out_dir`.
///
/// `progress` receives `0.0` when the subprocess starts, strictly increasing
/// mid-run fractions extracted from its output, and an unconditional `1.0`
/// once the outputs are resolved. The second argument is the segment (or
/// phase note) the value came from.
pub async fn run_translation(
    input_pdf: &Path,
    out_dir: &Path,
    options: &TranslateOptions,
    mut progress: impl FnMut(f32, &str) + Send,
) -> Result<TranslateOutput, TranslateError> {
    if !input_pdf.exists() {
        return Err(TranslateError::InputMissing(input_pdf.to_path_buf()));
    }
    let bin = resolve_executable(&options.bin).ok_or_else(|| TranslateError::TranslatorMissing {
        name: options.bin.clone(),
    })?;
    tokio::fs::create_dir_all(out_dir).await?;

    let stem = input_pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(
        bin = %bin.display(),
        input = %input_pdf.display(),
        out_dir = %out_dir.display(),
        service = %options.service,
        threads = options.threads,
        "running translator"
    );

    let mut child = Command::new(&bin)
        .arg(input_pdf)
        .arg("-s")
        .arg(&options.service)
        .arg("-o")
        .arg(out_dir)
        .arg("-t")
        .arg(options.threads.to_string())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    // Merge both pipes into one channel; the readers close it at EOF.
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
    let _stdout_pump = tokio::spawn(pump(child.stdout.take(), tx.clone()));
    let _stderr_pump = tokio::spawn(pump(child.stderr.take(), tx));

    progress(0.0, "translator started");

    let mut transcript = match &options.log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            Some(tokio::fs::File::create(path).await?)
        }
        None => None,
    };

    let mut segments = SegmentBuffer::new(options.capture);
    let mut scanner = ProgressScanner::new();
    let mut tail: VecDeque<String> = VecDeque::new();

    while let Some(chunk) = rx.recv().await {
        for segment in segments.push(&chunk) {
            if let Some(file) = transcript.as_mut() {
                file.write_all(segment.as_bytes()).await?;
                file.write_all(b"\n").await?;
            }
            if let Some(p) = scanner.observe(&segment) {
                progress(p, &segment);
            }
            push_tail(&mut tail, segment);
        }
    }
    if let Some(segment) = segments.finish() {
        if let Some(file) = transcript.as_mut() {
            file.write_all(segment.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        if let Some(p) = scanner.observe(&segment) {
            progress(p, &segment);
        }
        push_tail(&mut tail, segment);
    }
    if let Some(file) = transcript.as_mut() {
        file.flush().await?;
    }

    let status = child.wait().await?;
    if !status.success() {
        let code = status.code().unwrap_or(-1);
        let tail_text = if tail.is_empty() {
            "(no output captured)".to_string()
        } else {
            let start = tail.len().saturating_sub(TAIL_ERROR_LINES);
            tail.iter()
                .skip(start)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        };
        return Err(TranslateError::Process {
            code,
            tail: tail_text,
        });
    }

    let mono_candidates = [
        out_dir.join(format!("{stem}-mono.pdf")),
        out_dir.join(format!("{stem}-zh.pdf")),
    ];
    let mono_path = mono_candidates
        .iter()
        .find(|p| p.exists())
        .cloned()
        .ok_or_else(|| TranslateError::OutputNotFound {
            probed: mono_candidates.to_vec(),
        })?;

    let dual = out_dir.join(format!("{stem}-dual.pdf"));
    let dual_path = if dual.exists() {
        if options.keep_dual {
            Some(dual)
        } else {
            if let Err(e) = tokio::fs::remove_file(&dual).await {
                warn!(path = %dual.display(), error = %e, "failed to delete dual output");
            }
            None
        }
    } else {
        None
    };

    progress(1.0, "translation finished");

    Ok(TranslateOutput {
        mono_path,
        dual_path,
        transcript_path: options.log_path.clone(),
    })
}

async fn pump<R>(pipe: Option<R>, tx: mpsc::Sender<Vec<u8>>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else { return };
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn push_tail(tail: &mut VecDeque<String>, segment: String) {
    if tail.len() == TAIL_MAX {
        let _ = tail.pop_front();
    }
    tail.push_back(segment);
}

/// Find the translator: a directly executable path, else a `PATH` search.
fn resolve_executable(name: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if is_executable(direct) {
        return Some(direct.to_path_buf());
    }
    if direct.components().count() > 1 {
        // An explicit path that is not executable; do not fall back to PATH.
        return None;
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
