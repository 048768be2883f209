//! Progress extraction from free-form translator output.
//!
//! Recognizers, tried in priority order:
//!
//! 1. A percentage immediately followed by a progress-bar separator glyph
//!    (`12%|████…`)
//! 2. A bare percentage token (`12%`)
//! 3. `page i/n` phrasing with two integers
//! 4. A bare `i/n` fraction
//!
//! Each result is clamped to `[0, 1]`. [`ProgressScanner`] additionally gates
//! callbacks to strictly increasing values, suppressing duplicate and
//! regressive redraws of the same bar.

use std::sync::LazyLock;

use regex::Regex;

static BAR_PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,3})%\|").expect("static regex"));
static PLAIN_PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])([0-9]{1,3})%").expect("static regex"));
static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpages?\b.*?([0-9]+)\s*/\s*([0-9]+)").expect("static regex"));
static FRACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])([0-9]+)\s*/\s*([0-9]+)").expect("static regex"));

/// Extract a `0..=1` progress fraction from one output segment, if any
/// recognizer matches.
#[must_use]
pub fn extract_progress(text: &str) -> Option<f32> {
    if text.is_empty() {
        return None;
    }

    if let Some(p) = percent_from(&BAR_PERCENT_RE, text) {
        return Some(p);
    }
    if let Some(p) = percent_from(&PLAIN_PERCENT_RE, text) {
        return Some(p);
    }
    if let Some(p) = fraction_from(&PAGE_RE, text) {
        return Some(p);
    }
    fraction_from(&FRACTION_RE, text)
}

fn percent_from(re: &Regex, text: &str) -> Option<f32> {
    let caps = re.captures(text)?;
    let v: u32 = caps[1].parse().ok()?;
    (v <= 100).then(|| v as f32 / 100.0)
}

fn fraction_from(re: &Regex, text: &str) -> Option<f32> {
    let caps = re.captures(text)?;
    let i: u64 = caps[1].parse().ok()?;
    let n: u64 = caps[2].parse().ok()?;
    (n > 0).then(|| (i as f32 / n as f32).clamp(0.0, 1.0))
}

/// Monotonic gate over extracted progress values.
#[derive(Debug, Default)]
pub struct ProgressScanner {
    last: Option<f32>,
}

impl ProgressScanner {
    /// Create a scanner with no progress observed yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan one segment; returns the value only when it strictly exceeds
    /// everything seen so far.
    pub fn observe(&mut self, text: &str) -> Option<f32> {
        let p = extract_progress(text)?;
        if self.last.is_none_or(|last| p > last) {
            self.last = Some(p);
            Some(p)
        } else {
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
