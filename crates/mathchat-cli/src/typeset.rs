//! Math typesetter capability probe.
//!
//! The typesetter is an external collaborator. Availability is probed
//! for a bounded period (~5 s) and every rendering failure degrades to
//! the unmodified markup; math rendering is never a fatal error.

use std::io::Write as _;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};

/// Fixed delimiter set recognized by the typesetter:
/// `(left, right, display)`.
pub const DELIMITERS: [(&str, &str, bool); 4] = [
    ("$$", "$$", true),
    ("$", "$", false),
    ("\\[", "\\]", true),
    ("\\(", "\\)", false),
];

const MAX_ATTEMPTS: u32 = 50;
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Renders math spans inside formatted markup.
pub trait Typesetter {
    /// # Errors
    /// Rendering failures; the caller falls back to the input markup.
    fn render(&self, markup: &str) -> Result<String>;
}

/// Fallback when no typesetter becomes available: math spans stay as
/// their literal delimiters.
pub struct PlainText;

impl Typesetter for PlainText {
    fn render(&self, markup: &str) -> Result<String> {
        Ok(markup.to_string())
    }
}

/// Typesetter backed by the `katex` command-line renderer.
pub struct KatexCli;

impl KatexCli {
    fn render_expression(expression: &str, display: bool) -> Result<String> {
        let mut command = Command::new("katex");
        if display {
            command.arg("--display-mode");
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn katex")?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(expression.as_bytes())
                .context("Failed to write katex input")?;
        }
        let output = child.wait_with_output().context("katex did not exit")?;
        if !output.status.success() {
            anyhow::bail!("katex exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

impl Typesetter for KatexCli {
    fn render(&self, markup: &str) -> Result<String> {
        let mut out = String::with_capacity(markup.len());
        for segment in math_spans(markup) {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Math { body, display } => {
                    out.push_str(&Self::render_expression(body, display)?);
                }
            }
        }
        Ok(out)
    }
}

/// One piece of markup: literal text or the body of a math span.
#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Math { body: &'a str, display: bool },
}

/// Splits markup on complete math spans from [`DELIMITERS`]. At equal
/// positions the earlier catalog entry wins, so `$$` is never read as
/// two inline openers. An unpaired opener is treated as literal text.
fn math_spans(markup: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = markup;
    loop {
        let mut earliest: Option<(usize, &str, &str, bool)> = None;
        for (left, right, display) in DELIMITERS {
            if let Some(at) = rest.find(left)
                && earliest.is_none_or(|(found, ..)| at < found)
            {
                earliest = Some((at, left, right, display));
            }
        }
        let Some((open, left, right, display)) = earliest else {
            break;
        };
        let after = &rest[open + left.len()..];
        let Some(close) = after.find(right) else {
            break;
        };
        if open > 0 {
            segments.push(Segment::Text(&rest[..open]));
        }
        segments.push(Segment::Math {
            body: &after[..close],
            display,
        });
        rest = &after[close + right.len()..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

/// Polls `detect` until it yields a typesetter or the attempt budget
/// runs out.
pub async fn probe_with(
    mut detect: impl FnMut() -> Option<Box<dyn Typesetter>>,
) -> Box<dyn Typesetter> {
    for attempt in 0..MAX_ATTEMPTS {
        if let Some(typesetter) = detect() {
            tracing::debug!(attempt, "typesetter ready");
            return typesetter;
        }
        tokio::time::sleep(PROBE_INTERVAL).await;
    }
    tracing::warn!(
        "typesetter unavailable after {MAX_ATTEMPTS} attempts; math renders as plain text"
    );
    Box::new(PlainText)
}

/// Probes for the `katex` binary on PATH.
pub async fn probe() -> Box<dyn Typesetter> {
    probe_with(|| {
        let available = Command::new("katex")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success());
        available.then(|| Box::new(KatexCli) as Box<dyn Typesetter>)
    })
    .await
}
