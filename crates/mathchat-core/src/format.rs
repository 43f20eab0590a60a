//! Content-safety formatting for streamed markdown with math and code.
//!
//! [`render`] is re-run on every streaming update over the growing
//! cumulative text, so it is a pure function of its input and leaves
//! incomplete spans (an unclosed fence, a dangling `$`) as literal
//! text; a later call over a longer prefix recognizes the completed
//! span. Pass order matters:
//!
//! 1. math spans are pulled out first (`\[..\]`, then `$$..$$`, then
//!    `$..$`),
//! 2. then fenced code blocks, then inline code, so a `$` inside a
//!    code span and a `*` inside any protected region never reach the
//!    emphasis pass,
//! 3. emphasis and line breaks rewrite what remains,
//! 4. code placeholders are restored before math placeholders, so
//!    math-looking text inside a restored code span stays literal.

use std::sync::LazyLock;

use regex::{Captures, Regex};

// Placeholders are delimited by private-use code points so no byte of
// the protected text survives into the emphasis and line-break passes.
const TOKEN_OPEN: char = '\u{E000}';
const TOKEN_CLOSE: char = '\u{E001}';

static MATH_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\\[.*?\\\]").expect("hard-coded regex"));
static MATH_DISPLAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\$.*?\$\$").expect("hard-coded regex"));
static MATH_INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[^$]+\$").expect("hard-coded regex"));
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("hard-coded regex"));
static CODE_INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]+`").expect("hard-coded regex"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("hard-coded regex"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("hard-coded regex"));

/// Formats raw model text (markdown + math + code) into display markup
/// without ever mangling math or code spans.
pub fn render(text: &str) -> String {
    let mut protected: Vec<String> = Vec::new();

    // Math first: verbatim restore, the typesetter sees the original
    // delimiters.
    let out = stash(&MATH_BRACKET, text, &mut protected, str::to_string);
    let out = stash(&MATH_DISPLAY, &out, &mut protected, str::to_string);
    let out = stash(&MATH_INLINE, &out, &mut protected, str::to_string);

    // Code second: restored as markup, with the delimiters stripped.
    let out = stash(&CODE_FENCE, &out, &mut protected, |matched| {
        let inner = &matched[3..matched.len() - 3];
        format!("<pre><code>{inner}</code></pre>")
    });
    let out = stash(&CODE_INLINE, &out, &mut protected, |matched| {
        let inner = &matched[1..matched.len() - 1];
        format!("<code>{inner}</code>")
    });

    // What remains carries no raw math or code text.
    let out = BOLD.replace_all(&out, "<strong>$1</strong>");
    let out = ITALIC.replace_all(&out, "<em>$1</em>");
    let mut out = out.replace('\n', "<br>");

    // Reverse extraction order restores code before math, so a math
    // placeholder inside a code span is resolved on the second pass.
    for (index, replacement) in protected.iter().enumerate().rev() {
        out = out.replace(&placeholder(index), replacement);
    }
    out
}

fn placeholder(index: usize) -> String {
    format!("{TOKEN_OPEN}{index}{TOKEN_CLOSE}")
}

/// Replaces every match with a unique opaque token, recording the
/// restoration text.
fn stash(
    re: &Regex,
    input: &str,
    protected: &mut Vec<String>,
    wrap: impl Fn(&str) -> String,
) -> String {
    re.replace_all(input, |caps: &Captures<'_>| {
        let token = placeholder(protected.len());
        protected.push(wrap(&caps[0]));
        token
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_and_italic() {
        assert_eq!(
            render("**strong** and *soft*"),
            "<strong>strong</strong> and <em>soft</em>"
        );
    }

    #[test]
    fn newlines_become_breaks() {
        assert_eq!(render("one\ntwo"), "one<br>two");
    }

    #[test]
    fn inline_code_shields_math_and_emphasis() {
        let out = render("**bold** inside `code $not-math$ code`");
        assert_eq!(
            out,
            "<strong>bold</strong> inside <code>code $not-math$ code</code>"
        );
    }

    #[test]
    fn fenced_block_keeps_asterisks_and_dollars() {
        let out = render("```\nlet x = a * b; // costs $5\n```");
        assert_eq!(out, "<pre><code>\nlet x = a * b; // costs $5\n</code></pre>");
        assert!(!out.contains("<em>"));
        assert!(!out.contains("<br>"));
    }

    #[test]
    fn inline_math_survives_emphasis_pass() {
        assert_eq!(render("the ideal $I = (x*y, y^2)$ here"), "the ideal $I = (x*y, y^2)$ here");
    }

    #[test]
    fn display_math_survives_verbatim() {
        let text = "$$\n\\sum_{i=0}^n i^2 * 2\n$$";
        assert_eq!(render(text), text);
    }

    #[test]
    fn bracket_math_survives_verbatim() {
        let text = "\\[x^2 + y^2 = z^2\\]";
        assert_eq!(render(text), text);
    }

    #[test]
    fn adjacent_inline_math_spans_stay_separate() {
        assert_eq!(render("$a$ times $b$"), "$a$ times $b$");
    }

    #[test]
    fn unclosed_fence_is_left_literal() {
        let out = render("```rust\nlet x = 1;");
        assert!(out.starts_with("```rust<br>"));
        assert!(!out.contains("<pre>"));
    }

    #[test]
    fn dangling_dollar_is_left_literal() {
        assert_eq!(render("price is $5 and rising"), "price is $5 and rising");
    }

    #[test]
    fn unclosed_bold_is_left_literal() {
        assert_eq!(render("**half open"), "**half open");
    }

    // Growing-prefix idempotence: formatting a prefix and then the
    // longer text must agree on the prefix, as long as the boundary
    // does not fall inside a math/code span.
    #[test]
    fn prefix_formatting_is_stable_at_span_boundaries() {
        let prefix = "Let **R** be a ring.\n";
        let full = "Let **R** be a ring.\nThen `x*y` lies in $R[x]$.";
        assert!(render(full).starts_with(&render(prefix)));
    }

    #[test]
    fn span_completes_once_the_closing_delimiter_arrives() {
        // Mid-stream the span is incomplete and stays literal.
        assert_eq!(render("value $x^"), "value $x^");
        // One more update closes it and it becomes protected math.
        assert_eq!(render("value $x^2$ found"), "value $x^2$ found");
    }

    #[test]
    fn math_inside_code_is_restored_after_code() {
        // The $..$ is extracted as math first, then swallowed by the
        // code span; restoring code before math brings it back.
        let out = render("`f($x$)`");
        assert_eq!(out, "<code>f($x$)</code>");
    }

    #[test]
    fn mixed_document() {
        let out = render("**Result:**\n$$I = (x)$$\nUse `gens I` to *list* them.");
        assert_eq!(
            out,
            "<strong>Result:</strong><br>$$I = (x)$$<br>Use <code>gens I</code> to <em>list</em> them."
        );
    }
}
