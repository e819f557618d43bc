//! Structural rewriting of converter output via delimiter-bounded substitution.

use html_escape::{decode_html_entities, encode_text};
use tracing::warn;

use super::highlight;
use super::markup::{MATH_CLOSE, MATH_DISPLAY_OPEN, MATH_INLINE_OPEN};

const HINTED_CODE_OPEN: &str = "<pre><code class=\"language-";
const PLAIN_CODE_OPEN: &str = "<pre><code>";
const CODE_CLOSE: &str = "</code></pre>";

/// Replace each non-overlapping span between `open` and `close` with the
/// transform of its inner content, markers included. Spans are matched
/// minimally, left-to-right, and may cross newlines. A transform returning
/// `None` re-emits the original span verbatim. An opening marker with no
/// closing marker is left untouched, along with everything after it.
///
/// Nested or overlapping marker pairs are not supported; the first closing
/// marker wins.
pub(crate) fn substitute_between<F>(input: &str, open: &str, close: &str, mut transform: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(open) {
        let after_open = &rest[start + open.len()..];
        let Some(end) = after_open.find(close) else {
            break;
        };

        out.push_str(&rest[..start]);
        let inner = &after_open[..end];
        match transform(inner) {
            Some(replacement) => out.push_str(&replacement),
            None => {
                out.push_str(open);
                out.push_str(inner);
                out.push_str(close);
            }
        }
        rest = &after_open[end + close.len()..];
    }

    out.push_str(rest);
    out
}

/// Move typesetter script spans into styled containers, re-adding exactly one
/// pair of explicit delimiters for the client-side typesetter. The math
/// source goes through entity encoding because the container is ordinary
/// element content; the DOM hands the decoded source back to the typesetter.
pub(crate) fn relocate_math_spans(html: &str) -> String {
    let with_blocks = substitute_between(html, MATH_DISPLAY_OPEN, MATH_CLOSE, |tex| {
        Some(format!(
            "<div class=\"math-block\">\\[{}\\]</div>",
            encode_text(tex)
        ))
    });

    substitute_between(&with_blocks, MATH_INLINE_OPEN, MATH_CLOSE, |tex| {
        Some(format!(
            "<span class=\"math-inline\">${}$</span>",
            encode_text(tex)
        ))
    })
}

/// Re-render code spans with the syntax highlighter. Hinted spans resolve
/// their language token; bare spans get first-line inference and stay
/// untouched when nothing matches.
pub(crate) fn rehighlight_code_spans(html: &str) -> String {
    let hinted = substitute_between(html, HINTED_CODE_OPEN, CODE_CLOSE, |span| {
        let (token, escaped) = span.split_once("\">")?;
        let code = decode_html_entities(escaped);
        match highlight::highlight_code(Some(token), &code) {
            Ok(rendered) => Some(rendered),
            Err(err) => {
                warn!(
                    target = "application::render::rewrite",
                    language = token,
                    error = %err,
                    "highlighting failed; keeping escaped code span"
                );
                None
            }
        }
    });

    substitute_between(&hinted, PLAIN_CODE_OPEN, CODE_CLOSE, |escaped| {
        let code = decode_html_entities(escaped);
        let syntax = highlight::detect_syntax(&code)?;
        match highlight::highlight_detected(syntax, &code) {
            Ok(rendered) => Some(rendered),
            Err(err) => {
                warn!(
                    target = "application::render::rewrite",
                    language = %syntax.name,
                    error = %err,
                    "highlighting failed; keeping escaped code span"
                );
                None
            }
        }
    })
}
