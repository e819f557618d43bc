//! Input normalization ahead of markup conversion.

const FENCE: &str = "```";

/// Strip the configured command token when the text opens with it, e.g. the
/// trigger word a chat host leaves at the front of the message.
pub(crate) fn strip_command_prefix<'a>(text: &'a str, prefix: Option<&str>) -> &'a str {
    match prefix {
        Some(token) if !token.is_empty() => text.strip_prefix(token).unwrap_or(text),
        _ => text,
    }
}

/// Re-delimit fenced code blocks so each fence sits on its own line with
/// exactly one newline after the opening fence and one before the closing
/// fence. The code body is kept verbatim, internal blank lines included.
///
/// Fences are paired left-to-right. A trailing fence with no partner is
/// backslash-escaped: the converter would otherwise auto-close it at end of
/// input and swallow the rest of the message as code.
pub(crate) fn normalize_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let Some(close) = after_open.find(FENCE) else {
            out.push_str(&rest[..open]);
            out.push_str("\\`\\`\\`");
            rest = after_open;
            break;
        };

        let span = &after_open[..close];
        let (info, body) = match span.split_once('\n') {
            Some((first_line, remainder)) => (first_line.trim(), remainder.trim()),
            None => (span.trim(), ""),
        };

        out.push_str(rest[..open].trim_end());
        out.push('\n');
        out.push_str(FENCE);
        out.push_str(info);
        out.push('\n');
        if !body.is_empty() {
            out.push_str(body);
            out.push('\n');
        }
        out.push_str(FENCE);
        out.push('\n');

        rest = after_open[close + FENCE.len()..].trim_start();
    }

    out.push_str(rest);
    out
}

/// Full normalization pass applied before the converter sees the text.
pub(crate) fn prepare(text: &str, command_prefix: Option<&str>) -> String {
    normalize_code_fences(strip_command_prefix(text, command_prefix))
}
