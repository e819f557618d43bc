use once_cell::sync::Lazy;
use syntect::{
    highlighting::ThemeSet,
    html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

use crate::config::ThemeVariant;

use super::types::RenderError;

pub(crate) const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "syntax-" };

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

/// CSS rule-set matching the classed spans emitted by the functions below,
/// keyed to the document theme.
pub(crate) fn highlight_stylesheet(theme: ThemeVariant) -> Result<String, RenderError> {
    let theme_set = ThemeSet::load_defaults();
    let highlight_theme = theme_set
        .themes
        .get(theme.highlight_theme_name())
        .ok_or_else(|| {
            RenderError::document(format!(
                "missing bundled highlight theme `{}`",
                theme.highlight_theme_name()
            ))
        })?;

    css_for_theme_with_class_style(highlight_theme, CLASS_STYLE)
        .map_err(|err| RenderError::document(format!("failed to build highlight stylesheet: {err}")))
}

/// Highlight code carrying an explicit language token, falling back to the
/// plain-text grammar when the token is unknown.
pub(crate) fn highlight_code(language: Option<&str>, code: &str) -> Result<String, RenderError> {
    let lang_token = language.unwrap_or("text");
    let syntax =
        find_syntax(lang_token).unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
    render_highlighted(lang_token, syntax, code)
}

/// Infer the grammar from the code itself. Returns `None` when nothing
/// matches so the caller can keep the span exactly as the converter left it.
pub(crate) fn detect_syntax(code: &str) -> Option<&'static SyntaxReference> {
    SYNTAX_SET.find_syntax_by_first_line(code)
}

/// Highlight code with an already-resolved grammar.
pub(crate) fn highlight_detected(
    syntax: &SyntaxReference,
    code: &str,
) -> Result<String, RenderError> {
    let lang_token = syntax.name.to_ascii_lowercase().replace(' ', "-");
    render_highlighted(&lang_token, syntax, code)
}

fn render_highlighted(
    lang_token: &str,
    syntax: &SyntaxReference,
    code: &str,
) -> Result<String, RenderError> {
    let mut code_with_newline = code.to_string();
    if !code_with_newline.ends_with('\n') {
        code_with_newline.push('\n');
    }

    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, CLASS_STYLE);

    for line in LinesWithEndings::from(code_with_newline.as_str()) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .map_err(|err| RenderError::markup(format!("highlighting `{lang_token}` failed: {err}")))?;
    }

    let highlighted = generator.finalize();
    let lang_class = lang_token.to_ascii_lowercase();
    Ok(format!(
        "<pre class=\"syntax-highlight syntax-lang-{lang_class}\" data-language=\"{lang_token}\"><code class=\"language-{lang_class} syntax-code\">{highlighted}</code></pre>"
    ))
}

fn find_syntax(token: &str) -> Option<&'static SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    SYNTAX_SET
        .find_syntax_by_token(&lowercase)
        .or_else(|| SYNTAX_SET.find_syntax_by_name(&lowercase))
        .or_else(|| SYNTAX_SET.find_syntax_by_extension(&lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_language_token_produces_classed_spans() {
        let html = highlight_code(Some("rust"), "fn main() {}\n").expect("highlights");
        assert!(html.contains("syntax-lang-rust"), "missing wrapper: {html}");
        assert!(html.contains("<span class=\"syntax-"), "missing spans: {html}");
    }

    #[test]
    fn unknown_language_token_falls_back_to_plain_text() {
        let html = highlight_code(Some("nosuchlang"), "anything\n").expect("highlights");
        assert!(html.contains("data-language=\"nosuchlang\""), "{html}");
        assert!(html.contains("anything"), "{html}");
    }

    #[test]
    fn shebang_line_is_detected() {
        let syntax = detect_syntax("#!/bin/bash\necho hi\n").expect("detects shell");
        assert!(syntax.name.to_ascii_lowercase().contains("bash"), "{}", syntax.name);
    }

    #[test]
    fn prose_is_not_detected() {
        assert!(detect_syntax("just some prose, nothing else\n").is_none());
    }

    #[test]
    fn stylesheets_exist_for_both_themes() {
        for theme in [ThemeVariant::Light, ThemeVariant::Dark] {
            let css = highlight_stylesheet(theme).expect("stylesheet builds");
            assert!(css.contains(".syntax-"), "unprefixed stylesheet: {css}");
        }
    }
}
