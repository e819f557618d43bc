//! Markdown-to-HTML conversion with math spans marked for relocation.

use comrak::{
    Arena, format_html,
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
    options::Options,
    parse_document,
};

use super::types::RenderError;

/// Markers the rewrite stage consumes. The converter leaves math sources raw
/// inside typesetter script tags; the rewrite stage relocates them into
/// styled containers the client-side typesetter picks up.
pub(crate) const MATH_INLINE_OPEN: &str = "<script type=\"math/tex\">";
pub(crate) const MATH_DISPLAY_OPEN: &str = "<script type=\"math/tex; mode=display\">";
pub(crate) const MATH_CLOSE: &str = "</script>";

/// Converts normalized Markdown into HTML carrying the math markers above.
pub(crate) trait MarkupConverter: Send + Sync {
    fn convert(&self, markdown: &str) -> Result<String, RenderError>;
}

/// Comrak-based converter with dollar-delimited math, tables, and fenced
/// code enabled. Highlighting happens later, over the emitted HTML.
pub(crate) struct ComrakConverter {
    options: Options<'static>,
}

impl ComrakConverter {
    pub(crate) fn new() -> Self {
        let mut options = Options::default();

        let ext = &mut options.extension;
        ext.strikethrough = true;
        ext.table = true;
        ext.autolink = true;
        ext.tasklist = true;
        ext.math_dollars = true;

        // The injected math markers must survive formatting as-is.
        options.render.r#unsafe = true;

        Self { options }
    }
}

impl MarkupConverter for ComrakConverter {
    fn convert(&self, markdown: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        mark_math_nodes(root);

        let mut html = String::new();
        format_html(root, &self.options, &mut html)
            .map_err(|err| RenderError::markup(err.to_string()))?;
        Ok(html)
    }
}

/// Replace every math node with the script marker carrying its raw source.
fn mark_math_nodes<'a>(node: &'a AstNode<'a>) {
    let math = {
        let data = node.data.borrow();
        if let NodeValue::Math(math_node) = &data.value {
            Some((math_node.literal.clone(), math_node.display_math))
        } else {
            None
        }
    };

    if let Some((literal, display_mode)) = math {
        let mut data = node.data.borrow_mut();
        if display_mode {
            data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
                block_type: 0,
                literal: format!("{MATH_DISPLAY_OPEN}{literal}{MATH_CLOSE}"),
            });
        } else {
            data.value = NodeValue::HtmlInline(format!("{MATH_INLINE_OPEN}{literal}{MATH_CLOSE}"));
        }
    }

    let mut child = node.first_child();
    while let Some(next) = child {
        mark_math_nodes(next);
        child = next.next_sibling();
    }
}
