use std::fmt::{self, Write};

use crate::tree::{ContainerKind, TokenTree, TreeVisitor};

pub const DEFAULT_CLASS_PREFIX: &str = "hljs-";

#[derive(Debug, PartialEq, Eq, Clone)]
/// A renderer that will output `<span>` elements with scope based classes
pub struct HtmlRenderer {
    /// Prepended to the first segment of every scope class
    pub class_prefix: String,
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self {
            class_prefix: DEFAULT_CLASS_PREFIX.to_owned(),
        }
    }
}

impl HtmlRenderer {
    pub fn new(class_prefix: impl Into<String>) -> Self {
        Self {
            class_prefix: class_prefix.into(),
        }
    }

    /// Renders the tree to an HTML fragment, escaping text as needed.
    pub fn render(&self, tree: &TokenTree) -> String {
        let mut visitor = HtmlVisitor {
            prefix: &self.class_prefix,
            out: String::new(),
        };
        tree.walk(&mut visitor);
        visitor.out
    }

    /// `a.b.c` gives `{prefix}a b_ c__`: deeper segments get one more underscore each
    pub fn scope_to_class(&self, scope: &str) -> String {
        scope_class(&self.class_prefix, scope)
    }
}

fn scope_class(prefix: &str, scope: &str) -> String {
    let mut segments = scope.split('.');
    let mut class = format!("{prefix}{}", segments.next().unwrap_or_default());
    for (depth, segment) in segments.enumerate() {
        class.push(' ');
        class.push_str(segment);
        class.push_str(&"_".repeat(depth + 1));
    }
    class
}

struct HtmlVisitor<'a> {
    prefix: &'a str,
    out: String,
}

impl TreeVisitor for HtmlVisitor<'_> {
    fn text(&mut self, text: &str) {
        // writing to a String can't fail
        let _ = write!(self.out, "{}", HtmlEscaped(text));
    }

    fn open(&mut self, kind: &ContainerKind) {
        let class = match kind {
            ContainerKind::Scope(scope) => scope_class(self.prefix, scope),
            ContainerKind::Sublanguage(language) => format!("language-{language}"),
        };
        let _ = write!(self.out, r#"<span class="{class}">"#);
    }

    fn close(&mut self, _: &ContainerKind) {
        self.out.push_str("</span>");
    }
}

// From syntect
pub(crate) struct HtmlEscaped<'a>(pub &'a str);
impl fmt::Display for HtmlEscaped<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(s) = *self;
        let mut last = 0;
        for (i, ch) in s.bytes().enumerate() {
            let escaped = match ch {
                b'>' => "&gt;",
                b'<' => "&lt;",
                b'&' => "&amp;",
                b'\'' => "&#x27;",
                b'"' => "&quot;",
                _ => continue,
            };
            fmt.write_str(&s[last..i])?;
            fmt.write_str(escaped)?;
            last = i + 1;
        }

        if last < s.len() {
            fmt.write_str(&s[last..])?;
        }
        Ok(())
    }
}
