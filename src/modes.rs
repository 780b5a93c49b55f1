//! Building blocks for grammars written in Rust.
//!
//! Every function returns a fresh [`RawMode`] that can be tweaked with struct update syntax
//! before being put in a `contains`.

use crate::grammars::regex::{any_number_of_times, concat, either, lookahead};
use crate::grammars::{BuiltinHook, ContainsEntry, Hook, RawMode, RawPattern};

pub const MATCH_NOTHING_RE: &str = r"\b\B";
pub const IDENT_RE: &str = r"[a-zA-Z]\w*";
pub const UNDERSCORE_IDENT_RE: &str = r"[a-zA-Z_]\w*";
pub const NUMBER_RE: &str = r"\b\d+(\.\d+)?";
/// Hex, decimal and scientific notation, with an optional leading `-`
pub const C_NUMBER_RE: &str = r"(-?)(\b0[xX][a-fA-F0-9]+|(\b\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?)";
pub const BINARY_NUMBER_RE: &str = r"\b(0b[01]+)";

const DOCTAGS: &str = "TODO|FIXME|NOTE|BUG|OPTIMIZE|HACK|XXX";

fn pattern(src: &str) -> Option<RawPattern> {
    Some(RawPattern::One(src.to_owned()))
}

pub fn backslash_escape() -> RawMode {
    RawMode {
        begin: pattern(r"\\[\s\S]"),
        relevance: Some(0),
        ..Default::default()
    }
}

fn single_line_string(delimiter: &str) -> RawMode {
    RawMode {
        scope: Some("string".into()),
        begin: pattern(delimiter),
        end: pattern(delimiter),
        illegal: pattern(r"\n"),
        contains: vec![backslash_escape().into()],
        ..Default::default()
    }
}

/// `'...'` on a single line, with backslash escapes
pub fn apos_string() -> RawMode {
    single_line_string("'")
}

/// `"..."` on a single line, with backslash escapes
pub fn quote_string() -> RawMode {
    single_line_string("\"")
}

/// Looks like a few words of English prose. Comments contain it so that words of a comment
/// don't get mistaken for something else.
fn prose_words() -> RawMode {
    let word = either(&[
        "I",
        "a",
        "is",
        "so",
        "us",
        "to",
        "at",
        "if",
        "in",
        "it",
        "on",
        r"[A-Za-z]+['](d|ve|re|ll|t|s|n)",
        r"[A-Za-z]+[-][a-z]+",
        r"[A-Za-z][a-z]{2,}",
    ]);
    RawMode {
        begin: pattern(&concat(&["[ ]+(", &word, r"[.]?[:]?([.][ ]|[ ])){3}"])),
        ..Default::default()
    }
}

/// A comment between `begin` and `end`, highlighting doc tags like `TODO:` inside.
///
/// `extra` is merged on top of the comment mode: its fields win when set.
pub fn comment(begin: &str, end: &str, extra: RawMode) -> RawMode {
    let base = RawMode {
        scope: Some("comment".into()),
        begin: pattern(begin),
        end: pattern(end),
        ..Default::default()
    };
    let mut mode = base.merged_with(&extra);
    mode.contains.push(
        RawMode {
            scope: Some("doctag".into()),
            begin: pattern(&concat(&["[ ]*", &lookahead(&format!("({DOCTAGS}):"))])),
            end: pattern(&format!("({DOCTAGS}):")),
            exclude_begin: true,
            relevance: Some(0),
            ..Default::default()
        }
        .into(),
    );
    mode.contains.push(prose_words().into());
    mode
}

/// `// ...`
pub fn c_line_comment() -> RawMode {
    comment("//", "$", RawMode::default())
}

/// `/* ... */`
pub fn c_block_comment() -> RawMode {
    comment(r"/\*", r"\*/", RawMode::default())
}

/// `# ...`
pub fn hash_comment() -> RawMode {
    comment("#", "$", RawMode::default())
}

fn number_mode(re: &str) -> RawMode {
    RawMode {
        scope: Some("number".into()),
        begin: pattern(re),
        relevance: Some(0),
        ..Default::default()
    }
}

pub fn number() -> RawMode {
    number_mode(NUMBER_RE)
}

pub fn c_number() -> RawMode {
    number_mode(C_NUMBER_RE)
}

pub fn binary_number() -> RawMode {
    number_mode(BINARY_NUMBER_RE)
}

/// A regex literal, only when it looks like one: `/.../flags` on a single line
pub fn regexp() -> RawMode {
    RawMode {
        scope: Some("regexp".into()),
        begin: pattern(r"/(?=[^/\n]*/)"),
        end: pattern("/[gimuy]*"),
        contains: vec![
            backslash_escape().into(),
            RawMode {
                begin: pattern(r"\["),
                end: pattern(r"\]"),
                relevance: Some(0),
                contains: vec![backslash_escape().into()],
                ..Default::default()
            }
            .into(),
        ],
        ..Default::default()
    }
}

pub fn title() -> RawMode {
    RawMode {
        scope: Some("title".into()),
        begin: pattern(IDENT_RE),
        relevance: Some(0),
        ..Default::default()
    }
}

pub fn underscore_title() -> RawMode {
    RawMode {
        scope: Some("title".into()),
        begin: pattern(UNDERSCORE_IDENT_RE),
        relevance: Some(0),
        ..Default::default()
    }
}

/// Swallows `.method` so that method names are not taken for keywords
pub fn method_guard() -> RawMode {
    RawMode {
        begin: pattern(r"\.\s*[a-zA-Z_]\w*"),
        relevance: Some(0),
        ..Default::default()
    }
}

/// A `#!` line, only at the very start of the text. With `binary`, only when the
/// interpreter path contains it, eg `"(bash|sh)"`.
pub fn shebang(binary: Option<&str>) -> RawMode {
    let start = r"^#![ ]*/";
    let begin = match binary {
        Some(binary) => concat(&[start, r".*\b", binary, r"\b.*"]),
        None => start.to_owned(),
    };
    RawMode {
        scope: Some("meta".into()),
        begin: pattern(&begin),
        end: pattern("$"),
        relevance: Some(0),
        on_begin: Some(Hook::Builtin(BuiltinHook::StartOfInput)),
        ..Default::default()
    }
}

/// Makes the mode end only on an end match whose first group is the same as the one of
/// its begin match, eg for heredocs
pub fn end_same_as_begin(mode: RawMode) -> RawMode {
    RawMode {
        on_begin: Some(BuiltinHook::CaptureBeginMatch.into()),
        on_end: Some(BuiltinHook::EndSameAsBegin.into()),
        ..mode
    }
}

/// Convenience to repeat a mode source, eg `a(, a)*`
pub fn comma_separated(re: &str) -> String {
    concat(&[re, &any_number_of_times(&concat(&[r",\s*", re]))])
}

/// Turns a list of modes into `contains` entries
pub fn contains(modes: impl IntoIterator<Item = RawMode>) -> Vec<ContainsEntry> {
    modes.into_iter().map(ContainsEntry::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammars::RawGrammar;
    use crate::options::ScanOptions;
    use crate::registry::Registry;
    use crate::renderers::html::HtmlRenderer;

    fn scan(raw: RawGrammar, text: &str) -> String {
        let registry = Registry::default();
        registry.register("test", raw).unwrap();
        let res = registry.scan(text, &ScanOptions::new("test").lenient(false)).unwrap();
        HtmlRenderer::default().render(&res.tree)
    }

    fn grammar(modes: Vec<RawMode>) -> RawGrammar {
        let mut raw = RawGrammar::default();
        raw.mode.contains = contains(modes);
        raw
    }

    #[test]
    fn comments_and_doctags() {
        let raw = grammar(vec![c_line_comment(), c_block_comment()]);
        insta::assert_snapshot!(
            scan(raw, "x // TODO: fix\n/* a */"),
            @r#"x <span class="hljs-comment">// <span class="hljs-doctag">TODO:</span> fix</span>
<span class="hljs-comment">/* a */</span>"#
        );
    }

    #[test]
    fn strings_with_escapes() {
        let raw = grammar(vec![quote_string(), apos_string()]);
        insta::assert_snapshot!(
            scan(raw, r#""a\"b" 'c'"#),
            @r#"<span class="hljs-string">&quot;a\&quot;b&quot;</span> <span class="hljs-string">&#x27;c&#x27;</span>"#
        );
    }

    #[test]
    fn numbers() {
        let raw = grammar(vec![binary_number(), c_number()]);
        insta::assert_snapshot!(
            scan(raw, "0b101 0xFF 1.5e3"),
            @r#"<span class="hljs-number">0b101</span> <span class="hljs-number">0xFF</span> <span class="hljs-number">1.5e3</span>"#
        );
    }

    #[test]
    fn shebang_only_at_start() {
        let raw = grammar(vec![shebang(Some("(bash|sh)"))]);
        insta::assert_snapshot!(
            scan(raw.clone(), "#!/bin/sh\n#!/bin/sh"),
            @r#"<span class="hljs-meta">#!/bin/sh</span>
#!/bin/sh"#
        );
        insta::assert_snapshot!(scan(raw, "#!/usr/bin/python"), @"#!/usr/bin/python");
    }

    #[test]
    fn heredoc_with_end_same_as_begin() {
        let heredoc = end_same_as_begin(RawMode {
            scope: Some("string".into()),
            begin: pattern(r"<<(\w+)"),
            end: pattern(r"^(\w+)$"),
            ..Default::default()
        });
        let raw = grammar(vec![heredoc]);
        insta::assert_snapshot!(
            scan(raw, "<<A\nB\nA\nc"),
            @r#"<span class="hljs-string">&lt;&lt;A
B
A</span>
c"#
        );
    }

    #[test]
    fn regexp_literal() {
        let raw = grammar(vec![regexp()]);
        insta::assert_snapshot!(
            scan(raw, "x = /a[/]b/gi;"),
            @r#"x = <span class="hljs-regexp">/a[/]b/gi</span>;"#
        );
    }

    #[test]
    fn helpers() {
        assert_eq!(comma_separated(r"\d"), r"\d(?:,\s*\d)*");
        let guarded = RawMode {
            keywords: Some("return".into()),
            contains: contains([method_guard()]),
            ..Default::default()
        };
        let mut raw = RawGrammar::default();
        raw.mode = guarded;
        insta::assert_snapshot!(
            scan(raw, "return x.return"),
            @r#"<span class="hljs-keyword">return</span> x.return"#
        );
    }
}
