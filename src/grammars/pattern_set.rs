use std::fmt::{Debug, Formatter};

use onig::Region;

use crate::grammars::ModeId;
use crate::grammars::regex::{Regex, RegexFlags};

/// What a fragment of a mode matcher stands for
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchRule {
    /// The begin pattern of a child mode
    Begin(ModeId),
    /// The end terminator of the current mode, including the inherited ones
    End,
    /// The illegal pattern of the current mode
    Illegal,
}

/// Result of joining fragments with [`compose`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub source: String,
    /// Index of the group wrapping each fragment in the combined source
    pub wrapper_groups: Vec<usize>,
    /// Number of groups each fragment declares itself
    pub group_counts: Vec<usize>,
}

/// Finds the end (exclusive) of a bracket class starting at `start`.
/// Everything inside is copied verbatim: escapes and parens are literal in there.
fn class_end(src: &str, start: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b']' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Whether the `(` at the start of `rest` opens a capture group.
/// `(?:`, lookarounds and inline options don't, named groups do.
fn is_capturing_open(rest: &str) -> bool {
    let Some(after) = rest.strip_prefix("(?") else {
        return true;
    };
    if after.starts_with("<=") || after.starts_with("<!") {
        return false;
    }
    after.starts_with('<') || after.starts_with('\'') || after.starts_with("P<")
}

fn write_backreference(out: &mut String, group: usize) {
    // `\10` and above are ambiguous with octal escapes in oniguruma
    if group <= 9 {
        out.push('\\');
        out.push_str(&group.to_string());
    } else {
        out.push_str(&format!("\\k<{group}>"));
    }
}

/// Reads a numbered backreference, `\3` or `\k<3>`, at the start of `src`.
/// Gives back the group number and the length of the backreference.
fn backreference_at(src: &str) -> Option<(usize, usize)> {
    let rest = src.strip_prefix('\\')?;
    let (digits, len) = if let Some(named) = rest.strip_prefix("k<") {
        let digits = &named[..named.find('>')?];
        (digits, 4 + digits.len())
    } else {
        let count = rest.bytes().take_while(u8::is_ascii_digit).count();
        (&rest[..count], 1 + count)
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('0')
    {
        return None;
    }
    // a number too large for a group is copied as is for the regex engine to reject
    Some((digits.parse().ok()?, len))
}

/// Walks a regex source once, shifting every numbered backreference by `offset` and
/// counting the capture groups it opens.
fn rewrite_fragment(src: &str, offset: usize) -> (String, usize) {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len() + 4);
    let mut groups = 0;
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                if let Some(end) = class_end(src, i) {
                    i = end;
                } else {
                    i += 1;
                }
            }
            b'\\' => {
                if let Some((number, len)) = backreference_at(&src[i..]) {
                    out.push_str(&src[last..i]);
                    write_backreference(&mut out, number + offset);
                    i += len;
                    last = i;
                } else {
                    let escaped_len = src[i + 1..].chars().next().map_or(0, char::len_utf8);
                    i += 1 + escaped_len;
                }
            }
            b'(' => {
                if is_capturing_open(&src[i..]) {
                    groups += 1;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    out.push_str(&src[last.min(src.len())..]);

    (out, groups)
}

/// Counts the capture groups declared by a regex source
pub fn count_groups(src: &str) -> usize {
    rewrite_fragment(src, 0).1
}

/// Joins the fragments into a single regex source, each wrapped in its own capture group.
///
/// Backreferences inside a fragment are shifted so they keep pointing at the groups of
/// that same fragment once everything is combined.
pub fn compose(fragments: &[&str], join_with: &str) -> Composed {
    let mut seen_groups = 0;
    let mut wrapper_groups = Vec::with_capacity(fragments.len());
    let mut group_counts = Vec::with_capacity(fragments.len());
    let mut parts = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        seen_groups += 1;
        let wrapper = seen_groups;
        let (body, groups) = rewrite_fragment(fragment, wrapper);
        seen_groups += groups;
        wrapper_groups.push(wrapper);
        group_counts.push(groups);
        parts.push(format!("({body})"));
    }

    Composed {
        source: parts.join(join_with),
        wrapper_groups,
        group_counts,
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PatternSetMatch {
    pub rule: MatchRule,
    pub start: usize,
    pub end: usize,
    /// Captures numbered like in the original fragment: 0 is the whole match
    pub capture_pos: Vec<Option<(usize, usize)>>,
}

impl PatternSetMatch {
    pub fn capture<'t>(&self, text: &'t str, index: usize) -> Option<&'t str> {
        self.capture_pos
            .get(index)
            .copied()
            .flatten()
            .map(|(s, e)| &text[s..e])
    }
}

/// All the fragments of a mode compiled as one alternation
pub struct PatternSet {
    rules: Vec<MatchRule>,
    composed: Composed,
    regex: Option<Regex>,
}

impl PatternSet {
    pub fn new(items: Vec<(MatchRule, String)>, flags: RegexFlags) -> Result<Self, String> {
        let (rules, patterns): (Vec<_>, Vec<_>) = items.into_iter().unzip();
        let pattern_strs: Vec<&str> = patterns.iter().map(|s| s.as_str()).collect();
        let composed = compose(&pattern_strs, "|");

        if rules.is_empty() {
            return Ok(Self {
                rules,
                composed,
                regex: None,
            });
        }

        let regex = Regex::new(&composed.source, flags).map_err(|e| {
            format!(
                "Failed to compile pattern set with {} patterns: {:?}",
                pattern_strs.len(),
                e
            )
        })?;

        Ok(Self {
            rules,
            composed,
            regex: Some(regex),
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn source(&self) -> &str {
        &self.composed.source
    }

    /// Finds the leftmost match at or after `pos`. On ties the fragment declared first wins.
    pub(crate) fn find_at(&self, text: &str, pos: usize) -> Option<PatternSetMatch> {
        let regex = self.regex.as_ref()?;
        let mut region = Region::new();
        regex.search_region(text, pos, &mut region)?;
        let (start, end) = region.pos(0)?;

        // The top level alternatives are exclusive so the only populated wrapper
        // tells us which fragment fired
        let fragment = self
            .composed
            .wrapper_groups
            .iter()
            .position(|&group| region.pos(group).is_some())?;
        let wrapper = self.composed.wrapper_groups[fragment];

        let mut capture_pos = Vec::with_capacity(self.composed.group_counts[fragment] + 1);
        capture_pos.push(Some((start, end)));
        for i in 1..=self.composed.group_counts[fragment] {
            capture_pos.push(region.pos(wrapper + i));
        }

        Some(PatternSetMatch {
            rule: self.rules[fragment],
            start,
            end,
            capture_pos,
        })
    }
}

impl Debug for PatternSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PatternSet({} rules)", self.rules.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(patterns: &[&str]) -> PatternSet {
        let items = patterns
            .iter()
            .enumerate()
            .map(|(i, p)| (MatchRule::Begin(ModeId(i as u16)), p.to_string()))
            .collect();
        PatternSet::new(items, RegexFlags::default()).unwrap()
    }

    #[test]
    fn counts_only_capturing_groups() {
        assert_eq!(count_groups("a(b)(?:c)(?=d)(?<=e)(?<!f)"), 1);
        assert_eq!(count_groups(r"(?<name>a)(b)"), 2);
        assert_eq!(count_groups(r"\(not a group\)"), 0);
        assert_eq!(count_groups(r"[(](x)"), 1);
    }

    #[test]
    fn renumbers_backreferences() {
        let composed = compose(&[r"(a)\1", r#"(['"])x\1"#, "b"], "|");
        assert_eq!(composed.source, r#"((a)\2)|((['"])x\4)|(b)"#);
        assert_eq!(composed.wrapper_groups, vec![1, 3, 5]);
        assert_eq!(composed.group_counts, vec![1, 1, 0]);
    }

    #[test]
    fn does_not_touch_classes_or_escapes() {
        let composed = compose(&[r"[\1(]", r"\\1", r"\01"], "|");
        assert_eq!(composed.source, r"([\1(])|(\\1)|(\01)");
    }

    #[test]
    fn large_group_numbers_use_named_syntax() {
        let many = "(a)(a)(a)(a)(a)(a)(a)(a)(a)";
        let composed = compose(&[many, r"(b)\1"], "|");
        assert!(composed.source.ends_with(r"((b)\k<12>)"));
    }

    #[test]
    fn renumbers_named_syntax_and_keeps_oversized_numbers() {
        let composed = compose(&[r"(a)\k<1>", r"(b)\k<1>\k<x>", r"\99999999999999999999999"], "|");
        insta::assert_snapshot!(composed.source, @r"((a)\2)|((b)\4\k<x>)|(\99999999999999999999999)");
    }

    #[test]
    fn identifies_fragment_and_strips_wrappers() {
        let set = set(&[r"(x)(y)", r#"(['"])(.*?)\1"#, r"\d+"]);
        let text = "  'hi' 42";
        let m = set.find_at(text, 0).unwrap();
        assert_eq!(m.rule, MatchRule::Begin(ModeId(1)));
        assert_eq!((m.start, m.end), (2, 6));
        assert_eq!(m.capture(text, 1), Some("'"));
        assert_eq!(m.capture(text, 2), Some("hi"));
        assert_eq!(m.capture_pos.len(), 3);

        let m = set.find_at(text, 6).unwrap();
        assert_eq!(m.rule, MatchRule::Begin(ModeId(2)));
        assert_eq!(m.capture(text, 0), Some("42"));
    }

    #[test]
    fn earlier_fragment_wins_at_same_position() {
        let set = set(&["ab", "abc"]);
        let m = set.find_at("abc", 0).unwrap();
        assert_eq!(m.rule, MatchRule::Begin(ModeId(0)));
        assert_eq!(m.end, 2);
    }

    #[test]
    fn combined_match_equals_standalone_match() {
        let fragments = [r"(\w)\1", r#"(["'])(?:\\.|(?!\1).)*\1"#, r"<(\w+)>.*?</\1>"];
        let texts = ["a bb c", r#"x "it's" y"#, "<b>x</b>", "'q' <i>y</i> zz"];
        let composed = set(&fragments);
        for text in texts {
            let Some(m) = composed.find_at(text, 0) else {
                continue;
            };
            let MatchRule::Begin(ModeId(idx)) = m.rule else {
                unreachable!()
            };
            let alone = Regex::new(fragments[idx as usize], RegexFlags::default()).unwrap();
            assert_eq!(alone.find_at(text, m.start), Some((m.start, m.end)));
        }
    }

    #[test]
    fn empty_set_never_matches() {
        let set = PatternSet::new(vec![], RegexFlags::default()).unwrap();
        assert!(set.is_empty());
        assert!(set.find_at("anything", 0).is_none());
    }
}
