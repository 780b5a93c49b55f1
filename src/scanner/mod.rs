use std::collections::HashMap;
use std::mem;

use serde::Serialize;

use crate::detect::detect;
use crate::error::{AmbraResult, Error};
use crate::grammars::{
    Grammar, HookData, HookMatch, MatchOutcome, MatchRule, ModeId, PatternSetMatch, ScopeEmit,
    SubLanguage,
};
use crate::options::{ScanLimits, ScanOptions};
use crate::registry::Registry;
use crate::tree::{TokenTree, TreeBuilder};

mod stack;

pub use stack::{Frame, ModeStack};

/// How many characters of the input to keep on each side of a failure
const CONTEXT_CHARS: usize = 100;

/// Where and why a scan gave up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    /// Byte offset in the input
    pub index: usize,
    /// The input around `index`
    pub context: String,
    /// The mode active when an illegal lexeme was found
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// The name of the grammar used
    pub language: String,
    pub relevance: u32,
    pub tree: TokenTree,
    /// An illegal lexeme was found: the tree only has the text
    pub illegal: bool,
    /// The scanner failed for another reason: the tree only has the text
    pub error_raised: bool,
    pub diagnostic: Option<Diagnostic>,
    /// Only set by auto-detection
    pub second_best: Option<Box<ScanResult>>,
}

impl ScanResult {
    /// A result with the text as a single unscoped leaf
    pub(crate) fn plain(language: &str, text: &str) -> Self {
        let mut builder = TreeBuilder::default();
        builder.add_text(text);
        Self {
            language: language.to_owned(),
            relevance: 0,
            tree: builder.finish(),
            illegal: false,
            error_raised: false,
            diagnostic: None,
            second_best: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct ScanConfig {
    pub lenient: bool,
    pub ignore_illegals: bool,
    pub limits: ScanLimits,
}

impl From<&ScanOptions<'_>> for ScanConfig {
    fn from(options: &ScanOptions<'_>) -> Self {
        Self {
            lenient: options.lenient,
            ignore_illegals: options.ignore_illegals,
            limits: options.limits,
        }
    }
}

/// A scan result along with the mode stack it ended with, which a later scan of the
/// same embedded grammar can continue from
#[derive(Debug)]
pub(crate) struct Scanned {
    pub result: ScanResult,
    pub top: Option<ModeStack>,
}

/// What to do after handling a lexeme
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Advance(usize),
    Finish,
}

/// The text around `index`, cut on char boundaries
fn context_around(text: &str, index: usize) -> String {
    let start = text[..index]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS - 1)
        .map_or(0, |(i, _)| i);
    let end = text[index..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map_or(text.len(), |(i, _)| index + i);
    text[start..end].to_owned()
}

struct Scanner<'r> {
    registry: &'r Registry,
    grammar: &'r Grammar,
    text: &'r str,
    config: ScanConfig,
    stack: ModeStack,
    /// Text seen since the last emission, not scoped yet
    buffer: String,
    relevance: u32,
    /// Occurrences of each keyword, to cap how much a single one counts
    keyword_hits: HashMap<String, u32>,
    tree: TreeBuilder,
    iterations: usize,
    /// Rule and position of the last match acted upon
    last_match: Option<(MatchRule, usize)>,
    /// Mode stacks of named sublanguages, to resume them in the next span
    continuations: HashMap<String, ModeStack>,
    /// Where the next search starts
    index: usize,
}

impl<'r> Scanner<'r> {
    fn new(
        registry: &'r Registry,
        grammar: &'r Grammar,
        text: &'r str,
        config: ScanConfig,
        continuation: Option<ModeStack>,
    ) -> Self {
        let mut tree = TreeBuilder::default();
        let stack = continuation.unwrap_or_default();
        // reopen the scopes we were in
        for frame in stack.nested() {
            if let Some(scope) = &grammar.mode(frame.mode).scope {
                tree.open_node(grammar.resolve_scope(scope));
            }
        }

        Self {
            registry,
            grammar,
            text,
            config,
            stack,
            buffer: String::new(),
            relevance: 0,
            keyword_hits: HashMap::new(),
            tree,
            iterations: 0,
            last_match: None,
            continuations: HashMap::new(),
            index: 0,
        }
    }

    fn next_char_len(&self, at: usize) -> Option<usize> {
        self.text[at..].chars().next().map(char::len_utf8)
    }

    /// Consumes one char as text, for matches that would not make progress otherwise
    fn consume_one_char(&mut self, at: usize) -> Step {
        match self.next_char_len(at) {
            Some(len) => {
                self.buffer.push_str(&self.text[at..at + len]);
                Step::Advance(len)
            }
            None => Step::Finish,
        }
    }

    fn run(&mut self) -> AmbraResult<()> {
        let grammar = self.grammar;
        let text = self.text;

        loop {
            self.iterations += 1;
            let matcher = grammar.matcher(self.stack.top().mode)?;
            let Some(m) = matcher.find_at(text, self.index) else {
                break;
            };

            #[cfg(feature = "debug")]
            log::trace!(
                "[run] {:?} matched {:?} at {} in {:?}",
                m.rule,
                &text[m.start..m.end],
                m.start,
                self.stack
            );

            // Checked on every match, cycles of empty begins loop too
            let limits = self.config.limits;
            if self.iterations > limits.loop_iteration_bound
                && self.iterations > limits.loop_ratio * m.start
            {
                return Err(Error::InfiniteLoop {
                    grammar: grammar.name.clone(),
                    index: m.start,
                });
            }

            match self.process_lexeme(&text[self.index..m.start], &m)? {
                Step::Advance(n) => self.index = m.start + n,
                Step::Finish => {
                    self.index = text.len();
                    break;
                }
            }
        }

        self.buffer.push_str(&text[self.index..]);
        self.index = text.len();
        self.process_buffer()
    }

    fn process_lexeme(&mut self, before: &str, m: &PatternSetMatch) -> AmbraResult<Step> {
        let text = self.text;
        let lexeme = &text[m.start..m.end];
        self.buffer.push_str(before);

        // A begin matched nothing and the mode ends right away at the same position, or the
        // same begin fires again without anything consumed in between.
        // Go forward by hand or we would loop forever.
        let ends_right_away = m.rule == MatchRule::End
            && lexeme.is_empty()
            && matches!(self.last_match, Some((MatchRule::Begin(_), index)) if index == m.start);
        let begins_again = matches!(m.rule, MatchRule::Begin(_))
            && self.last_match == Some((m.rule, m.start));
        if ends_right_away || begins_again {
            if !self.config.lenient {
                return Err(Error::ZeroWidthMatch {
                    grammar: self.grammar.name.clone(),
                    index: m.start,
                });
            }
            return Ok(self.consume_one_char(m.start));
        }
        self.last_match = Some((m.rule, m.start));

        match m.rule {
            MatchRule::Begin(id) => return self.do_begin(id, m),
            MatchRule::Illegal if !self.config.ignore_illegals => {
                return Err(Error::IllegalLexeme {
                    grammar: self.grammar.name.clone(),
                    lexeme: lexeme.to_owned(),
                    mode: self
                        .grammar
                        .mode(self.stack.top().mode)
                        .display_name()
                        .to_owned(),
                    index: m.start,
                });
            }
            MatchRule::End => {
                if let Some(step) = self.do_end(m)? {
                    return Ok(step);
                }
            }
            MatchRule::Illegal => {}
        }

        if m.rule == MatchRule::Illegal && lexeme.is_empty() {
            return Ok(self.consume_one_char(m.start));
        }

        // Only reached by ignored end matches and illegal lexemes being ignored
        self.buffer.push_str(lexeme);
        Ok(Step::Advance(lexeme.len()))
    }

    fn do_begin(&mut self, id: ModeId, m: &PatternSetMatch) -> AmbraResult<Step> {
        let text = self.text;
        let mode = self.grammar.mode(id);
        let lexeme = &text[m.start..m.end];
        let hook_match = HookMatch::new(text, m.start, &m.capture_pos);
        let mut data = HookData::default();

        for hook in [&mode.before_begin, &mode.on_begin].into_iter().flatten() {
            if hook.run(&hook_match, &mut data) == MatchOutcome::Ignore {
                #[cfg(feature = "debug")]
                log::debug!("[do_begin] begin of mode {} ignored by hook", *id);
                if lexeme.is_empty() {
                    return Ok(self.consume_one_char(m.start));
                }
                self.buffer.push_str(lexeme);
                return Ok(Step::Advance(lexeme.len()));
            }
        }

        let flags = mode.flags;
        if flags.skip {
            self.buffer.push_str(lexeme);
        } else {
            if flags.exclude_begin {
                self.buffer.push_str(lexeme);
            }
            self.process_buffer()?;
            if !flags.return_begin && !flags.exclude_begin {
                self.buffer = lexeme.to_owned();
            }
        }

        self.start_mode(id, m, data)?;
        Ok(Step::Advance(if flags.return_begin { 0 } else { lexeme.len() }))
    }

    fn start_mode(&mut self, id: ModeId, m: &PatternSetMatch, data: HookData) -> AmbraResult<()> {
        let grammar = self.grammar;
        let mode = grammar.mode(id);
        if let Some(scope) = &mode.scope {
            self.tree.open_node(grammar.resolve_scope(scope));
        }
        match &mode.begin_scope {
            Some(ScopeEmit::Wrap(scope)) => {
                let buffer = mem::take(&mut self.buffer);
                self.tree.add_keyword(&buffer, grammar.resolve_scope(scope));
            }
            Some(ScopeEmit::Multi(groups)) => {
                self.emit_multi(groups, m);
                self.buffer.clear();
            }
            None => {}
        }

        #[cfg(feature = "debug")]
        log::debug!("[start_mode] pushing mode {} ({})", *id, mode.display_name());
        self.stack.push(id, data);
        Ok(())
    }

    /// Finds which mode ends with this match, starting from the one at `depth` and going
    /// up through the ones ending with their parent. Returns its depth in the stack.
    fn end_of_mode(&mut self, depth: usize, m: &PatternSetMatch) -> Option<usize> {
        let grammar = self.grammar;
        let text = self.text;
        let frame = self.stack.get_mut(depth);
        let mode = grammar.mode(frame.mode);

        let matched = mode
            .end
            .as_ref()
            .is_some_and(|end| end.match_at(text, m.start).is_some());
        if matched {
            let ignored = mode.on_end.as_ref().is_some_and(|hook| {
                hook.run(&HookMatch::new(text, m.start, &m.capture_pos), &mut frame.data)
                    == MatchOutcome::Ignore
            });
            if !ignored {
                let mut depth = depth;
                // the root doesn't end
                while depth > 1 && grammar.mode(self.stack.get(depth).mode).flags.ends_parent {
                    depth -= 1;
                }
                return Some(depth);
            }
        }

        if mode.flags.ends_with_parent && depth > 0 {
            return self.end_of_mode(depth - 1, m);
        }
        None
    }

    fn do_end(&mut self, m: &PatternSetMatch) -> AmbraResult<Option<Step>> {
        let top = self.stack.len() - 1;
        let Some(ended) = self.end_of_mode(top, m) else {
            return Ok(None);
        };

        let grammar = self.grammar;
        let text = self.text;
        let lexeme = &text[m.start..m.end];
        let origin = grammar.mode(self.stack.top().mode);
        let flags = origin.flags;

        match &origin.end_scope {
            Some(ScopeEmit::Wrap(scope)) => {
                self.process_buffer()?;
                self.tree.add_keyword(lexeme, grammar.resolve_scope(scope));
            }
            Some(ScopeEmit::Multi(groups)) => {
                self.process_buffer()?;
                self.emit_multi(groups, m);
            }
            None if flags.skip => self.buffer.push_str(lexeme),
            None => {
                if !flags.return_end && !flags.exclude_end {
                    self.buffer.push_str(lexeme);
                }
                self.process_buffer()?;
                if flags.exclude_end {
                    self.buffer = lexeme.to_owned();
                }
            }
        }

        let ended_mode = self.stack.get(ended).mode;
        while self.stack.len() > ended {
            let Some(frame) = self.stack.pop() else {
                break;
            };
            let mode = grammar.mode(frame.mode);
            if mode.scope.is_some() {
                self.tree.close_node();
            }
            if !mode.flags.skip && mode.sub_language.is_none() {
                self.relevance = self.relevance.saturating_add(mode.relevance);
            }
            #[cfg(feature = "debug")]
            log::debug!("[do_end] popped mode {} ({})", *frame.mode, mode.display_name());
        }

        if let Some(starts) = grammar.mode(ended_mode).starts {
            self.start_mode(starts, m, HookData::default())?;
        }

        Ok(Some(Step::Advance(if flags.return_end { 0 } else { lexeme.len() })))
    }

    /// Emits the groups of a begin/end match with their own scopes. Text between groups
    /// and groups without a scope go through keyword extraction.
    fn emit_multi(&mut self, groups: &[(usize, Option<String>)], m: &PatternSetMatch) {
        let grammar = self.grammar;
        let text = self.text;
        let mut pos = m.start;

        for (group, scope) in groups {
            let Some((start, end)) = m.capture_pos.get(*group).copied().flatten() else {
                continue;
            };
            if start < pos {
                continue;
            }
            self.emit_keywords(&text[pos..start]);
            match scope {
                Some(scope) => self
                    .tree
                    .add_keyword(&text[start..end], grammar.resolve_scope(scope)),
                None => self.emit_keywords(&text[start..end]),
            }
            pos = end;
        }
        self.emit_keywords(&text[pos..m.end]);
    }

    /// Flushes the buffer into the current mode
    fn process_buffer(&mut self) -> AmbraResult<()> {
        let grammar = self.grammar;
        let buffer = mem::take(&mut self.buffer);
        if grammar.mode(self.stack.top().mode).sub_language.is_some() {
            self.process_sub_language(&buffer)
        } else {
            self.emit_keywords(&buffer);
            Ok(())
        }
    }

    fn emit_keywords(&mut self, text: &str) {
        let grammar = self.grammar;
        let Some(keywords) = &grammar.mode(self.stack.top().mode).keywords else {
            self.tree.add_text(text);
            return;
        };

        let mut plain = String::new();
        let mut last = 0;
        let mut pos = 0;
        while pos <= text.len() {
            let Some((start, end)) = keywords.pattern().find_at(text, pos) else {
                break;
            };
            let word = &text[start..end];
            plain.push_str(&text[last..start]);
            let key = if grammar.case_insensitive {
                word.to_lowercase()
            } else {
                word.to_owned()
            };

            if let Some(keyword) = keywords.get(&key) {
                self.tree.add_text(&plain);
                plain.clear();
                let hits = self.keyword_hits.entry(key).or_insert(0);
                *hits += 1;
                if *hits <= self.config.limits.max_keyword_hits {
                    self.relevance = self.relevance.saturating_add(keyword.relevance);
                }
                // `_` classes count but aren't highlighted
                if keyword.class.starts_with('_') {
                    plain.push_str(word);
                } else {
                    self.tree
                        .add_keyword(word, grammar.resolve_scope(&keyword.class));
                }
            } else {
                plain.push_str(word);
            }

            last = end;
            pos = if end > start {
                end
            } else {
                match text[end..].chars().next() {
                    Some(c) => end + c.len_utf8(),
                    None => break,
                }
            };
        }

        plain.push_str(&text[last..]);
        self.tree.add_text(&plain);
    }

    fn process_sub_language(&mut self, text: &str) -> AmbraResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let registry = self.registry;
        let mode = self.grammar.mode(self.stack.top().mode);
        let Some(sub_language) = &mode.sub_language else {
            return Ok(());
        };

        let result = match sub_language {
            SubLanguage::Named(name) => {
                let Some(grammar) = registry.get_grammar(name) else {
                    #[cfg(feature = "debug")]
                    log::warn!("[process_sub_language] unknown sublanguage `{name}`");
                    self.tree.add_text(text);
                    return Ok(());
                };
                let config = ScanConfig {
                    lenient: true,
                    ignore_illegals: true,
                    limits: self.config.limits,
                };
                let continuation = self.continuations.remove(name);
                let scanned = scan_grammar(registry, &grammar, text, config, continuation)?;
                if let Some(top) = scanned.top {
                    self.continuations.insert(name.clone(), top);
                }
                scanned.result
            }
            SubLanguage::Auto(candidates) => {
                detect(registry, text, candidates.as_deref(), self.config.limits)
            }
        };

        if mode.relevance > 0 {
            self.relevance = self.relevance.saturating_add(result.relevance);
        }
        self.tree.add_sublanguage(result.tree, &result.language);
        Ok(())
    }

    fn degraded(&self, error: &Error) -> ScanResult {
        let (index, mode) = match error {
            Error::IllegalLexeme { index, mode, .. } => (*index, Some(mode.clone())),
            _ => (self.index.min(self.text.len()), None),
        };
        let mut result = ScanResult::plain(&self.grammar.name, self.text);
        result.illegal = error.is_illegal();
        result.error_raised = !result.illegal;
        result.diagnostic = Some(Diagnostic {
            message: error.to_string(),
            index,
            context: context_around(self.text, index),
            mode,
        });
        result
    }
}

/// Scans the text with the given grammar, optionally resuming from a previous mode stack.
pub(crate) fn scan_grammar(
    registry: &Registry,
    grammar: &Grammar,
    text: &str,
    config: ScanConfig,
    continuation: Option<ModeStack>,
) -> AmbraResult<Scanned> {
    let mut scanner = Scanner::new(registry, grammar, text, config, continuation);

    match scanner.run() {
        Ok(()) => Ok(Scanned {
            result: ScanResult {
                language: grammar.name.clone(),
                relevance: scanner.relevance,
                tree: scanner.tree.finish(),
                illegal: false,
                error_raised: false,
                diagnostic: None,
                second_best: None,
            },
            top: Some(scanner.stack),
        }),
        Err(err) if config.lenient && err.is_illegal() => {
            #[cfg(feature = "debug")]
            log::debug!("[scan_grammar] {}: {err}", grammar.name);
            Ok(Scanned {
                result: scanner.degraded(&err),
                top: None,
            })
        }
        Err(err) if config.lenient => {
            #[cfg(feature = "debug")]
            log::warn!("[scan_grammar] {}: {err}", grammar.name);
            Ok(Scanned {
                result: scanner.degraded(&err),
                top: Some(scanner.stack),
            })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammars::RawGrammar;
    use crate::renderers::html::HtmlRenderer;
    use crate::tree::{Container, ContainerKind, Node};

    fn registry(grammars: &[(&str, &str)]) -> Registry {
        let registry = Registry::default();
        for (name, json) in grammars {
            registry
                .register(name, RawGrammar::load_from_str(json).unwrap())
                .unwrap();
        }
        registry
    }

    fn scan(registry: &Registry, options: ScanOptions, text: &str) -> AmbraResult<ScanResult> {
        registry.scan(text, &options)
    }

    fn html(result: &ScanResult) -> String {
        HtmlRenderer::default().render(&result.tree)
    }

    fn scope(name: &str, children: Vec<Node>) -> Node {
        Node::Container(Container {
            kind: ContainerKind::Scope(name.to_owned()),
            children,
        })
    }

    fn text(t: &str) -> Node {
        Node::Text(t.to_owned())
    }

    const INI: &str = r##"{
        "contains": [
            {"scope": "comment", "begin": "#", "end": "$"},
            {"scope": "attr", "begin": "[A-Za-z_][A-Za-z0-9_]*(?=\\s*=)"},
            {"scope": "number", "begin": "\\b\\d+\\b"}
        ]
    }"##;

    #[test]
    fn ini_example() {
        let r = registry(&[("ini", INI)]);
        let res = scan(&r, ScanOptions::new("ini"), "# comment\nname = 1").unwrap();
        assert_eq!(
            res.tree.children,
            vec![
                scope("comment", vec![text("# comment")]),
                text("\n"),
                scope("attr", vec![text("name")]),
                text(" = "),
                scope("number", vec![text("1")]),
            ]
        );
        assert_eq!(res.relevance, 3);
        assert!(!res.illegal);
    }

    const STRINGS: &str = r#"{
        "contains": [{"scope": "string", "begin": "\"", "end": "\"", "illegal": "\\n"}]
    }"#;

    #[test]
    fn unterminated_string_is_illegal_in_strict_mode() {
        let r = registry(&[("str", STRINGS)]);
        let err = scan(&r, ScanOptions::new("str").lenient(false), "\"open string\nnext").unwrap_err();
        match err {
            Error::IllegalLexeme {
                lexeme,
                mode,
                index,
                ..
            } => {
                assert_eq!(lexeme, "\n");
                assert_eq!(mode, "string");
                assert_eq!(index, 12);
            }
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn illegal_degrades_to_text_when_lenient() {
        let r = registry(&[("str", STRINGS)]);
        let input = "x = \"open string\nnext <b>";
        let res = scan(&r, ScanOptions::new("str"), input).unwrap();
        assert!(res.illegal);
        assert!(!res.error_raised);
        assert_eq!(res.relevance, 0);
        assert_eq!(res.tree.text(), input);
        assert_eq!(res.tree.children.len(), 1);
        let diagnostic = res.diagnostic.unwrap();
        assert_eq!(diagnostic.index, 16);
        assert_eq!(diagnostic.context, input);
        assert_eq!(diagnostic.mode.as_deref(), Some("string"));
        assert_eq!(diagnostic.message, "Illegal lexeme \"\n\" for mode \"string\"");
    }

    #[test]
    fn ignore_illegals_keeps_scanning() {
        let r = registry(&[("str", STRINGS)]);
        let res = scan(&r, ScanOptions::new("str").ignore_illegals(true), "\"a\nb\"").unwrap();
        assert!(!res.illegal);
        assert_eq!(res.tree.children, vec![scope("string", vec![text("\"a\nb\"")])]);
    }

    const PARENS: &str = r#"{
        "contains": [{"scope": "paren", "begin": "\\(", "end": "\\)", "contains": ["self"]}]
    }"#;

    #[test]
    fn balanced_nesting() {
        let r = registry(&[("parens", PARENS)]);
        let res = scan(&r, ScanOptions::new("parens"), "(a(b)c)").unwrap();
        assert_eq!(
            res.tree.children,
            vec![scope(
                "paren",
                vec![text("(a"), scope("paren", vec![text("(b)")]), text("c)")]
            )]
        );
        assert_eq!(res.relevance, 2);
    }

    #[test]
    fn unclosed_modes_are_closed_at_the_end() {
        let r = registry(&[("parens", PARENS)]);
        let res = scan(&r, ScanOptions::new("parens"), "((a").unwrap();
        assert_eq!(
            res.tree.children,
            vec![scope("paren", vec![text("("), scope("paren", vec![text("(a")])])]
        );
        // unclosed modes don't count
        assert_eq!(res.relevance, 0);
    }

    #[test]
    fn keyword_relevance_is_capped() {
        let r = registry(&[("kw", r#"{"keywords": "foo bar"}"#)]);
        let input = ["foo"; 10].join(" ");
        let res = scan(&r, ScanOptions::new("kw"), &input).unwrap();
        assert_eq!(res.relevance, 7);
        let keyword_nodes = res
            .tree
            .children
            .iter()
            .filter(|n| matches!(n, Node::Container(_)))
            .count();
        assert_eq!(keyword_nodes, 10);

        let res = scan(&r, ScanOptions::new("kw"), "foo bar foo baz").unwrap();
        assert_eq!(res.relevance, 3);
    }

    #[test]
    fn keyword_classes_aliases_and_private_classes() {
        let r = registry(&[(
            "kw",
            r#"{
                "case_insensitive": true,
                "classNameAliases": {"built_in": "title.builtin"},
                "keywords": {"keyword": "select from", "built_in": "count", "_hidden": "where|5"}
            }"#,
        )]);
        let res = scan(&r, ScanOptions::new("kw"), "SELECT count(*) FROM t WHERE x").unwrap();
        assert_eq!(res.relevance, 1 + 1 + 1 + 5);
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-keyword">SELECT</span> <span class="hljs-title builtin_">count</span>(*) <span class="hljs-keyword">FROM</span> t WHERE x"#);
    }

    #[test]
    fn custom_keyword_pattern() {
        let r = registry(&[(
            "kw",
            r#"{"keywords": {"$pattern": "[a-z]+!", "keyword": "println! vec!"}}"#,
        )]);
        let res = scan(&r, ScanOptions::new("kw"), "println!(vec!)").unwrap();
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-keyword">println!</span>(<span class="hljs-keyword">vec!</span>)"#);
    }

    #[test]
    fn begin_keywords_ignore_member_access() {
        let r = registry(&[(
            "c",
            r#"{"contains": [{"scope": "class", "beginKeywords": "class", "end": "\\{", "excludeEnd": true, "contains": [{"scope": "title", "begin": "\\w+", "relevance": 0}]}]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("c"), "class A { x.class }").unwrap();
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-class"><span class="hljs-keyword">class</span> <span class="hljs-title">A</span> </span>{ x.class }"#);
    }

    #[test]
    fn exclude_and_return_flags() {
        let r = registry(&[(
            "flags",
            r#"{"contains": [
                {"scope": "string", "begin": "<", "end": ">", "excludeBegin": true, "excludeEnd": true},
                {"scope": "tag", "begin": "(?=@)", "returnBegin": true, "end": "\\s", "returnEnd": true,
                 "contains": [{"scope": "name", "begin": "@\\w+"}]}
            ]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("flags"), "<abc> @tag x").unwrap();
        insta::assert_snapshot!(html(&res), @r#"&lt;<span class="hljs-string">abc</span>&gt; <span class="hljs-tag"><span class="hljs-name">@tag</span></span> x"#);
    }

    #[test]
    fn ends_with_parent_and_ends_parent() {
        let r = registry(&[(
            "css",
            r#"{"contains": [{"scope": "rule", "begin": "\\{", "end": "\\}", "contains": [
                {"scope": "value", "begin": ":", "end": ";", "endsWithParent": true, "excludeEnd": true}
            ]}]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("css"), "{a: 1; b: 2}").unwrap();
        // the excluded end goes to the parent's parent
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-rule">{a<span class="hljs-value">: 1</span>; b<span class="hljs-value">: 2</span></span>}"#);

        let r = registry(&[(
            "call",
            r#"{"contains": [{"scope": "call", "begin": "\\w+\\(", "end": "\\)", "contains": [
                {"scope": "stop", "begin": "!", "endsParent": true}
            ]}]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("call"), "f(a!b)").unwrap();
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-call">f(a<span class="hljs-stop">!</span></span>b)"#);
    }

    #[test]
    fn starts_chains_modes() {
        let r = registry(&[(
            "pp",
            r##"{"contains": [{"scope": "meta", "begin": "#\\w+", "starts": {"scope": "string", "end": "$"}}]}"##,
        )]);
        let res = scan(&r, ScanOptions::new("pp"), "#include <x>\nint").unwrap();
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-meta">#include</span><span class="hljs-string"> &lt;x&gt;</span>
int"#);
    }

    #[test]
    fn multi_scope_begin() {
        let r = registry(&[(
            "fn",
            r#"{"keywords": "pub", "contains": [{
                "begin": ["fn", "\\s+", "[a-z_]+"],
                "beginScope": {"1": "keyword", "3": "title.function"}
            }]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("fn"), "pub fn main()").unwrap();
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-keyword">pub</span> <span class="hljs-keyword">fn</span> <span class="hljs-title function_">main</span>()"#);
    }

    #[test]
    fn wrap_scopes() {
        let r = registry(&[(
            "tpl",
            r#"{"contains": [{"scope": "template", "begin": "\\{\\{", "end": "\\}\\}",
                "beginScope": "punctuation", "endScope": "punctuation"}]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("tpl"), "a {{ x }} b").unwrap();
        insta::assert_snapshot!(html(&res), @r#"a <span class="hljs-template"><span class="hljs-punctuation">{{</span> x <span class="hljs-punctuation">}}</span></span> b"#);
    }

    #[test]
    fn skip_mode_text_goes_to_parent() {
        let r = registry(&[(
            "skip",
            r#"{"contains": [{"scope": "string", "begin": "'", "end": "'", "contains": [
                {"begin": "\\\\.", "skip": true}
            ]}]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("skip"), r"'a\'b'").unwrap();
        assert_eq!(res.tree.children, vec![scope("string", vec![text(r"'a\'b'")])]);
    }

    #[test]
    fn end_same_as_begin_hooks() {
        let r = registry(&[(
            "heredoc",
            r#"{"contains": [{"scope": "string", "begin": "<<(\\w+)", "end": "^(\\w+)$",
                "on:begin": "captureBeginMatch", "on:end": "endSameAsBegin"}]}"#,
        )]);
        let input = "<<EOF\nEND\nEOF\nafter";
        let res = scan(&r, ScanOptions::new("heredoc"), input).unwrap();
        assert_eq!(
            res.tree.children,
            vec![scope("string", vec![text("<<EOF\nEND\nEOF")]), text("\nafter")]
        );
    }

    #[test]
    fn start_of_input_hook() {
        let r = registry(&[(
            "sh",
            r#"{"contains": [{"scope": "meta", "begin": "^#!", "end": "$", "on:begin": "startOfInput"}]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("sh"), "#!/bin/sh\n#!x").unwrap();
        assert_eq!(
            res.tree.children,
            vec![scope("meta", vec![text("#!/bin/sh")]), text("\n#!x")]
        );
    }

    #[test]
    fn zero_width_collision() {
        let json = r#"{"contains": [{"scope": "empty", "begin": "(?=x)"}]}"#;
        let r = registry(&[("zw", json)]);
        let res = scan(&r, ScanOptions::new("zw"), "axb").unwrap();
        assert_eq!(res.tree.text(), "axb");
        assert!(!res.error_raised);

        let err = scan(&r, ScanOptions::new("zw").lenient(false), "axb").unwrap_err();
        assert!(matches!(err, Error::ZeroWidthMatch { index: 1, .. }));
    }

    #[test]
    fn infinite_loop_is_detected() {
        let json = r#"{"contains": [{"begin": "a", "end": "(?=b)", "on:end": "endSameAsBegin"}]}"#;
        let r = registry(&[("loop", json)]);
        let limits = ScanLimits {
            loop_iteration_bound: 50,
            ..Default::default()
        };
        let err = scan(&r, ScanOptions::new("loop").lenient(false).limits(limits), "ab").unwrap_err();
        assert!(matches!(err, Error::InfiniteLoop { index: 1, .. }));

        let res = scan(&r, ScanOptions::new("loop").limits(limits), "ab").unwrap();
        assert!(res.error_raised);
        assert!(!res.illegal);
        assert_eq!(res.tree.text(), "ab");
    }

    #[test]
    fn self_recursive_empty_begin_makes_progress() {
        let json = r#"{"contains": [{"scope": "x", "begin": "(?=a)", "end": "b", "contains": ["self"]}]}"#;
        let r = registry(&[("rec", json)]);
        let res = scan(&r, ScanOptions::new("rec"), "a").unwrap();
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-x">a</span>"#);
        assert!(!res.error_raised);

        let err = scan(&r, ScanOptions::new("rec").lenient(false), "a").unwrap_err();
        assert!(matches!(err, Error::ZeroWidthMatch { index: 0, .. }));
    }

    #[test]
    fn self_recursive_return_begin() {
        let json = r#"{"contains": [{"scope": "x", "begin": "a", "returnBegin": true, "end": "b", "contains": ["self"]}]}"#;
        let r = registry(&[("rec", json)]);
        let err = scan(&r, ScanOptions::new("rec").lenient(false), "a").unwrap_err();
        assert!(matches!(err, Error::ZeroWidthMatch { index: 0, .. }));

        let res = scan(&r, ScanOptions::new("rec"), "ab").unwrap();
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-x">ab</span>"#);
    }

    #[test]
    fn cycle_of_empty_begins_hits_loop_guard() {
        let json = r##"{
            "contains": ["#x"],
            "repository": {
                "x": {"begin": "(?=a)", "end": "b", "contains": ["#y"]},
                "y": {"begin": "(?=a)", "end": "b", "contains": ["#x"]}
            }
        }"##;
        let r = registry(&[("cycle", json)]);
        let limits = ScanLimits {
            loop_iteration_bound: 50,
            ..Default::default()
        };
        let err = scan(&r, ScanOptions::new("cycle").lenient(false).limits(limits), "a").unwrap_err();
        assert!(matches!(err, Error::InfiniteLoop { index: 0, .. }));

        let res = scan(&r, ScanOptions::new("cycle").limits(limits), "a").unwrap();
        assert!(res.error_raised);
        assert_eq!(res.tree.text(), "a");
    }

    #[test]
    fn unicode_regex_matches_non_ascii_words() {
        let json = r#"{"unicodeRegex": true, "contains": [{"scope": "word", "begin": "\\w+"}]}"#;
        let r = registry(&[("words", json)]);
        assert!(r.get_grammar("words").unwrap().flags.unicode);
        let res = scan(&r, ScanOptions::new("words"), "héllo wörld").unwrap();
        insta::assert_snapshot!(html(&res), @r#"<span class="hljs-word">héllo</span> <span class="hljs-word">wörld</span>"#);
    }

    #[test]
    fn named_sublanguage() {
        let r = registry(&[
            ("num", r#"{"contains": [{"scope": "number", "begin": "\\d+"}]}"#),
            (
                "host",
                r#"{"contains": [{"begin": "\\{", "end": "\\}", "excludeBegin": true, "excludeEnd": true, "subLanguage": "num", "relevance": 2}]}"#,
            ),
        ]);
        let res = scan(&r, ScanOptions::new("host"), "a{x 42}").unwrap();
        insta::assert_snapshot!(html(&res), @r#"a{<span class="language-num">x <span class="hljs-number">42</span></span>}"#);
        // only the number counts, modes with a sublanguage add nothing themselves
        assert_eq!(res.relevance, 1);
    }

    #[test]
    fn sublanguage_relevance_needs_relevant_mode() {
        let r = registry(&[
            ("num", r#"{"contains": [{"scope": "number", "begin": "\\d+"}]}"#),
            (
                "host",
                r#"{"contains": [{"begin": "\\{", "end": "\\}", "excludeBegin": true, "excludeEnd": true, "subLanguage": "num", "relevance": 0}]}"#,
            ),
        ]);
        let res = scan(&r, ScanOptions::new("host"), "a{x 42}").unwrap();
        insta::assert_snapshot!(html(&res), @r#"a{<span class="language-num">x <span class="hljs-number">42</span></span>}"#);
        assert_eq!(res.relevance, 0);
    }

    #[test]
    fn unknown_sublanguage_is_text() {
        let r = registry(&[(
            "host",
            r#"{"contains": [{"scope": "embed", "begin": "\\{", "end": "\\}", "subLanguage": "nope"}]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("host"), "{x}").unwrap();
        assert_eq!(res.tree.children, vec![scope("embed", vec![text("{x}")])]);
    }

    #[test]
    fn sublanguage_continues_across_spans() {
        let r = registry(&[
            ("inner", r#"{"contains": [{"scope": "string", "begin": "'", "end": "'"}]}"#),
            (
                "outer",
                r#"{"contains": [{"begin": "<%", "end": "%>", "excludeBegin": true, "excludeEnd": true, "subLanguage": "inner"}]}"#,
            ),
        ]);
        let res = scan(&r, ScanOptions::new("outer"), "<% 'ab %>x<% cd' %>").unwrap();
        insta::assert_snapshot!(html(&res), @r#"&lt;%<span class="language-inner"> <span class="hljs-string">&#x27;ab </span></span>%&gt;x&lt;%<span class="language-inner"><span class="hljs-string"> cd&#x27;</span> </span>%&gt;"#);
    }

    #[test]
    fn before_match_only_scopes_after_prefix() {
        let r = registry(&[(
            "bm",
            r#"{"contains": [{"scope": "title", "beforeMatch": "fn\\s+", "begin": "\\w+", "relevance": 0}]}"#,
        )]);
        let res = scan(&r, ScanOptions::new("bm"), "foo fn bar").unwrap();
        insta::assert_snapshot!(html(&res), @r#"foo fn <span class="hljs-title">bar</span>"#);
    }

    #[test]
    fn unknown_grammar() {
        let r = registry(&[]);
        assert!(matches!(
            scan(&r, ScanOptions::new("nope"), "x"),
            Err(Error::GrammarNotFound(_))
        ));
        let res = scan(&r, ScanOptions::new("nope").fallback_to_plain(true), "x").unwrap();
        assert_eq!(res.tree.text(), "x");
    }

    #[test]
    fn context_is_cut_on_chars() {
        let text = format!("{}é{}", "a".repeat(150), "b".repeat(150));
        let context = context_around(&text, 150);
        assert_eq!(context, format!("{}é{}", "a".repeat(100), "b".repeat(99)));
        assert_eq!(context_around("abc", 1), "abc");
    }
}
