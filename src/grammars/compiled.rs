use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::OnceLock;

use crate::error::{AmbraResult, Error};
use crate::grammars::hooks::Hook;
use crate::grammars::keywords::KeywordTable;
use crate::grammars::normalize::normalize;
use crate::grammars::pattern_set::{MatchRule, PatternSet};
use crate::grammars::raw::{
    CompilerExtension, ContainsEntry, RawGrammar, RawMode, RawPattern, RawScope, RawSubLanguage,
};
use crate::grammars::regex::{Regex, RegexFlags};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ModeId(pub u16);

impl Deref for ModeId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub const ROOT_MODE_ID: ModeId = ModeId(0);

/// Matches anywhere, without consuming anything
const MATCH_IMMEDIATELY: &str = r"\B|\b";

/// What to emit for the text matched by a begin or end pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEmit {
    /// The whole lexeme becomes a node with that scope
    Wrap(String),
    /// (capture group, scope) in group order. Groups without a scope go through keyword
    /// extraction instead
    Multi(Vec<(usize, Option<String>)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubLanguage {
    Named(String),
    /// Auto-detected among the given grammars, or all of them if `None`
    Auto(Option<Vec<String>>),
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ModeFlags {
    pub exclude_begin: bool,
    pub exclude_end: bool,
    pub return_begin: bool,
    pub return_end: bool,
    pub skip: bool,
    pub ends_with_parent: bool,
    pub ends_parent: bool,
}

#[derive(Debug, Default)]
pub struct CompiledMode {
    /// The mode whose `contains` made us compile this one. Only informative: at scan time the
    /// parent is whatever is below in the mode stack.
    pub(crate) parent: Option<ModeId>,
    pub(crate) scope: Option<String>,
    pub(crate) begin_scope: Option<ScopeEmit>,
    pub(crate) end_scope: Option<ScopeEmit>,
    pub(crate) begin: Option<Regex>,
    pub(crate) end: Option<Regex>,
    /// Own end and the inherited ones for `endsWithParent`
    pub(crate) terminator_end: String,
    pub(crate) illegal: Option<Regex>,
    pub(crate) keywords: Option<KeywordTable>,
    pub(crate) contains: Vec<ModeId>,
    pub(crate) starts: Option<ModeId>,
    pub(crate) flags: ModeFlags,
    pub(crate) relevance: u32,
    pub(crate) sub_language: Option<SubLanguage>,
    pub(crate) before_begin: Option<Hook>,
    pub(crate) on_begin: Option<Hook>,
    pub(crate) on_end: Option<Hook>,
    matcher: OnceLock<Result<PatternSet, String>>,
}

impl CompiledMode {
    pub fn parent(&self) -> Option<ModeId> {
        self.parent
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn contains(&self) -> &[ModeId] {
        &self.contains
    }

    pub fn relevance(&self) -> u32 {
        self.relevance
    }

    pub fn flags(&self) -> ModeFlags {
        self.flags
    }

    /// Name used in diagnostics
    pub(crate) fn display_name(&self) -> &str {
        self.scope.as_deref().unwrap_or("<unnamed>")
    }
}

/// A compiled grammar, immutable once built.
///
/// Modes live in an arena: `contains`, `starts` and `parent` are indices into it.
#[derive(Debug)]
pub struct Grammar {
    /// Name it was registered under
    pub name: String,
    pub display_name: String,
    pub aliases: Vec<String>,
    pub case_insensitive: bool,
    pub disable_autodetect: bool,
    pub superset_of: Option<String>,
    pub class_name_aliases: BTreeMap<String, String>,
    pub(crate) flags: RegexFlags,
    pub(crate) modes: Vec<CompiledMode>,
    /// The definition as given, kept for bundles
    pub(crate) raw: RawGrammar,
}

impl Grammar {
    pub fn from_raw(name: &str, raw: RawGrammar) -> AmbraResult<Self> {
        let definition_error = |message: String| Error::Definition {
            grammar: name.to_owned(),
            message,
        };

        if raw
            .mode
            .contains
            .iter()
            .any(|c| matches!(c, ContainsEntry::SelfRef))
        {
            return Err(definition_error(
                "contains `self` is not supported at the top-level of a grammar".to_owned(),
            ));
        }

        let flags = RegexFlags {
            case_insensitive: raw.case_insensitive,
            unicode: raw.unicode_regex,
        };
        let mut compiler = Compiler {
            flags,
            case_insensitive: raw.case_insensitive,
            repository: &raw.repository,
            extensions: &raw.compiler_extensions,
            modes: Vec::new(),
            references: HashMap::new(),
            in_progress: Vec::new(),
        };
        let root = compiler
            .compile_mode(raw.mode.clone(), None)
            .map_err(definition_error)?;
        debug_assert_eq!(root, ROOT_MODE_ID);
        let modes = compiler.modes;

        #[cfg(feature = "debug")]
        log::debug!("[Grammar::from_raw] {name}: compiled {} modes", modes.len());

        Ok(Self {
            name: name.to_owned(),
            display_name: if raw.name.is_empty() {
                name.to_owned()
            } else {
                raw.name.clone()
            },
            aliases: raw.aliases.clone(),
            case_insensitive: raw.case_insensitive,
            disable_autodetect: raw.disable_autodetect,
            superset_of: raw.superset_of.clone(),
            class_name_aliases: raw.class_name_aliases.clone(),
            flags,
            modes,
            raw,
        })
    }

    pub fn mode(&self, id: ModeId) -> &CompiledMode {
        &self.modes[*id as usize]
    }

    pub fn modes_len(&self) -> usize {
        self.modes.len()
    }

    pub fn raw(&self) -> &RawGrammar {
        &self.raw
    }

    /// Applies `classNameAliases`
    pub(crate) fn resolve_scope<'a>(&'a self, scope: &'a str) -> &'a str {
        self.class_name_aliases
            .get(scope)
            .map(|s| s.as_str())
            .unwrap_or(scope)
    }

    /// The combined matcher of a mode: children begins, then the end terminator,
    /// then the illegal pattern. Built on first use.
    pub(crate) fn matcher(&self, id: ModeId) -> AmbraResult<&PatternSet> {
        let mode = self.mode(id);
        mode.matcher
            .get_or_init(|| {
                let mut items = Vec::with_capacity(mode.contains.len() + 2);
                for child in &mode.contains {
                    if let Some(begin) = &self.mode(*child).begin {
                        items.push((MatchRule::Begin(*child), begin.pattern().to_owned()));
                    }
                }
                if !mode.terminator_end.is_empty() {
                    items.push((MatchRule::End, mode.terminator_end.clone()));
                }
                if let Some(illegal) = &mode.illegal {
                    items.push((MatchRule::Illegal, illegal.pattern().to_owned()));
                }

                #[cfg(feature = "debug")]
                log::debug!(
                    "[Grammar::matcher] {}: building matcher for mode {} with {} rules",
                    self.name,
                    *id,
                    items.len()
                );
                PatternSet::new(items, self.flags)
            })
            .as_ref()
            .map_err(|e| Error::TokenizeRegex(e.clone()))
    }
}

struct Compiler<'a> {
    flags: RegexFlags,
    case_insensitive: bool,
    repository: &'a BTreeMap<String, RawMode>,
    extensions: &'a [CompilerExtension],
    modes: Vec<CompiledMode>,
    /// Repository entries already compiled. The parent is part of the key only for the
    /// modes depending on it
    references: HashMap<(String, Option<ModeId>), Vec<ModeId>>,
    /// Repository entries being compiled, innermost last, and whether they depend on their parent
    in_progress: Vec<(String, bool)>,
}

impl Compiler<'_> {
    fn reserve(&mut self) -> Result<ModeId, String> {
        let id = u16::try_from(self.modes.len())
            .map_err(|_| "too many modes in the grammar".to_owned())?;
        // push a placeholder to reserve its spot
        self.modes.push(CompiledMode::default());
        Ok(ModeId(id))
    }

    fn compile_regex(&self, pattern: &str) -> Result<Regex, String> {
        Regex::new(pattern, self.flags).map_err(|e| format!("invalid regex `{pattern}`: {e}"))
    }

    fn compile_mode(&mut self, raw: RawMode, parent: Option<ModeId>) -> Result<ModeId, String> {
        let id = self.reserve()?;
        self.compile_into(id, raw, parent)?;
        Ok(id)
    }

    fn scope_emit(
        scope: Option<&RawScope>,
        element_groups: Option<&Vec<usize>>,
    ) -> Result<Option<ScopeEmit>, String> {
        let Some(scope) = scope else {
            return Ok(None);
        };
        let captures = match scope {
            RawScope::Name(name) => return Ok(Some(ScopeEmit::Wrap(name.clone()))),
            RawScope::Captures(captures) => captures,
        };

        let mut parsed = BTreeMap::new();
        for (key, name) in captures {
            let index: usize = key
                .parse()
                .map_err(|_| format!("invalid capture index `{key}` in scope map"))?;
            parsed.insert(index, name.clone());
        }

        let emit = match element_groups {
            // keys are 1-based element positions of an array pattern
            Some(groups) => {
                if let Some(bad) = parsed.keys().find(|k| **k == 0 || **k > groups.len()) {
                    return Err(format!("scope map refers to element {bad} out of {}", groups.len()));
                }
                groups
                    .iter()
                    .enumerate()
                    .map(|(i, group)| (*group, parsed.get(&(i + 1)).cloned()))
                    .collect()
            }
            // keys are plain capture groups of a single pattern
            None => parsed.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        };

        Ok(Some(ScopeEmit::Multi(emit)))
    }

    fn pattern_source(pattern: Option<&RawPattern>) -> Option<&str> {
        match pattern {
            Some(RawPattern::One(p)) => Some(p.as_str()),
            // only left if normalizing failed to see it, which doesn't happen
            Some(RawPattern::Seq(_)) | None => None,
        }
    }

    fn compile_into(
        &mut self,
        id: ModeId,
        mut raw: RawMode,
        parent: Option<ModeId>,
    ) -> Result<(), String> {
        normalize(&mut raw, parent.is_some(), self.extensions)?;

        let keywords = raw
            .keywords
            .as_ref()
            .map(|k| KeywordTable::compile(k, self.case_insensitive, self.flags))
            .transpose()?;

        let mut begin = None;
        let mut end = None;
        let mut terminator_end = String::new();
        if let Some(parent) = parent {
            let begin_src = Self::pattern_source(raw.begin.as_ref()).unwrap_or(MATCH_IMMEDIATELY);
            begin = Some(self.compile_regex(begin_src)?);

            let mut end_src = Self::pattern_source(raw.end.as_ref());
            if end_src.is_none() && !raw.ends_with_parent {
                end_src = Some(MATCH_IMMEDIATELY);
            }
            if let Some(src) = end_src {
                end = Some(self.compile_regex(src)?);
                terminator_end.push_str(src);
            }

            let parent_terminator = &self.modes[*parent as usize].terminator_end;
            if raw.ends_with_parent && !parent_terminator.is_empty() {
                if end_src.is_some() {
                    terminator_end.push('|');
                }
                terminator_end.push_str(parent_terminator);
            }
        }

        let illegal = Self::pattern_source(raw.illegal.as_ref())
            .map(|src| self.compile_regex(src))
            .transpose()?;

        let scope = match &raw.scope {
            Some(RawScope::Name(name)) => Some(name.clone()),
            _ => None,
        };
        let begin_scope = Self::scope_emit(raw.begin_scope.as_ref(), raw.begin_groups.as_ref())?;
        let end_scope = Self::scope_emit(raw.end_scope.as_ref(), raw.end_groups.as_ref())?;

        let sub_language = raw.sub_language.take().map(|s| match s {
            RawSubLanguage::One(name) => SubLanguage::Named(name),
            RawSubLanguage::Many(names) if names.is_empty() => SubLanguage::Auto(None),
            RawSubLanguage::Many(names) => SubLanguage::Auto(Some(names)),
        });

        // The mode needs to be in place before its children get compiled since they look
        // at its terminator
        self.modes[*id as usize] = CompiledMode {
            parent,
            scope,
            begin_scope,
            end_scope,
            begin,
            end,
            terminator_end,
            illegal,
            keywords,
            contains: Vec::new(),
            starts: None,
            flags: ModeFlags {
                exclude_begin: raw.exclude_begin,
                exclude_end: raw.exclude_end,
                return_begin: raw.return_begin,
                return_end: raw.return_end,
                skip: raw.skip,
                ends_with_parent: raw.ends_with_parent,
                ends_parent: raw.ends_parent,
            },
            relevance: raw.relevance.unwrap_or(1),
            sub_language,
            before_begin: raw.before_begin.take(),
            on_begin: raw.on_begin.take(),
            on_end: raw.on_end.take(),
            matcher: OnceLock::new(),
        };

        let mut contains = Vec::with_capacity(raw.contains.len());
        for entry in std::mem::take(&mut raw.contains) {
            match entry {
                ContainsEntry::SelfRef => contains.push(id),
                ContainsEntry::Include(name) => {
                    contains.extend(self.compile_reference(&name, id)?);
                }
                ContainsEntry::Mode(mode) => {
                    if mode.variants.is_empty() {
                        contains.push(self.compile_mode(*mode, Some(id))?);
                    } else {
                        for variant in &mode.variants {
                            contains.push(self.compile_mode(mode.merged_with(variant), Some(id))?);
                        }
                    }
                }
            }
        }

        // `starts` modes replace the current one so they share its parent
        let starts = match raw.starts.take() {
            Some(starts) => Some(self.compile_mode(*starts, parent)?),
            None => None,
        };

        let mode = &mut self.modes[*id as usize];
        mode.contains = contains;
        mode.starts = starts;
        Ok(())
    }

    fn compile_reference(&mut self, name: &str, parent: ModeId) -> Result<Vec<ModeId>, String> {
        let repository = self.repository;
        let raw = repository
            .get(name)
            .ok_or_else(|| format!("unknown repository entry `#{name}`"))?;
        let key = (
            name.to_owned(),
            raw.depends_on_parent().then_some(parent),
        );
        if let Some(ids) = self.references.get(&key) {
            return Ok(ids.clone());
        }
        // Modes depending on their parent get compiled once per parent, so a cycle made only
        // of those never ends. Any other entry in the cycle is cached and stops it.
        if raw.depends_on_parent() {
            let cycles = self
                .in_progress
                .iter()
                .rev()
                .take_while(|(_, depends)| *depends)
                .any(|(n, _)| n == name);
            if cycles {
                return Err(format!(
                    "repository entry `#{name}` contains itself through modes depending on their parent"
                ));
            }
        }

        let variants: Vec<RawMode> = if raw.variants.is_empty() {
            vec![raw.clone()]
        } else {
            raw.variants.iter().map(|v| raw.merged_with(v)).collect()
        };

        // Reserve everything first so a mode can refer to itself through the repository
        let mut ids = Vec::with_capacity(variants.len());
        for _ in &variants {
            ids.push(self.reserve()?);
        }
        self.references.insert(key, ids.clone());

        self.in_progress.push((name.to_owned(), raw.depends_on_parent()));
        for (id, mode) in ids.iter().zip(variants) {
            self.compile_into(*id, mode, Some(parent))?;
        }
        self.in_progress.pop();

        Ok(ids)
    }
}
