use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AmbraResult;
use crate::grammars::hooks::Hook;

/// A regex source, or several that are concatenated and get their own scope each
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPattern {
    One(String),
    Seq(Vec<String>),
}

impl From<&str> for RawPattern {
    fn from(value: &str) -> Self {
        RawPattern::One(value.to_owned())
    }
}

/// Either a plain scope name or a map of 1-based capture index to scope name.
///
/// Keys are kept as strings: integer map keys don't survive serde's buffering of
/// flattened/untagged content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScope {
    Name(String),
    Captures(BTreeMap<String, String>),
}

impl From<&str> for RawScope {
    fn from(value: &str) -> Self {
        RawScope::Name(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawKeywordList {
    /// Space separated words
    Words(String),
    List(Vec<String>),
}

impl RawKeywordList {
    pub(crate) fn words(&self) -> Vec<&str> {
        match self {
            RawKeywordList::Words(s) => s.split_whitespace().collect(),
            RawKeywordList::List(l) => l.iter().map(|s| s.as_str()).collect(),
        }
    }
}

/// The keywords of a mode.
///
/// Words can carry an explicit relevance with a `|n` suffix, eg `"unless|10"`.
/// The `Classes` form can also have a `$pattern` entry replacing the default `\w+`
/// used to find candidate words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawKeywords {
    Words(String),
    List(Vec<String>),
    Classes(BTreeMap<String, RawKeywordList>),
}

impl From<&str> for RawKeywords {
    fn from(value: &str) -> Self {
        RawKeywords::Words(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSubLanguage {
    One(String),
    /// Candidates for auto-detection. Empty means every grammar that allows it
    Many(Vec<String>),
}

/// An entry of `contains`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ContainsRepr", into = "ContainsRepr")]
pub enum ContainsEntry {
    /// `"self"`: the mode containing this entry, recursively
    SelfRef,
    /// `"#name"`: a shared mode from the grammar repository
    Include(String),
    Mode(Box<RawMode>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ContainsRepr {
    Reference(String),
    Mode(Box<RawMode>),
}

impl TryFrom<ContainsRepr> for ContainsEntry {
    type Error = String;

    fn try_from(value: ContainsRepr) -> Result<Self, Self::Error> {
        match value {
            ContainsRepr::Reference(r) if r == "self" => Ok(ContainsEntry::SelfRef),
            ContainsRepr::Reference(r) => match r.strip_prefix('#') {
                Some(name) => Ok(ContainsEntry::Include(name.to_owned())),
                None => Err(format!(
                    "invalid reference `{r}` in contains, expected `self` or `#name`"
                )),
            },
            ContainsRepr::Mode(m) => Ok(ContainsEntry::Mode(m)),
        }
    }
}

impl From<ContainsEntry> for ContainsRepr {
    fn from(value: ContainsEntry) -> Self {
        match value {
            ContainsEntry::SelfRef => ContainsRepr::Reference("self".to_owned()),
            ContainsEntry::Include(name) => ContainsRepr::Reference(format!("#{name}")),
            ContainsEntry::Mode(m) => ContainsRepr::Mode(m),
        }
    }
}

impl From<RawMode> for ContainsEntry {
    fn from(value: RawMode) -> Self {
        ContainsEntry::Mode(Box::new(value))
    }
}

/// A lexical context as written by a grammar author.
///
/// Most fields are sugar that gets normalized away when the grammar is compiled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<RawScope>,
    /// Older spelling of `scope`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin: Option<RawPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<RawPattern>,
    /// A begin-only mode that ends right after its match
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_: Option<RawPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_scope: Option<RawScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_scope: Option<RawScope>,
    /// Space separated words starting the mode, matched on word boundaries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_keywords: Option<String>,
    /// A prefix that must precede `begin` but is not part of the mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<RawKeywords>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub illegal: Option<RawPattern>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<ContainsEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<RawMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts: Option<Box<RawMode>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exclude_begin: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exclude_end: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub return_begin: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub return_end: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ends_with_parent: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ends_parent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_language: Option<RawSubLanguage>,
    #[serde(rename = "on:begin", skip_serializing_if = "Option::is_none")]
    pub on_begin: Option<Hook>,
    #[serde(rename = "on:end", skip_serializing_if = "Option::is_none")]
    pub on_end: Option<Hook>,

    // Filled while normalizing
    #[serde(skip)]
    pub(crate) before_begin: Option<Hook>,
    /// Group of each element of an array `begin` once concatenated
    #[serde(skip)]
    pub(crate) begin_groups: Option<Vec<usize>>,
    #[serde(skip)]
    pub(crate) end_groups: Option<Vec<usize>>,
}

impl RawMode {
    /// Whether that mode needs to be compiled again for every parent it appears in
    pub(crate) fn depends_on_parent(&self) -> bool {
        self.ends_with_parent
            || self
                .starts
                .as_ref()
                .is_some_and(|starts| starts.depends_on_parent())
    }

    /// Builds one of the `variants` of this mode: fields set on the variant win
    pub(crate) fn merged_with(&self, variant: &RawMode) -> RawMode {
        fn pick<T: Clone>(variant: &Option<T>, base: &Option<T>) -> Option<T> {
            variant.as_ref().or(base.as_ref()).cloned()
        }

        RawMode {
            scope: pick(&variant.scope, &self.scope),
            class_name: pick(&variant.class_name, &self.class_name),
            begin: pick(&variant.begin, &self.begin),
            end: pick(&variant.end, &self.end),
            match_: pick(&variant.match_, &self.match_),
            begin_scope: pick(&variant.begin_scope, &self.begin_scope),
            end_scope: pick(&variant.end_scope, &self.end_scope),
            begin_keywords: pick(&variant.begin_keywords, &self.begin_keywords),
            before_match: pick(&variant.before_match, &self.before_match),
            keywords: pick(&variant.keywords, &self.keywords),
            illegal: pick(&variant.illegal, &self.illegal),
            contains: if variant.contains.is_empty() {
                self.contains.clone()
            } else {
                variant.contains.clone()
            },
            // a variant never has variants of its own
            variants: Vec::new(),
            starts: pick(&variant.starts, &self.starts),
            exclude_begin: variant.exclude_begin || self.exclude_begin,
            exclude_end: variant.exclude_end || self.exclude_end,
            return_begin: variant.return_begin || self.return_begin,
            return_end: variant.return_end || self.return_end,
            skip: variant.skip || self.skip,
            ends_with_parent: variant.ends_with_parent || self.ends_with_parent,
            ends_parent: variant.ends_parent || self.ends_parent,
            relevance: variant.relevance.or(self.relevance),
            sub_language: pick(&variant.sub_language, &self.sub_language),
            on_begin: pick(&variant.on_begin, &self.on_begin),
            on_end: pick(&variant.on_end, &self.on_end),
            before_begin: None,
            begin_groups: pick(&variant.begin_groups, &self.begin_groups),
            end_groups: pick(&variant.end_groups, &self.end_groups),
        }
    }
}

/// Called on every mode of a grammar before the defaults are filled in.
pub type CompilerExtension = Arc<dyn Fn(&mut RawMode) + Send + Sync>;

/// A grammar definition. The root mode fields live at the top level of the definition.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawGrammar {
    /// Display name. The name it is registered under is used if missing
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(alias = "case_insensitive", skip_serializing_if = "std::ops::Not::not")]
    pub case_insensitive: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unicode_regex: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disable_autodetect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superset_of: Option<String>,
    /// Scope names replaced when emitted, eg `{"function": "title.function"}`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub class_name_aliases: BTreeMap<String, String>,
    /// Shared modes that can be referenced as `#name` in any `contains`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub repository: BTreeMap<String, RawMode>,
    #[serde(flatten)]
    pub mode: RawMode,
    #[serde(skip)]
    pub compiler_extensions: Vec<CompilerExtension>,
}

impl fmt::Debug for RawGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawGrammar")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("case_insensitive", &self.case_insensitive)
            .field("unicode_regex", &self.unicode_regex)
            .field("disable_autodetect", &self.disable_autodetect)
            .field("superset_of", &self.superset_of)
            .field("class_name_aliases", &self.class_name_aliases)
            .field("repository", &self.repository)
            .field("mode", &self.mode)
            .field("compiler_extensions", &self.compiler_extensions.len())
            .finish()
    }
}

impl RawGrammar {
    pub fn load_from_file(path: impl AsRef<Path>) -> AmbraResult<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let raw_grammar = serde_json::from_reader(reader)?;
        Ok(raw_grammar)
    }

    pub fn load_from_str(content: &str) -> AmbraResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammars::hooks::BuiltinHook;

    #[test]
    fn can_parse_all_fixture_grammars() {
        let mut count = 0;
        for entry in std::fs::read_dir("src/fixtures/grammars").unwrap() {
            let path = entry.unwrap().path();
            assert!(RawGrammar::load_from_file(&path).is_ok(), "{path:?}");
            count += 1;
        }
        assert!(count > 0);
    }

    #[test]
    fn root_mode_is_flattened() {
        let raw = RawGrammar::load_from_str(
            r##"{
                "name": "Demo",
                "case_insensitive": true,
                "keywords": {"keyword": "if else", "$pattern": "[a-z]+"},
                "contains": [
                    "#strings",
                    {"className": "number", "begin": "\\d+", "relevance": 0}
                ],
                "repository": {"strings": {"scope": "string", "begin": "'", "end": "'"}}
            }"##,
        )
        .unwrap();

        assert_eq!(raw.name, "Demo");
        assert!(raw.case_insensitive);
        assert!(matches!(raw.mode.keywords, Some(RawKeywords::Classes(ref c)) if c.len() == 2));
        assert_eq!(raw.mode.contains.len(), 2);
        assert!(matches!(raw.mode.contains[0], ContainsEntry::Include(ref n) if n == "strings"));
        let ContainsEntry::Mode(number) = &raw.mode.contains[1] else {
            panic!("expected an inline mode");
        };
        assert_eq!(number.class_name.as_deref(), Some("number"));
        assert_eq!(number.relevance, Some(0));
        assert!(raw.repository.contains_key("strings"));
    }

    #[test]
    fn parses_multi_scopes_and_hooks() {
        let mode: RawMode = serde_json::from_str(
            r#"{
                "begin": ["fn", "\\s+", "\\w+"],
                "beginScope": {"1": "keyword", "3": "title.function"},
                "on:begin": "startOfInput",
                "contains": ["self"]
            }"#,
        )
        .unwrap();

        assert!(matches!(mode.begin, Some(RawPattern::Seq(ref s)) if s.len() == 3));
        assert!(matches!(mode.begin_scope, Some(RawScope::Captures(ref c)) if c["3"] == "title.function"));
        assert!(matches!(
            mode.on_begin,
            Some(Hook::Builtin(BuiltinHook::StartOfInput))
        ));
        assert!(matches!(mode.contains[0], ContainsEntry::SelfRef));
    }

    #[test]
    fn rejects_unknown_references() {
        let res: Result<RawMode, _> = serde_json::from_str(r#"{"contains": ["strings"]}"#);
        assert!(res.is_err());
    }

    #[test]
    fn serializes_back_to_the_same_shape() {
        let json = r##"{"name":"Demo","keywords":"a b","contains":["#x",{"scope":"string","begin":"'","end":"'","illegal":["\\n","\\r"]}],"repository":{"x":{"match":"\\d+"}}}"##;
        let raw = RawGrammar::load_from_str(json).unwrap();
        let out = serde_json::to_value(&raw).unwrap();
        let expected: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn variants_override_base_fields() {
        let base = RawMode {
            scope: Some("string".into()),
            end: Some("'".into()),
            relevance: Some(0),
            ..Default::default()
        };
        let variant = RawMode {
            begin: Some("b'".into()),
            relevance: Some(2),
            ..Default::default()
        };
        let merged = base.merged_with(&variant);
        assert_eq!(merged.scope, Some(RawScope::Name("string".to_owned())));
        assert_eq!(merged.begin, Some(RawPattern::One("b'".to_owned())));
        assert_eq!(merged.end, Some(RawPattern::One("'".to_owned())));
        assert_eq!(merged.relevance, Some(2));
    }
}
