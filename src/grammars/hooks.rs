use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// What a hook decided about a begin or end match
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Accept,
    /// The match is treated as regular text and the mode stack is left alone
    Ignore,
}

/// A begin or end match, as seen by a hook
#[derive(Debug, Copy, Clone)]
pub struct HookMatch<'t> {
    input: &'t str,
    index: usize,
    captures: &'t [Option<(usize, usize)>],
}

impl<'t> HookMatch<'t> {
    pub(crate) fn new(input: &'t str, index: usize, captures: &'t [Option<(usize, usize)>]) -> Self {
        Self {
            input,
            index,
            captures,
        }
    }

    /// The whole text being scanned
    pub fn input(&self) -> &'t str {
        self.input
    }

    /// Byte offset of the match in the input
    pub fn index(&self) -> usize {
        self.index
    }

    /// The text of a capture group, 0 being the whole match
    pub fn get(&self, group: usize) -> Option<&'t str> {
        self.captures
            .get(group)
            .copied()
            .flatten()
            .map(|(s, e)| &self.input[s..e])
    }

    pub fn lexeme(&self) -> &'t str {
        self.get(0).unwrap_or_default()
    }
}

/// Scratch space attached to one activation of a mode.
///
/// The begin hook gets a fresh one that then lives in the mode stack until the mode ends,
/// where the end hook sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookData(HashMap<String, String>);

impl HookData {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

const BEGIN_MATCH_KEY: &str = "beginMatch";

/// Hooks that can be referenced by name in a grammar definition
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BuiltinHook {
    /// Remembers the first capture group of the begin match
    CaptureBeginMatch,
    /// Ignores the end match if its first capture group differs from the one remembered
    /// by `CaptureBeginMatch`. Used for heredocs and the like
    EndSameAsBegin,
    /// Ignores matches not at the very start of the input, eg shebangs
    StartOfInput,
    /// Ignores matches directly preceded by a `.`, eg `foo.return`
    NotAfterDot,
}

impl BuiltinHook {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinHook::CaptureBeginMatch => "captureBeginMatch",
            BuiltinHook::EndSameAsBegin => "endSameAsBegin",
            BuiltinHook::StartOfInput => "startOfInput",
            BuiltinHook::NotAfterDot => "notAfterDot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "captureBeginMatch" => Some(BuiltinHook::CaptureBeginMatch),
            "endSameAsBegin" => Some(BuiltinHook::EndSameAsBegin),
            "startOfInput" => Some(BuiltinHook::StartOfInput),
            "notAfterDot" => Some(BuiltinHook::NotAfterDot),
            _ => None,
        }
    }

    fn run(self, m: &HookMatch, data: &mut HookData) -> MatchOutcome {
        match self {
            BuiltinHook::CaptureBeginMatch => {
                data.insert(BEGIN_MATCH_KEY, m.get(1).unwrap_or_default());
                MatchOutcome::Accept
            }
            BuiltinHook::EndSameAsBegin => {
                if data.get(BEGIN_MATCH_KEY) == Some(m.get(1).unwrap_or_default()) {
                    MatchOutcome::Accept
                } else {
                    MatchOutcome::Ignore
                }
            }
            BuiltinHook::StartOfInput => {
                if m.index() == 0 {
                    MatchOutcome::Accept
                } else {
                    MatchOutcome::Ignore
                }
            }
            BuiltinHook::NotAfterDot => {
                if m.input()[..m.index()].ends_with('.') {
                    MatchOutcome::Ignore
                } else {
                    MatchOutcome::Accept
                }
            }
        }
    }
}

pub type HookFn = dyn Fn(&HookMatch, &mut HookData) -> MatchOutcome + Send + Sync;

/// Runs when a mode begin or end pattern matched and can veto that match.
#[derive(Clone)]
pub enum Hook {
    Builtin(BuiltinHook),
    /// Only available when building grammars in Rust, those can't be serialized
    Custom(Arc<HookFn>),
}

impl Hook {
    pub fn custom(f: impl Fn(&HookMatch, &mut HookData) -> MatchOutcome + Send + Sync + 'static) -> Self {
        Hook::Custom(Arc::new(f))
    }

    pub(crate) fn run(&self, m: &HookMatch, data: &mut HookData) -> MatchOutcome {
        match self {
            Hook::Builtin(b) => b.run(m, data),
            Hook::Custom(f) => f(m, data),
        }
    }
}

impl From<BuiltinHook> for Hook {
    fn from(value: BuiltinHook) -> Self {
        Hook::Builtin(value)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Builtin(b) => write!(f, "{}", b.name()),
            Hook::Custom(_) => write!(f, "<custom hook>"),
        }
    }
}

impl Serialize for Hook {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Hook::Builtin(b) => serializer.serialize_str(b.name()),
            Hook::Custom(_) => Err(serde::ser::Error::custom(
                "custom hooks cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Hook {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        BuiltinHook::from_name(&name)
            .map(Hook::Builtin)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown hook `{name}`")))
    }
}
