mod compiled;
pub mod hooks;
mod keywords;
mod normalize;
mod pattern_set;
mod raw;
pub mod regex;

pub use compiled::*;
pub use hooks::{BuiltinHook, Hook, HookData, HookMatch, MatchOutcome};
pub use keywords::{COMMON_KEYWORDS, Keyword, KeywordTable};
pub use pattern_set::{Composed, MatchRule, PatternSet, PatternSetMatch, compose, count_groups};
pub use raw::{
    CompilerExtension, ContainsEntry, RawGrammar, RawKeywordList, RawKeywords, RawMode,
    RawPattern, RawScope, RawSubLanguage,
};
pub use regex::{Regex, RegexFlags};
