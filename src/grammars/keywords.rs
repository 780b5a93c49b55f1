use std::collections::HashMap;

use crate::grammars::raw::{RawKeywordList, RawKeywords};
use crate::grammars::regex::{Regex, RegexFlags};

/// Short words common in prose and in many languages: they don't tell much about the
/// language of a text so they don't count towards relevance unless asked to.
pub const COMMON_KEYWORDS: [&str; 11] = [
    "of", "and", "for", "in", "not", "or", "if", "then", "parent", "list", "value",
];

const DEFAULT_KEYWORD_PATTERN: &str = r"\w+";
const PATTERN_KEY: &str = "$pattern";
const DEFAULT_CLASS: &str = "keyword";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// The scope of the keyword, eg `keyword`, `built_in` or `literal`
    pub class: String,
    pub relevance: u32,
}

/// The keywords of a mode, looked up by exact (or lowercased) text
#[derive(Debug)]
pub struct KeywordTable {
    pattern: Regex,
    words: HashMap<String, Keyword>,
}

fn keyword_relevance(word: &str, explicit: Option<&str>) -> Result<u32, String> {
    match explicit {
        Some(n) => n
            .parse()
            .map_err(|_| format!("invalid relevance `{n}` for keyword `{word}`")),
        None if COMMON_KEYWORDS.contains(&word.to_lowercase().as_str()) => Ok(0),
        None => Ok(1),
    }
}

impl KeywordTable {
    pub(crate) fn compile(
        keywords: &RawKeywords,
        case_insensitive: bool,
        flags: RegexFlags,
    ) -> Result<Self, String> {
        let mut words = HashMap::new();
        let mut pattern = None;

        let mut add = |class: &str, list: Vec<&str>| -> Result<(), String> {
            for entry in list {
                let (word, relevance) = match entry.split_once('|') {
                    Some((w, r)) => (w, Some(r)),
                    None => (entry, None),
                };
                let word = if case_insensitive {
                    word.to_lowercase()
                } else {
                    word.to_owned()
                };
                let relevance = keyword_relevance(&word, relevance)?;
                words.insert(
                    word,
                    Keyword {
                        class: class.to_owned(),
                        relevance,
                    },
                );
            }
            Ok(())
        };

        match keywords {
            RawKeywords::Words(s) => add(DEFAULT_CLASS, s.split_whitespace().collect())?,
            RawKeywords::List(l) => add(DEFAULT_CLASS, l.iter().map(|s| s.as_str()).collect())?,
            RawKeywords::Classes(classes) => {
                for (class, list) in classes {
                    if class == PATTERN_KEY {
                        if let RawKeywordList::Words(p) = list {
                            pattern = Some(p.as_str());
                        }
                        continue;
                    }
                    add(class, list.words())?;
                }
            }
        }

        let pattern_src = pattern.unwrap_or(DEFAULT_KEYWORD_PATTERN);
        let pattern = Regex::new(pattern_src, flags)
            .map_err(|e| format!("invalid keyword pattern `{pattern_src}`: {e}"))?;

        Ok(Self { pattern, words })
    }

    /// The regex finding candidate words in a text
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// `word` is expected to be already lowercased for case insensitive grammars
    pub fn get(&self, word: &str) -> Option<&Keyword> {
        self.words.get(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
