use std::fmt;

use onig::{Region, RegexOptions, SearchOptions, Syntax};

/// Grammar-wide options applied uniformly to every regex of a grammar
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RegexFlags {
    pub case_insensitive: bool,
    /// Kept for grammar authors targeting unicode-aware patterns.
    /// Oniguruma always matches UTF-8 input as unicode so this doesn't change the options.
    pub unicode: bool,
}

impl RegexFlags {
    pub(crate) fn options(self) -> RegexOptions {
        // Plain groups must keep capturing when a pattern also uses named groups,
        // otherwise the backreference renumbering would point to the wrong groups
        let mut options = RegexOptions::REGEX_OPTION_CAPTURE_GROUP;
        if self.case_insensitive {
            options |= RegexOptions::REGEX_OPTION_IGNORECASE;
        }
        options
    }
}

/// A regex compiled eagerly when a grammar is registered, keeping its source around
/// since composed matchers are built from the sources.
pub struct Regex {
    pattern: String,
    compiled: onig::Regex,
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

impl Regex {
    pub fn new(pattern: &str, flags: RegexFlags) -> Result<Self, onig::Error> {
        let compiled = onig::Regex::with_options(pattern, flags.options(), Syntax::default())?;
        Ok(Self {
            pattern: pattern.to_owned(),
            compiled,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Number of capture groups, not counting the implicit group 0
    pub fn captures_len(&self) -> usize {
        self.compiled.captures_len()
    }

    /// Tries to match exactly at `pos`, returning the end of the match.
    /// The whole text is given to onig so lookbehinds and anchors see the real context.
    pub fn match_at(&self, text: &str, pos: usize) -> Option<usize> {
        self.compiled
            .match_with_options(text, pos, SearchOptions::SEARCH_OPTION_NONE, None)
            .map(|len| pos + len)
    }

    /// Finds the leftmost match starting at or after `pos`
    pub fn find_at(&self, text: &str, pos: usize) -> Option<(usize, usize)> {
        let mut region = Region::new();
        self.search_region(text, pos, &mut region)?;
        region.pos(0)
    }

    /// Like [`Regex::find_at`] but fills all the capture positions in `region`
    pub(crate) fn search_region(&self, text: &str, pos: usize, region: &mut Region) -> Option<usize> {
        self.compiled.search_with_options(
            text,
            pos,
            text.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(region),
        )
    }
}

// Helpers to build regex sources when writing grammars in Rust.

/// Joins the given sources without any separator
pub fn concat(parts: &[&str]) -> String {
    parts.concat()
}

/// Wraps the source in a positive lookahead
pub fn lookahead(re: &str) -> String {
    format!("(?={re})")
}

/// `(?:re)*`
pub fn any_number_of_times(re: &str) -> String {
    format!("(?:{re})*")
}

/// `(?:re)?`
pub fn optional(re: &str) -> String {
    format!("(?:{re})?")
}

/// Non-capturing alternation of all the given sources
pub fn either(alternatives: &[&str]) -> String {
    format!("(?:{})", alternatives.join("|"))
}

/// Same as [`either`] but the alternation is a capture group
pub fn either_capture(alternatives: &[&str]) -> String {
    format!("({})", alternatives.join("|"))
}
