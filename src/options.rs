/// Heuristic constants of the scanner. The defaults are the values that work well in
/// practice, there is nothing more to them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScanLimits {
    /// How many occurrences of the same keyword count towards relevance
    pub max_keyword_hits: u32,
    /// Iterations allowed before the infinite loop check kicks in
    pub loop_iteration_bound: usize,
    /// The scan is aborted once iterations exceed this multiple of the match position
    pub loop_ratio: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_keyword_hits: 7,
            loop_iteration_bound: 100_000,
            loop_ratio: 3,
        }
    }
}

/// The options we can set for scanning a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions<'a> {
    pub(crate) language: &'a str,
    pub(crate) lenient: bool,
    pub(crate) ignore_illegals: bool,
    pub(crate) fallback_to_plain: bool,
    pub(crate) limits: ScanLimits,
}

impl<'a> ScanOptions<'a> {
    /// Scans with the given grammar name or alias, leniently.
    pub fn new(language: &'a str) -> Self {
        Self {
            language,
            lenient: true,
            ignore_illegals: false,
            fallback_to_plain: false,
            limits: ScanLimits::default(),
        }
    }

    /// When lenient, illegal lexemes and scanner failures give back the text unscoped with
    /// a diagnostic instead of an error.
    pub fn lenient(mut self, value: bool) -> Self {
        self.lenient = value;
        self
    }

    /// Treat illegal lexemes as regular text
    pub fn ignore_illegals(mut self, value: bool) -> Self {
        self.ignore_illegals = value;
        self
    }

    /// Whether to scan as plain text if the requested grammar is not found.
    pub fn fallback_to_plain(mut self, value: bool) -> Self {
        self.fallback_to_plain = value;
        self
    }

    pub fn limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }
}
