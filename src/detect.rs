use crate::options::ScanLimits;
use crate::registry::{PLAIN_GRAMMAR_NAME, Registry};
use crate::scanner::{ScanConfig, ScanResult, scan_grammar};

/// Whether `a` should be ranked before `b`.
///
/// On equal relevance, a grammar declared as a superset of the other one goes after it.
fn ranks_before(registry: &Registry, a: &ScanResult, b: &ScanResult) -> bool {
    if a.relevance != b.relevance {
        return a.relevance > b.relevance;
    }
    registry
        .get_grammar(&b.language)
        .is_some_and(|g| g.superset_of.as_deref() == Some(a.language.as_str()))
}

/// Scans the text with every candidate grammar, or every grammar allowing auto-detection
/// if there are none, and returns the most relevant result with the runner-up attached.
///
/// This never fails: a plain text result with a relevance of 0 takes part in the ranking.
pub(crate) fn detect<S: AsRef<str>>(
    registry: &Registry,
    text: &str,
    candidates: Option<&[S]>,
    limits: ScanLimits,
) -> ScanResult {
    let names: Vec<String> = match candidates {
        Some(c) => c.iter().map(|s| s.as_ref().to_owned()).collect(),
        None => registry.list_grammars(),
    };
    // Illegal lexemes disqualify a grammar instead of being skipped
    let config = ScanConfig {
        lenient: true,
        ignore_illegals: false,
        limits,
    };

    let mut results = vec![ScanResult::plain(PLAIN_GRAMMAR_NAME, text)];
    for name in &names {
        let Some(grammar) = registry.get_grammar(name) else {
            continue;
        };
        if grammar.disable_autodetect {
            continue;
        }

        let result = match scan_grammar(registry, &grammar, text, config, None) {
            Ok(scanned) => scanned.result,
            Err(_err) => {
                #[cfg(feature = "debug")]
                log::warn!("[detect] {name} failed: {_err}");
                let mut result = ScanResult::plain(&grammar.name, text);
                result.error_raised = true;
                result
            }
        };
        #[cfg(feature = "debug")]
        log::debug!("[detect] {name}: relevance {}", result.relevance);
        results.push(result);
    }

    // Stable insertion sort: the order of equally ranked results is kept
    for i in 1..results.len() {
        let mut j = i;
        while j > 0 && ranks_before(registry, &results[j], &results[j - 1]) {
            results.swap(j, j - 1);
            j -= 1;
        }
    }

    let mut ranked = results.into_iter();
    // there is always the plain text result
    let mut best = ranked
        .next()
        .unwrap_or_else(|| ScanResult::plain(PLAIN_GRAMMAR_NAME, text));
    best.second_best = ranked.next().map(Box::new);
    best
}
