//! Sugar expansion applied to every raw mode before it gets compiled.
//!
//! The passes run in a fixed order and each one can rely on the previous ones having run.
//! All of them are idempotent: a mode moved around by `beforeMatch` goes through them again.

use std::mem;

use crate::grammars::hooks::{BuiltinHook, Hook};
use crate::grammars::pattern_set::compose;
use crate::grammars::raw::{CompilerExtension, ContainsEntry, RawMode, RawPattern, RawScope};
use crate::grammars::regex::{concat, either, lookahead};

pub(crate) fn normalize(
    mode: &mut RawMode,
    has_parent: bool,
    extensions: &[CompilerExtension],
) -> Result<(), String> {
    legacy_names(mode);
    match_to_begin(mode)?;
    multi_scopes(mode)?;
    before_match(mode)?;
    for extension in extensions {
        extension(mode);
    }
    mode.before_begin = None;
    if has_parent {
        begin_keywords(mode);
    }
    illegal_alternation(mode);
    default_relevance(mode);
    Ok(())
}

fn legacy_names(mode: &mut RawMode) {
    if let Some(class_name) = mode.class_name.take() {
        mode.scope = Some(RawScope::Name(class_name));
    }
}

fn match_to_begin(mode: &mut RawMode) -> Result<(), String> {
    if let Some(pattern) = mode.match_.take() {
        if mode.begin.is_some() || mode.end.is_some() {
            return Err("begin & end are not supported with match".to_owned());
        }
        mode.begin = Some(pattern);
    }
    Ok(())
}

/// Concatenates array patterns, remembering in which group each element ended up so
/// they can be given their own scope
fn concat_elements(elements: &[String]) -> (String, Vec<usize>) {
    let elements: Vec<&str> = elements.iter().map(|s| s.as_str()).collect();
    let composed = compose(&elements, "");
    (composed.source, composed.wrapper_groups)
}

fn multi_scopes(mode: &mut RawMode) -> Result<(), String> {
    if matches!(mode.scope, Some(RawScope::Captures(_))) {
        mode.begin_scope = mode.scope.take();
    }

    if let Some(RawPattern::Seq(elements)) = &mode.begin {
        if mode.skip || mode.exclude_begin || mode.return_begin {
            return Err(
                "skip, excludeBegin, returnBegin not compatible with beginScope".to_owned(),
            );
        }
        if !matches!(mode.begin_scope, Some(RawScope::Captures(_))) {
            return Err("beginScope must be object".to_owned());
        }
        let (source, groups) = concat_elements(elements);
        mode.begin = Some(RawPattern::One(source));
        mode.begin_groups = Some(groups);
    }

    if let Some(RawPattern::Seq(elements)) = &mode.end {
        if mode.skip || mode.exclude_end || mode.return_end {
            return Err("skip, excludeEnd, returnEnd not compatible with endScope".to_owned());
        }
        if !matches!(mode.end_scope, Some(RawScope::Captures(_))) {
            return Err("endScope must be object".to_owned());
        }
        let (source, groups) = concat_elements(elements);
        mode.end = Some(RawPattern::One(source));
        mode.end_groups = Some(groups);
    }

    Ok(())
}

/// Turns the mode into a zero relevance mode matching the prefix, which then starts the
/// real mode.
fn before_match(mode: &mut RawMode) -> Result<(), String> {
    let Some(prefix) = mode.before_match.take() else {
        return Ok(());
    };
    if mode.starts.is_some() {
        return Err("beforeMatch cannot be used with starts".to_owned());
    }

    let mut original = mem::take(mode);
    let begin = match &original.begin {
        Some(RawPattern::One(b)) => b.clone(),
        _ => String::new(),
    };
    original.ends_parent = true;

    mode.keywords = original.keywords.clone();
    mode.begin = Some(RawPattern::One(concat(&[&prefix, &lookahead(&begin)])));
    mode.relevance = Some(0);
    mode.starts = Some(Box::new(RawMode {
        relevance: Some(0),
        contains: vec![ContainsEntry::Mode(Box::new(original))],
        ..Default::default()
    }));

    Ok(())
}

fn begin_keywords(mode: &mut RawMode) {
    let Some(words) = mode.begin_keywords.take() else {
        return;
    };
    let alternatives: Vec<&str> = words.split_whitespace().collect();
    mode.begin = Some(RawPattern::One(format!(
        r"\b({})(?!\.)(?=\b|\s)",
        alternatives.join("|")
    )));
    mode.before_begin = Some(Hook::Builtin(BuiltinHook::NotAfterDot));
    if mode.keywords.is_none() {
        mode.keywords = Some(words.as_str().into());
    }
    if mode.relevance.is_none() {
        mode.relevance = Some(0);
    }
}

fn illegal_alternation(mode: &mut RawMode) {
    if let Some(RawPattern::Seq(alternatives)) = &mode.illegal {
        let alternatives: Vec<&str> = alternatives.iter().map(|s| s.as_str()).collect();
        mode.illegal = Some(RawPattern::One(either(&alternatives)));
    }
}

fn default_relevance(mode: &mut RawMode) {
    if mode.relevance.is_none() {
        mode.relevance = Some(1);
    }
}
