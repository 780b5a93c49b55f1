use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "dump")]
use std::collections::BTreeMap;

#[cfg(feature = "dump")]
use serde::{Deserialize, Serialize};

use crate::detect::detect;
use crate::error::{AmbraResult, Error};
use crate::grammars::{Grammar, RawGrammar};
use crate::options::{ScanLimits, ScanOptions};
use crate::plugins::{Plugin, ScanContext, run_after, run_before};
use crate::scanner::{ScanConfig, ScanResult, scan_grammar};

/// The name of the grammar where nothing is highlighted
pub const PLAIN_GRAMMAR_NAME: &str = "plaintext";

/// What goes in a dump: the definitions as given, to be compiled again when loading
#[cfg(feature = "dump")]
#[derive(Debug, Default, Serialize, Deserialize)]
struct GrammarBundle {
    grammars: BTreeMap<String, RawGrammar>,
    aliases: BTreeMap<String, String>,
}

/// The main struct in ambra.
///
/// Holds the compiled grammars and their aliases and is responsible for scanning a text.
/// Rendering the resulting tree is up to the caller.
///
/// Every method takes `&self`: a registry can be put behind an `Arc` and used from multiple
/// threads, including while grammars get registered.
#[derive(Default)]
pub struct Registry {
    // lowercased grammar name -> grammar
    grammars: papaya::HashMap<String, Arc<Grammar>>,
    // lowercased alias -> grammar name
    aliases: papaya::HashMap<String, String>,
    plugins: RwLock<Vec<Plugin>>,
    // used by auto-detection when not given candidates, every grammar if empty
    default_candidates: RwLock<Vec<String>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("grammars", &self.list_grammars())
            .field("aliases", &self.aliases.pin().len())
            .field("plugins", &self.plugins_snapshot().len())
            .field("default_candidates", &self.default_candidates())
            .finish()
    }
}

impl Registry {
    /// Compiles the grammar and adds it under the given name, along with the aliases it
    /// declares. A grammar with the same name is replaced.
    ///
    /// The grammar is not added if its definition is invalid.
    pub fn register(&self, name: &str, raw: RawGrammar) -> AmbraResult<()> {
        let name = name.to_lowercase();
        let grammar = match Grammar::from_raw(&name, raw) {
            Ok(g) => g,
            Err(e) => {
                #[cfg(feature = "debug")]
                log::warn!("[Registry::register] failed to compile {name}: {e}");
                return Err(e);
            }
        };

        let aliases = grammar.aliases.clone();
        self.grammars.pin().insert(name.clone(), Arc::new(grammar));
        // a grammar registered again only keeps the aliases it declares now
        self.remove_aliases_of(&name);
        self.register_aliases(&aliases, &name);

        #[cfg(feature = "debug")]
        log::debug!("[Registry::register] registered {name} with aliases {aliases:?}");
        Ok(())
    }

    /// Same as `register` for grammars built in Rust
    pub fn register_with(&self, name: &str, factory: impl FnOnce() -> RawGrammar) -> AmbraResult<()> {
        self.register(name, factory())
    }

    /// Reads the JSON definition and adds it under the file name, without extension.
    pub fn add_grammar_from_path(&self, path: impl AsRef<Path>) -> AmbraResult<()> {
        let path = path.as_ref();
        let raw = RawGrammar::load_from_file(path)?;
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_owned(),
            None if !raw.name.is_empty() => raw.name.clone(),
            None => {
                return Err(Error::Definition {
                    grammar: path.display().to_string(),
                    message: "cannot name a grammar without a file name".to_owned(),
                });
            }
        };
        self.register(&name, raw)
    }

    pub fn add_grammar_from_str(&self, name: &str, content: &str) -> AmbraResult<()> {
        let raw = RawGrammar::load_from_str(content)?;
        self.register(name, raw)
    }

    /// Adds an empty grammar that will not match anything, excluded from auto-detection.
    ///
    /// It will get the `plaintext` grammar name.
    pub fn add_plain_grammar(&self, aliases: &[&str]) -> AmbraResult<()> {
        let raw = RawGrammar {
            name: "Plain text".to_owned(),
            disable_autodetect: true,
            ..Default::default()
        };
        self.register(PLAIN_GRAMMAR_NAME, raw)?;
        self.register_aliases(aliases, PLAIN_GRAMMAR_NAME);
        Ok(())
    }

    /// Removes the grammar and all the aliases pointing to it
    pub fn unregister(&self, name: &str) {
        let name = name.to_lowercase();
        self.grammars.pin().remove(&name);
        self.remove_aliases_of(&name);

        #[cfg(feature = "debug")]
        log::debug!("[Registry::unregister] removed {name}");
    }

    fn remove_aliases_of(&self, name: &str) {
        let aliases = self.aliases.pin();
        let stale: Vec<String> = aliases
            .iter()
            .filter(|(_, target)| *target == name)
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in stale {
            aliases.remove(&alias);
        }
    }

    /// Adds aliases for the given grammar name. Aliases are case-insensitive.
    pub fn register_aliases<S: AsRef<str>>(&self, aliases: &[S], name: &str) {
        let map = self.aliases.pin();
        for alias in aliases {
            map.insert(alias.as_ref().to_lowercase(), name.to_lowercase());
        }
    }

    /// Finds a grammar by name or alias
    pub fn get_grammar(&self, name: &str) -> Option<Arc<Grammar>> {
        let name = name.to_lowercase();
        let grammars = self.grammars.pin();
        if let Some(grammar) = grammars.get(name.as_str()) {
            return Some(Arc::clone(grammar));
        }
        let aliases = self.aliases.pin();
        let target = aliases.get(name.as_str())?;
        grammars.get(target.as_str()).cloned()
    }

    /// Checks whether the given lang is available in the registry with its grammar name
    /// or aliases
    pub fn contains_grammar(&self, name: &str) -> bool {
        self.get_grammar(name).is_some()
    }

    /// All registered grammar names, sorted
    pub fn list_grammars(&self) -> Vec<String> {
        let mut names: Vec<String> = self.grammars.pin().iter().map(|(k, _)| k.clone()).collect();
        names.sort();
        names
    }

    /// Whether the grammar exists and takes part in auto-detection
    pub fn autodetection(&self, name: &str) -> bool {
        self.get_grammar(name)
            .is_some_and(|g| !g.disable_autodetect)
    }

    /// Adds a plugin, run around every following scan after the ones already added
    pub fn add_plugin(&self, plugin: Plugin) {
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin);
    }

    fn plugins_snapshot(&self) -> Vec<Plugin> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Restricts auto-detection to those grammars when `scan_auto` isn't given candidates.
    /// An empty list means every grammar again.
    pub fn set_default_candidates<S: AsRef<str>>(&self, candidates: &[S]) {
        *self
            .default_candidates
            .write()
            .unwrap_or_else(PoisonError::into_inner) = candidates
            .iter()
            .map(|c| c.as_ref().to_lowercase())
            .collect();
    }

    pub fn default_candidates(&self) -> Vec<String> {
        self.default_candidates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The main entry point: scans the text with the grammar given in the options.
    ///
    /// When scanning leniently (the default), illegal lexemes and scanner failures give a
    /// result with the text unscoped and a diagnostic instead of an error.
    pub fn scan(&self, text: &str, options: &ScanOptions) -> AmbraResult<ScanResult> {
        let plugins = self.plugins_snapshot();
        if plugins.is_empty() {
            return self.scan_with_grammar(text, options);
        }

        let mut context = ScanContext {
            text: text.to_owned(),
            language: Some(options.language.to_owned()),
            result: None,
        };
        run_before(&plugins, &mut context);
        let mut result = match context.result {
            Some(result) => result,
            None => {
                let language = context.language.as_deref().unwrap_or(options.language);
                let options = ScanOptions {
                    language,
                    ..options.clone()
                };
                self.scan_with_grammar(&context.text, &options)?
            }
        };
        run_after(&plugins, &mut result);
        Ok(result)
    }

    fn scan_with_grammar(&self, text: &str, options: &ScanOptions) -> AmbraResult<ScanResult> {
        let Some(grammar) = self.get_grammar(options.language) else {
            if options.fallback_to_plain {
                return Ok(ScanResult::plain(PLAIN_GRAMMAR_NAME, text));
            }
            return Err(Error::GrammarNotFound(options.language.to_owned()));
        };

        let scanned = scan_grammar(self, &grammar, text, ScanConfig::from(options), None)?;
        Ok(scanned.result)
    }

    /// Finds the most relevant grammar for the text among the candidates. Without candidates,
    /// the default ones are used if set, or every grammar allowing auto-detection.
    pub fn scan_auto(&self, text: &str, candidates: Option<&[&str]>) -> ScanResult {
        let plugins = self.plugins_snapshot();
        if plugins.is_empty() {
            return self.detect_among(text, candidates);
        }

        let mut context = ScanContext {
            text: text.to_owned(),
            language: None,
            result: None,
        };
        run_before(&plugins, &mut context);
        let mut result = match context.result {
            Some(result) => result,
            None => self.detect_among(&context.text, candidates),
        };
        run_after(&plugins, &mut result);
        result
    }

    fn detect_among(&self, text: &str, candidates: Option<&[&str]>) -> ScanResult {
        if candidates.is_some() {
            return detect(self, text, candidates, ScanLimits::default());
        }
        let defaults = self.default_candidates();
        if defaults.is_empty() {
            detect(self, text, None::<&[&str]>, ScanLimits::default())
        } else {
            detect(self, text, Some(defaults.as_slice()), ScanLimits::default())
        }
    }

    #[cfg(feature = "dump")]
    /// Dump every grammar definition and alias to a compressed file that can be loaded later.
    ///
    /// Grammars using custom hooks can't be dumped.
    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> AmbraResult<()> {
        let mut bundle = GrammarBundle::default();
        for (name, grammar) in self.grammars.pin().iter() {
            bundle.grammars.insert(name.clone(), grammar.raw().clone());
        }
        for (alias, name) in self.aliases.pin().iter() {
            bundle.aliases.insert(alias.clone(), name.clone());
        }

        let json = serde_json::to_vec(&bundle)?;
        let compressed = zstd::encode_all(json.as_slice(), 0)?;
        std::fs::write(path, compressed)?;
        Ok(())
    }

    #[cfg(feature = "dump")]
    /// Read a dump made by `dump_to_file` and compile all its grammars
    pub fn load_from_file(path: impl AsRef<Path>) -> AmbraResult<Self> {
        let compressed = std::fs::read(path)?;
        let json = zstd::decode_all(compressed.as_slice())?;
        let bundle: GrammarBundle = serde_json::from_slice(&json)?;

        let registry = Self::default();
        for (name, raw) in bundle.grammars {
            registry.register(&name, raw)?;
        }
        for (alias, name) in bundle.aliases {
            registry.register_aliases(&[alias], &name);
        }
        Ok(registry)
    }
}
