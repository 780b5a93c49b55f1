//! Syntax highlighting driven by declarative grammars of nested modes.
//!
//! Grammars are registered in a [`Registry`], which scans text into a [`TokenTree`] with
//! either a given grammar or the most relevant one. Rendering the tree is up to a
//! [`TreeVisitor`], [`HtmlRenderer`] being the one provided.

mod detect;
mod error;
mod grammars;
pub mod modes;
mod options;
mod plugins;
mod registry;
mod renderers;
mod scanner;
mod tree;

pub use error::Error;
pub use grammars::{
    BuiltinHook, CompiledMode, CompilerExtension, ContainsEntry, Grammar, Hook, HookData,
    HookMatch, MatchOutcome, ModeFlags, ModeId, RawGrammar, RawKeywordList, RawKeywords,
    RawMode, RawPattern, RawScope, RawSubLanguage, regex,
};
pub use options::{ScanLimits, ScanOptions};
pub use plugins::{AfterScanFn, BeforeScanFn, Plugin, ScanContext};
pub use registry::{PLAIN_GRAMMAR_NAME, Registry};
pub use renderers::html::{DEFAULT_CLASS_PREFIX, HtmlRenderer};
pub use scanner::{Diagnostic, ScanResult};
pub use tree::{Container, ContainerKind, Node, TokenTree, TreeVisitor};
