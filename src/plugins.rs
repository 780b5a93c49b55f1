use std::fmt;
use std::sync::Arc;

use crate::scanner::ScanResult;

pub type BeforeScanFn = dyn Fn(&mut ScanContext) + Send + Sync;
pub type AfterScanFn = dyn Fn(&mut ScanResult) + Send + Sync;

/// What a plugin sees before a text gets scanned
#[derive(Debug, Clone, PartialEq)]
pub struct ScanContext {
    /// The text about to be scanned. Plugins can rewrite it.
    pub text: String,
    /// The requested grammar, `None` when auto-detecting.
    /// Changing it only has an effect when scanning with a given grammar.
    pub language: Option<String>,
    /// Set it to skip scanning altogether and use that result instead
    pub result: Option<ScanResult>,
}

/// Callbacks run around every scan made through a [`Registry`](crate::Registry), in the order
/// the plugins were added.
#[derive(Clone, Default)]
pub struct Plugin {
    pub(crate) before_scan: Option<Arc<BeforeScanFn>>,
    pub(crate) after_scan: Option<Arc<AfterScanFn>>,
}

impl Plugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before scanning, with the text and grammar asked for. It can provide the result
    /// itself.
    pub fn before_scan(mut self, f: impl Fn(&mut ScanContext) + Send + Sync + 'static) -> Self {
        self.before_scan = Some(Arc::new(f));
        self
    }

    /// Runs on every result, including the ones provided by a `before_scan` callback.
    pub fn after_scan(mut self, f: impl Fn(&mut ScanResult) + Send + Sync + 'static) -> Self {
        self.after_scan = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("before_scan", &self.before_scan.is_some())
            .field("after_scan", &self.after_scan.is_some())
            .finish()
    }
}

pub(crate) fn run_before(plugins: &[Plugin], context: &mut ScanContext) {
    for before in plugins.iter().filter_map(|p| p.before_scan.as_ref()) {
        before(context);
    }
}

pub(crate) fn run_after(plugins: &[Plugin], result: &mut ScanResult) {
    for after in plugins.iter().filter_map(|p| p.after_scan.as_ref()) {
        after(result);
    }
}
