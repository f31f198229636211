// ── Widget tag registry ──
//
// The explicit stand-in for the runtime's element registry: module code
// defines a tag by handing in a factory, and anyone may suspend until a
// tag becomes defined. First definition wins; there is no undefine.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

use super::Widget;

/// Creates one widget instance per call.
pub type WidgetFactory = Box<dyn Fn() -> Box<dyn Widget> + Send + Sync>;

/// Tag-to-factory registry with async "when defined" waits.
pub struct WidgetRegistry {
    factories: Mutex<HashMap<String, WidgetFactory>>,
    defined: watch::Sender<usize>,
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetRegistry {
    pub fn new() -> Self {
        let (defined, _) = watch::channel(0);
        Self {
            factories: Mutex::new(HashMap::new()),
            defined,
        }
    }

    /// Define a tag. A second definition for the same tag is ignored --
    /// whatever module registered first owns the tag for the process
    /// lifetime.
    pub fn define(&self, tag: impl Into<String>, factory: WidgetFactory) {
        let tag = tag.into();
        let mut factories = self.factories.lock().expect("registry lock poisoned");
        if factories.contains_key(&tag) {
            debug!(tag, "tag already defined, keeping first definition");
            return;
        }
        debug!(tag, "tag defined");
        factories.insert(tag, factory);
        drop(factories);
        self.defined.send_modify(|count| *count += 1);
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.factories
            .lock()
            .expect("registry lock poisoned")
            .contains_key(tag)
    }

    /// Suspend until `tag` is defined.
    ///
    /// There is deliberately no timeout: a module that never registers
    /// its tag leaves this future pending forever, exactly as the
    /// element registry it replaces would. Callers should spawn rather
    /// than block on loads they do not control.
    pub async fn when_defined(&self, tag: &str) {
        let mut rx = self.defined.subscribe();
        loop {
            if self.is_defined(tag) {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender lives in self; this only happens mid-teardown.
                return;
            }
        }
    }

    /// Create an instance of a defined tag.
    pub fn instantiate(&self, tag: &str) -> Option<Box<dyn Widget>> {
        self.factories
            .lock()
            .expect("registry lock poisoned")
            .get(tag)
            .map(|factory| factory())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
