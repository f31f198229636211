// ── Mount container & fan-out ──
//
// The host-side stand-in for the dashboard's widget container: a list of
// slots placed by the editor, each holding at most one live instance.
// A placed slot stays empty until its tag is defined and `upgrade` runs.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::model::EntitySnapshot;
use crate::widget::registry::WidgetRegistry;
use crate::widget::{Widget, push_state};

struct Slot {
    tag: String,
    instance: Option<Box<dyn Widget>>,
}

/// Container of mounted widgets under one dashboard view.
pub struct Mount {
    widget_prefix: String,
    slots: Mutex<Vec<Slot>>,
}

impl Mount {
    pub fn new(widget_prefix: impl Into<String>) -> Self {
        Self {
            widget_prefix: widget_prefix.into(),
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Place an empty slot for `tag`. The editor does this when the user
    /// drops a widget on the page, usually before the module has loaded.
    pub fn place(&self, tag: impl Into<String>) {
        let tag = tag.into();
        debug!(tag, "widget slot placed");
        self.slots
            .lock()
            .expect("mount lock poisoned")
            .push(Slot { tag, instance: None });
    }

    /// Remove every slot for `tag`, dropping any live instances.
    pub fn remove(&self, tag: &str) {
        self.slots
            .lock()
            .expect("mount lock poisoned")
            .retain(|slot| slot.tag != tag);
    }

    /// Materialize every empty slot whose tag is now defined.
    ///
    /// This is the "rendering pass": instances appear here and nowhere
    /// else.
    pub fn upgrade(&self, registry: &WidgetRegistry) {
        let mut slots = self.slots.lock().expect("mount lock poisoned");
        for slot in slots.iter_mut() {
            if slot.instance.is_none() {
                if let Some(instance) = registry.instantiate(&slot.tag) {
                    debug!(tag = slot.tag, "widget slot upgraded");
                    slot.instance = Some(instance);
                }
            }
        }
    }

    /// Run `f` against the first live instance of `tag`, if any.
    pub fn with_widget<R>(&self, tag: &str, f: impl FnOnce(&mut dyn Widget) -> R) -> Option<R> {
        let mut slots = self.slots.lock().expect("mount lock poisoned");
        slots
            .iter_mut()
            .find(|slot| slot.tag == tag)
            .and_then(|slot| slot.instance.as_mut())
            .map(|instance| f(instance.as_mut()))
    }

    /// Fan a snapshot out to every live widget carrying the prefix.
    ///
    /// Delivery is independent per widget: `push_state` absorbs widget
    /// panics, so one broken widget cannot skip the ones after it. The
    /// full snapshot goes to everyone -- no diffing.
    pub fn broadcast(&self, snapshot: &Arc<EntitySnapshot>) {
        let mut slots = self.slots.lock().expect("mount lock poisoned");
        for slot in slots.iter_mut() {
            if !slot.tag.starts_with(&self.widget_prefix) {
                continue;
            }
            if let Some(instance) = slot.instance.as_mut() {
                push_state(instance.as_mut(), snapshot);
            }
        }
    }

    /// Number of live instances (placed-but-unloaded slots don't count).
    pub fn live_count(&self) -> usize {
        self.slots
            .lock()
            .expect("mount lock poisoned")
            .iter()
            .filter(|slot| slot.instance.is_some())
            .count()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
