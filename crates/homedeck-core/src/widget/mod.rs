// ── Widget capability layer ──
//
// Widgets are late-bound code with no compile-time contract. The host
// never assumes a capability: it asks, via a safe cast that cannot fail,
// and only then invokes. The invocation itself is the untrusted part --
// it runs under catch_unwind so a malformed widget degrades silently
// instead of taking the dashboard down.

pub mod loader;
pub mod registry;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

use crate::model::EntitySnapshot;

/// A mounted widget instance.
///
/// The base trait carries only identity; capabilities are opt-in via the
/// `as_*` casts, which default to "not supported".
pub trait Widget: Send {
    /// The runtime tag this instance was created under.
    fn tag(&self) -> &str;

    /// Cast to the state-accepting capability, if implemented.
    fn as_stateful(&mut self) -> Option<&mut dyn StatefulWidget> {
        None
    }

    /// Cast to the configurable capability, if implemented.
    fn as_configurable(&mut self) -> Option<&mut dyn ConfigurableWidget> {
        None
    }
}

/// Accepts complete entity snapshots from the host.
pub trait StatefulWidget {
    fn set_state(&mut self, snapshot: Arc<EntitySnapshot>);
}

/// Accepts a serialized configuration string from the host.
pub trait ConfigurableWidget {
    fn configure(&mut self, config: &str);
}

/// Push a snapshot into a widget, if it accepts state.
///
/// Returns whether the widget exposed the capability at all. The call is
/// best-effort: a panic inside the widget is logged and absorbed, never
/// propagated. Capability detection is re-done on every call -- widgets
/// may be replaced in place.
pub fn push_state(widget: &mut dyn Widget, snapshot: &Arc<EntitySnapshot>) -> bool {
    let tag = widget.tag().to_owned();
    let Some(stateful) = widget.as_stateful() else {
        return false;
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        stateful.set_state(Arc::clone(snapshot));
    }));
    if let Err(panic) = outcome {
        warn!(tag, panic = panic_message(&panic), "widget state setter panicked");
    }
    true
}

/// Apply a configuration string to a widget, if it is configurable.
///
/// Same absorb-and-log contract as [`push_state`].
pub fn apply_config(widget: &mut dyn Widget, config: &str) -> bool {
    let tag = widget.tag().to_owned();
    let Some(configurable) = widget.as_configurable() else {
        return false;
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        configurable.configure(config);
    }));
    if let Err(panic) = outcome {
        warn!(tag, panic = panic_message(&panic), "widget configure panicked");
    }
    true
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

// ── Tests ────────────────────────────────────────────────────────────
