// homedeck-core: Dynamic widget host and live-state synchronization layer.
//
// Bridges two worlds with no compile-time contract between them: a widget
// registry fed by late-bound module code, and a streaming hub connection
// whose snapshots fan out to every mounted widget that can accept them.

pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod model;
pub mod mount;
pub mod session;
pub mod widget;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::AuthService;
pub use config::DeckConfig;
pub use error::CoreError;
pub use hub::{ConnectionState, HubLink};
pub use model::{Entity, EntityId, EntitySnapshot};
pub use mount::Mount;
pub use session::{BusyGuard, Session};
pub use widget::loader::{ApiModuleSource, ModuleRuntime, ModuleSource, WidgetLoader};
pub use widget::registry::{WidgetFactory, WidgetRegistry};
pub use widget::{ConfigurableWidget, StatefulWidget, Widget};

// Re-export the transport-level types consumers need to build a host.
pub use homedeck_api::auth::{AccessToken, HubToken, RefreshedToken, User};
pub use homedeck_api::{DesignerClient, MessageSink, ReconnectPolicy, TracingSink};
