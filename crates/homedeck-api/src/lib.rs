// homedeck-api: Async client for the designer server API and the hub entity feed

pub mod auth;
pub mod client;
pub mod components;
pub mod error;
pub mod feed;
pub mod transport;

pub use client::DesignerClient;
pub use error::{ApiFailure, Error, ErrorDetail, FailureKind, MessageSink, TracingSink};
pub use feed::{EntityUpdate, FeedHandle, FeedStatus, ReconnectPolicy, StateFrame};
pub use transport::{TlsMode, TransportConfig};
