// ── Widget module loader ──
//
// Fetch-execute-wait-prime, in that order, for every widget name. The
// fetch is deduplicated process-wide: a name maps to exactly one source
// URL, and that URL is requested at most once, even when concurrent
// loads race for it and even when the first request failed. Late callers
// skip straight to the registration wait.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error};
use url::Url;

use homedeck_api::DesignerClient;

use crate::config::DeckConfig;
use crate::mount::Mount;
use crate::session::Session;
use crate::widget::registry::WidgetRegistry;
use crate::widget::{apply_config, push_state};

/// The default configuration pushed into freshly loaded widgets.
pub const DEFAULT_WIDGET_CONFIG: &str = "{}";

// ── Seams ────────────────────────────────────────────────────────────

/// Where module code comes from.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Bytes, homedeck_api::Error>;
}

/// `ModuleSource` backed by the designer server's component endpoint.
pub struct ApiModuleSource {
    client: Arc<DesignerClient>,
}

impl ApiModuleSource {
    pub fn new(client: Arc<DesignerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ModuleSource for ApiModuleSource {
    async fn fetch(&self, url: &Url) -> Result<Bytes, homedeck_api::Error> {
        self.client.fetch_component(url).await
    }
}

/// Executes fetched module code.
///
/// Execution is whatever the embedder makes it -- a script engine, a wasm
/// runtime. The only contract is the side effect: well-behaved module
/// code calls [`WidgetRegistry::define`] for its tag before returning.
pub trait ModuleRuntime: Send + Sync {
    fn execute(
        &self,
        code: &[u8],
        registry: &WidgetRegistry,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

// ── Loader ───────────────────────────────────────────────────────────

/// Loads widget modules and primes the resulting instances.
pub struct WidgetLoader {
    source: Arc<dyn ModuleSource>,
    runtime: Arc<dyn ModuleRuntime>,
    registry: Arc<WidgetRegistry>,
    server_url: Url,
    widget_prefix: String,
    requested: Mutex<HashSet<Url>>,
}

impl WidgetLoader {
    pub fn new(
        config: &DeckConfig,
        source: Arc<dyn ModuleSource>,
        runtime: Arc<dyn ModuleRuntime>,
        registry: Arc<WidgetRegistry>,
    ) -> Self {
        Self {
            source,
            runtime,
            registry,
            server_url: config.server_url.clone(),
            widget_prefix: config.widget_prefix.clone(),
            requested: Mutex::new(HashSet::new()),
        }
    }

    /// The source URL for a logical widget name.
    pub fn source_url(&self, name: &str) -> Url {
        let full = format!(
            "{}/components/{}",
            self.server_url.as_str().trim_end_matches('/'),
            name
        );
        Url::parse(&full).expect("invalid component URL")
    }

    /// The runtime tag for a logical widget name.
    pub fn tag_name(&self, name: &str) -> String {
        format!("{}{}", self.widget_prefix, name)
    }

    /// Load a widget module, wait for its registration, and prime the
    /// mounted instance.
    ///
    /// `on_loaded` fires once with `true` on a fetch/execute failure
    /// (after which nothing else happens) or `false` as soon as the
    /// module has run -- before the registration wait, so callers can
    /// update their UI during the slow phase. No error escapes this
    /// function; the registration wait is unbounded.
    pub async fn load(
        &self,
        mount: &Mount,
        session: &Session,
        name: &str,
        on_loaded: impl FnOnce(bool) + Send,
    ) {
        let url = self.source_url(name);
        let tag = self.tag_name(name);

        // A failed request also counts as requested: retrying a broken
        // module within the same process is the editor's problem, not
        // the loader's.
        let first_request = self
            .requested
            .lock()
            .expect("loader lock poisoned")
            .insert(url.clone());

        if first_request {
            let code = match self.source.fetch(&url).await {
                Ok(code) => code,
                Err(e) => {
                    error!(name, url = %url, error = %e, "widget module fetch failed");
                    on_loaded(true);
                    return;
                }
            };

            if let Err(e) = self.runtime.execute(&code, &self.registry) {
                error!(name, error = %e, "widget module execution failed");
                on_loaded(true);
                return;
            }
        } else {
            debug!(name, "module already requested, skipping fetch");
        }

        on_loaded(false);

        self.registry.when_defined(&tag).await;

        // One rendering pass so the instance is queryable in the mount.
        tokio::task::yield_now().await;
        mount.upgrade(&self.registry);

        // The editor may have removed the placeholder while we loaded;
        // in that case there is nothing to prime and nothing to report.
        let _ = mount.with_widget(&tag, |widget| {
            apply_config(widget, DEFAULT_WIDGET_CONFIG);

            if let Some(snapshot) = session.entities() {
                push_state(widget, &snapshot);
            }
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::model::{Entity, EntityId, EntitySnapshot};
    use crate::widget::{ConfigurableWidget, StatefulWidget, Widget};

    // A source that serves every URL and counts fetches.
    struct CountingSource {
        fetches: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ModuleSource for CountingSource {
        async fn fetch(&self, _url: &Url) -> Result<Bytes, homedeck_api::Error> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent loads interleave like real requests.
            tokio::task::yield_now().await;
            if self.fail {
                Err(homedeck_api::Error::WebSocketConnect("404".into()))
            } else {
                Ok(Bytes::from_static(b"module code"))
            }
        }
    }

    // A runtime that defines `cwc-{code ignored}` recording widgets.
    struct DefiningRuntime {
        tag: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ModuleRuntime for DefiningRuntime {
        fn execute(
            &self,
            _code: &[u8],
            registry: &WidgetRegistry,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let tag = self.tag.clone();
            let log = Arc::clone(&self.log);
            registry.define(
                self.tag.clone(),
                Box::new(move || {
                    Box::new(Probe {
                        tag: tag.clone(),
                        log: Arc::clone(&log),
                    })
                }),
            );
            Ok(())
        }
    }

    struct Probe {
        tag: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Widget for Probe {
        fn tag(&self) -> &str {
            &self.tag
        }

        fn as_stateful(&mut self) -> Option<&mut dyn StatefulWidget> {
            Some(self)
        }

        fn as_configurable(&mut self) -> Option<&mut dyn ConfigurableWidget> {
            Some(self)
        }
    }

    impl StatefulWidget for Probe {
        fn set_state(&mut self, snapshot: Arc<EntitySnapshot>) {
            self.log
                .lock()
                .expect("log lock")
                .push(format!("state:{}", snapshot.len()));
        }
    }

    impl ConfigurableWidget for Probe {
        fn configure(&mut self, config: &str) {
            self.log
                .lock()
                .expect("log lock")
                .push(format!("config:{config}"));
        }
    }

    fn loader_with(
        source: Arc<dyn ModuleSource>,
        runtime: Arc<dyn ModuleRuntime>,
    ) -> (WidgetLoader, Arc<WidgetRegistry>) {
        let registry = Arc::new(WidgetRegistry::new());
        let loader = WidgetLoader::new(
            &DeckConfig::default(),
            source,
            runtime,
            Arc::clone(&registry),
        );
        (loader, registry)
    }

    fn one_entity_snapshot() -> Arc<EntitySnapshot> {
        let mut entities = std::collections::HashMap::new();
        entities.insert(
            EntityId::from("light.kitchen"),
            Entity {
                state: json!("on"),
                attributes: serde_json::Map::new(),
            },
        );
        Arc::new(EntitySnapshot::new(entities))
    }

    #[test]
    fn url_and_tag_derivation() {
        let (loader, _) = loader_with(
            CountingSource::new(false),
            Arc::new(DefiningRuntime {
                tag: "cwc-clock-widget".into(),
                log: Arc::new(Mutex::new(Vec::new())),
            }),
        );

        assert_eq!(
            loader.source_url("clock-widget").as_str(),
            "http://127.0.0.1:5000/components/clock-widget"
        );
        assert_eq!(loader.tag_name("clock-widget"), "cwc-clock-widget");
    }

    #[tokio::test]
    async fn cold_mount_primes_config_then_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = CountingSource::new(false);
        let runtime = Arc::new(DefiningRuntime {
            tag: "cwc-clock-widget".into(),
            log: Arc::clone(&log),
        });
        let (loader, _) = loader_with(source.clone(), runtime);

        let session = Session::new(None);
        session.set_entities(one_entity_snapshot());

        let mount = Mount::new("cwc-");
        mount.place("cwc-clock-widget");

        let loaded_ok = AtomicBool::new(false);
        loader
            .load(&mount, &session, "clock-widget", |had_error| {
                loaded_ok.store(!had_error, Ordering::SeqCst);
            })
            .await;

        assert!(loaded_ok.load(Ordering::SeqCst));
        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["config:{}".to_owned(), "state:1".to_owned()]
        );
    }

    #[tokio::test]
    async fn no_stored_snapshot_means_no_state_push() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = CountingSource::new(false);
        let runtime = Arc::new(DefiningRuntime {
            tag: "cwc-clock-widget".into(),
            log: Arc::clone(&log),
        });
        let (loader, _) = loader_with(source, runtime);

        let session = Session::new(None);
        let mount = Mount::new("cwc-");
        mount.place("cwc-clock-widget");

        loader.load(&mount, &session, "clock-widget", |_| {}).await;

        assert_eq!(*log.lock().expect("log lock"), vec!["config:{}".to_owned()]);
    }

    #[tokio::test]
    async fn concurrent_loads_fetch_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = CountingSource::new(false);
        let runtime = Arc::new(DefiningRuntime {
            tag: "cwc-clock-widget".into(),
            log,
        });
        let (loader, _) = loader_with(source.clone(), runtime);

        let session = Session::new(None);
        let mount = Mount::new("cwc-");
        mount.place("cwc-clock-widget");

        let callbacks = AtomicUsize::new(0);
        tokio::join!(
            loader.load(&mount, &session, "clock-widget", |had_error| {
                assert!(!had_error);
                callbacks.fetch_add(1, Ordering::SeqCst);
            }),
            loader.load(&mount, &session, "clock-widget", |had_error| {
                assert!(!had_error);
                callbacks.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(callbacks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_reports_and_aborts() {
        let source = CountingSource::new(true);
        let runtime = Arc::new(DefiningRuntime {
            tag: "cwc-missing-widget".into(),
            log: Arc::new(Mutex::new(Vec::new())),
        });
        let (loader, registry) = loader_with(source, runtime);

        let session = Session::new(None);
        let mount = Mount::new("cwc-");

        let had_error = AtomicBool::new(false);
        // Completing at all proves the registration wait was skipped:
        // nothing ever defines this tag.
        tokio::time::timeout(
            Duration::from_secs(1),
            loader.load(&mount, &session, "missing-widget", |e| {
                had_error.store(e, Ordering::SeqCst);
            }),
        )
        .await
        .expect("load returned without a registration wait");

        assert!(had_error.load(Ordering::SeqCst));
        assert!(!registry.is_defined("cwc-missing-widget"));
    }

    #[tokio::test]
    async fn removed_placeholder_is_not_an_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = CountingSource::new(false);
        let runtime = Arc::new(DefiningRuntime {
            tag: "cwc-clock-widget".into(),
            log: Arc::clone(&log),
        });
        let (loader, _) = loader_with(source, runtime);

        let session = Session::new(None);
        let mount = Mount::new("cwc-");
        // No placeholder: the editor dropped it while the module loaded.

        loader.load(&mount, &session, "clock-widget", |_| {}).await;

        assert!(log.lock().expect("log lock").is_empty());
    }
}
