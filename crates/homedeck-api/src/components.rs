// Component source endpoint
//
// Widget modules are served as executable code at
// `{base}/components/{name}`. Fetching is by URL so the loader's
// dedup set and this client agree on the identity of a module.

use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::client::DesignerClient;
use crate::error::Error;

impl DesignerClient {
    /// The source URL for a logical widget name.
    pub fn component_url(&self, name: &str) -> Url {
        self.url(&format!("components/{name}"))
    }

    /// Fetch a widget module's source by URL.
    ///
    /// `GET /components/{name}`
    pub async fn fetch_component(&self, url: &Url) -> Result<Bytes, Error> {
        debug!(url = %url, "fetching widget module");
        self.get_bytes(url.clone(), None).await
    }
}
