//! Shared HTTP client for the site and its embed hosts.
//!
//! Features:
//! - One connection pool for catalog, playlist and embed fetches
//! - Fixed default headers from [`SourceConfig`], `Referer` overridable per fetch
//! - Per-request timeout from the config (no fetch blocks indefinitely)
//! - DLE AJAX helper (`X-Requested-With`) and form POST for search

use std::sync::Arc;

use reqwest::header::REFERER;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, instrument};

use crate::config::SourceConfig;
use crate::error::{Result, SourceError};

/// HTTP client bound to one [`SourceConfig`].
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct SiteClient {
    client: Client,
    config: Arc<SourceConfig>,
}

impl SiteClient {
    /// Validate `config` and build the pooled client.
    ///
    /// Cookies persist across requests so the AJAX side channel sees the
    /// session the episode page set.
    pub fn new(config: SourceConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            // Let the server negotiate HTTP/2
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .default_headers(config.default_headers()?)
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Settings this client was built with.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// GET a URL as text, optionally overriding the default `Referer`.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_text(&self, url: &str, referer: Option<&str>) -> Result<String> {
        debug!("Fetching");
        let mut req = self.client.get(url);
        if let Some(referer) = referer {
            req = req.header(REFERER, referer);
        }
        Self::send_text(url, req).await
    }

    /// GET a DLE AJAX endpoint.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_ajax(&self, url: &str, referer: &str) -> Result<String> {
        debug!("Fetching AJAX fragment");
        let req = self
            .client
            .get(url)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, referer);
        Self::send_text(url, req).await
    }

    /// POST an urlencoded form.
    #[instrument(skip(self, form), fields(url = %url))]
    pub async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<String> {
        debug!("Posting form");
        let req = self.client.post(url).form(form);
        Self::send_text(url, req).await
    }

    async fn send_text(url: &str, req: RequestBuilder) -> Result<String> {
        let response = req.send().await?;
        let status = response.status();
        debug!(%status, version = ?response.version(), "Response received");

        if !status.is_success() {
            return Err(SourceError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}
