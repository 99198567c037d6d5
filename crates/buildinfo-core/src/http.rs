//! Blocking REST adapter for an Artifactory-style repository.

use crate::build::{AggregatedBuild, ModuleFragment};
use crate::client::{ClientFactory, RepositoryClient};
use crate::config::{PublishConfig, RepositoryEndpoint, RetentionConfig};
use crate::deploy::DeployDetail;
use crate::error::{BuildInfoError, Result};
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Proxy, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn connect(
        &self,
        endpoint: &RepositoryEndpoint,
        config: &PublishConfig,
    ) -> Result<Box<dyn RepositoryClient>> {
        Ok(Box::new(HttpRepositoryClient::new(endpoint, config)?))
    }
}

pub struct HttpRepositoryClient {
    http: Client,
    base_url: Url,
    username: String,
    password: String,
    retries: u32,
}

impl HttpRepositoryClient {
    pub fn new(endpoint: &RepositoryEndpoint, config: &PublishConfig) -> Result<Self> {
        let base_url = Url::parse(&endpoint.context_url).map_err(|e| {
            BuildInfoError::Config(format!("invalid context_url '{}': {e}", endpoint.context_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BuildInfoError::Config(format!(
                "context_url '{}' cannot carry a path",
                endpoint.context_url
            )));
        }
        let timeout = config
            .timeout()
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("buildinfo/", env!("CARGO_PKG_VERSION")));

        if config.proxy.is_configured() {
            let host = config.proxy.host.as_deref().unwrap_or_default().trim();
            let port = config.proxy.port.unwrap_or_default();
            let mut proxy = Proxy::all(format!("http://{host}:{port}"))?;
            if config.proxy.has_credentials() {
                proxy = proxy.basic_auth(
                    config.proxy.username.as_deref().unwrap_or_default(),
                    config.proxy.password.as_deref().unwrap_or_default(),
                );
            }
            debug!(host, port, "using proxy");
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            retries: config.connection_retries.unwrap_or(DEFAULT_RETRIES),
        })
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        if self.username.is_empty() {
            req
        } else {
            req.basic_auth(&self.username, Some(&self.password))
        }
    }

    /// Send with retries on connection-level failures only. HTTP error
    /// statuses are returned to the caller as-is.
    fn send(&self, make: impl Fn() -> Result<RequestBuilder>) -> Result<Response> {
        let mut attempt = 0;
        loop {
            match self.authorize(make()?).send() {
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, max = self.retries, error = %e, "retrying request");
                    std::thread::sleep(RETRY_BACKOFF * attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The base URL with `segments` appended, each percent-encoded.
    fn url<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `{base}/{repo}/{path};k=v...`, properties as matrix params.
    fn deploy_url(&self, detail: &DeployDetail) -> Url {
        let segments = std::iter::once(detail.target_repository.as_str())
            .chain(detail.artifact_path.trim_start_matches('/').split('/'));
        let mut url = self.url(segments);
        let mut path = url.path().to_string();
        for (k, v) in &detail.properties {
            path.push(';');
            path.push_str(&encode(k));
            path.push('=');
            path.push_str(&encode(v));
        }
        url.set_path(&path);
        url
    }
}

impl RepositoryClient for HttpRepositoryClient {
    fn deploy_artifact(&mut self, detail: &DeployDetail) -> Result<()> {
        let url = self.deploy_url(detail);
        let resp = self.send(|| {
            let file = std::fs::File::open(&detail.file)?;
            let mut req = self.http.put(url.clone()).body(file);
            if let Some(sha1) = &detail.checksums.sha1 {
                req = req.header("X-Checksum-Sha1", sha1);
            }
            if let Some(sha256) = &detail.checksums.sha256 {
                req = req.header("X-Checksum-Sha256", sha256);
            }
            if let Some(md5) = &detail.checksums.md5 {
                req = req.header("X-Checksum-Md5", md5);
            }
            Ok(req)
        });
        let resp = resp.map_err(|e| BuildInfoError::Deploy {
            path: detail.artifact_path.clone(),
            message: e.to_string(),
        })?;
        check(resp).map_err(|message| BuildInfoError::Deploy {
            path: detail.artifact_path.clone(),
            message,
        })?;
        debug!(path = %detail.artifact_path, repo = %detail.target_repository, "deployed");
        Ok(())
    }

    fn send_module_info(&mut self, build: &AggregatedBuild) -> Result<()> {
        let url = self.url([
            "api",
            "build",
            "append",
            build.name.as_str(),
            build.number.as_str(),
        ]);
        let modules: &[ModuleFragment] = &build.modules;
        let resp = self
            .send(|| Ok(self.http.post(url.clone()).json(modules)))
            .map_err(publish_error)?;
        check(resp).map_err(BuildInfoError::Publish)?;
        info!(name = %build.name, number = %build.number, modules = modules.len(), "appended module info");
        Ok(())
    }

    fn send_build_and_retention(
        &mut self,
        build: &AggregatedBuild,
        config: &PublishConfig,
    ) -> Result<()> {
        let url = self.url(["api", "build"]);
        let resp = self
            .send(|| Ok(self.http.put(url.clone()).json(build)))
            .map_err(publish_error)?;
        check(resp).map_err(BuildInfoError::Publish)?;
        info!(name = %build.name, number = %build.number, "sent build info");

        if let Some(retention) = config.build.retention.as_ref().filter(|r| r.is_enabled()) {
            let mut url = self.url(["api", "build", "retention", build.name.as_str()]);
            url.query_pairs_mut()
                .append_pair("async", &retention.async_delete.to_string());
            let body = RetentionRequest::from_config(retention);
            let resp = self
                .send(|| Ok(self.http.post(url.clone()).json(&body)))
                .map_err(publish_error)?;
            check(resp).map_err(BuildInfoError::Publish)?;
            debug!(name = %build.name, "applied build retention");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Connections are pooled by reqwest and dropped with the client.
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetentionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_build_date: Option<i64>,
    delete_build_artifacts: bool,
    build_numbers_not_to_be_discarded: Vec<String>,
}

impl RetentionRequest {
    fn from_config(retention: &RetentionConfig) -> Self {
        Self {
            count: retention.max_builds,
            minimum_build_date: retention.max_days.map(|days| {
                (Utc::now() - ChronoDuration::days(i64::from(days))).timestamp_millis()
            }),
            delete_build_artifacts: retention.delete_build_artifacts,
            build_numbers_not_to_be_discarded: retention.exclude_builds.clone(),
        }
    }
}

fn check(resp: Response) -> std::result::Result<(), String> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().unwrap_or_default();
    Err(format!("HTTP {status}: {}", body.trim()))
}

fn publish_error(e: BuildInfoError) -> BuildInfoError {
    match e {
        BuildInfoError::Publish(_) => e,
        other => BuildInfoError::Publish(other.to_string()),
    }
}

/// Percent-encode a matrix param key or value. `;` and `=` are legal inside
/// a path segment, so the segment encoder would leave them alone.
fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
