//! The "deploy this artifact / publish this build" capability.
//!
//! The coordinator never talks HTTP itself. It opens a client through a
//! [`ClientFactory`] and holds it in a [`ClientGuard`] so the connection is
//! closed on every exit path.

use crate::build::AggregatedBuild;
use crate::config::{PublishConfig, RepositoryEndpoint};
use crate::deploy::DeployDetail;
use crate::error::Result;
use std::ops::{Deref, DerefMut};
use tracing::warn;

pub trait RepositoryClient {
    fn deploy_artifact(&mut self, detail: &DeployDetail) -> Result<()>;

    /// Incremental publish: push the build's modules onto an existing record.
    fn send_module_info(&mut self, build: &AggregatedBuild) -> Result<()>;

    /// Full publish: send the record, then apply retention if configured.
    fn send_build_and_retention(
        &mut self,
        build: &AggregatedBuild,
        config: &PublishConfig,
    ) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

pub trait ClientFactory: Send + Sync {
    fn connect(
        &self,
        endpoint: &RepositoryEndpoint,
        config: &PublishConfig,
    ) -> Result<Box<dyn RepositoryClient>>;
}

/// Owns an open client and closes it when dropped.
pub struct ClientGuard {
    client: Box<dyn RepositoryClient>,
    closed: bool,
}

impl ClientGuard {
    pub fn new(client: Box<dyn RepositoryClient>) -> Self {
        Self {
            client,
            closed: false,
        }
    }

    /// Close now and surface the error instead of logging it on drop.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.client.close()
    }
}

impl Deref for ClientGuard {
    type Target = dyn RepositoryClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl DerefMut for ClientGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client.as_mut()
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.client.close() {
            warn!(error = %e, "failed to close repository client");
        }
    }
}
