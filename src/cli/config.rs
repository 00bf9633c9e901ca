use std::sync::Arc;

use anyhow::Context;

use crate::client::{AssistantClient, HostClient};
use crate::config::config;
use crate::session::{FileSessionStore, Session};

/// The persisted host session the CLI commands share.
pub fn open_session() -> anyhow::Result<Session> {
    let dir = FileSessionStore::default_dir().context("cannot locate the session directory")?;
    let store = FileSessionStore::open(&dir)
        .with_context(|| format!("cannot open session directory {}", dir.display()))?;
    tracing::debug!("Using session store at {}", store.dir().display());
    Ok(Session::new(Arc::new(store), config().storage.clone()))
}

pub fn host_client() -> anyhow::Result<HostClient> {
    HostClient::new(&config().host.base_url).context("failed to build host client")
}

pub fn assistant_client() -> anyhow::Result<AssistantClient> {
    AssistantClient::new(&config().assistant.base_url).context("failed to build assistant client")
}
