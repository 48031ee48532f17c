//! Lazily-initialized authenticated client
//!
//! `ClientProvider` owns the one API client a run uses. The first caller
//! builds it through a `Connector` (cache, refresh, interactive login) under
//! the write lock; every other caller either waits on that lock or finds
//! the finished client on the read path. A failed connect publishes
//! nothing, so the next call starts over.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;

/// Builds a ready-to-use client, authenticating if needed.
///
/// Uses `Pin<Box<dyn Future>>` so implementations stay object-safe.
pub trait Connector: Send + Sync {
    type Client: Send + Sync;

    fn connect(&self) -> Pin<Box<dyn Future<Output = Result<Self::Client>> + Send + '_>>;
}

/// Double-checked-locking holder for the shared client.
pub struct ClientProvider<C: Connector> {
    connector: C,
    slot: RwLock<Option<Arc<C::Client>>>,
}

impl<C: Connector> ClientProvider<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: RwLock::new(None),
        }
    }

    /// Return the shared client, building it on first use.
    pub async fn get(&self) -> Result<Arc<C::Client>> {
        {
            let slot = self.slot.read().await;
            if let Some(client) = slot.as_ref() {
                return Ok(Arc::clone(client));
            }
        }

        let mut slot = self.slot.write().await;
        if let Some(client) = slot.as_ref() {
            debug!("client was initialized by a concurrent caller");
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(self.connector.connect().await?);
        *slot = Some(Arc::clone(&client));
        info!("authenticated client ready");
        Ok(client)
    }

    pub async fn is_initialized(&self) -> bool {
        self.slot.read().await.is_some()
    }
}
