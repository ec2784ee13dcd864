//! `PlatformProvider` implementation fanning out across per-kind handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{DriftError, ErrorCode};
use crate::model::{not_implemented, PlatformProvider, PlatformResource, ResourceKind};
use crate::provider::handlers::ResourceHandler;

/// Registry of `kind -> handler`, fanned out per requested kind using a
/// `JoinSet` that shares one `CancellationToken`.
pub struct AwsPlatformProvider {
    handlers: BTreeMap<ResourceKind, Arc<dyn ResourceHandler>>,
}

impl AwsPlatformProvider {
    pub fn new(handlers: Vec<Arc<dyn ResourceHandler>>) -> Self {
        let handlers = handlers.into_iter().map(|h| (h.kind(), h)).collect();
        Self { handlers }
    }
}

#[async_trait]
impl PlatformProvider for AwsPlatformProvider {
    fn provider_type(&self) -> &'static str {
        "aws"
    }

    async fn list_resources(
        &self,
        cancel: CancellationToken,
        kinds: &[ResourceKind],
        filters: &BTreeMap<String, String>,
        out: Sender<Arc<PlatformResource>>,
    ) -> Result<(), DriftError> {
        let supported: Vec<&Arc<dyn ResourceHandler>> =
            kinds.iter().filter_map(|k| self.handlers.get(k)).collect();

        if supported.is_empty() {
            return Err(not_implemented(format!(
                "no handler registered for any of {kinds:?}"
            )));
        }

        let mut tasks = JoinSet::new();
        for handler in supported {
            let handler = handler.clone();
            let cancel = cancel.clone();
            let filters = filters.clone();
            let out = out.clone();
            tasks.spawn(async move { handler.list_resources(cancel, &filters, out).await });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| {
                DriftError::new(ErrorCode::Internal, format!("listing task panicked: {e}"))
            })?;
            match result {
                Ok(()) => {}
                Err(e) if e.code == ErrorCode::ResourceNotFound => {
                    tracing::warn!("listing reported not-found, continuing: {e}");
                }
                Err(e) => {
                    cancel.cancel();
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    async fn get_resource(
        &self,
        cancel: &CancellationToken,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Arc<PlatformResource>, DriftError> {
        match self.handlers.get(&kind) {
            Some(handler) => handler.get_resource(cancel, id).await,
            None => Err(not_implemented(format!("no handler registered for {kind}"))),
        }
    }
}
