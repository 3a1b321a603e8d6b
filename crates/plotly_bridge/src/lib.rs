//! `RenderSurface` implementation backed by a browser tab running Plotly,
//! reached over a WebSocket. Each command carries a correlation id; the page
//! acks it when the matching Plotly promise settles, which resolves the
//! pending oneshot here.

use std::{
    collections::HashMap,
    sync::{Mutex as SyncMutex, MutexGuard, PoisonError},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use map_core::{FrameSpec, RenderSurface, StyleUpdate, SurfaceInit};
use shared::{domain::TransitionSpec, protocol::ServerEvent};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

type AckSender = oneshot::Sender<Result<(), String>>;

/// A rendering surface that may or may not have a browser attached. At most
/// one browser owns the surface; attaching a new one fails every pending
/// request of the previous connection.
pub struct WsRenderSurface {
    outbound: Mutex<Option<mpsc::Sender<ServerEvent>>>,
    pending: SyncMutex<HashMap<Uuid, AckSender>>,
}

/// Removes the pending entry when a `request` future is dropped before its
/// ack arrives (e.g. cancelled by a caller-side timeout). A normal ack has
/// already taken the entry out, so the removal is a no-op then.
struct PendingAck<'a> {
    surface: &'a WsRenderSurface,
    request_id: Uuid,
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        self.surface.pending_map().remove(&self.request_id);
    }
}

impl WsRenderSurface {
    pub fn new() -> Self {
        Self {
            outbound: Mutex::new(None),
            pending: SyncMutex::new(HashMap::new()),
        }
    }

    pub async fn attach(&self, sender: mpsc::Sender<ServerEvent>) {
        let mut outbound = self.outbound.lock().await;
        if outbound.replace(sender).is_some() {
            debug!("replacing previously attached surface connection");
        }
        self.fail_pending("surface replaced by a new connection");
    }

    /// Clear the attachment, but only if `sender` is still the attached
    /// connection. A stale connection's teardown must not clobber the
    /// attachment of the tab that replaced it.
    pub async fn detach_if(&self, sender: &mpsc::Sender<ServerEvent>) {
        let mut outbound = self.outbound.lock().await;
        let owned = outbound
            .as_ref()
            .is_some_and(|current| current.same_channel(sender));
        if !owned {
            debug!("ignoring detach from a replaced connection");
            return;
        }
        *outbound = None;
        self.fail_pending("surface detached");
    }

    pub async fn is_attached(&self) -> bool {
        self.outbound.lock().await.is_some()
    }

    /// Resolve the pending request matching a browser ack. Unknown ids are
    /// logged and dropped (a late ack from a replaced connection or a
    /// cancelled request).
    pub fn resolve_ack(&self, request_id: Uuid, error: Option<String>) {
        let Some(tx) = self.pending_map().remove(&request_id) else {
            warn!(%request_id, "ack for unknown request id");
            return;
        };
        let _ = tx.send(match error {
            None => Ok(()),
            Some(message) => Err(message),
        });
    }

    fn fail_pending(&self, reason: &str) {
        for (_, tx) in self.pending_map().drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }

    fn pending_map(&self) -> MutexGuard<'_, HashMap<Uuid, AckSender>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending_map().len()
    }

    async fn request(&self, build: impl FnOnce(Uuid) -> ServerEvent) -> Result<()> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(request_id, tx);
        let _cleanup = PendingAck {
            surface: self,
            request_id,
        };
        {
            let outbound = self.outbound.lock().await;
            let Some(sender) = outbound.as_ref() else {
                return Err(anyhow!("rendering surface is not connected"));
            };
            if sender.send(build(request_id)).await.is_err() {
                return Err(anyhow!("rendering surface connection closed"));
            }
        }

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(anyhow!("surface rejected request: {message}")),
            Err(_) => Err(anyhow!("rendering surface detached before acknowledging")),
        }
    }
}

impl Default for WsRenderSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderSurface for WsRenderSurface {
    async fn initialize(&self, init: &SurfaceInit) -> Result<()> {
        let traces = init.traces.clone();
        let layout = init.layout.clone();
        let config = init.config.clone();
        self.request(|request_id| ServerEvent::Initialize {
            request_id,
            traces,
            layout,
            config,
        })
        .await
    }

    async fn apply_style_update(&self, update: &StyleUpdate) -> Result<()> {
        let update = update.to_restyle_update();
        self.request(|request_id| ServerEvent::Restyle {
            request_id,
            update,
            trace_indices: vec![0],
        })
        .await
    }

    async fn animate(&self, frame: &FrameSpec, transition: &TransitionSpec) -> Result<()> {
        let frame = frame.to_frame();
        let transition = transition.clone();
        self.request(|request_id| ServerEvent::Animate {
            request_id,
            frame,
            transition,
        })
        .await
    }

    // Relayouts are fire-and-forget; the browser does not ack them.
    async fn relayout(&self, width: f64, height: f64) -> Result<()> {
        let outbound = self.outbound.lock().await;
        let Some(sender) = outbound.as_ref() else {
            return Err(anyhow!("rendering surface is not connected"));
        };
        sender
            .send(ServerEvent::Relayout { width, height })
            .await
            .map_err(|_| anyhow!("rendering surface connection closed"))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
