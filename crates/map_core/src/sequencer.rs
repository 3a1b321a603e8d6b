use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::{DisplaySnapshot, TransitionSpec, ValueRange},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, warn};

use crate::{FrameSpec, RenderSurface, StyleUpdate};
use crate::registry::DatasetRegistry;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),
    #[error("dataset '{0}' has no values")]
    EmptyDataset(String),
    #[error("style update rejected by rendering surface: {0}")]
    StyleUpdate(String),
    #[error("animation rejected by rendering surface: {0}")]
    Animation(String),
    #[error("rendering surface did not acknowledge within {0} ms")]
    AckTimeout(u64),
}

impl SwitchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SwitchError::UnknownDataset(_) => ErrorCode::UnknownDataset,
            SwitchError::EmptyDataset(_) => ErrorCode::EmptyDataset,
            SwitchError::StyleUpdate(_) | SwitchError::Animation(_) => ErrorCode::Surface,
            SwitchError::AckTimeout(_) => ErrorCode::Timeout,
        }
    }
}

impl From<&SwitchError> for ApiError {
    fn from(err: &SwitchError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}

/// How a `switch_to` call ended. A superseded call was preempted by a newer
/// one and deliberately left the surface to it.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    Completed(DisplaySnapshot),
    Superseded,
}

#[derive(Debug, Clone)]
pub enum MapEvent {
    DisplayChanged(DisplaySnapshot),
    SwitchFailed { dataset: String, error: ApiError },
}

/// Serializes dataset switches against a single rendering surface.
///
/// Each switch is two phases: one atomic style update applied at zero
/// opacity, then an animated fade-in. Calls queue on an async mutex (FIFO);
/// a newer call preempts the in-flight animation through a generation
/// counter, so the visible map always converges on the newest request and
/// never renders a hybrid of two datasets.
pub struct TransitionSequencer {
    registry: Arc<DatasetRegistry>,
    surface: Arc<dyn RenderSurface>,
    transition: TransitionSpec,
    ack_timeout: Duration,
    gate: Mutex<()>,
    latest: AtomicU64,
    preempt: watch::Sender<u64>,
    current: RwLock<Option<DisplaySnapshot>>,
    events: broadcast::Sender<MapEvent>,
}

impl TransitionSequencer {
    pub fn new(
        registry: Arc<DatasetRegistry>,
        surface: Arc<dyn RenderSurface>,
        transition: TransitionSpec,
        ack_timeout: Duration,
    ) -> Self {
        let (preempt, _) = watch::channel(0);
        let (events, _) = broadcast::channel(64);
        Self {
            registry,
            surface,
            transition,
            ack_timeout,
            gate: Mutex::new(()),
            latest: AtomicU64::new(0),
            preempt,
            current: RwLock::new(None),
            events,
        }
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    pub fn transition(&self) -> &TransitionSpec {
        &self.transition
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MapEvent> {
        self.events.subscribe()
    }

    /// The last snapshot a completed switch applied.
    pub async fn current_display(&self) -> Option<DisplaySnapshot> {
        self.current.read().await.clone()
    }

    /// Swap the visible dataset: one atomic restyle at zero opacity, then an
    /// animated fade to full opacity. Resolves once the fade has finished,
    /// the call was superseded by a newer one, or a phase failed.
    pub async fn switch_to(&self, name: &str) -> Result<SwitchOutcome, SwitchError> {
        // Validation happens before the preemption handshake so a bad name
        // cannot cancel a legitimate in-flight switch.
        let Some(entry) = self.registry.get(name) else {
            let err = SwitchError::UnknownDataset(name.to_string());
            self.report_failure(name, &err);
            return Err(err);
        };
        let Some(range) = ValueRange::from_values(&entry.dataset.values) else {
            let err = SwitchError::EmptyDataset(name.to_string());
            self.report_failure(name, &err);
            return Err(err);
        };

        let my_gen = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.preempt.send_replace(my_gen);

        let _guard = self.gate.lock().await;
        if self.latest.load(Ordering::SeqCst) != my_gen {
            debug!(dataset = name, "switch superseded while queued");
            return Ok(SwitchOutcome::Superseded);
        }

        let update = StyleUpdate {
            values: entry.dataset.values.clone(),
            zmin: range.min,
            zmax: range.max,
            colorscale: entry.scale.clone(),
            opacity: 0.0,
        };
        match tokio::time::timeout(self.ack_timeout, self.surface.apply_style_update(&update))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let err = SwitchError::StyleUpdate(err.to_string());
                self.report_failure(name, &err);
                return Err(err);
            }
            Err(_) => {
                let err = SwitchError::AckTimeout(self.ack_timeout.as_millis() as u64);
                self.report_failure(name, &err);
                return Err(err);
            }
        }

        // A request that arrived during the style update wins without the
        // fade ever starting; it will restyle at zero opacity itself.
        if self.latest.load(Ordering::SeqCst) != my_gen {
            debug!(dataset = name, "switch superseded after style update");
            return Ok(SwitchOutcome::Superseded);
        }

        debug!(
            dataset = name,
            zmin = range.min,
            zmax = range.max,
            "style update applied, starting fade-in"
        );

        // The animation runs for the full transition; allow it that long
        // plus the ack budget before declaring the surface stuck.
        let deadline = Duration::from_millis(self.transition.duration_ms) + self.ack_timeout;
        let frame = FrameSpec { opacity: 1.0 };
        let mut preempted = self.preempt.subscribe();
        let animate = tokio::time::timeout(
            deadline,
            self.surface.animate(&frame, &self.transition),
        );
        tokio::pin!(animate);

        tokio::select! {
            res = &mut animate => match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    let err = SwitchError::Animation(err.to_string());
                    self.report_failure(name, &err);
                    return Err(err);
                }
                Err(_) => {
                    let err = SwitchError::AckTimeout(deadline.as_millis() as u64);
                    self.report_failure(name, &err);
                    return Err(err);
                }
            },
            _ = newer_generation(&mut preempted, my_gen) => {
                // A newer switch will restyle at zero opacity anyway; the
                // abandoned animation cannot leave a hybrid behind.
                debug!(dataset = name, "fade-in abandoned, newer switch queued");
                return Ok(SwitchOutcome::Superseded);
            }
        }

        let snapshot = DisplaySnapshot {
            dataset: name.to_string(),
            range,
            opacity: 1.0,
        };
        *self.current.write().await = Some(snapshot.clone());
        let _ = self
            .events
            .send(MapEvent::DisplayChanged(snapshot.clone()));
        Ok(SwitchOutcome::Completed(snapshot))
    }

    fn report_failure(&self, name: &str, err: &SwitchError) {
        warn!(dataset = name, error = %err, "dataset switch failed");
        let _ = self.events.send(MapEvent::SwitchFailed {
            dataset: name.to_string(),
            error: ApiError::from(err),
        });
    }
}

async fn newer_generation(rx: &mut watch::Receiver<u64>, my_gen: u64) {
    loop {
        if *rx.borrow_and_update() > my_gen {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender lives as long as the sequencer; never resolve if it is
            // somehow gone so the animate branch stays selectable.
            futures::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "tests/sequencer_tests.rs"]
mod tests;
