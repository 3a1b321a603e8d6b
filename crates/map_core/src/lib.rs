use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use shared::domain::{ColorScale, TransitionSpec};

pub mod registry;
pub mod sequencer;

pub use registry::{DatasetEntry, DatasetRegistry};
pub use sequencer::{MapEvent, SwitchError, SwitchOutcome, TransitionSequencer};

/// Initial plot description handed to the rendering surface once, when it
/// attaches: the traces, layout, and library config for `newPlot`.
#[derive(Debug, Clone)]
pub struct SurfaceInit {
    pub traces: Value,
    pub layout: Value,
    pub config: Value,
}

/// The atomic restyle payload of a dataset switch: values, scale bounds,
/// color scale, and opacity, applied in a single call so no intermediate
/// frame renders the new values at full opacity.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleUpdate {
    pub values: Vec<f64>,
    pub zmin: f64,
    pub zmax: f64,
    pub colorscale: ColorScale,
    pub opacity: f64,
}

impl StyleUpdate {
    /// Plotly restyle form: every attribute wrapped in a per-trace array.
    pub fn to_restyle_update(&self) -> Value {
        json!({
            "z": [self.values],
            "zmin": [self.zmin],
            "zmax": [self.zmax],
            "colorscale": [self.colorscale],
            "marker.opacity": [self.opacity],
        })
    }
}

/// Animation target for the fade-in phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub opacity: f64,
}

impl FrameSpec {
    pub fn to_frame(&self) -> Value {
        json!({
            "data": [{ "marker": { "opacity": self.opacity } }],
            "traces": [0],
        })
    }
}

/// The rendering surface the sequencer drives. Every method resolves only
/// once the surface has acknowledged the operation (for `animate`, once the
/// animation itself has finished).
#[async_trait]
pub trait RenderSurface: Send + Sync {
    async fn initialize(&self, init: &SurfaceInit) -> anyhow::Result<()>;
    async fn apply_style_update(&self, update: &StyleUpdate) -> anyhow::Result<()>;
    async fn animate(&self, frame: &FrameSpec, transition: &TransitionSpec)
        -> anyhow::Result<()>;
    async fn relayout(&self, width: f64, height: f64) -> anyhow::Result<()>;
}

/// Null surface used before a browser attaches and in tests of failure
/// paths.
pub struct MissingRenderSurface;

#[async_trait]
impl RenderSurface for MissingRenderSurface {
    async fn initialize(&self, _init: &SurfaceInit) -> anyhow::Result<()> {
        Err(anyhow!("rendering surface is unavailable"))
    }

    async fn apply_style_update(&self, _update: &StyleUpdate) -> anyhow::Result<()> {
        Err(anyhow!("rendering surface is unavailable"))
    }

    async fn animate(
        &self,
        _frame: &FrameSpec,
        _transition: &TransitionSpec,
    ) -> anyhow::Result<()> {
        Err(anyhow!("rendering surface is unavailable"))
    }

    async fn relayout(&self, _width: f64, _height: f64) -> anyhow::Result<()> {
        Err(anyhow!("rendering surface is unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::ColorStop;

    #[test]
    fn restyle_update_wraps_attributes_per_trace() {
        let update = StyleUpdate {
            values: vec![4.1, 6.2],
            zmin: 4.1,
            zmax: 6.2,
            colorscale: ColorScale(vec![
                ColorStop::new(0.0, "#111111"),
                ColorStop::new(1.0, "#eeeeee"),
            ]),
            opacity: 0.0,
        };
        let value = update.to_restyle_update();
        assert_eq!(value["z"][0][1], 6.2);
        assert_eq!(value["zmin"][0], 4.1);
        assert_eq!(value["zmax"][0], 6.2);
        assert_eq!(value["colorscale"][0][0][1], "#111111");
        assert_eq!(value["marker.opacity"][0], 0.0);
    }

    #[test]
    fn frame_targets_first_trace() {
        let frame = FrameSpec { opacity: 1.0 }.to_frame();
        assert_eq!(frame["data"][0]["marker"]["opacity"], 1.0);
        assert_eq!(frame["traces"][0], 0);
    }
}
