use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use map_core::{RenderSurface, SurfaceInit, SwitchError, SwitchOutcome, TransitionSequencer};
use plotly_bridge::WsRenderSurface;
use serde_json::json;
use shared::{
    domain::{TransitionSpec, ValueRange},
    error::ApiError,
    protocol::{ClientRequest, DatasetSummary, ServerEvent},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info, warn};

mod config;
mod datasets;

use config::{load_settings, Settings};

const MAX_REQUEST_BYTES: usize = 16 * 1024;

#[derive(Debug, Parser)]
#[command(name = "statemap", about = "Choropleth dashboard server")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = "statemap.toml")]
    config: PathBuf,
}

struct AppState {
    sequencer: Arc<TransitionSequencer>,
    surface: Arc<WsRenderSurface>,
    settings: Settings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let settings = load_settings(&args.config)?;
    let registry = Arc::new(datasets::builtin_registry()?);
    anyhow::ensure!(
        registry.get(&settings.default_dataset).is_some(),
        "default dataset '{}' is not registered",
        settings.default_dataset
    );

    let surface = Arc::new(WsRenderSurface::new());
    let sequencer = Arc::new(TransitionSequencer::new(
        registry,
        surface.clone() as Arc<dyn RenderSurface>,
        TransitionSpec {
            duration_ms: settings.transition_ms,
            easing: settings.transition_easing.clone(),
        },
        Duration::from_millis(settings.ack_timeout_ms),
    ));

    let addr: SocketAddr = settings.server_bind.parse()?;
    let state = AppState {
        sequencer,
        surface,
        settings,
    };
    let app = build_router(Arc::new(state));

    info!(%addr, "statemap listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/datasets", get(list_datasets))
        .route("/datasets/:name/activate", post(activate_dataset))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<Vec<DatasetSummary>> {
    Json(state.sequencer.registry().summaries())
}

async fn activate_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ApiError>)> {
    match state.sequencer.switch_to(&name).await {
        Ok(SwitchOutcome::Completed(snapshot)) => Ok(Json(json!({
            "outcome": "completed",
            "snapshot": snapshot,
        }))),
        Ok(SwitchOutcome::Superseded) => Ok(Json(json!({ "outcome": "superseded" }))),
        Err(err) => Err((status_for(&err), Json(ApiError::from(&err)))),
    }
}

fn status_for(err: &SwitchError) -> StatusCode {
    match err {
        SwitchError::UnknownDataset(_) => StatusCode::NOT_FOUND,
        SwitchError::EmptyDataset(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SwitchError::StyleUpdate(_) | SwitchError::Animation(_) | SwitchError::AckTimeout(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};
    use map_core::MapEvent;
    use tokio::sync::{broadcast, mpsc};

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(64);
    state.surface.attach(outbound_tx.clone()).await;
    let mut map_events = state.sequencer.subscribe_events();

    // One writer owns the sink; surface commands and sequencer notices
    // funnel through it.
    let send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                command = outbound_rx.recv() => match command {
                    Some(event) => event,
                    None => break,
                },
                notice = map_events.recv() => match notice {
                    Ok(MapEvent::DisplayChanged(snapshot)) => {
                        ServerEvent::DisplayChanged { snapshot }
                    }
                    Ok(MapEvent::SwitchFailed { dataset, error }) => {
                        ServerEvent::SwitchFailed { dataset, error }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "surface connection missed map events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        match serde_json::from_str::<ClientRequest>(&text) {
            Ok(ClientRequest::SurfaceReady { width, height }) => {
                debug!(width, height, "surface ready, initializing plot");
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(error) = bring_up_surface(&state).await {
                        warn!(%error, "surface bring-up failed");
                    }
                });
            }
            Ok(ClientRequest::Ack { request_id, error }) => {
                state.surface.resolve_ack(request_id, error);
            }
            Ok(ClientRequest::SetDataset { name }) => {
                let state = state.clone();
                tokio::spawn(async move {
                    // Failures are reported to the page via the event
                    // channel; nothing to do with the result here.
                    let _ = state.sequencer.switch_to(&name).await;
                });
            }
            Ok(ClientRequest::ViewportResized { width, height }) => {
                if let Err(error) = state.surface.relayout(width, height).await {
                    debug!(%error, "relayout dropped");
                }
            }
            Err(error) => {
                warn!(%error, "unparseable client message");
            }
        }
    }

    // Scoped to this connection's sender: a teardown racing a newer tab's
    // attach must not clear the newer attachment.
    state.surface.detach_if(&outbound_tx).await;
    send_task.abort();
}

/// Draw the initial plot on a freshly attached surface, then run a normal
/// switch so the map fades in on the dataset that was active before the
/// reconnect (or the configured default on first attach).
async fn bring_up_surface(state: &AppState) -> anyhow::Result<()> {
    let name = match state.sequencer.current_display().await {
        Some(snapshot) => snapshot.dataset,
        None => state.settings.default_dataset.clone(),
    };
    let init = surface_init(&state.settings, &state.sequencer, &name)?;
    state.surface.initialize(&init).await?;
    state.sequencer.switch_to(&name).await?;
    Ok(())
}

fn surface_init(
    settings: &Settings,
    sequencer: &TransitionSequencer,
    dataset: &str,
) -> anyhow::Result<SurfaceInit> {
    let registry = sequencer.registry();
    let entry = registry
        .get(dataset)
        .ok_or_else(|| anyhow::anyhow!("unknown dataset '{dataset}'"))?;
    let range = ValueRange::from_values(&entry.dataset.values)
        .ok_or_else(|| anyhow::anyhow!("dataset '{dataset}' has no values"))?;

    // The initial trace starts invisible; the first switch fades it in.
    let traces = json!([{
        "type": "choroplethmap",
        "geojson": settings.geojson_url,
        "featureidkey": "id",
        "locations": registry.region_codes(),
        "z": entry.dataset.values,
        "zmin": range.min,
        "zmax": range.max,
        "colorscale": entry.scale,
        "marker": { "opacity": 0.0, "line": { "width": 0.5 } },
    }]);
    let layout = json!({
        "map": {
            "style": settings.map_style,
            "center": { "lat": settings.center_lat, "lon": settings.center_lon },
            "zoom": settings.zoom,
            "bounds": { "east": -40, "north": 90, "south": 10, "west": -180 },
        },
        "margin": { "r": 0, "t": 0, "l": 0, "b": 0 },
        "paper_bgcolor": "#111111",
    });
    let config = json!({
        "scrollZoom": true,
        "editable": false,
        "displayModeBar": false,
        "displaylogo": false,
    });
    Ok(SurfaceInit {
        traces,
        layout,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use shared::error::ErrorCode;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let settings = Settings::default();
        let registry = Arc::new(datasets::builtin_registry().expect("registry"));
        let surface = Arc::new(WsRenderSurface::new());
        let sequencer = Arc::new(TransitionSequencer::new(
            registry,
            surface.clone() as Arc<dyn RenderSurface>,
            TransitionSpec {
                duration_ms: 100,
                easing: settings.transition_easing.clone(),
            },
            Duration::from_millis(200),
        ));
        Arc::new(AppState {
            sequencer,
            surface,
            settings,
        })
    }

    #[tokio::test]
    async fn healthz_responds_ok() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn datasets_listing_is_sorted() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/datasets").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let summaries: Vec<DatasetSummary> = serde_json::from_slice(&body).expect("summaries");
        let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["gdp", "population", "unemployment"]);
    }

    #[tokio::test]
    async fn activating_unknown_dataset_is_not_found() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::post("/datasets/crime/activate")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let error: ApiError = serde_json::from_slice(&body).expect("error");
        assert_eq!(error.code, ErrorCode::UnknownDataset);
    }

    #[tokio::test]
    async fn activating_without_a_surface_is_bad_gateway() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::post("/datasets/gdp/activate")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let error: ApiError = serde_json::from_slice(&body).expect("error");
        assert_eq!(error.code, ErrorCode::Surface);
    }

    #[test]
    fn surface_init_carries_map_defaults() {
        let state = test_state();
        let init = surface_init(&state.settings, &state.sequencer, "unemployment")
            .expect("surface init");
        assert_eq!(init.traces[0]["type"], "choroplethmap");
        assert_eq!(init.traces[0]["marker"]["opacity"], 0.0);
        assert_eq!(init.traces[0]["zmin"], 4.1);
        assert_eq!(init.layout["map"]["style"], "carto-darkmatter-nolabels");
        assert_eq!(init.layout["map"]["zoom"], 4.5);
        assert_eq!(init.config["displayModeBar"], false);
    }
}
