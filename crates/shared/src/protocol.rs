use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::{DisplaySnapshot, TransitionSpec},
    error::ApiError,
};

/// Commands and notices the server pushes to the browser surface over the
/// `/ws` channel. Commands carrying a `request_id` must be acknowledged by
/// the browser once the corresponding Plotly promise settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Initialize {
        request_id: Uuid,
        traces: Value,
        layout: Value,
        config: Value,
    },
    Restyle {
        request_id: Uuid,
        update: Value,
        trace_indices: Vec<usize>,
    },
    Animate {
        request_id: Uuid,
        frame: Value,
        transition: TransitionSpec,
    },
    /// Fire-and-forget; the browser does not ack relayouts.
    Relayout {
        width: f64,
        height: f64,
    },
    DisplayChanged {
        snapshot: DisplaySnapshot,
    },
    SwitchFailed {
        dataset: String,
        error: ApiError,
    },
}

/// Messages the browser sends back to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    /// The page finished loading and is ready to receive `initialize`.
    SurfaceReady {
        width: f64,
        height: f64,
    },
    Ack {
        request_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SetDataset {
        name: String,
    },
    ViewportResized {
        width: f64,
        height: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub min: f64,
    pub max: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_request_uses_snake_case_tags() {
        let request: ClientRequest =
            serde_json::from_str(r#"{"type":"set_dataset","payload":{"name":"gdp"}}"#)
                .expect("deserialize");
        assert!(matches!(request, ClientRequest::SetDataset { name } if name == "gdp"));
    }

    #[test]
    fn ack_error_field_defaults_to_none() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"ack","payload":{{"request_id":"{id}"}}}}"#);
        let request: ClientRequest = serde_json::from_str(&raw).expect("deserialize");
        let ClientRequest::Ack { request_id, error } = request else {
            panic!("expected ack");
        };
        assert_eq!(request_id, id);
        assert!(error.is_none());
    }
}
