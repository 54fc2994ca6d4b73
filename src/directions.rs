//! Walking directions from an external routing service.
//!
//! Requests walking-mode directions between two points, takes the first
//! candidate route, and flattens all of its legs into one ordered list
//! of steps. Each step keeps its own encoded polyline; decoding is left
//! to the session so a malformed step can be attributed precisely.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::GuidanceConfig;
use crate::error::{GuidanceError, TransportError};
use crate::position::Position;
use crate::session::Destination;

/// A single turn-by-turn step of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationStep {
    /// Distance of the step as formatted by the service, e.g. "0.2 km".
    pub distance_text: String,
    /// Duration of the step as formatted by the service, e.g. "3 mins".
    pub duration_text: String,
    /// Instruction with all markup removed.
    pub instruction_text: String,
    /// Encoded polyline of the step geometry.
    pub encoded_path: String,
}

/// Minimal HTTP GET seam so the client can run against any backend.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET and return the response body of a success response.
    async fn get(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<String, TransportError>;
}

/// Blocking `ureq` agent driven from tokio's blocking pool.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: &GuidanceConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.request_timeout()))
            .build()
            .into();
        Self { agent }
    }
}

#[async_trait]
impl HttpTransport for UreqTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<String, TransportError> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let query = query.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut request = agent.get(url.as_str());
            for (key, value) in &query {
                request = request.query(*key, value);
            }

            let response = request.call().map_err(|e| match e {
                ureq::Error::StatusCode(code) => TransportError::Status(code),
                other => TransportError::Network(other.to_string()),
            })?;

            response
                .into_body()
                .read_to_string()
                .map_err(|e| TransportError::Network(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::Network(format!("request task failed: {e}")))?
    }
}

/// Client for the routing service's directions endpoint.
pub struct DirectionsClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    api_key: String,
}

impl DirectionsClient {
    pub fn new(config: &GuidanceConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            endpoint: config.directions_endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Client backed by the default `ureq` transport.
    pub fn with_default_transport(config: &GuidanceConfig) -> Self {
        Self::new(config, Arc::new(UreqTransport::new(config)))
    }

    /// Fetch walking directions from `origin` to `destination`.
    ///
    /// Transport failures, non-success responses, unparseable bodies and
    /// responses without routes all map to `RouteUnavailable`.
    pub async fn fetch_walking_route(
        &self,
        origin: &Position,
        destination: &Destination,
    ) -> Result<Vec<NavigationStep>, GuidanceError> {
        let origin = format!("{},{}", origin.lat, origin.lon);
        let target = format!("{},{}", destination.lat, destination.lon);
        debug!("Requesting walking directions {origin} -> {target}");

        let query = [
            ("origin", origin),
            ("destination", target),
            ("mode", "walking".to_string()),
            ("key", self.api_key.clone()),
        ];
        let body = self.transport.get(&self.endpoint, &query).await?;

        let steps = parse_directions(&body)?;
        info!("Received walking route with {} steps", steps.len());
        Ok(steps)
    }
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<WireRoute>,
}

#[derive(Deserialize)]
struct WireRoute {
    #[serde(default)]
    legs: Vec<WireLeg>,
}

#[derive(Deserialize)]
struct WireLeg {
    #[serde(default)]
    steps: Vec<WireStep>,
}

#[derive(Deserialize)]
struct WireStep {
    distance: WireText,
    duration: WireText,
    html_instructions: String,
    polyline: WirePolyline,
}

#[derive(Deserialize)]
struct WireText {
    text: String,
}

#[derive(Deserialize)]
struct WirePolyline {
    points: String,
}

/// Parse a directions response body into ordered navigation steps.
///
/// Only the first route is consulted; its legs are flattened in order.
pub fn parse_directions(body: &str) -> Result<Vec<NavigationStep>, GuidanceError> {
    let response: DirectionsResponse = serde_json::from_str(body).map_err(|e| {
        GuidanceError::RouteUnavailable(format!("malformed directions response: {e}"))
    })?;

    let Some(route) = response.routes.into_iter().next() else {
        let status = response.status.as_deref().unwrap_or("no status");
        let reason = match response.error_message {
            Some(message) => format!("no routes returned ({status}): {message}"),
            None => format!("no routes returned ({status})"),
        };
        return Err(GuidanceError::RouteUnavailable(reason));
    };

    let steps = route
        .legs
        .into_iter()
        .flat_map(|leg| leg.steps)
        .map(|step| NavigationStep {
            distance_text: step.distance.text,
            duration_text: step.duration.text,
            instruction_text: strip_markup(&step.html_instructions),
            encoded_path: step.polyline.points,
        })
        .collect();

    Ok(steps)
}

/// Remove every `<...>` tag (at least one character between the brackets).
///
/// A `<` without a closing `>`, or an empty `<>`, is kept as text.
pub fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('>') {
            Some(close) if close > 0 => rest = &after[close + 1..],
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    out
}
