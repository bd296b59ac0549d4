//! Async HTTP client wrapping the clinical server's JSON API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use uuid::Uuid;
use ward_core::{
  chart::ChartStructure,
  patient::{Order, Patient, User},
  remote::{
    ChartServer, ConceptRecord, EncounterRecord, LocationRecord, NewEncounter,
    ObservationBatch, PatientChart, RemoteError,
  },
};

use crate::{Error, Result};

/// Connection settings for the clinical server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub base_url: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub password: String,
}

/// Async HTTP client for the clinical server's REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpChartServer {
  client: Client,
  config: ServerConfig,
}

/// Map a `reqwest` failure onto the remote error taxonomy.
fn classify(err: reqwest::Error) -> RemoteError {
  if err.is_timeout() {
    RemoteError::Timeout
  } else if err.is_decode() {
    RemoteError::Decode(err.to_string())
  } else if let Some(status) = err.status() {
    RemoteError::Server { status: status.as_u16(), message: err.to_string() }
  } else {
    RemoteError::Transport(err.to_string())
  }
}

impl HttpChartServer {
  /// Build a client whose requests give up after `timeout`.
  pub fn new(config: ServerConfig, timeout: Duration) -> Result<Self> {
    if !(config.base_url.starts_with("http://")
      || config.base_url.starts_with("https://"))
    {
      return Err(Error::InvalidBaseUrl(config.base_url));
    }
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, config })
  }

  pub fn config(&self) -> &ServerConfig { &self.config }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }

  /// Send `req` with credentials; any non-success status is a server error.
  async fn send(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
    let resp = self.auth(req).send().await.map_err(classify)?;
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(RemoteError::Server { status: status.as_u16(), message })
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
    tracing::debug!(%path, "GET");
    let resp = self.send(self.client.get(self.url(path))).await?;
    resp.json().await.map_err(classify)
  }
}

// ─── ChartServer impl ────────────────────────────────────────────────────────

impl ChartServer for HttpChartServer {
  async fn fetch_locations(&self) -> Result<Vec<LocationRecord>, RemoteError> {
    self.get_json("/locations").await
  }

  async fn fetch_concepts(&self) -> Result<Vec<ConceptRecord>, RemoteError> {
    self.get_json("/concepts").await
  }

  async fn fetch_chart_structure(
    &self,
    chart_uuid: Uuid,
  ) -> Result<ChartStructure, RemoteError> {
    self.get_json(&format!("/charts/{chart_uuid}")).await
  }

  async fn fetch_patients(&self) -> Result<Vec<Patient>, RemoteError> {
    self.get_json("/patients").await
  }

  async fn fetch_orders(&self) -> Result<Vec<Order>, RemoteError> {
    self.get_json("/orders").await
  }

  async fn fetch_users(&self) -> Result<Vec<User>, RemoteError> {
    self.get_json("/users").await
  }

  async fn fetch_observations(
    &self,
    since: Option<DateTime<Utc>>,
  ) -> Result<ObservationBatch, RemoteError> {
    let mut req = self.client.get(self.url("/observations"));
    if let Some(since) = since {
      req = req.query(&[("since", since.to_rfc3339())]);
    }
    tracing::debug!(?since, "GET /observations");
    let resp = self.send(req).await?;
    resp.json().await.map_err(classify)
  }

  async fn fetch_chart(&self, patient_uuid: Uuid) -> Result<PatientChart, RemoteError> {
    self
      .get_json(&format!("/patientencounters/{patient_uuid}"))
      .await
  }

  async fn submit_encounter(
    &self,
    encounter: NewEncounter,
  ) -> Result<EncounterRecord, RemoteError> {
    tracing::debug!(patient = %encounter.patient_uuid, "POST /encounters");
    let req = self.client.post(self.url("/encounters")).json(&encounter);
    let resp = self.send(req).await?;
    resp.json().await.map_err(classify)
  }

  async fn delete_observation(&self, uuid: Uuid) -> Result<(), RemoteError> {
    tracing::debug!(%uuid, "DELETE /observations");
    let req = self.client.delete(self.url(&format!("/observations/{uuid}")));
    match self.send(req).await {
      Ok(_) => Ok(()),
      // Already voided.
      Err(RemoteError::Server { status, .. })
        if status == StatusCode::NOT_FOUND.as_u16() =>
      {
        Ok(())
      }
      Err(e) => Err(e),
    }
  }
}
