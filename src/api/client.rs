use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::backend::BackendClient;
use crate::api::messages::{MachineResponse, PublishRequest, Query, SimpleResponse, UserResponse};
use crate::core::error::BackendError;
use crate::models::card::Uid;
use crate::models::machine::MachineId;

/// Blocking HTTP client for the workshop backend
pub struct HttpBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    machine_id: MachineId,
    online: bool,
}

impl HttpBackend {
    pub fn new(endpoint: String, machine_id: MachineId, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            machine_id,
            online: false,
        })
    }

    fn query_url(&self) -> String {
        format!("{}/machine/{}/query", self.endpoint, self.machine_id)
    }

    fn send<R: DeserializeOwned>(&self, query: &Query) -> Result<R, BackendError> {
        if !self.online {
            return Err(BackendError::Offline);
        }

        debug!(query = ?query, "Sending backend query");

        let response = self.client.post(self.query_url()).json(query).send()?;

        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }

        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Run a query, turning any failure into the inconclusive default reply
    fn process<R: DeserializeOwned + Default>(&mut self, query: Query) -> R {
        match self.send(&query) {
            Ok(reply) => reply,
            Err(BackendError::Offline) => R::default(),
            Err(e) => {
                warn!(error = %e, query = ?query, "Backend query failed");
                if matches!(e, BackendError::Http(_)) {
                    self.online = false;
                }
                R::default()
            }
        }
    }
}

impl BackendClient for HttpBackend {
    fn is_online(&self) -> bool {
        self.online
    }

    fn connect(&mut self) -> bool {
        let url = format!("{}/health", self.endpoint);
        self.online = match self.client.get(&url).send() {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(endpoint = %self.endpoint, status = %response.status(), "Backend health check failed");
                false
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Backend unreachable");
                false
            }
        };

        info!(endpoint = %self.endpoint, online = self.online, "Backend connection attempt finished");
        self.online
    }

    fn check_card(&mut self, uid: Uid) -> UserResponse {
        self.process(Query::CheckUser { uid })
    }

    fn publish(&mut self, topic: &str, payload: &str) -> bool {
        if !self.online {
            return false;
        }

        let url = format!("{}/publish", self.endpoint);
        let request = PublishRequest { topic, payload };

        match self.client.post(&url).json(&request).send() {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(topic = topic, status = %response.status(), "Publish rejected by backend");
                false
            }
            Err(e) => {
                warn!(topic = topic, error = %e, "Publish failed");
                self.online = false;
                false
            }
        }
    }

    fn check_machine(&mut self, machine_id: MachineId) -> MachineResponse {
        self.process(Query::CheckMachine { machine_id: machine_id.0 })
    }

    fn start_use(&mut self, uid: Uid, machine_id: MachineId) -> SimpleResponse {
        self.process(Query::StartUse {
            uid,
            machine_id: machine_id.0,
        })
    }

    fn finish_use(&mut self, uid: Uid, machine_id: MachineId, duration: Duration) -> SimpleResponse {
        self.process(Query::StopUse {
            uid,
            machine_id: machine_id.0,
            duration_s: duration.as_secs(),
        })
    }

    fn register_maintenance(&mut self, uid: Uid, machine_id: MachineId) -> SimpleResponse {
        self.process(Query::RegisterMaintenance {
            uid,
            machine_id: machine_id.0,
        })
    }

    fn alive(&mut self, machine_id: MachineId) -> SimpleResponse {
        self.process(Query::Alive { machine_id: machine_id.0 })
    }
}
