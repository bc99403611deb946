//! Persistence gateway seam.
//!
//! The editor never awaits the network itself. Mutating operations return a
//! [`Request`] that the host runs against a [`RegionGateway`] (see
//! [`execute`]) and the resulting [`Response`] is fed back into the engine.
//! Each request carries a [`Ticket`] so its response can be matched to the
//! operation that issued it, even when several are in flight at once.
//!
//! ERROR HANDLING
//! ==============
//! Gateway failures are plain human-readable messages. They are never fatal:
//! the repository rolls back to its pre-call state and the engine reports a
//! notice.

#[cfg(test)]
#[path = "gateway_test.rs"]
mod gateway_test;

use std::cell::RefCell;
use std::collections::HashMap;

use futures::future::join_all;

use crate::region::{Region, RegionFields, RegionId, RegionPatch};

/// Correlates a request with its response.
pub type Ticket = u64;

/// A failed gateway call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct GatewayError {
    pub message: String,
}

impl GatewayError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Backend for region CRUD.
///
/// Futures are not required to be `Send`; in the browser they run on the
/// single UI thread.
#[async_trait::async_trait(?Send)]
pub trait RegionGateway {
    /// All regions configured for `camera_id`.
    async fn list_regions(&self, camera_id: &str) -> Result<Vec<Region>, GatewayError>;

    /// Persist a new region and return it with its assigned id.
    async fn create_region(&self, camera_id: &str, fields: &RegionFields) -> Result<Region, GatewayError>;

    /// Apply a sparse update and return the stored region.
    async fn update_region(&self, id: &RegionId, patch: &RegionPatch) -> Result<Region, GatewayError>;

    /// Remove a region.
    async fn delete_region(&self, id: &RegionId) -> Result<(), GatewayError>;
}

/// A gateway call the host should perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    List { ticket: Ticket, camera_id: String },
    Create { ticket: Ticket, camera_id: String, fields: RegionFields },
    Update { ticket: Ticket, id: RegionId, patch: RegionPatch },
    Delete { ticket: Ticket, id: RegionId },
}

impl Request {
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        match self {
            Self::List { ticket, .. }
            | Self::Create { ticket, .. }
            | Self::Update { ticket, .. }
            | Self::Delete { ticket, .. } => *ticket,
        }
    }
}

/// Result of a gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Listed(Result<Vec<Region>, GatewayError>),
    Created(Result<Region, GatewayError>),
    Updated(Result<Region, GatewayError>),
    Deleted(Result<(), GatewayError>),
}

impl Outcome {
    /// The failure, if the call failed.
    #[must_use]
    pub fn error(&self) -> Option<&GatewayError> {
        match self {
            Self::Listed(Err(e)) | Self::Created(Err(e)) | Self::Updated(Err(e)) | Self::Deleted(Err(e)) => Some(e),
            _ => None,
        }
    }
}

/// A finished gateway call, tagged with the ticket of its request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub ticket: Ticket,
    pub outcome: Outcome,
}

/// Run one request against `gateway`.
pub async fn execute(gateway: &dyn RegionGateway, request: Request) -> Response {
    let ticket = request.ticket();
    let outcome = match request {
        Request::List { camera_id, .. } => Outcome::Listed(gateway.list_regions(&camera_id).await),
        Request::Create { camera_id, fields, .. } => Outcome::Created(gateway.create_region(&camera_id, &fields).await),
        Request::Update { id, patch, .. } => Outcome::Updated(gateway.update_region(&id, &patch).await),
        Request::Delete { id, .. } => Outcome::Deleted(gateway.delete_region(&id).await),
    };
    Response { ticket, outcome }
}

/// Run several requests concurrently; responses come back in request order.
pub async fn execute_all(gateway: &dyn RegionGateway, requests: Vec<Request>) -> Vec<Response> {
    join_all(requests.into_iter().map(|r| execute(gateway, r))).await
}

/// In-process gateway.
///
/// Backs the editor when regions are staged locally instead of going to a
/// server, and doubles as a deterministic backend in tests.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    cameras: RefCell<HashMap<String, Vec<Region>>>,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a camera's regions.
    pub fn insert(&self, camera_id: &str, region: Region) {
        self.cameras
            .borrow_mut()
            .entry(camera_id.to_owned())
            .or_default()
            .push(region);
    }

    /// Snapshot of a camera's stored regions.
    #[must_use]
    pub fn regions(&self, camera_id: &str) -> Vec<Region> {
        self.cameras
            .borrow()
            .get(camera_id)
            .cloned()
            .unwrap_or_default()
    }

    fn not_found(id: &RegionId) -> GatewayError {
        GatewayError::new(format!("region {id} not found"))
    }
}

#[async_trait::async_trait(?Send)]
impl RegionGateway for MemoryGateway {
    async fn list_regions(&self, camera_id: &str) -> Result<Vec<Region>, GatewayError> {
        Ok(self.regions(camera_id))
    }

    async fn create_region(&self, camera_id: &str, fields: &RegionFields) -> Result<Region, GatewayError> {
        let region = Region::new(RegionId::new(uuid::Uuid::new_v4().to_string()), fields.clone());
        self.insert(camera_id, region.clone());
        Ok(region)
    }

    async fn update_region(&self, id: &RegionId, patch: &RegionPatch) -> Result<Region, GatewayError> {
        let mut cameras = self.cameras.borrow_mut();
        let region = cameras
            .values_mut()
            .flat_map(|regions| regions.iter_mut())
            .find(|r| &r.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        patch.apply_to(&mut region.fields);
        Ok(region.clone())
    }

    async fn delete_region(&self, id: &RegionId) -> Result<(), GatewayError> {
        let mut cameras = self.cameras.borrow_mut();
        for regions in cameras.values_mut() {
            if let Some(pos) = regions.iter().position(|r| &r.id == id) {
                regions.remove(pos);
                return Ok(());
            }
        }
        Err(Self::not_found(id))
    }
}
