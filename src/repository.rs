//! Authoritative in-memory region set for the selected camera.
//!
//! The repository is only mutated by its own operations, and only in
//! response to gateway results: `create`, `update` and `delete` validate and
//! return a [`Request`], and the local set changes when the matching
//! [`Response`] comes back through [`RegionRepository::complete`]. A failed
//! call therefore leaves the set exactly as it was.
//!
//! Requests in flight are tracked by ticket. A region with its own request
//! in flight is *pending* and rejects further single operations until the
//! response arrives. Selecting a camera forgets every in-flight ticket, so
//! late responses for the previous camera are dropped.

#[cfg(test)]
#[path = "repository_test.rs"]
mod repository_test;

use std::collections::HashMap;
use std::fmt;

use log::{debug, info, warn};

use crate::gateway::{GatewayError, Outcome, Request, Response, Ticket};
use crate::geometry::Point;
use crate::region::{Region, RegionFields, RegionId, RegionPatch, ValidationError};

/// Identifies one batch operation.
pub type BatchId = u64;

/// Why a repository operation was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no camera selected")]
    NoCamera,
    #[error("region {0} not found")]
    UnknownRegion(RegionId),
    #[error("region {0} is still saving")]
    Busy(RegionId),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Progress of the initial fetch for the selected camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// What a batch was doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Enable,
    Disable,
    Delete,
    Import,
}

impl BatchKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Enable => "Enable regions",
            Self::Disable => "Disable regions",
            Self::Delete => "Delete regions",
            Self::Import => "Import regions",
        }
    }
}

/// Final tally of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub kind: BatchKind,
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

/// Requests issued by a batch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStart {
    /// Set while responses are still outstanding.
    pub batch: Option<BatchId>,
    pub requests: Vec<Request>,
    /// Set when the batch finished without issuing anything (every item was refused).
    pub summary: Option<BatchSummary>,
}

/// A gateway response applied to the repository.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The camera's region list arrived (count) or failed.
    Fetched(Result<usize, GatewayError>),
    /// A single create finished.
    Created { ticket: Ticket, result: Result<RegionId, GatewayError> },
    /// A single update finished.
    Updated { id: RegionId, result: Result<(), GatewayError> },
    /// A single delete finished.
    Deleted { id: RegionId, result: Result<(), GatewayError> },
    /// One item of a batch finished; `summary` is set once the whole batch has.
    BatchItem { batch: BatchId, summary: Option<BatchSummary> },
}

#[derive(Debug, Clone)]
enum PendingOp {
    Fetch,
    Create { batch: Option<BatchId> },
    Update { id: RegionId, merged: RegionFields, batch: Option<BatchId> },
    Delete { id: RegionId, batch: Option<BatchId> },
}

impl PendingOp {
    fn region_id(&self) -> Option<&RegionId> {
        match self {
            Self::Update { id, .. } | Self::Delete { id, .. } => Some(id),
            Self::Fetch | Self::Create { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BatchProgress {
    kind: BatchKind,
    remaining: usize,
    succeeded: usize,
    failed: usize,
}

/// Ordered set of regions for one camera plus in-flight bookkeeping.
#[derive(Debug, Default)]
pub struct RegionRepository {
    camera_id: Option<String>,
    regions: Vec<Region>,
    load_state: LoadState,
    in_flight: HashMap<Ticket, PendingOp>,
    batches: HashMap<BatchId, BatchProgress>,
    next_ticket: Ticket,
    next_batch: BatchId,
}

impl RegionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Queries ---

    #[must_use]
    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    #[must_use]
    pub fn get(&self, id: &RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| &r.id == id)
    }

    /// Regions in insertion order, which is also draw order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Number of enabled regions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.regions.iter().filter(|r| r.fields.enabled).count()
    }

    /// Ids of regions too small to be useful.
    #[must_use]
    pub fn issues(&self, min_extent: f64) -> Vec<&RegionId> {
        self.regions
            .iter()
            .filter(|r| r.fields.shape.is_degenerate(min_extent))
            .map(|r| &r.id)
            .collect()
    }

    /// Topmost region containing `point` (logical space).
    #[must_use]
    pub fn hit_test(&self, point: Point) -> Option<&Region> {
        self.regions.iter().rev().find(|r| r.fields.shape.contains(point))
    }

    /// Whether `id` has a request in flight.
    #[must_use]
    pub fn is_pending(&self, id: &RegionId) -> bool {
        self.in_flight.values().any(|op| op.region_id() == Some(id))
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    // --- Operations ---

    /// Switch to `camera_id` and request its regions.
    ///
    /// The set is emptied immediately and every in-flight ticket is
    /// forgotten, so nothing stale survives a camera change.
    pub fn fetch_all(&mut self, camera_id: &str) -> Request {
        if !self.in_flight.is_empty() {
            debug!("dropping {} in-flight request(s) on camera change", self.in_flight.len());
        }
        self.camera_id = Some(camera_id.to_owned());
        self.regions.clear();
        self.in_flight.clear();
        self.batches.clear();
        self.load_state = LoadState::Loading;
        let ticket = self.issue(PendingOp::Fetch);
        Request::List { ticket, camera_id: camera_id.to_owned() }
    }

    /// Validate `fields` and request their creation.
    ///
    /// # Errors
    ///
    /// [`RegionError::NoCamera`] before a camera is selected, or
    /// [`RegionError::Validation`] when the fields are not persistable.
    pub fn create(&mut self, fields: RegionFields) -> Result<Request, RegionError> {
        self.create_in(fields, None)
    }

    /// Validate the merged result of `patch` and request the update.
    ///
    /// Returns `Ok(None)` when the patch changes nothing; no request is needed.
    ///
    /// # Errors
    ///
    /// [`RegionError::UnknownRegion`], [`RegionError::Busy`] while the region
    /// is saving, or [`RegionError::Validation`] for the merged fields.
    pub fn update(&mut self, id: &RegionId, patch: &RegionPatch) -> Result<Option<Request>, RegionError> {
        let region = self.get(id).ok_or_else(|| RegionError::UnknownRegion(id.clone()))?;
        if self.is_pending(id) {
            return Err(RegionError::Busy(id.clone()));
        }
        let mut merged = region.fields.clone();
        patch.apply_to(&mut merged);
        merged.validate()?;

        let effective = RegionPatch::diff(&region.fields, &merged);
        if effective.is_empty() {
            return Ok(None);
        }
        let ticket = self.issue(PendingOp::Update { id: id.clone(), merged, batch: None });
        Ok(Some(Request::Update { ticket, id: id.clone(), patch: effective }))
    }

    /// Request deletion. The region stays until the gateway confirms.
    ///
    /// # Errors
    ///
    /// [`RegionError::UnknownRegion`] or [`RegionError::Busy`].
    pub fn delete(&mut self, id: &RegionId) -> Result<Request, RegionError> {
        if self.get(id).is_none() {
            return Err(RegionError::UnknownRegion(id.clone()));
        }
        if self.is_pending(id) {
            return Err(RegionError::Busy(id.clone()));
        }
        let ticket = self.issue(PendingOp::Delete { id: id.clone(), batch: None });
        Ok(Request::Delete { ticket, id: id.clone() })
    }

    /// Enable or disable every region that is not already in that state.
    pub fn batch_set_enabled(&mut self, enabled: bool) -> BatchStart {
        let kind = if enabled { BatchKind::Enable } else { BatchKind::Disable };
        let batch = self.allocate_batch();
        let targets: Vec<Region> = self
            .regions
            .iter()
            .filter(|r| r.fields.enabled != enabled)
            .cloned()
            .collect();

        let mut requests = Vec::with_capacity(targets.len());
        let mut refused = 0;
        for region in targets {
            if self.is_pending(&region.id) {
                warn!("batch {}: region {} is still saving; counted as failed", kind.label(), region.id);
                refused += 1;
                continue;
            }
            let patch = RegionPatch::enabled(enabled);
            let mut merged = region.fields;
            patch.apply_to(&mut merged);
            let ticket = self.issue(PendingOp::Update { id: region.id.clone(), merged, batch: Some(batch) });
            requests.push(Request::Update { ticket, id: region.id, patch });
        }
        self.open_batch(batch, kind, requests, refused)
    }

    /// Delete every region.
    pub fn batch_delete(&mut self) -> BatchStart {
        let batch = self.allocate_batch();
        let ids: Vec<RegionId> = self.regions.iter().map(|r| r.id.clone()).collect();

        let mut requests = Vec::with_capacity(ids.len());
        let mut refused = 0;
        for id in ids {
            if self.is_pending(&id) {
                warn!("batch delete: region {id} is still saving; counted as failed");
                refused += 1;
                continue;
            }
            let ticket = self.issue(PendingOp::Delete { id: id.clone(), batch: Some(batch) });
            requests.push(Request::Delete { ticket, id });
        }
        self.open_batch(batch, BatchKind::Delete, requests, refused)
    }

    /// Create every entry of `items` as one batch. Invalid entries count as failures.
    pub fn batch_create(&mut self, items: Vec<RegionFields>) -> BatchStart {
        let batch = self.allocate_batch();
        let mut requests = Vec::with_capacity(items.len());
        let mut refused = 0;
        for fields in items {
            match self.create_in(fields, Some(batch)) {
                Ok(request) => requests.push(request),
                Err(e) => {
                    warn!("batch import: entry refused: {e}");
                    refused += 1;
                }
            }
        }
        self.open_batch(batch, BatchKind::Import, requests, refused)
    }

    /// Apply a gateway response. Returns `None` for tickets this repository
    /// no longer tracks (for example, responses for a previous camera).
    pub fn complete(&mut self, response: Response) -> Option<Completion> {
        let Some(op) = self.in_flight.remove(&response.ticket) else {
            debug!("ignoring response for untracked ticket {}", response.ticket);
            return None;
        };
        let completion = match op {
            PendingOp::Fetch => self.finish_fetch(response.outcome),
            PendingOp::Create { batch } => {
                let result = match response.outcome {
                    Outcome::Created(result) => result,
                    other => Err(unexpected("create", &other)),
                };
                let result = result.map(|region| {
                    let id = region.id.clone();
                    self.regions.push(region);
                    id
                });
                if let Err(ref e) = result {
                    warn!("create failed: {e}");
                }
                match batch {
                    Some(batch) => self.record(batch, result.is_ok()),
                    None => Completion::Created { ticket: response.ticket, result },
                }
            }
            PendingOp::Update { id, merged, batch } => {
                let result = match response.outcome {
                    Outcome::Updated(result) => result.map(|_| ()),
                    other => Err(unexpected("update", &other)),
                };
                match result {
                    Ok(()) => {
                        if let Some(region) = self.regions.iter_mut().find(|r| r.id == id) {
                            region.fields = merged;
                        }
                    }
                    Err(ref e) => warn!("update of region {id} failed: {e}"),
                }
                match batch {
                    Some(batch) => self.record(batch, result.is_ok()),
                    None => Completion::Updated { id, result },
                }
            }
            PendingOp::Delete { id, batch } => {
                let result = match response.outcome {
                    Outcome::Deleted(result) => result,
                    other => Err(unexpected("delete", &other)),
                };
                match result {
                    Ok(()) => self.regions.retain(|r| r.id != id),
                    Err(ref e) => warn!("delete of region {id} failed: {e}"),
                }
                match batch {
                    Some(batch) => self.record(batch, result.is_ok()),
                    None => Completion::Deleted { id, result },
                }
            }
        };
        Some(completion)
    }

    // --- Internals ---

    fn issue(&mut self, op: PendingOp) -> Ticket {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.in_flight.insert(ticket, op);
        ticket
    }

    fn allocate_batch(&mut self) -> BatchId {
        self.next_batch += 1;
        self.next_batch
    }

    fn create_in(&mut self, fields: RegionFields, batch: Option<BatchId>) -> Result<Request, RegionError> {
        let camera_id = self.camera_id.clone().ok_or(RegionError::NoCamera)?;
        fields.validate()?;
        let ticket = self.issue(PendingOp::Create { batch });
        Ok(Request::Create { ticket, camera_id, fields })
    }

    fn open_batch(&mut self, batch: BatchId, kind: BatchKind, requests: Vec<Request>, refused: usize) -> BatchStart {
        if requests.is_empty() {
            let summary = (refused > 0).then_some(BatchSummary { kind, succeeded: 0, failed: refused });
            return BatchStart { batch: None, requests, summary };
        }
        self.batches.insert(
            batch,
            BatchProgress { kind, remaining: requests.len(), succeeded: 0, failed: refused },
        );
        BatchStart { batch: Some(batch), requests, summary: None }
    }

    fn record(&mut self, batch: BatchId, ok: bool) -> Completion {
        let Some(progress) = self.batches.get_mut(&batch) else {
            return Completion::BatchItem { batch, summary: None };
        };
        if ok {
            progress.succeeded += 1;
        } else {
            progress.failed += 1;
        }
        progress.remaining = progress.remaining.saturating_sub(1);
        if progress.remaining > 0 {
            return Completion::BatchItem { batch, summary: None };
        }
        let summary = BatchSummary { kind: progress.kind, succeeded: progress.succeeded, failed: progress.failed };
        self.batches.remove(&batch);
        info!("{}: {summary}", summary.kind.label());
        Completion::BatchItem { batch, summary: Some(summary) }
    }

    fn finish_fetch(&mut self, outcome: Outcome) -> Completion {
        let result = match outcome {
            Outcome::Listed(result) => result,
            other => Err(unexpected("list", &other)),
        };
        match result {
            Ok(regions) => {
                info!(
                    "loaded {} region(s) for camera {}",
                    regions.len(),
                    self.camera_id.as_deref().unwrap_or_default()
                );
                self.regions = regions;
                self.load_state = LoadState::Loaded;
                Completion::Fetched(Ok(self.regions.len()))
            }
            Err(e) => {
                warn!("region fetch failed: {e}");
                self.regions.clear();
                self.load_state = LoadState::Failed;
                Completion::Fetched(Err(e))
            }
        }
    }
}

fn unexpected(expected: &str, outcome: &Outcome) -> GatewayError {
    let got = match outcome {
        Outcome::Listed(_) => "list",
        Outcome::Created(_) => "create",
        Outcome::Updated(_) => "update",
        Outcome::Deleted(_) => "delete",
    };
    GatewayError::new(format!("expected {expected} response, got {got}"))
}
