//! Drawing state machine: the operator's current gesture over the canvas.
//!
//! ```text
//!            start_drawing                    finish (gateway ok)
//!   Idle ─────────────────▶ Drawing ───────────────────────────▶ Idle
//!    ▲  ◀──────────────────    │ add_point / track_pointer
//!    │    cancel / Escape      └──────────┘
//!    │
//!    │ select_for_edit        save (gateway ok) / cancel_edit / no-op save
//!    └──────────────▶ Editing ─────────────────────────────────────▶ Idle
//! ```
//!
//! Commits are split-phase. `finish_drawing` and `save_edit` hand a
//! [`Request`] back to the caller and park the machine with the request's
//! ticket until [`DrawingStateMachine::on_completion`] reports the outcome.
//! A failed commit leaves the machine where it was, draft points and
//! working copy intact, so the operator can retry.

#[cfg(test)]
#[path = "drawing_test.rs"]
mod drawing_test;

use log::debug;
use time::OffsetDateTime;

use crate::consts::MIN_POLYGON_POINTS;
use crate::gateway::{Request, Ticket};
use crate::geometry::{Point, Shape};
use crate::region::{FormField, Region, RegionFields, RegionForm, RegionId, RegionKind, RegionPatch};
use crate::repository::{RegionError, RegionRepository};

/// Why a transition was refused. The state is unchanged in every case.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DrawingError {
    #[error("load a camera frame or image before drawing")]
    NoBackground,
    #[error("not drawing")]
    NotDrawing,
    #[error("no region is being edited")]
    NotEditing,
    #[error("finish or cancel the current drawing first")]
    DrawingInProgress,
    #[error("still saving; wait for the previous request")]
    Busy,
    #[error("a region needs at least 3 points (got {0})")]
    TooFewPoints(usize),
    #[error(transparent)]
    Region(#[from] RegionError),
}

impl DrawingError {
    /// The form field to highlight, for validation failures.
    #[must_use]
    pub fn field(&self) -> Option<FormField> {
        match self {
            Self::Region(RegionError::Validation(e)) => Some(e.field()),
            Self::TooFewPoints(_) => Some(FormField::Points),
            _ => None,
        }
    }
}

/// An in-progress, uncommitted polygon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    /// Committed vertices in logical coordinates.
    pub points: Vec<Point>,
    /// Last pointer position, for the live edge.
    pub pointer: Option<Point>,
    /// Ticket of the create request while it is in flight.
    pub committing: Option<Ticket>,
}

/// Working copy of an existing region.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub id: RegionId,
    pub form: RegionForm,
    pub shape: Shape,
    /// Fields as they were when the edit opened; saving sends only what the
    /// operator changed relative to these.
    pub original: RegionFields,
    /// Ticket of the update request while it is in flight.
    pub saving: Option<Ticket>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum EditorState {
    #[default]
    Idle,
    Drawing(Draft),
    Editing(EditSession),
}

#[derive(Debug, Default)]
pub struct DrawingStateMachine {
    state: EditorState,
}

impl DrawingStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Queries ---

    #[must_use]
    pub fn state(&self) -> &EditorState {
        &self.state
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == EditorState::Idle
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        matches!(self.state, EditorState::Drawing(_))
    }

    #[must_use]
    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            EditorState::Drawing(draft) => Some(draft),
            _ => None,
        }
    }

    #[must_use]
    pub fn edit(&self) -> Option<&EditSession> {
        match &self.state {
            EditorState::Editing(session) => Some(session),
            _ => None,
        }
    }

    /// The working copy, for the host's edit form.
    pub fn edit_form_mut(&mut self) -> Option<&mut RegionForm> {
        match &mut self.state {
            EditorState::Editing(session) if session.saving.is_none() => Some(&mut session.form),
            _ => None,
        }
    }

    /// Id of the region being edited.
    #[must_use]
    pub fn editing_id(&self) -> Option<&RegionId> {
        self.edit().map(|s| &s.id)
    }

    /// Whether a commit is waiting on the gateway.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match &self.state {
            EditorState::Idle => false,
            EditorState::Drawing(draft) => draft.committing.is_some(),
            EditorState::Editing(session) => session.saving.is_some(),
        }
    }

    // --- Drawing ---

    /// Enter `Drawing` with an empty draft, discarding any prior draft or edit.
    ///
    /// # Errors
    ///
    /// [`DrawingError::NoBackground`] without a background to draw on, or
    /// [`DrawingError::Busy`] while a commit is in flight.
    pub fn start_drawing(&mut self, has_background: bool) -> Result<(), DrawingError> {
        if !has_background {
            return Err(DrawingError::NoBackground);
        }
        if self.is_busy() {
            return Err(DrawingError::Busy);
        }
        debug!("drawing started");
        self.state = EditorState::Drawing(Draft::default());
        Ok(())
    }

    /// Append a vertex.
    ///
    /// # Errors
    ///
    /// [`DrawingError::NotDrawing`] outside `Drawing`, [`DrawingError::Busy`]
    /// while the draft is being committed.
    pub fn add_point(&mut self, point: Point) -> Result<(), DrawingError> {
        let draft = self.open_draft()?;
        draft.points.push(point);
        draft.pointer = Some(point);
        Ok(())
    }

    /// Record the pointer position. Returns whether a redraw is needed.
    pub fn track_pointer(&mut self, point: Point) -> bool {
        match &mut self.state {
            EditorState::Drawing(draft) if draft.committing.is_none() && !draft.points.is_empty() => {
                draft.pointer = Some(point);
                true
            }
            _ => false,
        }
    }

    /// Validate the draft and request its creation.
    ///
    /// A blank name becomes `"<TypeLabel>_<HHMMSS>"` from `now`. On success the
    /// draft waits for the returned request's response.
    ///
    /// # Errors
    ///
    /// [`DrawingError::TooFewPoints`] below three vertices, or
    /// [`DrawingError::Region`] when validation or the repository refuses.
    /// Draft points are kept in every case.
    pub fn finish_drawing(
        &mut self,
        form: &RegionForm,
        repo: &mut RegionRepository,
        now: OffsetDateTime,
    ) -> Result<Request, DrawingError> {
        let draft = self.open_draft()?;
        if draft.points.len() < MIN_POLYGON_POINTS {
            return Err(DrawingError::TooFewPoints(draft.points.len()));
        }

        let mut form = form.clone();
        if form.name.trim().is_empty() {
            form.name = auto_name(form.kind, now);
        }
        let fields = form
            .build(Shape::polygon(draft.points.clone()))
            .map_err(RegionError::from)?;
        let request = repo.create(fields)?;
        draft.committing = Some(request.ticket());
        debug!("draft committing as ticket {}", request.ticket());
        Ok(request)
    }

    /// Double-click finishes the polygon when it has enough points; otherwise
    /// it is ignored.
    ///
    /// # Errors
    ///
    /// As [`Self::finish_drawing`], once the point threshold is met.
    pub fn double_click(
        &mut self,
        form: &RegionForm,
        repo: &mut RegionRepository,
        now: OffsetDateTime,
    ) -> Result<Option<Request>, DrawingError> {
        let ready = self
            .draft()
            .is_some_and(|d| d.committing.is_none() && d.points.len() >= MIN_POLYGON_POINTS);
        if !ready {
            return Ok(None);
        }
        self.finish_drawing(form, repo, now).map(Some)
    }

    /// Discard the draft. Returns whether anything was discarded.
    pub fn cancel_drawing(&mut self) -> bool {
        if !self.is_drawing() {
            return false;
        }
        debug!("drawing cancelled");
        self.state = EditorState::Idle;
        true
    }

    // --- Editing ---

    /// Open a working copy of `region`.
    ///
    /// # Errors
    ///
    /// [`DrawingError::DrawingInProgress`] while drawing, or
    /// [`DrawingError::Busy`] while a previous edit is saving.
    pub fn select_for_edit(&mut self, region: &Region) -> Result<(), DrawingError> {
        match &self.state {
            EditorState::Drawing(_) => return Err(DrawingError::DrawingInProgress),
            EditorState::Editing(session) if session.saving.is_some() => return Err(DrawingError::Busy),
            EditorState::Idle | EditorState::Editing(_) => {}
        }
        debug!("editing region {}", region.id);
        self.state = EditorState::Editing(EditSession {
            id: region.id.clone(),
            form: RegionForm::from_fields(&region.fields),
            shape: region.fields.shape.clone(),
            original: region.fields.clone(),
            saving: None,
        });
        Ok(())
    }

    /// Validate the working copy and request the update.
    ///
    /// Returns `Ok(None)` when nothing changed; the machine returns to `Idle`
    /// without a request.
    ///
    /// # Errors
    ///
    /// [`DrawingError::NotEditing`], [`DrawingError::Busy`], or
    /// [`DrawingError::Region`] for validation and repository refusals. The
    /// working copy is kept in every case.
    pub fn save_edit(&mut self, repo: &mut RegionRepository) -> Result<Option<Request>, DrawingError> {
        let EditorState::Editing(session) = &mut self.state else {
            return Err(DrawingError::NotEditing);
        };
        if session.saving.is_some() {
            return Err(DrawingError::Busy);
        }
        let fields = session.form.build(session.shape.clone()).map_err(RegionError::from)?;
        let patch = RegionPatch::diff(&session.original, &fields);

        match repo.update(&session.id, &patch)? {
            Some(request) => {
                session.saving = Some(request.ticket());
                Ok(Some(request))
            }
            None => {
                debug!("edit of region {} changed nothing", session.id);
                self.state = EditorState::Idle;
                Ok(None)
            }
        }
    }

    /// Discard the working copy. Returns whether an edit was open.
    pub fn cancel_edit(&mut self) -> bool {
        if self.edit().is_none() {
            return false;
        }
        self.state = EditorState::Idle;
        true
    }

    // --- Completions ---

    /// Resolve a commit that was waiting on `ticket`.
    ///
    /// Success returns to `Idle`; failure releases the wait and keeps the
    /// draft or working copy. Returns whether the ticket belonged to the
    /// machine.
    pub fn on_completion(&mut self, ticket: Ticket, succeeded: bool) -> bool {
        let waiting = match &mut self.state {
            EditorState::Drawing(draft) if draft.committing == Some(ticket) => &mut draft.committing,
            EditorState::Editing(session) if session.saving == Some(ticket) => &mut session.saving,
            _ => return false,
        };
        if succeeded {
            self.state = EditorState::Idle;
        } else {
            *waiting = None;
        }
        true
    }

    /// Drop the edit session if it refers to `id` (the region was deleted).
    pub fn forget(&mut self, id: &RegionId) {
        if self.editing_id() == Some(id) {
            self.state = EditorState::Idle;
        }
    }

    /// Back to `Idle` unconditionally (camera change).
    pub fn reset(&mut self) {
        self.state = EditorState::Idle;
    }

    fn open_draft(&mut self) -> Result<&mut Draft, DrawingError> {
        match &mut self.state {
            EditorState::Drawing(draft) if draft.committing.is_some() => Err(DrawingError::Busy),
            EditorState::Drawing(draft) => Ok(draft),
            _ => Err(DrawingError::NotDrawing),
        }
    }
}

fn auto_name(kind: Option<RegionKind>, now: OffsetDateTime) -> String {
    let label = kind.map_or("Region", RegionKind::label);
    format!("{label}_{:02}{:02}{:02}", now.hour(), now.minute(), now.second())
}
