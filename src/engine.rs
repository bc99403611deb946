//! Top-level editor engine.
//!
//! [`EngineCore`] holds every piece of editor state and all logic that does
//! not need a browser: it is what the tests drive. [`Engine`] wraps it with
//! the canvas element and translates DOM events.
//!
//! Input handlers are synchronous and return [`Action`]s. An
//! [`Action::Persist`] asks the host to run a gateway request; the host feeds
//! the [`Response`] back through [`EngineCore::handle_response`].
//! [`EngineCore::settle`] does that loop itself for hosts that can await.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::cell::Cell;
use std::rc::Rc;

use log::{debug, info};
use time::OffsetDateTime;
use wasm_bindgen::JsValue;
use web_sys::{HtmlCanvasElement, HtmlImageElement, KeyboardEvent, MouseEvent};

use crate::canvas_handle::CanvasHandle;
use crate::config::EditorConfig;
use crate::config_io::{self, ExportedFile, ImportMode, ImportedConfig};
use crate::drawing::{DrawingError, DrawingStateMachine, EditorState};
use crate::gateway::{self, RegionGateway, Request, Response};
use crate::geometry::Point;
use crate::input::{Button, Key, Modifiers, Notice};
use crate::observer::{Change, Listener, Subject, Subscription};
use crate::region::{Region, RegionForm, RegionId, RegionKind, RegionPatch};
use crate::render::{self, DisplayOptions, Scene};
use crate::repository::{BatchStart, BatchSummary, Completion, RegionError, RegionRepository};
use crate::viewport::{ClientRect, Viewport};

/// Actions returned from input handlers for the host to process.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Editor state changed; repaint.
    RenderNeeded,
    /// Run this request against the gateway and hand the response back.
    Persist(Request),
    /// Show a message to the operator.
    Notify(Notice),
    /// Offer a file for download.
    Download(ExportedFile),
}

/// Where the background image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundSource {
    CameraSnapshot { camera_id: String },
    Upload { file_name: String },
}

/// The raster the regions are drawn over. Size is the image's natural size.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub source: BackgroundSource,
    pub width: f64,
    pub height: f64,
}

/// Process-local view state.
#[derive(Debug, Clone, Default)]
pub struct EditorSession {
    pub background: Option<Background>,
    pub selected: Option<RegionId>,
    pub hovered: Option<RegionId>,
    pub display: DisplayOptions,
    /// Preset for the next drawn region.
    pub draw_form: RegionForm,
}

/// Core engine state: all logic that doesn't depend on the canvas element.
pub struct EngineCore {
    pub config: EditorConfig,
    pub repo: RegionRepository,
    pub machine: DrawingStateMachine,
    pub viewport: Viewport,
    pub session: EditorSession,
    changes: Subject,
    clock: fn() -> OffsetDateTime,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl EngineCore {
    #[must_use]
    pub fn new(config: EditorConfig) -> Self {
        Self {
            viewport: Viewport::new(config.zoom),
            config,
            repo: RegionRepository::new(),
            machine: DrawingStateMachine::new(),
            session: EditorSession::default(),
            changes: Subject::new(),
            clock: OffsetDateTime::now_utc,
        }
    }

    /// Replace the time source used for auto-naming and export timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Listen for state changes.
    #[must_use]
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        self.changes.subscribe(listener)
    }

    // --- Camera / background / display ---

    /// Switch camera: discards the draft, edit and selection, and requests
    /// the camera's regions.
    pub fn select_camera(&mut self, camera_id: &str) -> Vec<Action> {
        info!("selecting camera {camera_id}");
        self.machine.reset();
        self.session.selected = None;
        self.session.hovered = None;
        let stale_snapshot = matches!(
            &self.session.background,
            Some(Background { source: BackgroundSource::CameraSnapshot { camera_id: bg }, .. }) if bg != camera_id
        );
        if stale_snapshot {
            self.session.background = None;
            self.changes.publish(Change::Background);
        }
        let request = self.repo.fetch_all(camera_id);
        self.changes.publish(Change::Regions);
        self.changes.publish(Change::Drawing);
        self.changes.publish(Change::Selection);
        vec![Action::Persist(request), Action::RenderNeeded]
    }

    /// Load or clear the background. A new background invalidates the draft.
    pub fn set_background(&mut self, background: Option<Background>) -> Vec<Action> {
        if self.machine.is_drawing() && !self.machine.is_busy() {
            self.machine.cancel_drawing();
            self.changes.publish(Change::Drawing);
        }
        self.session.background = background;
        self.changes.publish(Change::Background);
        vec![Action::RenderNeeded]
    }

    pub fn set_display(&mut self, display: DisplayOptions) -> Vec<Action> {
        if self.session.display == display {
            return Vec::new();
        }
        self.session.display = display;
        self.changes.publish(Change::Display);
        vec![Action::RenderNeeded]
    }

    /// Choose the type of the next drawn region, loading its preset.
    pub fn set_region_kind(&mut self, kind: RegionKind) {
        self.session.draw_form.apply_kind(kind);
    }

    /// The form used for the next drawn region.
    pub fn draw_form_mut(&mut self) -> &mut RegionForm {
        &mut self.session.draw_form
    }

    // --- Zoom ---

    pub fn zoom_in(&mut self) -> Vec<Action> {
        let changed = self.viewport.zoom_in();
        self.scale_changed(changed)
    }

    pub fn zoom_out(&mut self) -> Vec<Action> {
        let changed = self.viewport.zoom_out();
        self.scale_changed(changed)
    }

    pub fn reset_zoom(&mut self) -> Vec<Action> {
        let changed = self.viewport.reset_zoom();
        self.scale_changed(changed)
    }

    pub fn set_scale(&mut self, scale: f64) -> Vec<Action> {
        let changed = self.viewport.set_scale(scale);
        self.scale_changed(changed)
    }

    fn scale_changed(&self, changed: bool) -> Vec<Action> {
        if !changed {
            return Vec::new();
        }
        debug!("scale now {}", self.viewport.scale());
        self.changes.publish(Change::Scale);
        vec![Action::RenderNeeded]
    }

    // --- Drawing ---

    pub fn start_drawing(&mut self) -> Vec<Action> {
        match self.machine.start_drawing(self.session.background.is_some()) {
            Ok(()) => {
                self.session.selected = None;
                self.changes.publish(Change::Drawing);
                self.changes.publish(Change::Selection);
                vec![Action::RenderNeeded]
            }
            Err(e) => vec![drawing_notice(&e)],
        }
    }

    pub fn cancel_drawing(&mut self) -> Vec<Action> {
        if !self.machine.cancel_drawing() {
            return Vec::new();
        }
        self.changes.publish(Change::Drawing);
        vec![Action::RenderNeeded]
    }

    /// Commit the draft using the draw form.
    pub fn finish_drawing(&mut self) -> Vec<Action> {
        let now = (self.clock)();
        match self.machine.finish_drawing(&self.session.draw_form, &mut self.repo, now) {
            Ok(request) => {
                self.changes.publish(Change::Drawing);
                vec![Action::Persist(request), Action::RenderNeeded]
            }
            Err(e) => vec![drawing_notice(&e)],
        }
    }

    // --- Pointer / keyboard ---

    /// Primary-button press: adds a vertex while drawing, otherwise selects
    /// the topmost region under the pointer.
    pub fn on_pointer_down(&mut self, client: Point, rect: ClientRect, button: Button) -> Vec<Action> {
        if button != Button::Primary {
            return Vec::new();
        }
        let logical = self.viewport.logical_from_event(client, rect);
        if self.machine.is_drawing() {
            return match self.machine.add_point(logical) {
                Ok(()) => {
                    self.changes.publish(Change::Drawing);
                    vec![Action::RenderNeeded]
                }
                Err(e) => vec![drawing_notice(&e)],
            };
        }
        let hit = self.repo.hit_test(logical).map(|r| r.id.clone());
        self.select_region(hit)
    }

    pub fn on_pointer_move(&mut self, client: Point, rect: ClientRect) -> Vec<Action> {
        let logical = self.viewport.logical_from_event(client, rect);
        if self.machine.is_drawing() {
            return if self.machine.track_pointer(logical) { vec![Action::RenderNeeded] } else { Vec::new() };
        }
        let hovered = self.repo.hit_test(logical).map(|r| r.id.clone());
        if hovered != self.session.hovered {
            self.session.hovered = hovered;
            self.changes.publish(Change::Selection);
        }
        Vec::new()
    }

    /// Double-click finishes the draft when it has enough points.
    pub fn on_double_click(&mut self) -> Vec<Action> {
        let now = (self.clock)();
        match self.machine.double_click(&self.session.draw_form, &mut self.repo, now) {
            Ok(Some(request)) => {
                self.changes.publish(Change::Drawing);
                vec![Action::Persist(request), Action::RenderNeeded]
            }
            Ok(None) => Vec::new(),
            Err(e) => vec![drawing_notice(&e)],
        }
    }

    /// Escape cancels the draft or edit (else clears the selection), Enter
    /// finishes the draft, Delete removes the selected region. Delete with
    /// Ctrl, Meta or Alt held is left to the browser.
    pub fn on_key_down(&mut self, key: &Key, modifiers: Modifiers) -> Vec<Action> {
        if key.is_escape() {
            if self.machine.is_drawing() {
                return self.cancel_drawing();
            }
            if self.machine.edit().is_some() {
                return self.cancel_edit();
            }
            return self.select_region(None);
        }
        if key.is_enter() && self.machine.is_drawing() {
            return self.finish_drawing();
        }
        if key.is_delete() && !modifiers.is_command() && self.machine.is_idle() {
            if let Some(id) = self.session.selected.clone() {
                return self.delete_region(&id);
            }
        }
        Vec::new()
    }

    // --- Selection / editing ---

    /// Select `id` (or clear the selection). Unknown ids clear it.
    pub fn select_region(&mut self, id: Option<RegionId>) -> Vec<Action> {
        let id = id.filter(|id| self.repo.get(id).is_some());
        if id == self.session.selected {
            return Vec::new();
        }
        self.session.selected = id;
        self.changes.publish(Change::Selection);
        vec![Action::RenderNeeded]
    }

    /// Open the edit form for `id`.
    pub fn edit_region(&mut self, id: &RegionId) -> Vec<Action> {
        let Some(region) = self.repo.get(id) else {
            return vec![region_notice(&RegionError::UnknownRegion(id.clone()))];
        };
        if let Err(e) = self.machine.select_for_edit(region) {
            return vec![drawing_notice(&e)];
        }
        self.session.selected = Some(id.clone());
        self.changes.publish(Change::Drawing);
        self.changes.publish(Change::Selection);
        vec![Action::RenderNeeded]
    }

    /// The open edit form, if any.
    pub fn edit_form_mut(&mut self) -> Option<&mut RegionForm> {
        self.machine.edit_form_mut()
    }

    pub fn save_edit(&mut self) -> Vec<Action> {
        match self.machine.save_edit(&mut self.repo) {
            Ok(Some(request)) => vec![Action::Persist(request)],
            Ok(None) => {
                self.changes.publish(Change::Drawing);
                vec![Action::Notify(Notice::info("No changes to save")), Action::RenderNeeded]
            }
            Err(e) => vec![drawing_notice(&e)],
        }
    }

    pub fn cancel_edit(&mut self) -> Vec<Action> {
        if !self.machine.cancel_edit() {
            return Vec::new();
        }
        self.changes.publish(Change::Drawing);
        vec![Action::RenderNeeded]
    }

    /// Enable or disable a single region.
    pub fn set_region_enabled(&mut self, id: &RegionId, enabled: bool) -> Vec<Action> {
        match self.repo.update(id, &RegionPatch::enabled(enabled)) {
            Ok(Some(request)) => vec![Action::Persist(request)],
            Ok(None) => Vec::new(),
            Err(e) => vec![region_notice(&e)],
        }
    }

    /// Request deletion; the region stays until the gateway confirms.
    pub fn delete_region(&mut self, id: &RegionId) -> Vec<Action> {
        match self.repo.delete(id) {
            Ok(request) => vec![Action::Persist(request)],
            Err(e) => vec![region_notice(&e)],
        }
    }

    // --- Batches ---

    pub fn batch_set_enabled(&mut self, enabled: bool) -> Vec<Action> {
        let start = self.repo.batch_set_enabled(enabled);
        batch_actions(start)
    }

    pub fn batch_delete(&mut self) -> Vec<Action> {
        let start = self.repo.batch_delete();
        batch_actions(start)
    }

    // --- Export / import ---

    /// Offer the current region set as a download.
    pub fn export_config(&self) -> Vec<Action> {
        let Some(camera) = self.repo.camera_id() else {
            return vec![region_notice(&RegionError::NoCamera)];
        };
        match config_io::export_config(camera, self.repo.regions(), (self.clock)()) {
            Ok(file) => vec![Action::Download(file)],
            Err(e) => vec![Action::Notify(Notice::error(format!("Export failed: {e}")))],
        }
    }

    /// Parse `json` and apply it. Nothing is applied if the document is invalid.
    pub fn import_json(&mut self, json: &str, mode: ImportMode) -> Vec<Action> {
        match config_io::import_config(json) {
            Ok(config) => self.apply_import(config, mode),
            Err(e) => vec![Action::Notify(Notice::error(format!("Import failed: {e}")))],
        }
    }

    /// Create the imported regions, first deleting the existing ones in
    /// [`ImportMode::Replace`].
    pub fn apply_import(&mut self, config: ImportedConfig, mode: ImportMode) -> Vec<Action> {
        if self.repo.camera_id().is_none() {
            return vec![region_notice(&RegionError::NoCamera)];
        }
        let mut actions = Vec::new();
        if mode == ImportMode::Replace {
            actions.extend(batch_actions(self.repo.batch_delete()));
        }
        actions.extend(batch_actions(self.repo.batch_create(config.into_fields())));
        actions
    }

    // --- Gateway completions ---

    /// Apply a gateway response. Responses for a previous camera are ignored.
    pub fn handle_response(&mut self, response: Response) -> Vec<Action> {
        let ticket = response.ticket;
        let Some(completion) = self.repo.complete(response) else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        match completion {
            Completion::Fetched(Ok(_)) => {}
            Completion::Fetched(Err(e)) => {
                actions.push(Action::Notify(Notice::error(format!("Failed to load regions: {e}"))));
            }
            Completion::Created { result, .. } => {
                self.machine.on_completion(ticket, result.is_ok());
                self.changes.publish(Change::Drawing);
                actions.push(Action::Notify(match result {
                    Ok(_) => Notice::info("Region created"),
                    Err(e) => Notice::error(format!("Failed to save region: {e}")),
                }));
            }
            Completion::Updated { result, .. } => {
                if self.machine.on_completion(ticket, result.is_ok()) {
                    self.changes.publish(Change::Drawing);
                }
                if let Err(e) = result {
                    actions.push(Action::Notify(Notice::error(format!("Failed to update region: {e}"))));
                }
            }
            Completion::Deleted { id, result } => {
                actions.push(Action::Notify(match result {
                    Ok(()) => Notice::info("Region deleted"),
                    Err(e) => Notice::error(format!("Failed to delete region {id}: {e}")),
                }));
            }
            Completion::BatchItem { summary, .. } => {
                if let Some(summary) = summary {
                    actions.push(Action::Notify(summary_notice(summary)));
                }
            }
        }

        self.reconcile_selection();
        self.changes.publish(Change::Regions);
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Run every [`Action::Persist`] in `actions` against `gateway`,
    /// concurrently, until none remain. Returns the other actions in order.
    pub async fn settle(&mut self, gateway: &dyn RegionGateway, mut actions: Vec<Action>) -> Vec<Action> {
        let mut settled = Vec::new();
        loop {
            let mut requests = Vec::new();
            for action in actions {
                match action {
                    Action::Persist(request) => requests.push(request),
                    other => settled.push(other),
                }
            }
            if requests.is_empty() {
                return settled;
            }
            let responses = gateway::execute_all(gateway, requests).await;
            actions = responses
                .into_iter()
                .flat_map(|response| self.handle_response(response))
                .collect();
        }
    }

    fn reconcile_selection(&mut self) {
        if let Some(id) = self.session.selected.clone() {
            if self.repo.get(&id).is_none() {
                self.session.selected = None;
                self.changes.publish(Change::Selection);
            }
        }
        if let Some(id) = self.session.hovered.clone() {
            if self.repo.get(&id).is_none() {
                self.session.hovered = None;
            }
        }
        if let Some(id) = self.machine.editing_id().cloned() {
            if self.repo.get(&id).is_none() {
                self.machine.forget(&id);
                self.changes.publish(Change::Drawing);
            }
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        self.repo.regions()
    }

    #[must_use]
    pub fn selection(&self) -> Option<&RegionId> {
        self.session.selected.as_ref()
    }

    #[must_use]
    pub fn hovered(&self) -> Option<&Region> {
        self.session.hovered.as_ref().and_then(|id| self.repo.get(id))
    }

    #[must_use]
    pub fn state(&self) -> &EditorState {
        self.machine.state()
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.viewport.scale()
    }

    /// Ids of regions too small to be useful.
    #[must_use]
    pub fn issues(&self) -> Vec<&RegionId> {
        self.repo.issues(self.config.min_region_extent_px)
    }

    /// Client-space point at which to show `id`'s tooltip (its centroid).
    #[must_use]
    pub fn tooltip_anchor(&self, id: &RegionId, rect: ClientRect) -> Option<Point> {
        let centroid = self.repo.get(id)?.fields.shape.centroid()?;
        Some(self.viewport.client_from_logical(centroid, rect))
    }

    /// Canvas size in device pixels.
    #[must_use]
    pub fn canvas_size(&self) -> (f64, f64) {
        self.scene().canvas_size()
    }

    /// Everything the renderer needs.
    #[must_use]
    pub fn scene(&self) -> Scene<'_> {
        Scene {
            regions: self.repo.regions(),
            background: self.session.background.as_ref().map(|b| (b.width, b.height)),
            state: self.machine.state(),
            selected: self.session.selected.as_ref(),
            scale: self.viewport.scale(),
            display: self.session.display,
            grid_spacing: self.config.grid_spacing,
        }
    }
}

fn batch_actions(start: BatchStart) -> Vec<Action> {
    if let Some(summary) = start.summary {
        return vec![Action::Notify(summary_notice(summary))];
    }
    if start.requests.is_empty() {
        return vec![Action::Notify(Notice::info("Nothing to change"))];
    }
    start.requests.into_iter().map(Action::Persist).collect()
}

fn summary_notice(summary: BatchSummary) -> Notice {
    let message = format!("{}: {summary}", summary.kind.label());
    if summary.failed == 0 { Notice::info(message) } else { Notice::warning(message) }
}

fn region_notice(error: &RegionError) -> Action {
    let notice = match error {
        RegionError::Validation(e) => Notice::warning(e.to_string()).for_field(e.field()),
        RegionError::Gateway(e) => Notice::error(e.to_string()),
        RegionError::NoCamera | RegionError::UnknownRegion(_) | RegionError::Busy(_) => {
            Notice::warning(error.to_string())
        }
    };
    Action::Notify(notice)
}

fn drawing_notice(error: &DrawingError) -> Action {
    if let DrawingError::Region(e) = error {
        return region_notice(e);
    }
    let notice = Notice::warning(error.to_string());
    Action::Notify(match error.field() {
        Some(field) => notice.for_field(field),
        None => notice,
    })
}

/// The full editor engine. Wraps `EngineCore` and owns the canvas.
pub struct Engine {
    canvas: CanvasHandle,
    pub core: EngineCore,
    dirty: Rc<Cell<bool>>,
    _changes: Subscription,
}

impl Engine {
    /// Bind to `canvas`, acquiring its 2D context.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the canvas has no 2D context.
    pub fn new(canvas: HtmlCanvasElement, config: EditorConfig) -> Result<Self, JsValue> {
        let canvas = CanvasHandle::acquire(canvas)?;
        let core = EngineCore::new(config);
        let dirty = Rc::new(Cell::new(true));
        let flag = Rc::clone(&dirty);
        let changes = core.subscribe(Rc::new(move |_: Change| flag.set(true)));
        Ok(Self { canvas, core, dirty, _changes: changes })
    }

    // --- Background ---

    /// Draw over `image`, sized by its natural dimensions.
    pub fn set_background_image(&mut self, image: HtmlImageElement, source: BackgroundSource) -> Vec<Action> {
        let background = Background {
            source,
            width: f64::from(image.natural_width()),
            height: f64::from(image.natural_height()),
        };
        self.canvas.set_image(Some(image));
        self.core.set_background(Some(background))
    }

    pub fn clear_background(&mut self) -> Vec<Action> {
        self.canvas.set_image(None);
        self.core.set_background(None)
    }

    // --- DOM events ---

    pub fn on_mouse_down(&mut self, event: &MouseEvent) -> Vec<Action> {
        let rect = self.canvas.client_rect();
        self.core.on_pointer_down(client_point(event), rect, Button::from_dom(event.button()))
    }

    pub fn on_mouse_move(&mut self, event: &MouseEvent) -> Vec<Action> {
        let rect = self.canvas.client_rect();
        self.core.on_pointer_move(client_point(event), rect)
    }

    pub fn on_double_click(&mut self, _event: &MouseEvent) -> Vec<Action> {
        self.core.on_double_click()
    }

    pub fn on_key_down(&mut self, event: &KeyboardEvent) -> Vec<Action> {
        let modifiers = Modifiers {
            shift: event.shift_key(),
            ctrl: event.ctrl_key(),
            alt: event.alt_key(),
            meta: event.meta_key(),
        };
        self.core.on_key_down(&Key::new(event.key()), modifiers)
    }

    /// Client-space anchor for the hovered region's tooltip.
    #[must_use]
    pub fn hover_tooltip(&self) -> Option<(Point, &Region)> {
        let region = self.core.hovered()?;
        let anchor = self.core.tooltip_anchor(&region.id, self.canvas.client_rect())?;
        Some((anchor, region))
    }

    // --- Render ---

    /// Repaint unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a `Canvas2D` call fails.
    pub fn render(&mut self) -> Result<(), JsValue> {
        render::draw(&mut self.canvas, &self.core.scene())?;
        self.dirty.set(false);
        Ok(())
    }

    /// Repaint only if state changed since the last render.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a `Canvas2D` call fails.
    pub fn render_if_dirty(&mut self) -> Result<bool, JsValue> {
        if !self.dirty.get() {
            return Ok(false);
        }
        self.render()?;
        Ok(true)
    }

    /// Release the canvas context and return the element.
    #[must_use]
    pub fn teardown(self) -> HtmlCanvasElement {
        self.canvas.release()
    }
}

fn client_point(event: &MouseEvent) -> Point {
    Point::new(f64::from(event.client_x()), f64::from(event.client_y()))
}
