#![allow(clippy::float_cmp)]

use std::cell::RefCell;

use futures::executor::block_on;
use time::macros::datetime;

use super::*;
use crate::gateway::{GatewayError, MemoryGateway, Outcome};
use crate::geometry::Shape;
use crate::input::NoticeLevel;
use crate::region::RegionFields;

// =============================================================
// Helpers
// =============================================================

fn fixed_clock() -> OffsetDateTime {
    datetime!(2024-03-05 14:07:09 UTC)
}

/// Memory gateway with switchable failures.
#[derive(Default)]
struct FlakyGateway {
    inner: MemoryGateway,
    fail_list: bool,
    fail_create: bool,
    fail_update_for: RefCell<Option<RegionId>>,
}

#[async_trait::async_trait(?Send)]
impl RegionGateway for FlakyGateway {
    async fn list_regions(&self, camera_id: &str) -> Result<Vec<Region>, GatewayError> {
        if self.fail_list {
            return Err(GatewayError::new("503 Service Unavailable"));
        }
        self.inner.list_regions(camera_id).await
    }

    async fn create_region(&self, camera_id: &str, fields: &crate::region::RegionFields) -> Result<Region, GatewayError> {
        if self.fail_create {
            return Err(GatewayError::new("offline"));
        }
        self.inner.create_region(camera_id, fields).await
    }

    async fn update_region(&self, id: &RegionId, patch: &RegionPatch) -> Result<Region, GatewayError> {
        if self.fail_update_for.borrow().as_ref() == Some(id) {
            return Err(GatewayError::new("timeout"));
        }
        self.inner.update_region(id, patch).await
    }

    async fn delete_region(&self, id: &RegionId) -> Result<(), GatewayError> {
        self.inner.delete_region(id).await
    }
}

fn seeded(gw: &MemoryGateway, camera: &str, id: &str, name: &str, x: f64) {
    gw.insert(
        camera,
        Region::new(
            RegionId::new(id),
            RegionFields::new(
                name,
                RegionKind::Monitoring,
                Shape::polygon(vec![
                    Point::new(x, 0.0),
                    Point::new(x + 50.0, 0.0),
                    Point::new(x + 50.0, 50.0),
                    Point::new(x, 50.0),
                ]),
            ),
        ),
    );
}

fn core() -> EngineCore {
    EngineCore::default().with_clock(fixed_clock)
}

fn run(core: &mut EngineCore, gw: &dyn RegionGateway, actions: Vec<Action>) -> Vec<Action> {
    block_on(core.settle(gw, actions))
}

/// Engine on `cam1` with its regions loaded and a 640x480 background.
fn ready(gw: &dyn RegionGateway) -> EngineCore {
    let mut core = core();
    let actions = core.select_camera("cam1");
    run(&mut core, gw, actions);
    core.set_background(Some(Background {
        source: BackgroundSource::Upload { file_name: "frame.png".into() },
        width: 640.0,
        height: 480.0,
    }));
    core
}

fn notices(actions: &[Action]) -> Vec<&Notice> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Notify(n) => Some(n),
            _ => None,
        })
        .collect()
}

fn persists(actions: &[Action]) -> usize {
    actions.iter().filter(|a| matches!(a, Action::Persist(_))).count()
}

const ORIGIN: ClientRect = ClientRect { left: 0.0, top: 0.0 };

fn click(core: &mut EngineCore, x: f64, y: f64) -> Vec<Action> {
    core.on_pointer_down(Point::new(x, y), ORIGIN, Button::Primary)
}

fn draw_triangle(core: &mut EngineCore) {
    core.start_drawing();
    click(core, 10.0, 10.0);
    click(core, 100.0, 10.0);
    click(core, 50.0, 100.0);
}

// =============================================================
// Camera / loading
// =============================================================

#[test]
fn select_camera_loads_regions() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    seeded(&gw, "cam2", "b", "Bay", 0.0);
    let core = ready(&gw);
    assert_eq!(core.regions().len(), 1);
    assert_eq!(core.regions()[0].fields.name, "Aisle");
}

#[test]
fn fetch_failure_leaves_set_empty_and_reports_error() {
    let gw = FlakyGateway { fail_list: true, ..FlakyGateway::default() };
    seeded(&gw.inner, "cam1", "a", "Aisle", 0.0);
    let mut core = core();
    let actions = core.select_camera("cam1");
    let out = run(&mut core, &gw, actions);
    assert!(core.regions().is_empty());
    let n = notices(&out);
    assert_eq!(n.len(), 1);
    assert_eq!(n[0].level, NoticeLevel::Error);
    assert!(n[0].message.contains("503"));
}

#[test]
fn camera_change_discards_draft_and_drops_late_responses() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    draw_triangle(&mut core);
    core.draw_form_mut().name = "Door".into();
    let pending = core.finish_drawing();

    let switch = core.select_camera("cam2");
    assert!(core.machine.is_idle());

    // The cam1 create completes after the switch.
    let late = run(&mut core, &gw, pending);
    assert!(notices(&late).is_empty());
    run(&mut core, &gw, switch);
    assert!(core.regions().is_empty());
}

#[test]
fn camera_change_drops_snapshot_of_other_camera() {
    let mut core = core();
    core.set_background(Some(Background {
        source: BackgroundSource::CameraSnapshot { camera_id: "cam1".into() },
        width: 100.0,
        height: 100.0,
    }));
    core.select_camera("cam1");
    assert!(core.session.background.is_some());
    core.select_camera("cam2");
    assert!(core.session.background.is_none());
}

// =============================================================
// Drawing
// =============================================================

#[test]
fn triangle_named_entrance_gets_entrance_preset() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    core.set_region_kind(RegionKind::Entrance);
    core.draw_form_mut().name = "Entrance".into();
    draw_triangle(&mut core);

    let actions = core.finish_drawing();
    assert_eq!(persists(&actions), 1);
    let out = run(&mut core, &gw, actions);

    assert_eq!(core.regions().len(), 1);
    let fields = &core.regions()[0].fields;
    assert_eq!(fields.name, "Entrance");
    assert_eq!(fields.kind, RegionKind::Entrance);
    assert_eq!(fields.sensitivity, 60.0);
    assert_eq!(fields.threshold, 0.7);
    assert_eq!(
        fields.shape.vertices(),
        [Point::new(10.0, 10.0), Point::new(100.0, 10.0), Point::new(50.0, 100.0)]
    );
    assert!(core.machine.is_idle());
    assert_eq!(notices(&out)[0].message, "Region created");
    assert_eq!(gw.regions("cam1").len(), 1);
}

#[test]
fn click_at_scale_two_stores_halved_point() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    core.set_scale(2.0);
    core.start_drawing();
    let rect = ClientRect::new(30.0, 40.0);
    core.on_pointer_down(Point::new(230.0, 240.0), rect, Button::Primary);
    assert_eq!(core.machine.draft().unwrap().points, [Point::new(100.0, 100.0)]);
}

#[test]
fn drawing_without_background_warns() {
    let mut core = core();
    core.select_camera("cam1");
    let actions = core.start_drawing();
    let n = notices(&actions);
    assert_eq!(n[0].level, NoticeLevel::Warning);
    assert!(core.machine.is_idle());
}

#[test]
fn finishing_with_two_points_never_creates() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    core.start_drawing();
    click(&mut core, 0.0, 0.0);
    click(&mut core, 40.0, 0.0);

    assert!(core.on_double_click().is_empty());
    let actions = core.finish_drawing();
    assert_eq!(persists(&actions), 0);
    assert_eq!(notices(&actions)[0].field, Some(crate::region::FormField::Points));
    assert_eq!(core.machine.draft().unwrap().points.len(), 2);
}

#[test]
fn double_click_finishes_with_auto_name() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    core.set_region_kind(RegionKind::Loitering);
    draw_triangle(&mut core);
    let actions = core.on_double_click();
    run(&mut core, &gw, actions);
    assert_eq!(core.regions()[0].fields.name, "Loitering_140709");
}

#[test]
fn escape_cancels_draft_without_persisting() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    draw_triangle(&mut core);
    let actions = core.on_key_down(&Key::new("Escape"), Modifiers::default());
    assert_eq!(actions, [Action::RenderNeeded]);
    assert!(core.machine.is_idle());
    assert!(core.regions().is_empty());
}

#[test]
fn enter_finishes_draft() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    core.draw_form_mut().name = "Lane".into();
    draw_triangle(&mut core);
    let actions = core.on_key_down(&Key::new("Enter"), Modifiers::default());
    assert_eq!(persists(&actions), 1);
}

#[test]
fn failed_create_keeps_draft_and_reports_error() {
    let gw = FlakyGateway { fail_create: true, ..FlakyGateway::default() };
    let mut core = ready(&gw);
    core.draw_form_mut().name = "Door".into();
    draw_triangle(&mut core);
    let actions = core.finish_drawing();
    let out = run(&mut core, &gw, actions);

    assert!(core.regions().is_empty());
    assert_eq!(core.machine.draft().unwrap().points.len(), 3);
    assert!(!core.machine.is_busy());
    let n = notices(&out);
    assert_eq!(n[0].level, NoticeLevel::Error);
    assert!(n[0].message.contains("offline"));
}

#[test]
fn new_background_discards_draft() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    draw_triangle(&mut core);
    core.set_background(None);
    assert!(core.machine.is_idle());
}

#[test]
fn pointer_move_tracks_live_edge_while_drawing() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    core.start_drawing();
    click(&mut core, 5.0, 5.0);
    let actions = core.on_pointer_move(Point::new(20.0, 30.0), ORIGIN);
    assert_eq!(actions, [Action::RenderNeeded]);
    assert_eq!(core.machine.draft().unwrap().pointer, Some(Point::new(20.0, 30.0)));
}

// =============================================================
// Selection / hover
// =============================================================

#[test]
fn click_selects_topmost_and_empty_click_clears() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "under", "Under", 0.0);
    seeded(&gw, "cam1", "over", "Over", 25.0);
    let mut core = ready(&gw);

    click(&mut core, 30.0, 10.0);
    assert_eq!(core.selection().map(RegionId::as_str), Some("over"));
    click(&mut core, 10.0, 10.0);
    assert_eq!(core.selection().map(RegionId::as_str), Some("under"));
    click(&mut core, 300.0, 300.0);
    assert!(core.selection().is_none());
}

#[test]
fn hover_and_tooltip_anchor() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    core.set_scale(2.0);
    let rect = ClientRect::new(10.0, 20.0);
    core.on_pointer_move(Point::new(60.0, 60.0), rect);
    assert_eq!(core.hovered().map(|r| r.fields.name.as_str()), Some("Aisle"));
    assert_eq!(core.tooltip_anchor(&RegionId::new("a"), rect), Some(Point::new(60.0, 70.0)));
}

// =============================================================
// Editing / delete
// =============================================================

#[test]
fn edit_save_applies_changes() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let id = RegionId::new("a");
    core.edit_region(&id);
    core.edit_form_mut().unwrap().threshold = 0.9;
    let actions = core.save_edit();
    run(&mut core, &gw, actions);
    assert_eq!(core.regions()[0].fields.threshold, 0.9);
    assert!(core.machine.is_idle());
    assert_eq!(gw.regions("cam1")[0].fields.threshold, 0.9);
}

#[test]
fn noop_edit_does_not_call_gateway() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    core.edit_region(&RegionId::new("a"));
    let actions = core.save_edit();
    assert_eq!(persists(&actions), 0);
    assert_eq!(notices(&actions)[0].level, NoticeLevel::Info);
    assert!(core.machine.is_idle());
}

#[test]
fn clearing_interval_in_edit_form_persists() {
    let gw = MemoryGateway::new();
    let mut fields = RegionFields::new("Aisle", RegionKind::Monitoring, Shape::polygon(vec![
        Point::new(0.0, 0.0),
        Point::new(50.0, 0.0),
        Point::new(0.0, 50.0),
    ]));
    fields.interval = Some(30);
    gw.insert("cam1", Region::new(RegionId::new("a"), fields));
    let mut core = ready(&gw);

    core.edit_region(&RegionId::new("a"));
    core.edit_form_mut().unwrap().interval = None;
    let actions = core.save_edit();
    assert_eq!(persists(&actions), 1);
    let out = run(&mut core, &gw, actions);

    assert!(notices(&out).is_empty());
    assert_eq!(core.regions()[0].fields.interval, None);
    assert_eq!(gw.regions("cam1")[0].fields.interval, None);
}

#[test]
fn batch_toggle_during_edit_survives_rename() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let id = RegionId::new("a");

    core.edit_region(&id);
    let actions = core.batch_set_enabled(false);
    run(&mut core, &gw, actions);
    assert!(!core.regions()[0].fields.enabled);

    core.edit_form_mut().unwrap().name = "Zone renamed".into();
    let actions = core.save_edit();
    let [Action::Persist(Request::Update { patch, .. })] = actions.as_slice() else {
        panic!("expected one update, got {actions:?}");
    };
    assert!(patch.enabled.is_none());
    run(&mut core, &gw, actions);

    let stored = &gw.regions("cam1")[0].fields;
    assert_eq!(stored.name, "Zone renamed");
    assert!(!stored.enabled);
    assert!(!core.regions()[0].fields.enabled);
}

#[test]
fn invalid_edit_reports_field() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    core.edit_region(&RegionId::new("a"));
    core.edit_form_mut().unwrap().name = String::new();
    let actions = core.save_edit();
    assert_eq!(notices(&actions)[0].field, Some(crate::region::FormField::Name));
    assert!(core.machine.edit().is_some());
}

#[test]
fn delete_key_removes_selected_region_after_confirmation() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    click(&mut core, 10.0, 10.0);
    let actions = core.on_key_down(&Key::new("Delete"), Modifiers::default());
    assert_eq!(core.regions().len(), 1);
    run(&mut core, &gw, actions);
    assert!(core.regions().is_empty());
    assert!(core.selection().is_none());
}

#[test]
fn ctrl_backspace_does_not_delete_selection() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    click(&mut core, 10.0, 10.0);

    let ctrl = Modifiers { ctrl: true, ..Modifiers::default() };
    assert!(core.on_key_down(&Key::new("Backspace"), ctrl).is_empty());
    let meta = Modifiers { meta: true, ..Modifiers::default() };
    assert!(core.on_key_down(&Key::new("Delete"), meta).is_empty());

    let shift = Modifiers { shift: true, ..Modifiers::default() };
    assert_eq!(persists(&core.on_key_down(&Key::new("Backspace"), shift)), 1);
}

#[test]
fn deleting_edited_region_closes_edit() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let id = RegionId::new("a");
    core.edit_region(&id);
    let actions = core.delete_region(&id);
    run(&mut core, &gw, actions);
    assert!(core.machine.is_idle());
}

#[test]
fn second_operation_on_pending_region_is_refused() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let id = RegionId::new("a");
    let first = core.set_region_enabled(&id, false);
    assert_eq!(persists(&first), 1);
    let second = core.delete_region(&id);
    assert_eq!(notices(&second)[0].level, NoticeLevel::Warning);
}

// =============================================================
// Batches
// =============================================================

#[test]
fn batch_disable_with_one_failure_reports_summary() {
    let gw = FlakyGateway::default();
    seeded(&gw.inner, "cam1", "a", "A1", 0.0);
    seeded(&gw.inner, "cam1", "b", "B1", 60.0);
    seeded(&gw.inner, "cam1", "c", "C1", 120.0);
    *gw.fail_update_for.borrow_mut() = Some(RegionId::new("b"));
    let mut core = ready(&gw);

    let actions = core.batch_set_enabled(false);
    assert_eq!(persists(&actions), 3);
    let out = run(&mut core, &gw, actions);

    let n = notices(&out);
    assert_eq!(n.len(), 1);
    assert_eq!(n[0].message, "Disable regions: 2 succeeded, 1 failed");
    assert_eq!(n[0].level, NoticeLevel::Warning);
    assert_eq!(core.repo.active_count(), 1);
}

#[test]
fn batch_with_nothing_to_change_says_so() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let actions = core.batch_set_enabled(true);
    assert_eq!(persists(&actions), 0);
    assert_eq!(notices(&actions)[0].level, NoticeLevel::Info);
}

#[test]
fn batch_delete_clears_everything() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "A1", 0.0);
    seeded(&gw, "cam1", "b", "B1", 60.0);
    let mut core = ready(&gw);
    let actions = core.batch_delete();
    let out = run(&mut core, &gw, actions);
    assert!(core.regions().is_empty());
    assert_eq!(notices(&out)[0].level, NoticeLevel::Info);
}

// =============================================================
// Export / import
// =============================================================

#[test]
fn export_offers_download() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let core = ready(&gw);
    let actions = core.export_config();
    let [Action::Download(file)] = actions.as_slice() else {
        panic!("expected download, got {actions:?}");
    };
    assert_eq!(file.filename, "region-config-cam1-1709647629000.json");
    assert!(file.contents.contains("\"Aisle\""));
}

#[test]
fn export_without_camera_warns() {
    let actions = core().export_config();
    assert_eq!(notices(&actions)[0].level, NoticeLevel::Warning);
}

#[test]
fn import_replace_swaps_region_set() {
    let source = MemoryGateway::new();
    seeded(&source, "cam9", "x", "Xray", 0.0);
    seeded(&source, "cam9", "y", "Yard", 60.0);
    let mut exporter = core();
    let actions = exporter.select_camera("cam9");
    run(&mut exporter, &source, actions);
    let exported = exporter.export_config();
    let [Action::Download(file)] = exported.as_slice() else {
        panic!("expected download, got {exported:?}");
    };

    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let actions = core.import_json(&file.contents, ImportMode::Replace);
    run(&mut core, &gw, actions);

    let names: Vec<&str> = core.regions().iter().map(|r| r.fields.name.as_str()).collect();
    assert_eq!(names, ["Xray", "Yard"]);
    assert_eq!(gw.regions("cam1").len(), 2);
}

#[test]
fn import_append_keeps_existing() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let json = r#"{"regions":[{"name":"Gate","type":"intrusion","points":[{"x":0,"y":0},{"x":30,"y":0},{"x":0,"y":30}],"sensitivity":80,"threshold":0.8}]}"#;
    let actions = core.import_json(json, ImportMode::Append);
    let out = run(&mut core, &gw, actions);
    assert_eq!(core.regions().len(), 2);
    assert_eq!(notices(&out)[0].message, "Import regions: 1 succeeded, 0 failed");
}

#[test]
fn invalid_import_changes_nothing() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let actions = core.import_json(r#"{"camera":"cam1"}"#, ImportMode::Replace);
    assert_eq!(persists(&actions), 0);
    assert_eq!(notices(&actions)[0].level, NoticeLevel::Error);
    assert_eq!(core.regions().len(), 1);
}

// =============================================================
// Zoom / display / notifications
// =============================================================

#[test]
fn zoom_is_clamped_and_points_are_untouched() {
    let gw = MemoryGateway::new();
    seeded(&gw, "cam1", "a", "Aisle", 0.0);
    let mut core = ready(&gw);
    let before = core.regions()[0].fields.clone();
    core.set_scale(3.0);
    assert!(core.zoom_in().is_empty());
    assert_eq!(core.scale(), 3.0);
    assert_eq!(core.zoom_out(), [Action::RenderNeeded]);
    assert_eq!(core.scale(), 2.9);
    core.reset_zoom();
    assert_eq!(core.scale(), 1.0);
    assert_eq!(core.regions()[0].fields, before);
}

#[test]
fn canvas_size_follows_background_and_scale() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    core.set_scale(0.5);
    assert_eq!(core.canvas_size(), (320.0, 240.0));
}

#[test]
fn issues_flag_small_regions() {
    let gw = MemoryGateway::new();
    gw.insert(
        "cam1",
        Region::new(
            RegionId::new("tiny"),
            RegionFields::new(
                "Tiny",
                RegionKind::Custom,
                Shape::polygon(vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(0.0, 5.0)]),
            ),
        ),
    );
    let core = ready(&gw);
    assert_eq!(core.issues(), [&RegionId::new("tiny")]);
}

#[test]
fn subscribers_see_changes() {
    let gw = MemoryGateway::new();
    let mut core = ready(&gw);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _sub = core.subscribe(Rc::new(move |c: Change| sink.borrow_mut().push(c)));

    core.zoom_in();
    core.set_display(DisplayOptions { show_grid: true, ..DisplayOptions::default() });
    core.start_drawing();

    assert_eq!(*seen.borrow(), [Change::Scale, Change::Display, Change::Drawing, Change::Selection]);
}

#[test]
fn unknown_response_is_ignored() {
    let mut core = core();
    let actions = core.handle_response(Response { ticket: 999, outcome: Outcome::Deleted(Ok(())) });
    assert!(actions.is_empty());
}
