//! End-to-end editor flows through the public API, backed by the in-memory
//! gateway.

use async_trait::async_trait;
use futures::executor::block_on;
use time::OffsetDateTime;
use time::macros::datetime;

use region_editor::config::EditorConfig;
use region_editor::config_io::ImportMode;
use region_editor::engine::{Action, Background, BackgroundSource, EngineCore};
use region_editor::gateway::{GatewayError, MemoryGateway, RegionGateway};
use region_editor::geometry::Point;
use region_editor::input::{Button, Key, Modifiers, NoticeLevel};
use region_editor::region::{Region, RegionFields, RegionId, RegionKind, RegionPatch};
use region_editor::viewport::ClientRect;

fn clock() -> OffsetDateTime {
    datetime!(2024-06-01 08:30:00 UTC)
}

fn editor(config: EditorConfig) -> EngineCore {
    EngineCore::new(config).with_clock(clock)
}

fn settle(core: &mut EngineCore, gw: &dyn RegionGateway, actions: Vec<Action>) -> Vec<Action> {
    block_on(core.settle(gw, actions))
}

fn open_camera(core: &mut EngineCore, gw: &dyn RegionGateway, camera: &str) {
    let actions = core.select_camera(camera);
    settle(core, gw, actions);
    core.set_background(Some(Background {
        source: BackgroundSource::CameraSnapshot { camera_id: camera.to_owned() },
        width: 1280.0,
        height: 720.0,
    }));
}

fn draw(core: &mut EngineCore, points: &[(f64, f64)]) {
    core.start_drawing();
    let rect = ClientRect::new(0.0, 0.0);
    let scale = core.scale();
    for &(x, y) in points {
        core.on_pointer_down(Point::new(x * scale, y * scale), rect, Button::Primary);
    }
}

fn messages(actions: &[Action]) -> Vec<(NoticeLevel, String)> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Notify(n) => Some((n.level, n.message.clone())),
            _ => None,
        })
        .collect()
}

/// Refuses every write; reads succeed.
struct ReadOnlyGateway(MemoryGateway);

#[async_trait(?Send)]
impl RegionGateway for ReadOnlyGateway {
    async fn list_regions(&self, camera_id: &str) -> Result<Vec<Region>, GatewayError> {
        self.0.list_regions(camera_id).await
    }

    async fn create_region(&self, _camera_id: &str, _fields: &RegionFields) -> Result<Region, GatewayError> {
        Err(GatewayError::new("create region failed: 403"))
    }

    async fn update_region(&self, _id: &RegionId, _patch: &RegionPatch) -> Result<Region, GatewayError> {
        Err(GatewayError::new("update region failed: 403"))
    }

    async fn delete_region(&self, _id: &RegionId) -> Result<(), GatewayError> {
        Err(GatewayError::new("delete region failed: 403"))
    }
}

#[test]
fn draw_zoomed_edit_and_disable() {
    let gw = MemoryGateway::new();
    let mut core = editor(EditorConfig::default());
    open_camera(&mut core, &gw, "lobby");

    core.set_scale(1.5);
    core.set_region_kind(RegionKind::Handwash);
    draw(&mut core, &[(100.0, 100.0), (300.0, 100.0), (300.0, 250.0), (100.0, 250.0)]);
    let actions = core.on_key_down(&Key::new("Enter"), Modifiers::default());
    let out = settle(&mut core, &gw, actions);
    assert_eq!(messages(&out), [(NoticeLevel::Info, "Region created".to_owned())]);

    let stored = gw.regions("lobby");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].fields.name, "Handwash_083000");
    assert_eq!(stored[0].fields.shape.vertices()[1], Point::new(300.0, 100.0));

    // Select by clicking inside, then rename through the edit form.
    let id = stored[0].id.clone();
    core.on_pointer_down(Point::new(300.0, 300.0), ClientRect::new(0.0, 0.0), Button::Primary);
    assert_eq!(core.selection(), Some(&id));
    core.edit_region(&id);
    if let Some(form) = core.edit_form_mut() {
        form.name = "Sink row".to_owned();
    }
    let actions = core.save_edit();
    settle(&mut core, &gw, actions);
    assert_eq!(gw.regions("lobby")[0].fields.name, "Sink row");

    let actions = core.set_region_enabled(&id, false);
    settle(&mut core, &gw, actions);
    assert!(!gw.regions("lobby")[0].fields.enabled);
    assert_eq!(core.repo.active_count(), 0);
}

#[test]
fn copy_configuration_between_cameras() {
    let gw = MemoryGateway::new();
    let mut core = editor(EditorConfig::default());
    open_camera(&mut core, &gw, "dock-1");
    draw(&mut core, &[(0.0, 0.0), (80.0, 0.0), (40.0, 60.0)]);
    let actions = core.finish_drawing();
    settle(&mut core, &gw, actions);

    let exported = core.export_config();
    let Some(Action::Download(file)) = exported.first() else {
        unreachable!("export produced {exported:?}");
    };
    assert!(file.filename.starts_with("region-config-dock-1-"));

    open_camera(&mut core, &gw, "dock-2");
    assert!(core.regions().is_empty());
    let actions = core.import_json(&file.contents, ImportMode::Append);
    settle(&mut core, &gw, actions);

    assert_eq!(gw.regions("dock-2").len(), 1);
    assert_ne!(gw.regions("dock-2")[0].id, gw.regions("dock-1")[0].id);
    assert_eq!(gw.regions("dock-2")[0].fields, gw.regions("dock-1")[0].fields);
}

#[test]
fn rejected_writes_leave_state_untouched() {
    let inner = MemoryGateway::new();
    inner.insert(
        "gate",
        Region::new(
            RegionId::new("fence"),
            RegionFields::new(
                "Fence",
                RegionKind::Intrusion,
                region_editor::geometry::Shape::polygon(vec![
                    Point::new(10.0, 10.0),
                    Point::new(200.0, 10.0),
                    Point::new(200.0, 200.0),
                ]),
            ),
        ),
    );
    let gw = ReadOnlyGateway(inner);
    let mut core = editor(EditorConfig::default());
    open_camera(&mut core, &gw, "gate");
    assert_eq!(core.regions().len(), 1);

    let actions = core.batch_delete();
    let out = settle(&mut core, &gw, actions);
    assert_eq!(
        messages(&out),
        [(NoticeLevel::Warning, "Delete regions: 0 succeeded, 1 failed".to_owned())]
    );
    assert_eq!(core.regions().len(), 1);

    draw(&mut core, &[(300.0, 300.0), (400.0, 300.0), (350.0, 400.0)]);
    let actions = core.finish_drawing();
    let out = settle(&mut core, &gw, actions);
    assert_eq!(messages(&out)[0].0, NoticeLevel::Error);
    assert_eq!(core.regions().len(), 1);
    assert!(core.machine.is_drawing());
}

#[test]
fn configured_zoom_limits_apply() {
    let config = EditorConfig::from_lookup(|key| match key {
        "REGION_EDITOR_MAX_ZOOM" => Some("2".to_owned()),
        _ => None,
    })
    .unwrap();
    let mut core = editor(config);
    core.set_scale(5.0);
    assert!((core.scale() - 2.0).abs() < f64::EPSILON);
}
