use futures::executor::block_on;

use super::*;
use crate::geometry::{Point, Shape};
use crate::region::RegionKind;

fn fields(name: &str) -> RegionFields {
    RegionFields::new(
        name,
        RegionKind::Counting,
        Shape::polygon(vec![Point::new(0.0, 0.0), Point::new(40.0, 0.0), Point::new(0.0, 40.0)]),
    )
}

// =============================================================
// MemoryGateway
// =============================================================

#[test]
fn create_assigns_id_and_stores_under_camera() {
    let gw = MemoryGateway::new();
    let region = block_on(gw.create_region("cam1", &fields("Aisle"))).unwrap();
    assert!(!region.id.as_str().is_empty());
    assert_eq!(gw.regions("cam1"), vec![region]);
    assert!(gw.regions("cam2").is_empty());
}

#[test]
fn list_returns_only_that_cameras_regions() {
    let gw = MemoryGateway::new();
    gw.insert("cam1", Region::new(RegionId::new("a"), fields("Alpha")));
    gw.insert("cam2", Region::new(RegionId::new("b"), fields("Bravo")));
    let listed = block_on(gw.list_regions("cam2")).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id.as_str(), "b");
}

#[test]
fn update_applies_patch() {
    let gw = MemoryGateway::new();
    gw.insert("cam1", Region::new(RegionId::new("a"), fields("Alpha")));
    let updated = block_on(gw.update_region(&RegionId::new("a"), &RegionPatch::enabled(false))).unwrap();
    assert!(!updated.fields.enabled);
    assert!(!gw.regions("cam1")[0].fields.enabled);
}

#[test]
fn missing_region_errors() {
    let gw = MemoryGateway::new();
    let id = RegionId::new("nope");
    let err = block_on(gw.delete_region(&id)).unwrap_err();
    assert_eq!(err.message, "region nope not found");
    assert!(block_on(gw.update_region(&id, &RegionPatch::enabled(true))).is_err());
}

#[test]
fn delete_removes_region() {
    let gw = MemoryGateway::new();
    gw.insert("cam1", Region::new(RegionId::new("a"), fields("Alpha")));
    block_on(gw.delete_region(&RegionId::new("a"))).unwrap();
    assert!(gw.regions("cam1").is_empty());
}

// =============================================================
// execute / execute_all
// =============================================================

#[test]
fn execute_preserves_ticket() {
    let gw = MemoryGateway::new();
    let response = block_on(execute(&gw, Request::List { ticket: 17, camera_id: "cam1".into() }));
    assert_eq!(response.ticket, 17);
    assert_eq!(response.outcome, Outcome::Listed(Ok(vec![])));
}

#[test]
fn execute_all_returns_responses_in_request_order() {
    let gw = MemoryGateway::new();
    gw.insert("cam1", Region::new(RegionId::new("a"), fields("Alpha")));
    let requests = vec![
        Request::Delete { ticket: 3, id: RegionId::new("missing") },
        Request::Update { ticket: 1, id: RegionId::new("a"), patch: RegionPatch::enabled(false) },
        Request::Create { ticket: 2, camera_id: "cam1".into(), fields: fields("Bravo") },
    ];
    let responses = block_on(execute_all(&gw, requests));
    let tickets: Vec<Ticket> = responses.iter().map(|r| r.ticket).collect();
    assert_eq!(tickets, [3, 1, 2]);
    assert!(responses[0].outcome.error().is_some());
    assert!(responses[1].outcome.error().is_none());
    assert_eq!(gw.regions("cam1").len(), 2);
}
