//! Custom route lifecycle against file-backed storage.

use serde_json::json;
use tempfile::TempDir;
use travel_routes::{
    CustomRouteStore, JsonFileStorage, KeyValueStorage, ListMode, LoadedDataset, RouteDetail,
    RouteOrigin, Selection, StorageKeys, TravelApp,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn curated(id: &str, name: &str) -> RouteDetail {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "stops": [
            {"id": "a", "name": "Valparaíso", "coordinates": {"lat": -33.05, "lng": -71.62}},
            {"id": "b", "name": "Santiago", "coordinates": {"lat": -33.45, "lng": -70.66}}
        ],
        "segments": [{"id": "s1", "from": "a", "to": "b", "mode": "bus"}]
    }))
    .unwrap()
}

fn dataset_with(routes: Vec<RouteDetail>) -> LoadedDataset {
    let route_index = routes
        .iter()
        .map(|route| serde_json::from_value(json!({"id": route.id, "name": route.name})).unwrap())
        .collect();
    LoadedDataset {
        route_index,
        routes,
        templates: serde_json::from_value(json!({"blankRoute": {"id": "blank", "name": ""}})).unwrap(),
        ..Default::default()
    }
}

#[test]
fn test_storage_round_trip_restores_custom_source() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state/storage.json");

    let saved = {
        let mut store = CustomRouteStore::load(JsonFileStorage::open(&path), StorageKeys::default());
        store.add_from_curated(&curated("coast", "Küste")).unwrap();
        store.add_from_curated(&curated("valley", "Tal")).unwrap();
        store.toggle_saved_poi("poi-1").unwrap();
        store.set_notes("Fähre buchen").unwrap();
        store.routes().to_vec()
    };

    let raw = JsonFileStorage::open(&path)
        .get("travel-routes.custom")
        .unwrap()
        .unwrap();
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored[0]["source"], "custom");

    let store = CustomRouteStore::load(JsonFileStorage::open(&path), StorageKeys::default());
    assert_eq!(store.routes(), saved.as_slice());
    assert!(store.routes().iter().all(|route| route.source == RouteOrigin::Custom));
    assert_eq!(store.saved_pois().to_vec(), vec!["poi-1".to_string()]);
    assert_eq!(store.notes().as_deref(), Some("Fähre buchen"));
}

#[test]
fn test_malformed_storage_starts_empty() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("storage.json");
    std::fs::write(&path, "not json at all").unwrap();

    let store = CustomRouteStore::load(JsonFileStorage::open(&path), StorageKeys::default());
    assert!(store.routes().is_empty());
    assert!(store.saved_pois().is_empty());
}

#[test]
fn test_lifecycle_falls_back_to_curated() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let storage = JsonFileStorage::open(tmp.path().join("storage.json"));
    let mut app = TravelApp::new(dataset_with(vec![curated("coast", "Küste")]), storage);

    let copy_id = app.add_custom_route_from_curated("coast").unwrap().route.id;
    assert_ne!(copy_id, "coast");
    assert_eq!(app.list_mode(), ListMode::Custom);
    assert_eq!(app.visible_routes().len(), 1);
    assert_eq!(app.visible_routes()[0].id, copy_id);

    let selection = app.delete_custom_route(&copy_id).unwrap().clone();
    assert_eq!(selection.route_id(), Some("coast"));
    assert!(app.store().routes().is_empty());
}

#[test]
fn test_lifecycle_ends_in_empty_state() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let storage = JsonFileStorage::open(tmp.path().join("storage.json"));
    let mut app = TravelApp::new(dataset_with(Vec::new()), storage);
    assert_eq!(*app.selection(), Selection::Empty);

    let blank_id = app.create_blank_route().unwrap().unwrap().route.id;
    assert_eq!(app.selection().route_id(), Some(blank_id.as_str()));

    let selection = app.delete_custom_route(&blank_id).unwrap().clone();
    assert_eq!(selection, Selection::Empty);
    assert!(app.current_view().is_none());
    assert!(app.empty_state().is_some());
}
