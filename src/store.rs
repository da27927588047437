//! # Custom Route Store
//!
//! User-owned routes, free-text notes and saved POI ids, persisted through a
//! [`KeyValueStorage`] under the three keys of [`StorageKeys`].
//!
//! Every mutation writes through synchronously. Stored values that fail to
//! parse are read as empty with a warning; write failures are returned.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::config::StorageKeys;
use crate::error::{OptionExt, Result, TravelRouteError};
use crate::types::{Activity, RouteDetail, RouteMeta, RouteOrigin};

/// Name given to routes created from the blank template.
pub const BLANK_ROUTE_NAME: &str = "Meine neue Route";
/// Suffix appended to the name of a copied route.
pub const COPY_SUFFIX: &str = "(Kopie)";

// ============================================================================
// Storage backends
// ============================================================================

/// String key/value persistence, shaped like browser local storage.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Volatile storage for tests and sessions without persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// All keys in one JSON object file, rewritten on every change.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStorage {
    /// Open the file at `path`. A missing file starts empty; an unreadable
    /// or malformed one is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, String>>(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!(
                        "[JsonFileStorage] Ignoring malformed storage file {}: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("[JsonFileStorage] Could not read {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| TravelRouteError::storage(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TravelRouteError::storage(e.to_string()))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).map_err(|e| TravelRouteError::storage(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| TravelRouteError::storage(e.to_string()))
    }
}

impl KeyValueStorage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush() {
            match previous {
                Some(previous) => self.entries.insert(key.to_string(), previous),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if let Some(previous) = self.entries.remove(key) {
            if let Err(e) = self.flush() {
                self.entries.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Editing
// ============================================================================

/// Values submitted from the route editor. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteEdit {
    pub name: Option<String>,
    pub summary: Option<String>,
    pub pace: Option<String>,
    /// Raw input; anything that is not a finite number is stored as 0
    pub cost_estimate: Option<String>,
    pub notes: Option<String>,
}

fn parse_cost(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

// ============================================================================
// Custom Route Store
// ============================================================================

pub struct CustomRouteStore<S: KeyValueStorage> {
    storage: S,
    keys: StorageKeys,
    routes: Vec<RouteDetail>,
    saved_pois: Vec<String>,
}

impl<S: KeyValueStorage> CustomRouteStore<S> {
    /// Read custom routes and saved POIs from `storage`.
    pub fn load(storage: S, keys: StorageKeys) -> Self {
        let routes = read_custom_routes(&storage, &keys.custom_routes);
        let saved_pois = read_saved_pois(&storage, &keys.saved_pois);
        log::info!(
            "[CustomRouteStore] Loaded {} custom routes and {} saved POIs",
            routes.len(),
            saved_pois.len()
        );
        Self {
            storage,
            keys,
            routes,
            saved_pois,
        }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Custom routes in creation order.
    pub fn routes(&self) -> &[RouteDetail] {
        &self.routes
    }

    pub fn get(&self, route_id: &str) -> Option<&RouteDetail> {
        self.routes.iter().find(|route| route.id == route_id)
    }

    pub fn contains(&self, route_id: &str) -> bool {
        self.get(route_id).is_some()
    }

    /// Apply `change` to a copy of one route and commit it only once the
    /// updated list is stored.
    fn update_route<T>(
        &mut self,
        route_id: &str,
        change: impl FnOnce(&mut RouteDetail) -> Result<T>,
    ) -> Result<T> {
        let mut routes = self.routes.clone();
        let route = routes
            .iter_mut()
            .find(|route| route.id == route_id)
            .ok_or_unknown_route(route_id)?;
        let value = change(route)?;
        self.save_routes(routes)?;
        Ok(value)
    }

    /// `custom-<unix millis>`, bumped until no stored route uses it.
    fn next_route_id(&self) -> String {
        let mut millis = now_millis();
        loop {
            let id = format!("custom-{}", millis);
            if !self.contains(&id) {
                return id;
            }
            millis += 1;
        }
    }

    fn push(&mut self, route: RouteDetail) -> Result<&RouteDetail> {
        let mut routes = self.routes.clone();
        routes.push(route);
        self.save_routes(routes)?;
        let index = self.routes.len() - 1;
        let added = &self.routes[index];
        log::info!("[CustomRouteStore] Added '{}' ({})", added.name, added.id);
        Ok(added)
    }

    /// Copy a route into the store with a new id, "(Kopie)" appended to its
    /// name and every stop selected.
    pub fn add_from_curated(&mut self, original: &RouteDetail) -> Result<&RouteDetail> {
        let mut copy = original.clone();
        copy.id = self.next_route_id();
        copy.name = format!("{} {}", original.name, COPY_SUFFIX);
        copy.source = RouteOrigin::Custom;
        for stop in &mut copy.stops {
            stop.selected = Some(true);
        }
        self.push(copy)
    }

    /// New route from the dataset's blank template.
    pub fn create_blank(&mut self, template: &RouteDetail) -> Result<&RouteDetail> {
        let mut route = template.clone();
        route.id = self.next_route_id();
        route.name = BLANK_ROUTE_NAME.to_string();
        route.source = RouteOrigin::Custom;
        self.push(route)
    }

    /// Remove a route. Returns false when no custom route has this id.
    pub fn delete(&mut self, route_id: &str) -> Result<bool> {
        if !self.contains(route_id) {
            return Ok(false);
        }
        let mut routes = self.routes.clone();
        routes.retain(|route| route.id != route_id);
        self.save_routes(routes)?;
        log::info!("[CustomRouteStore] Deleted {}", route_id);
        Ok(true)
    }

    /// Mark a stop of a custom route as selected or deselected.
    pub fn toggle_stop_selection(&mut self, route_id: &str, stop_id: &str, selected: bool) -> Result<()> {
        self.update_route(route_id, |route| {
            let stop = route
                .stops
                .iter_mut()
                .find(|stop| stop.id == stop_id)
                .ok_or_invalid_route(route_id, &format!("no stop '{}'", stop_id))?;
            stop.selected = Some(selected);
            Ok(())
        })
    }

    /// Apply editor values to a custom route.
    pub fn apply_edit(&mut self, route_id: &str, edit: RouteEdit) -> Result<&RouteDetail> {
        self.update_route(route_id, |route| {
            if let Some(name) = edit.name {
                route.name = name;
            }
            if let Some(summary) = edit.summary {
                route.summary = Some(summary);
            }
            if edit.pace.is_some() || edit.cost_estimate.is_some() {
                let meta = route.meta.get_or_insert_with(RouteMeta::default);
                if let Some(pace) = edit.pace {
                    meta.pace = Some(pace);
                }
                if let Some(cost) = edit.cost_estimate {
                    meta.cost_estimate = Some(parse_cost(&cost));
                }
            }
            if let Some(notes) = edit.notes {
                route.notes = Some(notes);
            }
            Ok(())
        })?;
        self.get(route_id).ok_or_unknown_route(route_id)
    }

    /// Append an activity to a custom route unless one with the same title
    /// and stop is already there. Returns whether it was added.
    pub fn copy_activity_to_route(&mut self, activity: &Activity, route_id: &str) -> Result<bool> {
        let stop_of = |a: &Activity| a.extra.get("stopId").cloned().unwrap_or(Value::Null);
        let route = self.get(route_id).ok_or_unknown_route(route_id)?;
        let duplicate = route
            .activities
            .iter()
            .any(|existing| existing.title == activity.title && stop_of(existing) == stop_of(activity));
        if duplicate {
            return Ok(false);
        }
        self.update_route(route_id, |route| {
            route.activities.push(activity.clone());
            Ok(true)
        })
    }

    /// Store `routes` and make them current. Memory is untouched on failure.
    fn save_routes(&mut self, routes: Vec<RouteDetail>) -> Result<()> {
        let json = serde_json::to_string(&routes)
            .map_err(|e| TravelRouteError::storage(e.to_string()))?;
        self.storage.set(&self.keys.custom_routes, &json)?;
        self.routes = routes;
        Ok(())
    }

    // ========================================================================
    // Notes
    // ========================================================================

    /// Stored notes, `None` when nothing has been saved.
    pub fn notes(&self) -> Option<String> {
        match self.storage.get(&self.keys.notes) {
            Ok(notes) => notes,
            Err(e) => {
                log::warn!("[CustomRouteStore] Could not read notes: {}", e);
                None
            }
        }
    }

    pub fn set_notes(&mut self, notes: &str) -> Result<()> {
        self.storage.set(&self.keys.notes, notes)
    }

    pub fn clear_notes(&mut self) -> Result<()> {
        self.storage.remove(&self.keys.notes)
    }

    // ========================================================================
    // Saved POIs
    // ========================================================================

    pub fn saved_pois(&self) -> &[String] {
        &self.saved_pois
    }

    pub fn is_poi_saved(&self, poi_id: &str) -> bool {
        self.saved_pois.iter().any(|id| id == poi_id)
    }

    /// Replace the saved set. Duplicates are dropped, first occurrence wins.
    pub fn set_saved_pois(&mut self, ids: impl IntoIterator<Item = String>) -> Result<()> {
        let mut saved: Vec<String> = Vec::new();
        for id in ids {
            if !saved.contains(&id) {
                saved.push(id);
            }
        }
        self.save_saved_pois(saved)
    }

    /// Flip a POI between saved and not saved. Returns the new state.
    pub fn toggle_saved_poi(&mut self, poi_id: &str) -> Result<bool> {
        let mut saved_pois = self.saved_pois.clone();
        let saved = if self.is_poi_saved(poi_id) {
            saved_pois.retain(|id| id != poi_id);
            false
        } else {
            saved_pois.push(poi_id.to_string());
            true
        };
        self.save_saved_pois(saved_pois)?;
        Ok(saved)
    }

    fn save_saved_pois(&mut self, saved_pois: Vec<String>) -> Result<()> {
        let json = serde_json::to_string(&saved_pois)
            .map_err(|e| TravelRouteError::storage(e.to_string()))?;
        self.storage.set(&self.keys.saved_pois, &json)?;
        self.saved_pois = saved_pois;
        Ok(())
    }
}

fn read_value<S: KeyValueStorage>(storage: &S, key: &str) -> Option<Value> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) if !raw.trim().is_empty() => raw,
        Ok(_) => return None,
        Err(e) => {
            log::warn!("[CustomRouteStore] Could not read '{}': {}", key, e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("[CustomRouteStore] Ignoring malformed value under '{}': {}", key, e);
            None
        }
    }
}

/// Stored routes, each forced to `source: custom`. Entries that are not
/// route objects are skipped.
fn read_custom_routes<S: KeyValueStorage>(storage: &S, key: &str) -> Vec<RouteDetail> {
    let Some(value) = read_value(storage, key) else {
        return Vec::new();
    };
    let Value::Array(items) = value else {
        log::warn!("[CustomRouteStore] Value under '{}' is not an array", key);
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RouteDetail>(item) {
            Ok(mut route) => {
                route.source = RouteOrigin::Custom;
                Some(route)
            }
            Err(e) => {
                log::warn!("[CustomRouteStore] Skipping stored route: {}", e);
                None
            }
        })
        .collect()
}

fn read_saved_pois<S: KeyValueStorage>(storage: &S, key: &str) -> Vec<String> {
    match read_value(storage, key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id),
                _ => None,
            })
            .collect(),
        Some(_) => {
            log::warn!("[CustomRouteStore] Value under '{}' is not an array", key);
            Vec::new()
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn curated() -> RouteDetail {
        serde_json::from_value(json!({
            "id": "north",
            "name": "Norden",
            "meta": {"durationDays": 10, "costEstimate": 2000},
            "stops": [
                {"id": "a", "name": "Arica", "selected": false},
                {"id": "b", "name": "Iquique"}
            ],
            "segments": [{"from": "a", "to": "b", "mode": "bus"}]
        }))
        .unwrap()
    }

    fn store() -> CustomRouteStore<MemoryStorage> {
        CustomRouteStore::load(MemoryStorage::new(), StorageKeys::default())
    }

    /// Memory storage whose writes fail while the shared flag is set.
    #[derive(Default)]
    struct QuotaStorage {
        inner: MemoryStorage,
        full: Rc<Cell<bool>>,
    }

    impl KeyValueStorage for QuotaStorage {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<()> {
            if self.full.get() {
                return Err(TravelRouteError::storage("quota exceeded"));
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let storage = QuotaStorage::default();
        let full = Rc::clone(&storage.full);
        let mut store = CustomRouteStore::load(storage, StorageKeys::default());
        let id = store.add_from_curated(&curated()).unwrap().id.clone();
        let before = store.routes().to_vec();

        full.set(true);
        assert!(store.add_from_curated(&curated()).is_err());
        assert!(store.create_blank(&curated()).is_err());
        assert!(store.delete(&id).is_err());
        assert!(store.toggle_stop_selection(&id, "a", false).is_err());
        let edit = RouteEdit {
            name: Some("Neu".to_string()),
            ..Default::default()
        };
        assert!(store.apply_edit(&id, edit).is_err());
        let activity = Activity {
            title: Some("Geysire".to_string()),
            ..Default::default()
        };
        assert!(store.copy_activity_to_route(&activity, &id).is_err());
        assert_eq!(store.routes(), before.as_slice());

        assert!(store.toggle_saved_poi("geysers").is_err());
        assert!(store.set_saved_pois(vec!["a".to_string()]).is_err());
        assert!(store.saved_pois().is_empty());

        full.set(false);
        let reloaded = CustomRouteStore::load(store.into_storage(), StorageKeys::default());
        assert_eq!(reloaded.routes(), before.as_slice());
    }

    #[test]
    fn test_json_file_rolls_back_failed_flush() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let mut storage = JsonFileStorage::open(blocker.join("storage.json"));
        assert!(storage.set("travel-routes.notes", "x").is_err());
        assert_eq!(storage.get("travel-routes.notes").unwrap(), None);
    }

    #[test]
    fn test_add_from_curated() {
        let mut store = store();
        let original = curated();
        let copy = store.add_from_curated(&original).unwrap().clone();

        assert!(copy.id.starts_with("custom-"));
        assert_eq!(copy.name, "Norden (Kopie)");
        assert_eq!(copy.source, RouteOrigin::Custom);
        assert!(copy.stops.iter().all(|s| s.selected == Some(true)));
        assert_eq!(copy.segments, original.segments);
        assert_eq!(original.stops[0].selected, Some(false));

        let stored = store.storage().get("travel-routes.custom").unwrap().unwrap();
        assert!(stored.contains(&copy.id));
    }

    #[test]
    fn test_ids_are_unique() {
        let mut store = store();
        let first = store.add_from_curated(&curated()).unwrap().id.clone();
        let second = store.add_from_curated(&curated()).unwrap().id.clone();
        assert_ne!(first, second);
    }

    #[test]
    fn test_create_blank() {
        let mut store = store();
        let template = RouteDetail {
            id: "template".to_string(),
            name: "Vorlage".to_string(),
            ..Default::default()
        };
        let route = store.create_blank(&template).unwrap();
        assert_eq!(route.name, BLANK_ROUTE_NAME);
        assert!(route.is_custom());
    }

    #[test]
    fn test_delete() {
        let mut store = store();
        let id = store.add_from_curated(&curated()).unwrap().id.clone();
        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.routes().is_empty());
        assert_eq!(store.storage().get("travel-routes.custom").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_toggle_stop_selection() {
        let mut store = store();
        let id = store.add_from_curated(&curated()).unwrap().id.clone();
        store.toggle_stop_selection(&id, "b", false).unwrap();
        assert_eq!(store.get(&id).unwrap().stops[1].selected, Some(false));

        assert!(matches!(
            store.toggle_stop_selection("north", "b", false),
            Err(TravelRouteError::UnknownRoute { .. })
        ));
        assert!(matches!(
            store.toggle_stop_selection(&id, "zzz", false),
            Err(TravelRouteError::InvalidRoute { .. })
        ));
    }

    #[test]
    fn test_apply_edit() {
        let mut store = store();
        let id = store.add_from_curated(&curated()).unwrap().id.clone();
        let route = store
            .apply_edit(
                &id,
                RouteEdit {
                    name: Some("Mein Norden".to_string()),
                    pace: Some("zügig".to_string()),
                    cost_estimate: Some("viel".to_string()),
                    notes: Some("Sonnencreme!".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(route.name, "Mein Norden");
        let meta = route.meta.as_ref().unwrap();
        assert_eq!(meta.pace.as_deref(), Some("zügig"));
        assert_eq!(meta.cost_estimate, Some(0.0));
        assert_eq!(meta.duration_days, Some(10));
        assert_eq!(route.notes.as_deref(), Some("Sonnencreme!"));

        let route = store
            .apply_edit(&id, RouteEdit { cost_estimate: Some(" 1450.5 ".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(route.meta.as_ref().unwrap().cost_estimate, Some(1450.5));
    }

    #[test]
    fn test_reload_restores_custom_source() {
        let mut store = store();
        let id = store.add_from_curated(&curated()).unwrap().id.clone();
        let storage = store.into_storage();

        let reloaded = CustomRouteStore::load(storage, StorageKeys::default());
        assert_eq!(reloaded.routes().len(), 1);
        assert_eq!(reloaded.routes()[0].id, id);
        assert_eq!(reloaded.routes()[0].source, RouteOrigin::Custom);
    }

    #[test]
    fn test_malformed_storage_reads_empty() {
        let mut storage = MemoryStorage::new();
        storage.set("travel-routes.custom", "{not json").unwrap();
        storage.set("travel-routes.saved-pois", r#"{"a": 1}"#).unwrap();
        let store = CustomRouteStore::load(storage, StorageKeys::default());
        assert!(store.routes().is_empty());
        assert!(store.saved_pois().is_empty());

        let mut storage = MemoryStorage::new();
        storage
            .set("travel-routes.custom", r#"[{"id": "custom-1", "name": "ok"}, 42]"#)
            .unwrap();
        let store = CustomRouteStore::load(storage, StorageKeys::default());
        assert_eq!(store.routes().len(), 1);
        assert!(store.routes()[0].is_custom());
    }

    #[test]
    fn test_notes() {
        let mut store = store();
        assert_eq!(store.notes(), None);
        store.set_notes("# Packliste").unwrap();
        assert_eq!(store.notes().as_deref(), Some("# Packliste"));
        store.clear_notes().unwrap();
        assert_eq!(store.notes(), None);
    }

    #[test]
    fn test_saved_pois() {
        let mut store = store();
        assert!(store.toggle_saved_poi("geysers").unwrap());
        assert!(store.toggle_saved_poi("lagoon").unwrap());
        assert!(!store.toggle_saved_poi("geysers").unwrap());
        assert_eq!(store.saved_pois().to_vec(), vec!["lagoon".to_string()]);

        store
            .set_saved_pois(vec!["a".to_string(), "b".to_string(), "a".to_string()])
            .unwrap();
        let storage = store.into_storage();
        assert_eq!(
            storage.get("travel-routes.saved-pois").unwrap().as_deref(),
            Some(r#"["a","b"]"#)
        );
    }

    #[test]
    fn test_copy_activity_to_route() {
        let mut store = store();
        let id = store.add_from_curated(&curated()).unwrap().id.clone();
        let activity: Activity = serde_json::from_value(json!({
            "title": "Kajak auf dem Fjord",
            "stopId": "stop-1",
            "price": 89
        }))
        .unwrap();
        assert!(store.copy_activity_to_route(&activity, &id).unwrap());
        assert!(!store.copy_activity_to_route(&activity, &id).unwrap());
        assert_eq!(store.get(&id).unwrap().activities.len(), 1);
    }
}
