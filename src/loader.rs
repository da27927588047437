//! # Route Dataset Loader
//!
//! Reads the index document and the per-route detail documents through a
//! [`DatasetSource`].
//!
//! ## Failure policy
//!
//! - The index document is required: [`RouteLibrary::open`] fails if it cannot
//!   be read or parsed.
//! - A detail document that cannot be read, parsed, lacks an `id` or carries
//!   the id of a different route is dropped with a warning. The failure is
//!   remembered for the session so the document is not fetched again.
//! - Structural problems inside a parsed route (dangling stop references,
//!   unknown modes) are logged but the route stays available.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use rstar::{RTree, RTreeObject, AABB};
use serde_json::Value;

use crate::bounds::{calculate_bounding_box, Bounds};
use crate::config::{StorageKeys, TravelConfig};
use crate::error::{Result, TravelRouteError};
use crate::geo_transform::{build_segment_collection, build_stop_collection, collect_all_coordinates};
use crate::types::{
    PoiOverview, PoiOverviewRef, RouteDetail, RouteIndexEntry, RouteTemplates, TagDefinition,
    TransportModes, TravelMeta, TravelRoutesDataset,
};

// ============================================================================
// Sources
// ============================================================================

/// Where dataset documents come from.
pub trait DatasetSource {
    /// Read the document at `path`, relative to the dataset root.
    fn fetch_text(&self, path: &str) -> Result<String>;
}

impl<S: DatasetSource + ?Sized> DatasetSource for &S {
    fn fetch_text(&self, path: &str) -> Result<String> {
        (**self).fetch_text(path)
    }
}

/// Strip leading slashes and `./`, and refuse paths leaving the root.
pub(crate) fn sanitize_relative_path(path: &str) -> Result<String> {
    let trimmed = path.trim().trim_start_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let escapes = Path::new(trimmed).components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if trimmed.is_empty() || escapes {
        return Err(TravelRouteError::DocumentUnavailable {
            path: path.to_string(),
            message: "path must stay inside the dataset root".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Dataset stored in a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DatasetSource for DirectorySource {
    fn fetch_text(&self, path: &str) -> Result<String> {
        let relative = sanitize_relative_path(path)?;
        fs::read_to_string(self.root.join(&relative)).map_err(|e| {
            TravelRouteError::DocumentUnavailable {
                path: relative,
                message: e.to_string(),
            }
        })
    }
}

// ============================================================================
// Results
// ============================================================================

/// A route that could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRoute {
    pub route_id: String,
    pub reason: String,
}

/// Outcome of [`RouteLibrary::load_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Loaded route ids, index order
    pub loaded: Vec<String>,
    pub skipped: Vec<SkippedRoute>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// The fully loaded dataset: index entries are filtered to routes that loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadedDataset {
    pub meta: TravelMeta,
    pub transport_modes: TransportModes,
    pub route_index: Vec<RouteIndexEntry>,
    /// Same order as `route_index`
    pub routes: Vec<RouteDetail>,
    pub tag_library: Vec<TagDefinition>,
    pub templates: Option<RouteTemplates>,
    pub poi_overview: Option<PoiOverview>,
    pub storage_keys: StorageKeys,
}

impl LoadedDataset {
    pub fn available_route_ids(&self) -> Vec<String> {
        self.route_index.iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteDetail> {
        self.routes.iter().find(|route| route.id == route_id)
    }

    pub fn index_entry(&self, route_id: &str) -> Option<&RouteIndexEntry> {
        self.route_index.iter().find(|entry| entry.id == route_id)
    }

    /// Label for a tag id from the tag library, or the id itself.
    pub fn tag_label<'a>(&'a self, tag_id: &'a str) -> &'a str {
        self.tag_library
            .iter()
            .find(|tag| tag.id == tag_id && !tag.label.is_empty())
            .map(|tag| tag.label.as_str())
            .unwrap_or(tag_id)
    }
}

/// Bounds wrapper for R-tree viewport queries
#[derive(Debug, Clone)]
struct RouteEnvelope {
    route_id: String,
    bounds: Bounds,
}

impl RTreeObject for RouteEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds.envelope()
    }
}

// ============================================================================
// Route Library
// ============================================================================

/// Index document plus lazily loaded route details.
pub struct RouteLibrary<S: DatasetSource> {
    source: S,
    config: TravelConfig,
    dataset: TravelRoutesDataset,

    // Session caches
    details: HashMap<String, RouteDetail>,
    failures: HashMap<String, String>,

    // Spatial index over loaded routes, rebuilt on demand
    spatial_index: RTree<RouteEnvelope>,
    spatial_dirty: bool,
}

impl<S: DatasetSource> RouteLibrary<S> {
    /// Read and parse the index document. Duplicate index ids are dropped.
    pub fn open(source: S, config: TravelConfig) -> Result<Self> {
        let text = source.fetch_text(&config.index_path)?;
        let mut dataset: TravelRoutesDataset =
            serde_json::from_str(&text).map_err(|e| TravelRouteError::InvalidDocument {
                path: config.index_path.clone(),
                message: e.to_string(),
            })?;

        let mut seen = HashSet::new();
        dataset.route_index.retain(|entry| {
            if seen.insert(entry.id.clone()) {
                true
            } else {
                log::warn!("[RouteLibrary] Dropping duplicate index entry '{}'", entry.id);
                false
            }
        });

        log::info!(
            "[RouteLibrary] Opened index '{}' with {} routes and {} transport modes",
            config.index_path,
            dataset.route_index.len(),
            dataset.transport_modes.len()
        );

        Ok(Self {
            source,
            config,
            dataset,
            details: HashMap::new(),
            failures: HashMap::new(),
            spatial_index: RTree::new(),
            spatial_dirty: false,
        })
    }

    pub fn dataset(&self) -> &TravelRoutesDataset {
        &self.dataset
    }

    pub fn index(&self) -> &[RouteIndexEntry] {
        &self.dataset.route_index
    }

    pub fn transport_modes(&self) -> &TransportModes {
        &self.dataset.transport_modes
    }

    pub fn config(&self) -> &TravelConfig {
        &self.config
    }

    /// Configured storage keys with the dataset's `meta.editor` overrides.
    pub fn storage_keys(&self) -> StorageKeys {
        self.config
            .storage_keys
            .clone()
            .with_editor_meta(self.dataset.meta.editor.as_ref())
    }

    /// Detail document path for an index entry.
    pub fn route_file(&self, entry: &RouteIndexEntry) -> String {
        entry
            .file
            .clone()
            .filter(|file| !file.trim().is_empty())
            .unwrap_or_else(|| self.config.route_file_for(&entry.id))
    }

    /// Normalized detail for `route_id`, loading it on first request.
    ///
    /// Returns `None` when the id is not in the index or its document failed.
    pub fn load_route_by_id(&mut self, route_id: &str) -> Option<&RouteDetail> {
        if !self.details.contains_key(route_id) {
            if self.failures.contains_key(route_id) {
                return None;
            }
            let entry = self
                .dataset
                .route_index
                .iter()
                .find(|entry| entry.id == route_id)?
                .clone();
            match self.fetch_route(&entry) {
                Ok(route) => {
                    self.details.insert(route_id.to_string(), route);
                    self.spatial_dirty = true;
                }
                Err(e) => {
                    log::warn!("[RouteLibrary] Route '{}' skipped: {}", route_id, e);
                    self.failures.insert(route_id.to_string(), e.to_string());
                    return None;
                }
            }
        } else {
            log::debug!("[RouteLibrary] Cache hit for route '{}'", route_id);
        }
        self.details.get(route_id)
    }

    /// Load every index entry not yet attempted.
    pub fn load_all(&mut self) -> LoadReport {
        let ids: Vec<String> = self.index().iter().map(|entry| entry.id.clone()).collect();
        let mut report = LoadReport::default();

        for id in ids {
            if self.load_route_by_id(&id).is_some() {
                report.loaded.push(id);
            } else {
                let reason = self
                    .failures
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| "not loaded".to_string());
                report.skipped.push(SkippedRoute {
                    route_id: id,
                    reason,
                });
            }
        }

        if report.is_complete() {
            log::info!("[RouteLibrary] Loaded {} routes", report.loaded.len());
        } else {
            log::warn!(
                "[RouteLibrary] Loaded {} routes, {} missing from the dataset",
                report.loaded.len(),
                report.skipped.len()
            );
        }
        report
    }

    /// Ids of routes loaded so far, index order.
    pub fn available_route_ids(&self) -> Vec<String> {
        self.index()
            .iter()
            .filter(|entry| self.details.contains_key(&entry.id))
            .map(|entry| entry.id.clone())
            .collect()
    }

    fn fetch_route(&self, entry: &RouteIndexEntry) -> Result<RouteDetail> {
        let path = sanitize_relative_path(&self.route_file(entry))?;
        let text = self.source.fetch_text(&path)?;
        let mut route = parse_route_document(&path, &text)?;

        if route.id != entry.id {
            return Err(TravelRouteError::InvalidRoute {
                route_id: entry.id.clone(),
                message: format!("document '{}' describes route '{}'", path, route.id),
            });
        }

        normalize_route(&mut route, entry);

        for issue in route.validate(&self.dataset.transport_modes) {
            log::warn!("[RouteLibrary] Route '{}': {}", route.id, issue);
        }
        Ok(route)
    }

    /// Ids of loaded routes whose extent intersects `view`.
    pub fn routes_in_view(&mut self, view: &Bounds) -> Vec<String> {
        self.ensure_spatial_index();
        let mut ids: Vec<String> = self
            .spatial_index
            .locate_in_envelope_intersecting(&view.envelope())
            .map(|envelope| envelope.route_id.clone())
            .collect();
        ids.sort_by_key(|id| self.index().iter().position(|entry| &entry.id == id));
        ids
    }

    fn ensure_spatial_index(&mut self) {
        if !self.spatial_dirty {
            return;
        }
        let modes = &self.dataset.transport_modes;
        let envelopes: Vec<RouteEnvelope> = self
            .details
            .values()
            .filter_map(|route| {
                let coordinates = collect_all_coordinates(
                    &build_segment_collection(route, modes),
                    &build_stop_collection(route),
                );
                calculate_bounding_box(&coordinates).map(|bounds| RouteEnvelope {
                    route_id: route.id.clone(),
                    bounds,
                })
            })
            .collect();
        self.spatial_index = RTree::bulk_load(envelopes);
        self.spatial_dirty = false;
    }

    /// Read a POI overview document.
    pub fn load_poi_overview(&self, path: &str) -> Result<PoiOverview> {
        let text = self.source.fetch_text(path)?;
        serde_json::from_str(&text).map_err(|e| TravelRouteError::InvalidDocument {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// The POI overview the index embeds or names, falling back to the
    /// configured path. `None` when no overview exists.
    pub fn poi_overview(&self) -> Result<Option<PoiOverview>> {
        match &self.dataset.poi_overview {
            Some(PoiOverviewRef::Inline(overview)) => Ok(Some(overview.clone())),
            Some(PoiOverviewRef::File(path)) => self.load_poi_overview(path).map(Some),
            None => match self.load_poi_overview(&self.config.poi_overview_path) {
                Ok(overview) => Ok(Some(overview)),
                Err(TravelRouteError::DocumentUnavailable { .. }) => {
                    log::debug!("[RouteLibrary] No POI overview available");
                    Ok(None)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Load everything and hand over the dataset, index filtered to the
    /// routes that loaded.
    pub fn into_dataset(mut self) -> LoadedDataset {
        self.load_all();

        let poi_overview = self.poi_overview().unwrap_or_else(|e| {
            log::warn!("[RouteLibrary] POI overview skipped: {}", e);
            None
        });
        let storage_keys = self.storage_keys();

        let mut details = std::mem::take(&mut self.details);
        let mut route_index = Vec::new();
        let mut routes = Vec::new();
        for entry in std::mem::take(&mut self.dataset.route_index) {
            if let Some(route) = details.remove(&entry.id) {
                route_index.push(entry);
                routes.push(route);
            }
        }

        LoadedDataset {
            meta: self.dataset.meta,
            transport_modes: self.dataset.transport_modes,
            route_index,
            routes,
            tag_library: self.dataset.tag_library,
            templates: self.dataset.templates,
            poi_overview,
            storage_keys,
        }
    }
}

/// Parse a detail document, requiring a string `id`. A legacy `title`
/// fills a missing `name`.
pub fn parse_route_document(path: &str, text: &str) -> Result<RouteDetail> {
    let invalid = |message: String| TravelRouteError::InvalidDocument {
        path: path.to_string(),
        message,
    };

    let raw: Value = serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
    match raw.get("id") {
        Some(Value::String(id)) if !id.is_empty() => {}
        _ => return Err(invalid("route document has no id".to_string())),
    }

    let mut route: RouteDetail = serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?;
    if route.name.is_empty() {
        if let Some(title) = route.title.clone() {
            route.name = title;
        }
    }
    Ok(route)
}

/// Backfill name, meta, durationDays and mapFocus from the index entry.
fn normalize_route(route: &mut RouteDetail, entry: &RouteIndexEntry) {
    if route.name.is_empty() && !entry.name.is_empty() {
        route.name = entry.name.clone();
    }
    match (&mut route.meta, &entry.meta) {
        (None, Some(entry_meta)) => route.meta = Some(entry_meta.clone()),
        (Some(meta), Some(entry_meta)) if meta.duration_days.is_none() => {
            meta.duration_days = entry_meta.duration_days;
        }
        _ => {}
    }
    if route.map_focus.is_none() {
        route.map_focus = entry.map_focus.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// In-memory source that counts fetches per path.
    #[derive(Default)]
    struct MapSource {
        documents: HashMap<String, String>,
        fetches: RefCell<HashMap<String, usize>>,
    }

    impl MapSource {
        fn with(mut self, path: &str, body: &str) -> Self {
            self.documents.insert(path.to_string(), body.to_string());
            self
        }

        fn fetch_count(&self, path: &str) -> usize {
            self.fetches.borrow().get(path).copied().unwrap_or(0)
        }
    }

    impl DatasetSource for MapSource {
        fn fetch_text(&self, path: &str) -> Result<String> {
            *self.fetches.borrow_mut().entry(path.to_string()).or_default() += 1;
            self.documents
                .get(path)
                .cloned()
                .ok_or_else(|| TravelRouteError::DocumentUnavailable {
                    path: path.to_string(),
                    message: "not found".to_string(),
                })
        }
    }

    const INDEX: &str = r##"{
        "meta": {"title": "Chile", "editor": {"notesKey": "chile.notes"}},
        "transportModes": {"bus": {"label": "Bus", "color": "#16a34a"}},
        "routeIndex": [
            {"id": "north", "name": "Norden", "meta": {"durationDays": 12, "theme": "Wüste"}, "mapFocus": {"zoom": 5}},
            {"id": "south", "file": "/data/routes/south.json", "name": "Süden"},
            {"id": "broken", "name": "Kaputt"},
            {"id": "north", "name": "Doppelt"}
        ]
    }"##;

    fn source() -> MapSource {
        MapSource::default()
            .with("travel-routes-data.json", INDEX)
            .with(
                "data/routes/north.json",
                r#"{"id": "north", "meta": {"pace": "ruhig"}, "stops": [
                    {"id": "a", "coordinates": {"lat": -23.6, "lng": -70.4}},
                    {"id": "b", "coordinates": {"lat": -22.9, "lng": -68.2}}
                ], "segments": [{"from": "a", "to": "b", "mode": "bus"}]}"#,
            )
            .with(
                "data/routes/south.json",
                r#"{"id": "south", "title": "Patagonien", "stops": [
                    {"id": "c", "coordinates": {"lat": -51.7, "lng": -72.5}}
                ]}"#,
            )
            .with("data/routes/broken.json", r#"{"name": "no id"}"#)
    }

    #[test]
    fn test_open_drops_duplicate_ids() {
        let library = RouteLibrary::open(source(), TravelConfig::default()).unwrap();
        let ids: Vec<&str> = library.index().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["north", "south", "broken"]);
        assert_eq!(library.index()[0].name, "Norden");
        assert_eq!(library.storage_keys().notes, "chile.notes");
    }

    #[test]
    fn test_open_fails_without_index() {
        let result = RouteLibrary::open(MapSource::default(), TravelConfig::default());
        assert!(matches!(result, Err(TravelRouteError::DocumentUnavailable { .. })));

        let bad = MapSource::default().with("travel-routes-data.json", "{");
        let result = RouteLibrary::open(bad, TravelConfig::default());
        assert!(matches!(result, Err(TravelRouteError::InvalidDocument { .. })));
    }

    #[test]
    fn test_load_route_normalizes_from_index() {
        let mut library = RouteLibrary::open(source(), TravelConfig::default()).unwrap();
        let north = library.load_route_by_id("north").unwrap().clone();
        assert_eq!(north.name, "Norden");
        let meta = north.meta.unwrap();
        assert_eq!(meta.pace.as_deref(), Some("ruhig"));
        assert_eq!(meta.duration_days, Some(12));
        assert_eq!(north.map_focus, Some(serde_json::json!({"zoom": 5})));

        let south = library.load_route_by_id("south").unwrap();
        assert_eq!(south.name, "Patagonien");
        assert!(library.load_route_by_id("atlantis").is_none());
    }

    #[test]
    fn test_failed_routes_are_not_refetched() {
        let mut library = RouteLibrary::open(source(), TravelConfig::default()).unwrap();
        assert!(library.load_route_by_id("broken").is_none());
        assert!(library.load_route_by_id("broken").is_none());
        assert_eq!(library.source.fetch_count("data/routes/broken.json"), 1);

        library.load_route_by_id("north");
        library.load_route_by_id("north");
        assert_eq!(library.source.fetch_count("data/routes/north.json"), 1);
    }

    #[test]
    fn test_load_all_report() {
        let mut library = RouteLibrary::open(source(), TravelConfig::default()).unwrap();
        let report = library.load_all();
        assert_eq!(report.loaded, vec!["north", "south"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].route_id, "broken");
        assert!(report.skipped[0].reason.contains("no id"));
        assert_eq!(library.available_route_ids(), vec!["north", "south"]);
    }

    #[test]
    fn test_mismatched_id_is_skipped() {
        let source = MapSource::default()
            .with("travel-routes-data.json", r#"{"routeIndex": [{"id": "x"}]}"#)
            .with("data/routes/x.json", r#"{"id": "y"}"#);
        let mut library = RouteLibrary::open(source, TravelConfig::default()).unwrap();
        assert!(library.load_route_by_id("x").is_none());
        assert!(library.available_route_ids().is_empty());
    }

    #[test]
    fn test_into_dataset_filters_index() {
        let source = source().with(
            "data/poi-overview.json",
            r#"{"items": [{"id": "geysers", "description": "El Tatio"}]}"#,
        );
        let dataset = RouteLibrary::open(source, TravelConfig::default())
            .unwrap()
            .into_dataset();
        assert_eq!(dataset.available_route_ids(), vec!["north", "south"]);
        assert_eq!(dataset.routes[1].id, "south");
        assert_eq!(dataset.poi_overview.as_ref().unwrap().items[0].id, "geysers");
        assert_eq!(dataset.storage_keys.notes, "chile.notes");
        assert!(dataset.route("broken").is_none());
    }

    #[test]
    fn test_routes_in_view() {
        let mut library = RouteLibrary::open(source(), TravelConfig::default()).unwrap();
        library.load_all();
        let atacama = Bounds::from_corners([[-71.0, -24.0], [-68.0, -22.0]]);
        assert_eq!(library.routes_in_view(&atacama), vec!["north"]);
        let chile = Bounds::from_corners([[-76.0, -56.0], [-66.0, -17.0]]);
        assert_eq!(library.routes_in_view(&chile), vec!["north", "south"]);
    }

    #[test]
    fn test_sanitize_relative_path() {
        assert_eq!(sanitize_relative_path("/data/a.json").unwrap(), "data/a.json");
        assert_eq!(sanitize_relative_path("./data/a.json").unwrap(), "data/a.json");
        assert!(sanitize_relative_path("data/../../etc/passwd").is_err());
        assert!(sanitize_relative_path("").is_err());
    }
}
