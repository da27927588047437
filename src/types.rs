//! Dataset document types.
//!
//! These mirror the JSON documents the travel-routes page ships: the index
//! document (`travel-routes-data.json`), one detail document per route and
//! the optional POI overview. Every struct keeps unrecognised members in an
//! `extra` map so a route copied into local storage round-trips without losing
//! fields this crate does not interpret (photos, contact details, cost
//! breakdowns, ...).

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unrecognised JSON members carried along for round-tripping.
pub type JsonObject = Map<String, Value>;

/// A `[lng, lat]` pair, GeoJSON axis order.
pub type LngLat = [f64; 2];

/// Transport-mode registry: mode key -> styling and physical characteristics.
pub type TransportModes = BTreeMap<String, TransportMode>;

// ============================================================================
// Coordinates
// ============================================================================

/// Latitude/longitude object as written in the route documents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "lon", alias = "longitude")]
    pub lng: f64,
}

/// A coordinate in either of the two encodings found in the dataset.
///
/// Stops use `{lat, lng}` objects while GeoJSON-derived fields use
/// `[lng, lat]` arrays. Both normalize to [`LngLat`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    /// Tried first: a derived struct also accepts a sequence in field order
    Pair(LngLat),
    LatLng(LatLng),
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Coordinate::LatLng(LatLng { lat, lng })
    }

    /// Normalize to `[lng, lat]`, rejecting non-finite values.
    pub fn to_lng_lat(&self) -> Option<LngLat> {
        let (lng, lat) = match *self {
            Coordinate::LatLng(LatLng { lat, lng }) => (lng, lat),
            Coordinate::Pair([lng, lat]) => (lng, lat),
        };
        if lng.is_finite() && lat.is_finite() {
            Some([lng, lat])
        } else {
            None
        }
    }
}

// ============================================================================
// Transport modes
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportMode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Leaflet-style dash pattern, e.g. `"6 8"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_array: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_speed_kmh: Option<f64>,
    /// kg CO₂e per passenger-kilometre
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_per_km: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

// ============================================================================
// Route metadata
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<u32>,
    /// Estimated total cost in EUR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Aggregate figures for a route, as precomputed by the data build or
/// derived by [`crate::geo_transform::compute_route_metrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_carbon_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_carbon_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_transport_carbon_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lodging_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_daily_budget: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

// ============================================================================
// Index document
// ============================================================================

/// Summary record in the index document pointing at one detail document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteIndexEntry {
    pub id: String,
    /// Path of the detail document, relative to the dataset root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RouteMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RouteMetrics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_focus: Option<Value>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_storage_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_poi_key: Option<String>,
}

/// One tile URL template or an explicit list of templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TileLayer {
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSettings {
    /// `[lat, lng]` as Leaflet's `setView` expects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_layer: Option<TileLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tile_subdomains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glyphs_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<EditorMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MapSettings>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTemplates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blank_route: Option<RouteDetail>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoiItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// The POI overview document: `{items: [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoiOverview {
    #[serde(default)]
    pub items: Vec<PoiItem>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// The index document either embeds the POI overview or names its file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoiOverviewRef {
    File(String),
    Inline(PoiOverview),
}

/// The index document (`travel-routes-data.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelRoutesDataset {
    #[serde(default)]
    pub meta: TravelMeta,
    #[serde(default)]
    pub transport_modes: TransportModes,
    #[serde(default)]
    pub route_index: Vec<RouteIndexEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_library: Vec<TagDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestion_library: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<RouteTemplates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_overview: Option<PoiOverviewRef>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

// ============================================================================
// Detail document
// ============================================================================

/// Where a route came from. Curated routes are read-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteOrigin {
    #[default]
    Curated,
    Custom,
}

impl RouteOrigin {
    pub fn is_curated(&self) -> bool {
        *self == RouteOrigin::Curated
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOrigin::Curated => "curated",
            RouteOrigin::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Only meaningful on custom routes; absent means selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl RouteStop {
    pub fn is_selected(&self) -> bool {
        self.selected.unwrap_or(true)
    }
}

/// A directed transit leg between two stops of the same route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_stop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_stop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_kg: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lodging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Start or end of a day-arrival segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayArrivalSegment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<SegmentEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<SegmentEndpoint>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayArrival {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<DayArrivalSegment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map_points: Vec<MapPoint>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayStation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// One day of a day-based itinerary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<DayStation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival: Option<DayArrival>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// Precomputed per-day geometry for the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySegmentDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Raw GeoJSON geometry; only LineStrings are rendered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLayers {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub daily_segments: Vec<DailySegmentDefinition>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// A full route document, curated or custom.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDetail {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Legacy spelling of `name` in older documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RouteMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RouteMetrics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stops: Vec<RouteStop>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<RouteSegment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flights: Vec<Flight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lodging: Vec<Lodging>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub food: Vec<FoodItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activities: Vec<Activity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<DayDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_layers: Option<MapLayers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_focus: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "RouteOrigin::is_curated")]
    pub source: RouteOrigin,
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl RouteDetail {
    pub fn stop(&self, stop_id: &str) -> Option<&RouteStop> {
        self.stops.iter().find(|stop| stop.id == stop_id)
    }

    pub fn is_custom(&self) -> bool {
        self.source == RouteOrigin::Custom
    }

    pub fn theme(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.theme.as_deref())
    }

    /// Name of the stop with this id, or the id itself.
    pub fn stop_label<'a>(&'a self, stop_id: &'a str) -> &'a str {
        self.stop(stop_id)
            .and_then(|stop| stop.name.as_deref())
            .unwrap_or(stop_id)
    }

    /// Copy of this route with deselected stops and the segments touching
    /// them removed. This is what the map shows for a custom route.
    pub fn with_selected_stops_only(&self) -> RouteDetail {
        let mut route = self.clone();
        let deselected: HashSet<&str> = self
            .stops
            .iter()
            .filter(|stop| !stop.is_selected())
            .map(|stop| stop.id.as_str())
            .collect();
        if deselected.is_empty() {
            return route;
        }
        route.stops.retain(|stop| stop.is_selected());
        route.segments.retain(|segment| {
            !deselected.contains(segment.from.as_str()) && !deselected.contains(segment.to.as_str())
        });
        route
    }

    /// Check the structural invariants of a route document.
    ///
    /// Returns one message per violation: duplicate or unlocatable stops,
    /// segments referencing stops outside the route, and modes missing from
    /// the registry.
    pub fn validate(&self, transport_modes: &TransportModes) -> Vec<String> {
        let mut issues = Vec::new();
        let mut stop_ids = HashSet::new();

        for stop in &self.stops {
            if !stop_ids.insert(stop.id.as_str()) {
                issues.push(format!("duplicate stop id '{}'", stop.id));
            }
            match stop.coordinates {
                Some(coordinate) if coordinate.to_lng_lat().is_some() => {}
                _ => issues.push(format!("stop '{}' has no finite coordinates", stop.id)),
            }
        }

        for (index, segment) in self.segments.iter().enumerate() {
            let label = segment
                .id
                .clone()
                .unwrap_or_else(|| format!("segment-{}", index + 1));
            for endpoint in [&segment.from, &segment.to] {
                if !stop_ids.contains(endpoint.as_str()) {
                    issues.push(format!("{} references unknown stop '{}'", label, endpoint));
                }
            }
            match segment.mode.as_deref() {
                Some(mode) if transport_modes.contains_key(mode) => {}
                Some(mode) => issues.push(format!("{} uses unknown mode '{}'", label, mode)),
                None => issues.push(format!("{} has no mode", label)),
            }
        }

        issues
    }
}
