//! # Geo Transform
//!
//! Pure conversions from route documents to GeoJSON feature collections.
//!
//! Segment lines come from the first of three sources that yields any
//! feature (see [`SegmentSource`]). Stop points come from `stops` or, for
//! day-based itineraries, from the per-day station and arrival map points.
//! Nothing here touches a map; [`crate::map::RouteMap`] consumes the output.

use std::collections::HashMap;

use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use serde::Serialize;
use serde_json::Value;

use crate::types::{LngLat, RouteDetail, RouteMetrics, SegmentEndpoint, TransportModes};

/// Line color for segments without a usable mode color.
pub const DEFAULT_SEGMENT_COLOR: &str = "#2563eb";
/// Legend label for segments without a mode.
pub const DEFAULT_SEGMENT_LABEL: &str = "Segment";
/// Mode recorded on features whose source has none.
pub const FALLBACK_MODE: &str = "segment";

// ============================================================================
// Mode appearance
// ============================================================================

/// Styling resolved from the transport-mode registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeAppearance {
    pub color: String,
    pub label: String,
    /// Dash pattern in line widths; `None` draws a solid line
    pub dash_array: Option<Vec<f64>>,
}

/// Resolve color, label and dash pattern for a mode key.
///
/// - no mode: default color, label "Segment"
/// - unknown mode: default color, the key itself as label
/// - known mode: registry color and label, falling back to the above
pub fn resolve_mode_appearance(mode: Option<&str>, modes: &TransportModes) -> ModeAppearance {
    let Some(mode) = mode.filter(|m| !m.is_empty()) else {
        return ModeAppearance {
            color: DEFAULT_SEGMENT_COLOR.to_string(),
            label: DEFAULT_SEGMENT_LABEL.to_string(),
            dash_array: None,
        };
    };

    match modes.get(mode) {
        Some(definition) => ModeAppearance {
            color: definition
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_SEGMENT_COLOR.to_string()),
            label: definition.label.clone().unwrap_or_else(|| mode.to_string()),
            dash_array: definition.dash_array.as_deref().and_then(parse_dash_array),
        },
        None => ModeAppearance {
            color: DEFAULT_SEGMENT_COLOR.to_string(),
            label: mode.to_string(),
            dash_array: None,
        },
    }
}

/// `"6 8"` -> `[6.0, 8.0]`. Patterns with fewer than two positive numbers
/// are dropped.
fn parse_dash_array(raw: &str) -> Option<Vec<f64>> {
    let values: Vec<f64> = raw
        .split_whitespace()
        .filter_map(|part| part.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if values.len() >= 2 {
        Some(values)
    } else {
        None
    }
}

// ============================================================================
// Segment collection
// ============================================================================

/// Where the segment lines of a route were taken from, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentSource {
    /// `mapLayers.dailySegments` with LineString geometry
    ExplicitGeometry,
    /// `segments` joined against `stops` coordinates
    StopLookup,
    /// `days[].arrival.segments` endpoint coordinates
    DayArrival,
}

impl SegmentSource {
    pub const PRECEDENCE: [SegmentSource; 3] = [
        SegmentSource::ExplicitGeometry,
        SegmentSource::StopLookup,
        SegmentSource::DayArrival,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFeature {
    pub id: String,
    pub mode: String,
    /// Discovery order, starting at 0
    pub order: u32,
    pub appearance: ModeAppearance,
    pub coordinates: Vec<LngLat>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SegmentProperties<'a> {
    id: &'a str,
    mode: &'a str,
    order: u32,
    color: &'a str,
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dash_array: Option<&'a [f64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    route_id: Option<&'a str>,
}

impl SegmentFeature {
    fn to_feature(&self, route_id: Option<&str>) -> Feature {
        let properties = SegmentProperties {
            id: &self.id,
            mode: &self.mode,
            order: self.order,
            color: &self.appearance.color,
            label: &self.appearance.label,
            dash_array: self.appearance.dash_array.as_deref(),
            route_id,
        };
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(GeoValue::LineString(
                self.coordinates.iter().map(|c| c.to_vec()).collect(),
            ))),
            id: Some(Id::String(self.id.clone())),
            properties: to_properties(&properties),
            foreign_members: None,
        }
    }
}

/// Line features for one route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentCollection {
    /// `None` when no source produced a feature
    pub source: Option<SegmentSource>,
    pub features: Vec<SegmentFeature>,
}

impl SegmentCollection {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn coordinates(&self) -> impl Iterator<Item = LngLat> + '_ {
        self.features
            .iter()
            .flat_map(|feature| feature.coordinates.iter().copied())
    }

    pub fn to_geojson(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.iter().map(|f| f.to_feature(None)).collect(),
            foreign_members: None,
        }
    }
}

/// Build the line collection for a route from the first source that yields
/// any feature. Features keep discovery order.
pub fn build_segment_collection(route: &RouteDetail, modes: &TransportModes) -> SegmentCollection {
    for source in SegmentSource::PRECEDENCE {
        let features = match source {
            SegmentSource::ExplicitGeometry => segments_from_geometry(route, modes),
            SegmentSource::StopLookup => segments_from_stops(route, modes),
            SegmentSource::DayArrival => segments_from_days(route, modes),
        };
        if !features.is_empty() {
            return SegmentCollection {
                source: Some(source),
                features,
            };
        }
    }
    SegmentCollection::default()
}

fn segment_feature(
    id: String,
    mode: Option<&str>,
    order: usize,
    coordinates: Vec<LngLat>,
    modes: &TransportModes,
) -> SegmentFeature {
    SegmentFeature {
        id,
        mode: mode
            .filter(|m| !m.is_empty())
            .unwrap_or(FALLBACK_MODE)
            .to_string(),
        order: order as u32,
        appearance: resolve_mode_appearance(mode, modes),
        coordinates,
    }
}

fn segments_from_geometry(route: &RouteDetail, modes: &TransportModes) -> Vec<SegmentFeature> {
    let Some(layers) = &route.map_layers else {
        return Vec::new();
    };
    let mut features = Vec::new();
    for (index, daily) in layers.daily_segments.iter().enumerate() {
        let Some(coordinates) = daily.geometry.as_ref().and_then(line_string_coordinates) else {
            continue;
        };
        let id = daily
            .day_id
            .clone()
            .unwrap_or_else(|| format!("day-{}", index + 1));
        let order = features.len();
        features.push(segment_feature(id, daily.mode.as_deref(), order, coordinates, modes));
    }
    features
}

/// Positions of a GeoJSON LineString, `None` for any other geometry.
fn line_string_coordinates(raw: &Value) -> Option<Vec<LngLat>> {
    let geometry = Geometry::from_json_value(raw.clone()).ok()?;
    match geometry.value {
        GeoValue::LineString(positions) => {
            let coordinates: Vec<LngLat> = positions
                .iter()
                .filter(|p| p.len() >= 2 && p[0].is_finite() && p[1].is_finite())
                .map(|p| [p[0], p[1]])
                .collect();
            if coordinates.len() >= 2 {
                Some(coordinates)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn segments_from_stops(route: &RouteDetail, modes: &TransportModes) -> Vec<SegmentFeature> {
    let positions: HashMap<&str, LngLat> = route
        .stops
        .iter()
        .filter_map(|stop| {
            stop.coordinates
                .and_then(|c| c.to_lng_lat())
                .map(|c| (stop.id.as_str(), c))
        })
        .collect();

    let mut features = Vec::new();
    for (index, segment) in route.segments.iter().enumerate() {
        let (Some(from), Some(to)) = (
            positions.get(segment.from.as_str()),
            positions.get(segment.to.as_str()),
        ) else {
            continue;
        };
        let id = segment
            .id
            .clone()
            .unwrap_or_else(|| format!("segment-{}", index + 1));
        let order = features.len();
        features.push(segment_feature(id, segment.mode.as_deref(), order, vec![*from, *to], modes));
    }
    features
}

fn segments_from_days(route: &RouteDetail, modes: &TransportModes) -> Vec<SegmentFeature> {
    let mut features = Vec::new();
    for day in &route.days {
        let Some(arrival) = &day.arrival else {
            continue;
        };
        for (index, segment) in arrival.segments.iter().enumerate() {
            let (Some(from), Some(to)) = (endpoint_position(&segment.from), endpoint_position(&segment.to))
            else {
                continue;
            };
            let id = format!("{}-segment-{}", day.id, index + 1);
            let order = features.len();
            features.push(segment_feature(id, segment.mode.as_deref(), order, vec![from, to], modes));
        }
    }
    features
}

fn endpoint_position(endpoint: &Option<SegmentEndpoint>) -> Option<LngLat> {
    endpoint
        .as_ref()
        .and_then(|e| e.coordinates)
        .and_then(|c| c.to_lng_lat())
}

// ============================================================================
// Stop collection
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StopFeature {
    pub id: String,
    pub name: String,
    /// Position in the itinerary. Day-derived points sit strictly between
    /// their day's station and the next day.
    pub order: f64,
    /// 1-based marker label
    pub label: u32,
    pub title: String,
    pub subtitle: Option<String>,
    pub kind: Option<String>,
    /// 0-based day index for day-derived points
    pub day_index: Option<usize>,
    pub coordinates: LngLat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StopProperties<'a> {
    id: &'a str,
    name: &'a str,
    order: f64,
    label: u32,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    day_index: Option<usize>,
}

impl StopFeature {
    fn to_feature(&self) -> Feature {
        let properties = StopProperties {
            id: &self.id,
            name: &self.name,
            order: self.order,
            label: self.label,
            title: &self.title,
            subtitle: self.subtitle.as_deref(),
            kind: self.kind.as_deref(),
            day_index: self.day_index,
        };
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(GeoValue::Point(self.coordinates.to_vec()))),
            id: Some(Id::String(self.id.clone())),
            properties: to_properties(&properties),
            foreign_members: None,
        }
    }
}

/// Point features for one route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopCollection {
    pub features: Vec<StopFeature>,
}

impl StopCollection {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StopFeature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn to_geojson(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.iter().map(StopFeature::to_feature).collect(),
            foreign_members: None,
        }
    }
}

/// Build stop points from `stops`, or from `days` when the route has none.
/// Entries without finite coordinates are skipped.
pub fn build_stop_collection(route: &RouteDetail) -> StopCollection {
    if !route.stops.is_empty() {
        return StopCollection {
            features: stops_from_route(route),
        };
    }
    StopCollection {
        features: stops_from_days(route),
    }
}

fn stops_from_route(route: &RouteDetail) -> Vec<StopFeature> {
    route
        .stops
        .iter()
        .enumerate()
        .filter_map(|(index, stop)| {
            let coordinates = stop.coordinates.and_then(|c| c.to_lng_lat())?;
            let name = stop
                .name
                .clone()
                .or_else(|| stop.city.clone())
                .unwrap_or_else(|| format!("Stop {}", index + 1));
            let title = stop
                .name
                .clone()
                .or_else(|| stop.city.clone())
                .unwrap_or_else(|| stop.id.clone());
            Some(StopFeature {
                id: stop.id.clone(),
                name,
                order: index as f64,
                label: index as u32 + 1,
                title,
                subtitle: stop.city.clone().or_else(|| stop.kind.clone()),
                kind: stop.kind.clone(),
                day_index: None,
                coordinates,
            })
        })
        .collect()
}

fn stops_from_days(route: &RouteDetail) -> Vec<StopFeature> {
    let mut features = Vec::new();
    for (day_index, day) in route.days.iter().enumerate() {
        if let Some(station) = &day.station {
            if let Some(coordinates) = station.coordinates.and_then(|c| c.to_lng_lat()) {
                let name = station
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Station {}", day_index + 1));
                features.push(StopFeature {
                    id: format!("{}-station", day.id),
                    title: name.clone(),
                    name,
                    order: day_index as f64,
                    label: day_index as u32 + 1,
                    subtitle: day.date.clone(),
                    kind: Some("station".to_string()),
                    day_index: Some(day_index),
                    coordinates,
                });
            }
        }

        let Some(arrival) = &day.arrival else {
            continue;
        };
        let slots = (arrival.map_points.len() + 1) as f64;
        for (point_index, point) in arrival.map_points.iter().enumerate() {
            let Some(coordinates) = point.coordinates.and_then(|c| c.to_lng_lat()) else {
                continue;
            };
            let name = point.name.clone().unwrap_or_else(|| point.id.clone());
            features.push(StopFeature {
                id: point.id.clone(),
                title: name.clone(),
                name,
                order: day_index as f64 + (point_index + 1) as f64 / slots,
                label: day_index as u32 + 1,
                subtitle: point.kind.clone(),
                kind: point.kind.clone(),
                day_index: Some(day_index),
                coordinates,
            });
        }
    }
    features
}

// ============================================================================
// Aggregates
// ============================================================================

/// Every coordinate of both collections, lines first.
pub fn collect_all_coordinates(segments: &SegmentCollection, stops: &StopCollection) -> Vec<LngLat> {
    segments
        .coordinates()
        .chain(stops.features.iter().map(|f| f.coordinates))
        .collect()
}

/// Segment lines of many routes in one collection, each tagged with
/// `routeId`. Orders restart per route.
pub fn build_route_segment_library<'a>(
    routes: impl IntoIterator<Item = &'a RouteDetail>,
    modes: &TransportModes,
) -> FeatureCollection {
    let mut features = Vec::new();
    for route in routes {
        let collection = build_segment_collection(route, modes);
        features.extend(
            collection
                .features
                .iter()
                .map(|f| f.to_feature(Some(&route.id))),
        );
    }
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Great-circle distance in kilometres between two `[lng, lat]` points.
pub fn haversine_km(a: LngLat, b: LngLat) -> f64 {
    const R: f64 = 6_371.0; // Earth's radius in km

    let [lng1, lat1] = a;
    let [lng2, lat2] = b;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * R * h.sqrt().asin()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Derive aggregate figures for a route.
///
/// Segment distance is `distanceKm` or the haversine distance between its
/// stops; segment carbon is `carbonKg` or distance × the mode's
/// `carbonPerKm`. Flights without a distance take the matching segment's or
/// the stop-to-stop distance and the `flight` mode factor.
pub fn compute_route_metrics(route: &RouteDetail, modes: &TransportModes) -> RouteMetrics {
    let stop_position = |id: &str| {
        route
            .stop(id)
            .and_then(|stop| stop.coordinates)
            .and_then(|c| c.to_lng_lat())
    };
    let carbon_factor = |mode: Option<&str>| {
        mode.and_then(|m| modes.get(m))
            .and_then(|m| m.carbon_per_km)
            .unwrap_or(0.0)
    };

    let mut total_distance = 0.0;
    let mut total_carbon = 0.0;
    let mut segment_distances: HashMap<(&str, &str), f64> = HashMap::new();
    for segment in &route.segments {
        let distance = segment
            .distance_km
            .filter(|d| d.is_finite())
            .or_else(|| {
                let (from, to) = (stop_position(&segment.from)?, stop_position(&segment.to)?);
                Some(haversine_km(from, to))
            })
            .unwrap_or(0.0);
        segment_distances.insert((segment.from.as_str(), segment.to.as_str()), distance);
        total_distance += distance;
        total_carbon += segment
            .carbon_kg
            .filter(|c| c.is_finite())
            .unwrap_or_else(|| distance * carbon_factor(segment.mode.as_deref()));
    }

    let mut flight_carbon = 0.0;
    for flight in &route.flights {
        let endpoints = flight.from_stop_id.as_deref().zip(flight.to_stop_id.as_deref());
        let distance = flight
            .distance_km
            .filter(|d| d.is_finite() && *d > 0.0)
            .or_else(|| endpoints.and_then(|key| segment_distances.get(&key).copied()))
            .filter(|d| *d > 0.0)
            .or_else(|| {
                let (from, to) = endpoints?;
                Some(haversine_km(stop_position(from)?, stop_position(to)?))
            });
        if let Some(distance) = distance {
            flight_carbon += flight
                .carbon_kg
                .unwrap_or_else(|| distance * carbon_factor(Some("flight")));
        }
    }

    let count = |n: usize| Some(n as u32);
    let mut metrics = RouteMetrics {
        total_distance_km: Some(round_to(total_distance, 1)),
        estimated_carbon_kg: Some(round_to(total_carbon, 1)),
        segment_count: count(route.segments.len()),
        flight_count: count(
            route
                .segments
                .iter()
                .filter(|s| s.mode.as_deref() == Some("flight"))
                .count(),
        ),
        stop_count: count(route.stops.len()),
        lodging_count: count(route.lodging.len()),
        food_count: count(route.food.len()),
        activity_count: count(route.activities.len()),
        ..Default::default()
    };

    if flight_carbon > 0.0 {
        metrics.flight_carbon_kg = Some(round_to(flight_carbon, 1));
        metrics.ground_transport_carbon_kg = Some(round_to((total_carbon - flight_carbon).max(0.0), 1));
    }

    if let Some(meta) = &route.meta {
        if let Some(days) = meta.duration_days.filter(|d| *d > 0) {
            let cost = meta.cost_estimate.unwrap_or(0.0);
            metrics.average_daily_budget = Some(round_to(cost / days as f64, 2));
        }
    }

    metrics
}

fn to_properties<T: Serialize>(properties: &T) -> Option<JsonObject> {
    match serde_json::to_value(properties) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
