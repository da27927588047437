//! # Map Rendering
//!
//! Glue between the GeoJSON collections of [`crate::geo_transform`] and a map
//! engine. The engine itself sits behind [`MapSurface`] so the glue can be
//! driven by MapLibre, Leaflet or a recording fake in tests.
//!
//! [`RouteMap`] keeps the interaction state the engine does not: which popup
//! is open (at most one), which feature is selected and which is hovered.
//!
//! The module also carries the pure style helpers: raster base style, tile
//! template expansion, timeline opacity expressions and popup/tooltip text.

use geojson::{feature::Id, Feature, FeatureCollection, Value as GeoValue};
use serde_json::{json, Value};

use crate::bounds::{calculate_bounding_box, Bounds};
use crate::config::TravelConfig;
use crate::geo_transform::resolve_mode_appearance;
use crate::route_list::{format_duration, format_number_de};
use crate::types::{LngLat, MapSettings, RouteDetail, RouteSegment, RouteStop, TileLayer, TransportModes};

/// Opaque handle of a popup opened on the surface.
pub type PopupHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub padding: f64,
    pub max_zoom: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            padding: 48.0,
            max_zoom: 8.5,
        }
    }
}

/// Operations a map engine must offer.
pub trait MapSurface {
    fn has_source(&self, source_id: &str) -> bool;
    fn add_geojson_source(&mut self, source_id: &str, data: &FeatureCollection);
    /// Replace the data of an existing source. Returns false if it is absent.
    fn set_source_data(&mut self, source_id: &str, data: &FeatureCollection) -> bool;
    fn has_layer(&self, layer_id: &str) -> bool;
    /// Add a layer from a MapLibre style-spec layer object.
    fn add_layer(&mut self, layer: Value);
    /// Returns false if the layer is absent.
    fn set_paint_property(&mut self, layer_id: &str, property: &str, value: Value) -> bool;
    fn fit_bounds(&mut self, bounds: [LngLat; 2], options: FitOptions);
    fn open_popup(&mut self, at: LngLat, html: &str) -> PopupHandle;
    fn close_popup(&mut self, handle: PopupHandle);
    fn set_feature_state(&mut self, source_id: &str, feature_id: &str, state: Value);
}

/// What the selection callback receives.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSelection {
    pub source_id: String,
    pub feature_id: String,
    pub properties: serde_json::Map<String, Value>,
    pub anchor: LngLat,
}

type SelectionCallback = Box<dyn FnMut(&FeatureSelection)>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FeatureRef {
    source_id: String,
    feature_id: String,
}

// ============================================================================
// Route Map
// ============================================================================

pub struct RouteMap<M: MapSurface> {
    surface: M,
    fit: FitOptions,
    popup: Option<PopupHandle>,
    selected: Option<FeatureRef>,
    hovered: Option<FeatureRef>,
    on_select: Option<SelectionCallback>,
}

impl<M: MapSurface> RouteMap<M> {
    pub fn new(surface: M) -> Self {
        Self::with_options(surface, FitOptions::default())
    }

    pub fn with_config(surface: M, config: &TravelConfig) -> Self {
        Self::with_options(
            surface,
            FitOptions {
                padding: config.fit_padding,
                max_zoom: config.fit_max_zoom,
            },
        )
    }

    pub fn with_options(surface: M, fit: FitOptions) -> Self {
        Self {
            surface,
            fit,
            popup: None,
            selected: None,
            hovered: None,
            on_select: None,
        }
    }

    pub fn surface(&self) -> &M {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut M {
        &mut self.surface
    }

    pub fn into_surface(self) -> M {
        self.surface
    }

    /// Register the callback invoked when a feature is clicked.
    pub fn on_select(&mut self, callback: impl FnMut(&FeatureSelection) + 'static) {
        self.on_select = Some(Box::new(callback));
    }

    /// Add the source, or replace its data if it already exists.
    pub fn add_geojson_source(&mut self, source_id: &str, data: &FeatureCollection) {
        if self.surface.has_source(source_id) {
            log::debug!("[RouteMap] Updating source '{}' ({} features)", source_id, data.features.len());
            self.surface.set_source_data(source_id, data);
        } else {
            log::debug!("[RouteMap] Adding source '{}' ({} features)", source_id, data.features.len());
            self.surface.add_geojson_source(source_id, data);
        }
    }

    /// Line layer over the LineStrings of `source_id`. Returns false when
    /// the layer exists already or the source is missing.
    pub fn add_route_layer(&mut self, layer_id: &str, source_id: &str) -> bool {
        self.add_layer_if_missing(layer_id, source_id, route_layer_spec(layer_id, source_id))
    }

    /// Circle layer over the Points of `source_id`.
    pub fn add_poi_layer(&mut self, layer_id: &str, source_id: &str) -> bool {
        self.add_layer_if_missing(layer_id, source_id, poi_layer_spec(layer_id, source_id))
    }

    fn add_layer_if_missing(&mut self, layer_id: &str, source_id: &str, layer: Value) -> bool {
        if self.surface.has_layer(layer_id) {
            return false;
        }
        if !self.surface.has_source(source_id) {
            log::debug!("[RouteMap] Skipping layer '{}': no source '{}'", layer_id, source_id);
            return false;
        }
        self.surface.add_layer(layer);
        true
    }

    /// Fit the viewport to every coordinate of `collections`. Returns the
    /// fitted bounds, `None` when there is nothing to fit.
    pub fn fit_to_data(&mut self, collections: &[&FeatureCollection]) -> Option<Bounds> {
        let coordinates: Vec<LngLat> = collections
            .iter()
            .flat_map(|collection| collection.features.iter())
            .flat_map(feature_coordinates)
            .collect();
        self.fit_to_coordinates(&coordinates)
    }

    pub fn fit_to_coordinates(&mut self, coordinates: &[LngLat]) -> Option<Bounds> {
        let bounds = calculate_bounding_box(coordinates)?;
        self.surface.fit_bounds(bounds.corners(), self.fit);
        Some(bounds)
    }

    /// Open a popup, closing the one currently open.
    pub fn open_popup(&mut self, at: LngLat, html: &str) -> PopupHandle {
        self.close_popup();
        let handle = self.surface.open_popup(at, html);
        self.popup = Some(handle);
        handle
    }

    pub fn close_popup(&mut self) {
        if let Some(handle) = self.popup.take() {
            self.surface.close_popup(handle);
        }
    }

    pub fn has_open_popup(&self) -> bool {
        self.popup.is_some()
    }

    /// Click on a feature: popup, selection highlight and callback.
    ///
    /// Features without an id are ignored and yield `None`.
    pub fn handle_click(&mut self, source_id: &str, feature: &Feature) -> Option<FeatureSelection> {
        let feature_id = feature_id(feature)?;
        let anchor = feature_anchor(feature)?;
        let properties = feature.properties.clone().unwrap_or_default();

        self.open_popup(anchor, &feature_popup_html(&properties));
        self.highlight(source_id, &feature_id);

        let selection = FeatureSelection {
            source_id: source_id.to_string(),
            feature_id,
            properties,
            anchor,
        };
        if let Some(callback) = self.on_select.as_mut() {
            callback(&selection);
        }
        Some(selection)
    }

    /// Move the `selected` state to one feature.
    pub fn highlight(&mut self, source_id: &str, feature_id: &str) {
        let target = FeatureRef {
            source_id: source_id.to_string(),
            feature_id: feature_id.to_string(),
        };
        if self.selected.as_ref() == Some(&target) {
            return;
        }
        if let Some(previous) = self.selected.take() {
            self.surface
                .set_feature_state(&previous.source_id, &previous.feature_id, json!({"selected": false}));
        }
        self.surface
            .set_feature_state(source_id, feature_id, json!({"selected": true}));
        self.selected = Some(target);
    }

    pub fn clear_highlight(&mut self) {
        if let Some(previous) = self.selected.take() {
            self.surface
                .set_feature_state(&previous.source_id, &previous.feature_id, json!({"selected": false}));
        }
    }

    pub fn selected_feature(&self) -> Option<(&str, &str)> {
        self.selected
            .as_ref()
            .map(|f| (f.source_id.as_str(), f.feature_id.as_str()))
    }

    pub fn handle_hover(&mut self, source_id: &str, feature_id: &str) {
        let target = FeatureRef {
            source_id: source_id.to_string(),
            feature_id: feature_id.to_string(),
        };
        if self.hovered.as_ref() == Some(&target) {
            return;
        }
        self.handle_leave();
        self.surface
            .set_feature_state(source_id, feature_id, json!({"hover": true}));
        self.hovered = Some(target);
    }

    pub fn handle_leave(&mut self) {
        if let Some(previous) = self.hovered.take() {
            self.surface
                .set_feature_state(&previous.source_id, &previous.feature_id, json!({"hover": false}));
        }
    }

    /// Dim segments and stops past the timeline slider.
    pub fn apply_timeline(
        &mut self,
        segment_layer: &str,
        stop_layer: &str,
        step_count: usize,
        slider_value: f64,
    ) -> f64 {
        let threshold = resolve_visibility_threshold(step_count, slider_value);
        self.surface
            .set_paint_property(segment_layer, "line-opacity", segment_opacity_expression(threshold));
        self.surface
            .set_paint_property(stop_layer, "circle-opacity", stop_opacity_expression(threshold));
        threshold
    }
}

fn feature_id(feature: &Feature) -> Option<String> {
    match &feature.id {
        Some(Id::String(id)) => Some(id.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => feature
            .properties
            .as_ref()
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn positions_of(value: &GeoValue) -> Vec<LngLat> {
    let pair = |p: &Vec<f64>| (p.len() >= 2).then(|| [p[0], p[1]]);
    match value {
        GeoValue::Point(p) => pair(p).into_iter().collect(),
        GeoValue::MultiPoint(ps) | GeoValue::LineString(ps) => ps.iter().filter_map(pair).collect(),
        GeoValue::MultiLineString(lines) | GeoValue::Polygon(lines) => {
            lines.iter().flatten().filter_map(pair).collect()
        }
        GeoValue::MultiPolygon(polygons) => polygons
            .iter()
            .flatten()
            .flatten()
            .filter_map(pair)
            .collect(),
        GeoValue::GeometryCollection(geometries) => {
            geometries.iter().flat_map(|g| positions_of(&g.value)).collect()
        }
    }
}

fn feature_coordinates(feature: &Feature) -> Vec<LngLat> {
    feature
        .geometry
        .as_ref()
        .map(|g| positions_of(&g.value))
        .unwrap_or_default()
}

/// Popup anchor: the point itself, or the middle vertex of a line.
fn feature_anchor(feature: &Feature) -> Option<LngLat> {
    let coordinates = feature_coordinates(feature);
    coordinates.get(coordinates.len() / 2).copied()
}

// ============================================================================
// Layer specs
// ============================================================================

fn state_case(selected: Value, hover: Value, otherwise: Value) -> Value {
    json!([
        "case",
        ["boolean", ["feature-state", "selected"], false], selected,
        ["boolean", ["feature-state", "hover"], false], hover,
        otherwise
    ])
}

/// Line layer filtered to LineStrings; selected lines are wider and opaque.
pub fn route_layer_spec(layer_id: &str, source_id: &str) -> Value {
    json!({
        "id": layer_id,
        "type": "line",
        "source": source_id,
        "filter": ["==", ["geometry-type"], "LineString"],
        "layout": {"line-join": "round", "line-cap": "round"},
        "paint": {
            "line-color": ["coalesce", ["get", "color"], crate::geo_transform::DEFAULT_SEGMENT_COLOR],
            "line-width": state_case(json!(7), json!(5.5), json!(4)),
            "line-opacity": state_case(json!(1), json!(0.95), json!(0.8))
        }
    })
}

/// Circle layer filtered to Points.
pub fn poi_layer_spec(layer_id: &str, source_id: &str) -> Value {
    json!({
        "id": layer_id,
        "type": "circle",
        "source": source_id,
        "filter": ["==", ["geometry-type"], "Point"],
        "paint": {
            "circle-color": "#ffffff",
            "circle-stroke-color": crate::geo_transform::DEFAULT_SEGMENT_COLOR,
            "circle-radius": state_case(json!(9), json!(8), json!(6)),
            "circle-stroke-width": state_case(json!(4), json!(3), json!(2))
        }
    })
}

// ============================================================================
// Base style
// ============================================================================

const DEFAULT_TILE: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
const DEFAULT_GLYPHS: &str = "https://demotiles.maplibre.org/font/{fontstack}/{range}.pbf";
const DEFAULT_ATTRIBUTION: &str = "© OpenStreetMap-Mitwirkende";
const DEFAULT_SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

/// Tile URL templates for the raster source.
///
/// A list is used as is (blank entries dropped); a single template with
/// `{s}` is expanded over the subdomains; nothing configured falls back to
/// OpenStreetMap.
pub fn resolve_tile_templates(settings: Option<&MapSettings>) -> Vec<String> {
    match settings.and_then(|s| s.tile_layer.as_ref()) {
        Some(TileLayer::Many(templates)) => {
            let valid: Vec<String> = templates
                .iter()
                .filter(|t| !t.trim().is_empty())
                .cloned()
                .collect();
            if !valid.is_empty() {
                return valid;
            }
        }
        Some(TileLayer::Single(template)) if !template.trim().is_empty() => {
            if template.contains("{s}") {
                let subdomains: Vec<&str> = match settings {
                    Some(s) if !s.tile_subdomains.is_empty() => {
                        s.tile_subdomains.iter().map(String::as_str).collect()
                    }
                    _ => DEFAULT_SUBDOMAINS.to_vec(),
                };
                return subdomains
                    .into_iter()
                    .map(|sub| template.replacen("{s}", sub, 1))
                    .collect();
            }
            return vec![template.clone()];
        }
        _ => {}
    }
    vec![DEFAULT_TILE.to_string()]
}

/// MapLibre style with one raster base layer.
pub fn create_raster_style(settings: Option<&MapSettings>) -> Value {
    let mut style = json!({
        "version": 8,
        "glyphs": settings
            .and_then(|s| s.glyphs_url.clone())
            .unwrap_or_else(|| DEFAULT_GLYPHS.to_string()),
        "sources": {
            "osm": {
                "type": "raster",
                "tiles": resolve_tile_templates(settings),
                "tileSize": 256,
                "maxzoom": 14,
                "attribution": settings
                    .and_then(|s| s.attribution.clone())
                    .unwrap_or_else(|| DEFAULT_ATTRIBUTION.to_string())
            }
        },
        "layers": [{"id": "osm-base", "type": "raster", "source": "osm"}]
    });
    if let Some(sprite) = settings.and_then(|s| s.sprite_url.as_deref()) {
        style["sprite"] = json!(sprite);
    }
    style
}

// ============================================================================
// Timeline visibility
// ============================================================================

/// `Number.MAX_SAFE_INTEGER`: nothing is dimmed.
pub const MAX_VISIBILITY_THRESHOLD: f64 = 9_007_199_254_740_991.0;

pub const ACTIVE_SEGMENT_OPACITY: f64 = 1.0;
pub const INACTIVE_SEGMENT_OPACITY: f64 = 0.7;
pub const ACTIVE_STOP_OPACITY: f64 = 1.0;
pub const INACTIVE_STOP_OPACITY: f64 = 0.7;

/// Order up to which features render fully opaque.
pub fn resolve_visibility_threshold(step_count: usize, slider_value: f64) -> f64 {
    if !slider_value.is_finite() || step_count == 0 {
        return MAX_VISIBILITY_THRESHOLD;
    }
    slider_value
}

pub fn segment_opacity_expression(threshold: f64) -> Value {
    json!(["case", ["<=", ["get", "order"], threshold], ACTIVE_SEGMENT_OPACITY, INACTIVE_SEGMENT_OPACITY])
}

pub fn stop_opacity_expression(threshold: f64) -> Value {
    json!(["case", ["<=", ["get", "order"], threshold], ACTIVE_STOP_OPACITY, INACTIVE_STOP_OPACITY])
}

/// Slider position showing the whole route: the last step, or 0.
pub fn default_slider_index(step_count: usize) -> usize {
    step_count.saturating_sub(1)
}

// ============================================================================
// Popup and tooltip content
// ============================================================================

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Title in bold, subtitle below, from GeoJSON feature properties.
pub fn feature_popup_html(properties: &serde_json::Map<String, Value>) -> String {
    let text = |key: &str| {
        properties
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    let title = text("title")
        .or_else(|| text("name"))
        .or_else(|| text("label"))
        .or_else(|| text("id"))
        .unwrap_or_default();
    let mut html = format!("<strong>{}</strong>", escape_html(title));
    if let Some(subtitle) = text("subtitle") {
        html.push_str("<br/>");
        html.push_str(&escape_html(subtitle));
    }
    html
}

/// Marker glyph for a stop type.
pub fn stop_icon(kind: Option<&str>) -> &'static str {
    match kind {
        Some("airport") => "✈️",
        Some("bus") => "🚌",
        Some("hotel") => "🛏️",
        Some("trail") => "🥾",
        Some("beach") => "🏖️",
        Some("town") => "🏘️",
        Some("food") => "🍽️",
        _ => "📍",
    }
}

/// Popup body for a stop marker.
pub fn stop_popup_html(route: &RouteDetail, stop: &RouteStop) -> String {
    let extra_str = |key: &str| stop.extra.get(key).and_then(Value::as_str);
    let name = stop.name.as_deref().unwrap_or(&stop.id);

    let mut lines = vec![format!("<strong>{}</strong>", escape_html(name))];
    if let Some(description) = stop.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(escape_html(description));
    }
    if let Some(rating) = stop.extra.get("rating").and_then(Value::as_f64) {
        lines.push(format!("⭐ {:.1}", rating));
    }
    if let Some(hours) = extra_str("openingHours") {
        lines.push(format!("Öffnungszeiten: {}", escape_html(hours)));
    }
    if let Some(website) = extra_str("website") {
        lines.push(format!(
            "<a target=\"_blank\" rel=\"noopener\" href=\"{}\">{}</a>",
            escape_html(website),
            escape_html(website)
        ));
    }
    if route.is_custom() && !stop.is_selected() {
        lines.push("<span class=\"travel-badge-warning\">Derzeit deaktiviert</span>".to_string());
    }
    lines.join("<br/>")
}

/// `🚌 Fernbus · Turbus · 480 km · 6.5 h · 12,4 kg CO₂e`
pub fn segment_tooltip(segment: &RouteSegment, modes: &TransportModes) -> String {
    let appearance = resolve_mode_appearance(segment.mode.as_deref(), modes);
    let icon = segment
        .mode
        .as_deref()
        .and_then(|m| modes.get(m))
        .and_then(|m| m.icon.clone())
        .unwrap_or_default();
    let positive = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0);

    let bits = [
        Some(format!("{} {}", icon, appearance.label).trim().to_string()),
        segment.operator.clone(),
        positive(segment.distance_km).map(|d| format!("{} km", format_number_de(d))),
        positive(segment.duration_minutes).map(|m| format_duration(Some(m))),
        positive(segment.carbon_kg).map(|c| format!("{} kg CO₂e", format_number_de(c))),
    ];
    bits.into_iter()
        .flatten()
        .filter(|bit| !bit.is_empty())
        .collect::<Vec<_>>()
        .join(" · ")
}
