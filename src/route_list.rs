//! # Route List
//!
//! Search and tag filtering over the curated or custom collection, and the
//! card view model shown for each visible route.

use std::collections::BTreeSet;

use crate::types::{RouteDetail, RouteIndexEntry, RouteOrigin, TagDefinition};

/// Which collection the list shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ListMode {
    #[default]
    Curated,
    Custom,
}

impl ListMode {
    pub fn origin(&self) -> RouteOrigin {
        match self {
            ListMode::Curated => RouteOrigin::Curated,
            ListMode::Custom => RouteOrigin::Custom,
        }
    }
}

impl From<RouteOrigin> for ListMode {
    fn from(origin: RouteOrigin) -> Self {
        match origin {
            RouteOrigin::Curated => ListMode::Curated,
            RouteOrigin::Custom => ListMode::Custom,
        }
    }
}

/// Active tag chips plus the search box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteFilter {
    search_term: String,
    active_tags: BTreeSet<String>,
}

impl RouteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: &str) {
        self.search_term = term.trim().to_string();
    }

    pub fn active_tags(&self) -> &BTreeSet<String> {
        &self.active_tags
    }

    /// Activate or deactivate a tag chip. Returns whether it is now active.
    pub fn toggle_tag(&mut self, tag: &str) -> bool {
        if self.active_tags.remove(tag) {
            false
        } else {
            self.active_tags.insert(tag.to_string());
            true
        }
    }

    pub fn clear(&mut self) {
        self.search_term.clear();
        self.active_tags.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.search_term.is_empty() && self.active_tags.is_empty()
    }

    /// Whether a route passes both the tag and the text filter.
    pub fn matches(&self, route: &RouteDetail, entry: Option<&RouteIndexEntry>) -> bool {
        let tag_match = self.active_tags.is_empty()
            || route.tags.iter().any(|tag| self.active_tags.contains(tag));
        if !tag_match {
            return false;
        }
        if self.search_term.is_empty() {
            return true;
        }
        search_haystack(route, entry).contains(&self.search_term.to_lowercase())
    }
}

/// Lowercased text a search term is matched against.
///
/// Includes name, summary, theme, tags, index search tokens, stop names,
/// food names, activity titles, flight numbers and the headline metrics.
pub fn search_haystack(route: &RouteDetail, entry: Option<&RouteIndexEntry>) -> String {
    let metrics = route.metrics.as_ref();
    let metric = |value: Option<f64>| value.map(|v| v.to_string());

    let parts: Vec<Option<String>> = [
        Some(route.name.clone()),
        route.summary.clone(),
        route.theme().map(str::to_string),
    ]
    .into_iter()
    .chain(route.tags.iter().cloned().map(Some))
    .chain(
        entry
            .into_iter()
            .flat_map(|e| e.search_tokens.iter().cloned().map(Some)),
    )
    .chain(route.stops.iter().map(|stop| stop.name.clone()))
    .chain(route.food.iter().map(|item| item.name.clone()))
    .chain(route.activities.iter().map(|item| item.title.clone()))
    .chain(route.flights.iter().map(|flight| flight.flight_number.clone()))
    .chain([
        metric(metrics.and_then(|m| m.total_distance_km)),
        metric(metrics.and_then(|m| m.estimated_carbon_kg)),
        metric(metrics.and_then(|m| m.average_daily_budget)),
    ])
    .collect();

    parts
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Routes passing `filter`, in their original order.
pub fn visible_routes<'a>(
    routes: &'a [RouteDetail],
    index: &[RouteIndexEntry],
    filter: &RouteFilter,
) -> Vec<&'a RouteDetail> {
    if filter.is_empty() {
        return routes.iter().collect();
    }
    routes
        .iter()
        .filter(|route| {
            let entry = index.iter().find(|entry| entry.id == route.id);
            filter.matches(route, entry)
        })
        .collect()
}

/// Text shown when no route passes the filter.
pub fn empty_state_message(mode: ListMode) -> String {
    match mode {
        ListMode::Curated => "Keine Route gefunden.".to_string(),
        ListMode::Custom => {
            "Keine Route gefunden. Lege eine eigene Route an, um hier Inhalte zu sehen.".to_string()
        }
    }
}

// ============================================================================
// Cards
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardAction {
    /// Curated routes can be copied into the custom collection
    CopyToCustom,
    /// Custom routes can be deleted
    Delete,
}

impl CardAction {
    pub fn label(&self) -> &'static str {
        match self {
            CardAction::CopyToCustom => "Als Vorlage übernehmen",
            CardAction::Delete => "Route löschen",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaRow {
    pub label: &'static str,
    pub value: String,
}

/// Everything a route card displays.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCard {
    pub route_id: String,
    pub title: String,
    pub subtitle: String,
    pub color: Option<String>,
    pub badge: String,
    pub description: String,
    pub meta: Vec<MetaRow>,
    pub action: CardAction,
}

const MISSING: &str = "—";

pub fn build_route_card(
    route: &RouteDetail,
    default_duration_days: Option<u32>,
    tag_library: &[TagDefinition],
) -> RouteCard {
    let meta = route.meta.as_ref();
    let metrics = route.metrics.as_ref();
    let positive = |value: Option<f64>| value.filter(|v| v.is_finite() && *v != 0.0);

    let days = meta
        .and_then(|m| m.duration_days)
        .or(default_duration_days)
        .map(|d| d.to_string())
        .unwrap_or_else(|| MISSING.to_string());
    let cost = format_number_de(meta.and_then(|m| m.cost_estimate).unwrap_or(0.0));
    let daily = positive(metrics.and_then(|m| m.average_daily_budget))
        .map(format_number_de)
        .unwrap_or_else(|| MISSING.to_string());
    let distance = positive(metrics.and_then(|m| m.total_distance_km))
        .map(|v| format!("{} km", format_number_de(v)))
        .unwrap_or_else(|| MISSING.to_string());
    let carbon = positive(metrics.and_then(|m| m.estimated_carbon_kg))
        .map(|v| format!("{} kg", format_number_de(v)))
        .unwrap_or_else(|| MISSING.to_string());
    let tags = if route.tags.is_empty() {
        MISSING.to_string()
    } else {
        route
            .tags
            .iter()
            .map(|tag| tag_label(tag_library, tag))
            .collect::<Vec<_>>()
            .join(", ")
    };

    RouteCard {
        route_id: route.id.clone(),
        title: route.name.clone(),
        subtitle: route
            .theme()
            .unwrap_or("Thema unbekannt")
            .to_string(),
        color: route.color.clone(),
        badge: meta.and_then(|m| m.pace.clone()).unwrap_or_default(),
        description: route.summary.clone().unwrap_or_default(),
        meta: vec![
            MetaRow { label: "Tage", value: days },
            MetaRow { label: "Kosten ~€", value: cost },
            MetaRow { label: "Ø/Tag €", value: daily },
            MetaRow { label: "Distanz", value: distance },
            MetaRow { label: "CO₂", value: carbon },
            MetaRow { label: "Tags", value: tags },
        ],
        action: if route.is_custom() {
            CardAction::Delete
        } else {
            CardAction::CopyToCustom
        },
    }
}

fn tag_label<'a>(tag_library: &'a [TagDefinition], tag_id: &'a str) -> &'a str {
    tag_library
        .iter()
        .find(|tag| tag.id == tag_id && !tag.label.is_empty())
        .map(|tag| tag.label.as_str())
        .unwrap_or(tag_id)
}

// ============================================================================
// German number formatting
// ============================================================================

/// Format like `toLocaleString('de-DE')`: `.` groups thousands, `,` marks
/// decimals, at most three fraction digits.
pub fn format_number_de(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "NaN".to_string()
        } else if value > 0.0 {
            "∞".to_string()
        } else {
            "-∞".to_string()
        };
    }

    let rounded = (value * 1000.0).round() / 1000.0;
    let negative = rounded < 0.0;
    let text = format!("{:.3}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac_part.is_empty() {
        out.push(',');
        out.push_str(frac_part);
    }
    out
}

/// Segment duration: minutes below 90, hours (one decimal) above.
pub fn format_duration(minutes: Option<f64>) -> String {
    match minutes.filter(|m| m.is_finite()) {
        None => "n/a".to_string(),
        Some(m) if m < 90.0 => format!("{} min", m),
        Some(m) => format!("{} h", (m / 60.0 * 10.0).round() / 10.0),
    }
}
