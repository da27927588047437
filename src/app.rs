//! # Application State
//!
//! [`TravelApp`] owns the loaded dataset and the custom route store and
//! tracks what the page shows: the list mode, the active filter and the
//! selected route. Every operation returns the data the UI needs next, so
//! a host only renders and never keeps state of its own.

use crate::bounds::{calculate_bounding_box, Bounds};
use crate::error::{OptionExt, Result, TravelRouteError};
use crate::geo_transform::{
    build_segment_collection, build_stop_collection, collect_all_coordinates, SegmentCollection,
    StopCollection,
};
use crate::loader::LoadedDataset;
use crate::route_list::{
    build_route_card, empty_state_message, visible_routes, ListMode, RouteCard, RouteFilter,
};
use crate::store::{CustomRouteStore, KeyValueStorage, RouteEdit};
use crate::types::{Activity, RouteDetail, RouteOrigin};

/// What the detail pane shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    Route { route_id: String, origin: RouteOrigin },
    /// No route exists in either collection
    #[default]
    Empty,
}

impl Selection {
    pub fn route_id(&self) -> Option<&str> {
        match self {
            Selection::Route { route_id, .. } => Some(route_id),
            Selection::Empty => None,
        }
    }
}

/// Map-ready rendering of one route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteView {
    /// The route as displayed. Deselected stops of custom routes are removed.
    pub route: RouteDetail,
    pub origin: RouteOrigin,
    pub segments: SegmentCollection,
    pub stops: StopCollection,
    /// `None` when the route has no locatable coordinates
    pub bounds: Option<Bounds>,
}

pub struct TravelApp<S: KeyValueStorage> {
    dataset: LoadedDataset,
    store: CustomRouteStore<S>,
    mode: ListMode,
    filter: RouteFilter,
    selection: Selection,
}

impl<S: KeyValueStorage> TravelApp<S> {
    /// Build the app over a loaded dataset. Stored custom routes are read
    /// with the dataset's storage keys; the first of them is selected, else
    /// the first curated route.
    pub fn new(dataset: LoadedDataset, storage: S) -> Self {
        let store = CustomRouteStore::load(storage, dataset.storage_keys.clone());
        let mut app = Self {
            dataset,
            store,
            mode: ListMode::Curated,
            filter: RouteFilter::new(),
            selection: Selection::Empty,
        };
        app.selection = app.fallback_selection();
        if let Selection::Route { origin, .. } = &app.selection {
            app.mode = ListMode::from(*origin);
        }
        app
    }

    pub fn dataset(&self) -> &LoadedDataset {
        &self.dataset
    }

    pub fn store(&self) -> &CustomRouteStore<S> {
        &self.store
    }

    /// Notes and saved POIs are edited directly on the store.
    pub fn store_mut(&mut self) -> &mut CustomRouteStore<S> {
        &mut self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    // ========================================================================
    // Route list
    // ========================================================================

    pub fn list_mode(&self) -> ListMode {
        self.mode
    }

    pub fn set_list_mode(&mut self, mode: ListMode) {
        self.mode = mode;
    }

    pub fn filter(&self) -> &RouteFilter {
        &self.filter
    }

    pub fn set_search_term(&mut self, term: &str) {
        self.filter.set_search_term(term);
    }

    pub fn toggle_tag(&mut self, tag: &str) -> bool {
        self.filter.toggle_tag(tag)
    }

    pub fn clear_filter(&mut self) {
        self.filter.clear();
    }

    /// Routes of the current mode passing the filter, in list order.
    pub fn visible_routes(&self) -> Vec<&RouteDetail> {
        match self.mode {
            ListMode::Curated => visible_routes(&self.dataset.routes, &self.dataset.route_index, &self.filter),
            ListMode::Custom => visible_routes(self.store.routes(), &[], &self.filter),
        }
    }

    pub fn route_cards(&self) -> Vec<RouteCard> {
        let default_days = self.dataset.meta.default_duration_days;
        self.visible_routes()
            .into_iter()
            .map(|route| build_route_card(route, default_days, &self.dataset.tag_library))
            .collect()
    }

    /// Message for an empty list, `None` while routes are visible.
    pub fn empty_state(&self) -> Option<String> {
        if self.visible_routes().is_empty() {
            Some(empty_state_message(self.mode))
        } else {
            None
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Look a route up in both collections; custom ids win.
    pub fn find_route(&self, route_id: &str) -> Option<(&RouteDetail, RouteOrigin)> {
        if let Some(route) = self.store.get(route_id) {
            return Some((route, RouteOrigin::Custom));
        }
        self.dataset
            .route(route_id)
            .map(|route| (route, RouteOrigin::Curated))
    }

    /// Select a route and build its map data. Unknown ids leave the
    /// selection untouched and yield `None`.
    pub fn select_route(&mut self, route_id: &str) -> Option<RouteView> {
        let (_, origin) = self.find_route(route_id)?;
        self.selection = Selection::Route {
            route_id: route_id.to_string(),
            origin,
        };
        log::debug!("[TravelApp] Selected {} route {}", origin.as_str(), route_id);
        self.current_view()
    }

    /// Map data for the current selection.
    pub fn current_view(&self) -> Option<RouteView> {
        let route_id = self.selection.route_id()?;
        let (route, origin) = self.find_route(route_id)?;
        Some(self.build_view(route, origin))
    }

    fn build_view(&self, route: &RouteDetail, origin: RouteOrigin) -> RouteView {
        let route = if route.is_custom() {
            route.with_selected_stops_only()
        } else {
            route.clone()
        };
        let segments = build_segment_collection(&route, &self.dataset.transport_modes);
        let stops = build_stop_collection(&route);
        let bounds = calculate_bounding_box(&collect_all_coordinates(&segments, &stops));
        RouteView {
            route,
            origin,
            segments,
            stops,
            bounds,
        }
    }

    /// First custom route, else first curated route, else nothing.
    fn fallback_selection(&self) -> Selection {
        if let Some(route) = self.store.routes().first() {
            return Selection::Route {
                route_id: route.id.clone(),
                origin: RouteOrigin::Custom,
            };
        }
        match self.dataset.routes.first() {
            Some(route) => Selection::Route {
                route_id: route.id.clone(),
                origin: RouteOrigin::Curated,
            },
            None => Selection::Empty,
        }
    }

    // ========================================================================
    // Custom routes
    // ========================================================================

    fn require_custom(&self, route_id: &str) -> Result<()> {
        if self.store.contains(route_id) {
            return Ok(());
        }
        if self.dataset.route(route_id).is_some() {
            return Err(TravelRouteError::ImmutableRoute {
                route_id: route_id.to_string(),
            });
        }
        Err(TravelRouteError::UnknownRoute {
            route_id: route_id.to_string(),
        })
    }

    fn select_new_custom(&mut self, route_id: String) -> Option<RouteView> {
        self.mode = ListMode::Custom;
        self.select_route(&route_id)
    }

    /// Copy a curated route into the custom collection, switch the list to
    /// custom routes and select the copy. Custom ids are not curated and
    /// yield `UnknownRoute`.
    pub fn add_custom_route_from_curated(&mut self, route_id: &str) -> Result<RouteView> {
        let original = self
            .dataset
            .route(route_id)
            .ok_or_unknown_route(route_id)?
            .clone();
        let new_id = self.store.add_from_curated(&original)?.id.clone();
        self.select_new_custom(new_id.clone())
            .ok_or_unknown_route(&new_id)
    }

    /// New custom route from the dataset's blank template. `None` when the
    /// dataset has no template.
    pub fn create_blank_route(&mut self) -> Result<Option<RouteView>> {
        let template = match self
            .dataset
            .templates
            .as_ref()
            .and_then(|t| t.blank_route.clone())
        {
            Some(template) => template,
            None => {
                log::warn!("[TravelApp] Dataset has no blank route template");
                return Ok(None);
            }
        };
        let new_id = self.store.create_blank(&template)?.id.clone();
        Ok(self.select_new_custom(new_id))
    }

    /// Delete a custom route and return what is selected afterwards.
    pub fn delete_custom_route(&mut self, route_id: &str) -> Result<&Selection> {
        self.require_custom(route_id)?;
        self.store.delete(route_id)?;

        if self.selection.route_id() == Some(route_id) {
            self.selection = self.fallback_selection();
            if let Selection::Route { origin, .. } = &self.selection {
                self.mode = ListMode::from(*origin);
            }
        }
        Ok(&self.selection)
    }

    /// Select or deselect a stop of a custom route. Returns the refreshed
    /// view when the route is the current selection.
    pub fn toggle_stop_selection(
        &mut self,
        route_id: &str,
        stop_id: &str,
        selected: bool,
    ) -> Result<Option<RouteView>> {
        self.require_custom(route_id)?;
        self.store.toggle_stop_selection(route_id, stop_id, selected)?;
        Ok(self.refreshed_view(route_id))
    }

    /// Save the editor form of a custom route.
    pub fn save_editor(&mut self, route_id: &str, edit: RouteEdit) -> Result<Option<RouteView>> {
        self.require_custom(route_id)?;
        self.store.apply_edit(route_id, edit)?;
        Ok(self.refreshed_view(route_id))
    }

    pub fn copy_activity_to_route(&mut self, activity: &Activity, route_id: &str) -> Result<bool> {
        self.require_custom(route_id)?;
        self.store.copy_activity_to_route(activity, route_id)
    }

    fn refreshed_view(&self, route_id: &str) -> Option<RouteView> {
        if self.selection.route_id() == Some(route_id) {
            self.current_view()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;
    use crate::types::RouteTemplates;
    use serde_json::json;

    fn route(value: serde_json::Value) -> RouteDetail {
        serde_json::from_value(value).unwrap()
    }

    fn dataset() -> LoadedDataset {
        let north = route(json!({
            "id": "north",
            "name": "Norte Grande",
            "tags": ["desert"],
            "stops": [
                {"id": "a", "name": "Arica", "coordinates": {"lat": -18.5, "lng": -70.3}},
                {"id": "b", "name": "Iquique", "coordinates": {"lat": -20.2, "lng": -70.1}},
                {"id": "c", "name": "Calama", "coordinates": {"lat": -22.5, "lng": -68.9}}
            ],
            "segments": [
                {"id": "s1", "from": "a", "to": "b", "mode": "bus"},
                {"id": "s2", "from": "b", "to": "c", "mode": "bus"}
            ]
        }));
        let south = route(json!({"id": "south", "name": "Patagonia", "tags": ["hiking"]}));
        let mut dataset = LoadedDataset {
            route_index: vec![
                serde_json::from_value(json!({"id": "north", "name": "Norte Grande"})).unwrap(),
                serde_json::from_value(json!({"id": "south", "name": "Patagonia"})).unwrap(),
            ],
            routes: vec![north, south],
            ..Default::default()
        };
        dataset.templates = Some(RouteTemplates {
            blank_route: Some(route(json!({"id": "blank", "name": "", "stops": []}))),
            ..Default::default()
        });
        dataset
    }

    #[test]
    fn test_initial_selection() {
        let app = TravelApp::new(dataset(), MemoryStorage::new());
        assert_eq!(app.selection().route_id(), Some("north"));
        assert_eq!(app.list_mode(), ListMode::Curated);

        let empty = TravelApp::new(LoadedDataset::default(), MemoryStorage::new());
        assert_eq!(*empty.selection(), Selection::Empty);
        assert!(empty.current_view().is_none());
        assert_eq!(empty.empty_state().as_deref(), Some("Keine Route gefunden."));
    }

    #[test]
    fn test_select_route_builds_view() {
        let mut app = TravelApp::new(dataset(), MemoryStorage::new());
        let view = app.select_route("north").unwrap();
        assert_eq!(view.origin, RouteOrigin::Curated);
        assert_eq!(view.segments.features.len(), 2);
        assert_eq!(view.stops.features.len(), 3);
        let bounds = view.bounds.unwrap();
        assert_eq!(bounds.corners(), [[-70.3, -22.5], [-68.9, -18.5]]);

        assert!(app.select_route("nowhere").is_none());
        assert_eq!(app.selection().route_id(), Some("north"));
    }

    #[test]
    fn test_copy_and_toggle_stop() {
        let mut app = TravelApp::new(dataset(), MemoryStorage::new());
        let view = app.add_custom_route_from_curated("north").unwrap();
        let custom_id = view.route.id.clone();
        assert!(custom_id.starts_with("custom-"));
        assert_eq!(view.route.name, "Norte Grande (Kopie)");
        assert_eq!(app.list_mode(), ListMode::Custom);
        assert_eq!(app.visible_routes().len(), 1);

        let view = app
            .toggle_stop_selection(&custom_id, "b", false)
            .unwrap()
            .unwrap();
        assert_eq!(view.stops.features.len(), 2);
        assert!(view.segments.is_empty());

        // the stored route keeps the stop, only the view drops it
        assert_eq!(app.store().get(&custom_id).unwrap().stops.len(), 3);
    }

    #[test]
    fn test_only_curated_routes_are_copied() {
        let mut app = TravelApp::new(dataset(), MemoryStorage::new());
        let custom_id = app.add_custom_route_from_curated("north").unwrap().route.id;
        assert!(matches!(
            app.add_custom_route_from_curated(&custom_id),
            Err(TravelRouteError::UnknownRoute { .. })
        ));
        assert_eq!(app.store().routes().len(), 1);
    }

    #[test]
    fn test_deleting_unselected_route_keeps_selection() {
        let mut app = TravelApp::new(dataset(), MemoryStorage::new());
        let first = app.add_custom_route_from_curated("north").unwrap().route.id;
        app.select_route("south").unwrap();

        let selection = app.delete_custom_route(&first).unwrap();
        assert_eq!(selection.route_id(), Some("south"));
        assert_eq!(app.store().routes().len(), 0);
    }

    #[test]
    fn test_curated_routes_are_immutable() {
        let mut app = TravelApp::new(dataset(), MemoryStorage::new());
        assert!(matches!(
            app.toggle_stop_selection("north", "a", false),
            Err(TravelRouteError::ImmutableRoute { .. })
        ));
        assert!(matches!(
            app.delete_custom_route("north"),
            Err(TravelRouteError::ImmutableRoute { .. })
        ));
        assert!(matches!(
            app.save_editor("ghost", RouteEdit::default()),
            Err(TravelRouteError::UnknownRoute { .. })
        ));
    }

    #[test]
    fn test_delete_falls_back() {
        let mut app = TravelApp::new(dataset(), MemoryStorage::new());
        let first = app.add_custom_route_from_curated("north").unwrap().route.id;
        let second = app.add_custom_route_from_curated("south").unwrap().route.id;
        assert_eq!(app.selection().route_id(), Some(second.as_str()));

        let selection = app.delete_custom_route(&second).unwrap();
        assert_eq!(selection.route_id(), Some(first.as_str()));

        let selection = app.delete_custom_route(&first).unwrap().clone();
        assert_eq!(
            selection,
            Selection::Route {
                route_id: "north".to_string(),
                origin: RouteOrigin::Curated
            }
        );
        assert_eq!(app.list_mode(), ListMode::Curated);
    }

    #[test]
    fn test_blank_route_and_editor() {
        let mut app = TravelApp::new(dataset(), MemoryStorage::new());
        let view = app.create_blank_route().unwrap().unwrap();
        assert_eq!(view.route.name, "Meine neue Route");

        let edit = RouteEdit {
            name: Some("Atacama".to_string()),
            cost_estimate: Some("abc".to_string()),
            ..Default::default()
        };
        let view = app.save_editor(&view.route.id, edit).unwrap().unwrap();
        assert_eq!(view.route.name, "Atacama");
        assert_eq!(view.route.meta.unwrap().cost_estimate, Some(0.0));

        let mut no_template = dataset();
        no_template.templates = None;
        let mut app = TravelApp::new(no_template, MemoryStorage::new());
        assert!(app.create_blank_route().unwrap().is_none());
    }

    #[test]
    fn test_filter_and_cards() {
        let mut app = TravelApp::new(dataset(), MemoryStorage::new());
        app.set_search_term("PATA");
        let cards = app.route_cards();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].route_id, "south");

        app.clear_filter();
        app.toggle_tag("desert");
        assert_eq!(app.visible_routes()[0].id, "north");

        app.set_list_mode(ListMode::Custom);
        assert!(app.empty_state().unwrap().contains("eigene Route"));
    }
}
