//! Runtime configuration.
//!
//! Defaults reproduce the layout of the published site: the index document at
//! `travel-routes-data.json`, detail documents under `data/routes/` and
//! the three local-storage keys used by the route editor.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TravelRouteError};
use crate::types::EditorMeta;

/// Keys under which the store persists its three values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageKeys {
    /// Custom routes (JSON array). Default: "travel-routes.custom"
    pub custom_routes: String,
    /// Free-text notes. Default: "travel-routes.notes"
    pub notes: String,
    /// Saved POI ids (JSON array). Default: "travel-routes.saved-pois"
    pub saved_pois: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            custom_routes: "travel-routes.custom".to_string(),
            notes: "travel-routes.notes".to_string(),
            saved_pois: "travel-routes.saved-pois".to_string(),
        }
    }
}

impl StorageKeys {
    /// Apply the overrides a dataset declares under `meta.editor`.
    pub fn with_editor_meta(mut self, editor: Option<&EditorMeta>) -> Self {
        let Some(editor) = editor else {
            return self;
        };
        if let Some(key) = non_empty(&editor.local_storage_key) {
            self.custom_routes = key;
        }
        if let Some(key) = non_empty(&editor.notes_key) {
            self.notes = key;
        }
        if let Some(key) = non_empty(&editor.saved_poi_key) {
            self.saved_pois = key;
        }
        self
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Configuration for loading, rendering and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TravelConfig {
    /// Index document path relative to the source root.
    /// Default: "travel-routes-data.json"
    pub index_path: String,

    /// Detail path used when an index entry has no `file`; `{id}` is replaced.
    /// Default: "data/routes/{id}.json"
    pub route_file_pattern: String,

    /// POI overview path used when the index does not name one.
    /// Default: "data/poi-overview.json"
    pub poi_overview_path: String,

    pub storage_keys: StorageKeys,

    /// Pixel padding around fitted bounds. Default: 48
    pub fit_padding: f64,

    /// Zoom ceiling when fitting bounds. Default: 8.5
    pub fit_max_zoom: f64,

    /// Fraction of the canvas reserved as projector padding. Default: 0.06
    pub projector_padding_ratio: f64,

    /// HTTP request timeout in seconds. Default: 30
    pub http_timeout_secs: u64,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            index_path: "travel-routes-data.json".to_string(),
            route_file_pattern: "data/routes/{id}.json".to_string(),
            poi_overview_path: "data/poi-overview.json".to_string(),
            storage_keys: StorageKeys::default(),
            fit_padding: 48.0,
            fit_max_zoom: 8.5,
            projector_padding_ratio: 0.06,
            http_timeout_secs: 30,
        }
    }
}

impl TravelConfig {
    /// Parse a configuration document. Missing members keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TravelConfig =
            serde_json::from_str(json).map_err(|e| TravelRouteError::Config {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.index_path.trim().is_empty() {
            return Err(TravelRouteError::Config {
                message: "indexPath must not be empty".to_string(),
            });
        }
        if !self.route_file_pattern.contains("{id}") {
            return Err(TravelRouteError::Config {
                message: "routeFilePattern must contain {id}".to_string(),
            });
        }
        if !self.fit_padding.is_finite() || self.fit_padding < 0.0 {
            return Err(TravelRouteError::Config {
                message: format!("fitPadding must be non-negative, got {}", self.fit_padding),
            });
        }
        Ok(())
    }

    /// Default detail document path for a route id.
    pub fn route_file_for(&self, route_id: &str) -> String {
        self.route_file_pattern.replace("{id}", route_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TravelConfig::default();
        assert_eq!(config.storage_keys.custom_routes, "travel-routes.custom");
        assert_eq!(config.storage_keys.notes, "travel-routes.notes");
        assert_eq!(config.storage_keys.saved_pois, "travel-routes.saved-pois");
        assert_eq!(config.fit_padding, 48.0);
        assert_eq!(config.fit_max_zoom, 8.5);
        assert_eq!(config.route_file_for("atacama"), "data/routes/atacama.json");
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            TravelConfig::from_json_str(r#"{"fitPadding": 24, "storageKeys": {"notes": "n"}}"#)
                .unwrap();
        assert_eq!(config.fit_padding, 24.0);
        assert_eq!(config.storage_keys.notes, "n");
        assert_eq!(config.storage_keys.custom_routes, "travel-routes.custom");
        assert_eq!(config.index_path, "travel-routes-data.json");
    }

    #[test]
    fn test_from_json_rejects_bad_pattern() {
        let err = TravelConfig::from_json_str(r#"{"routeFilePattern": "routes.json"}"#);
        assert!(matches!(err, Err(TravelRouteError::Config { .. })));
        assert!(TravelConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_editor_meta_overrides() {
        let editor = EditorMeta {
            local_storage_key: Some("site.routes".to_string()),
            notes_key: Some("  ".to_string()),
            saved_poi_key: None,
        };
        let keys = StorageKeys::default().with_editor_meta(Some(&editor));
        assert_eq!(keys.custom_routes, "site.routes");
        assert_eq!(keys.notes, "travel-routes.notes");
        assert_eq!(keys.saved_pois, "travel-routes.saved-pois");

        assert_eq!(StorageKeys::default().with_editor_meta(None), StorageKeys::default());
    }
}
