//! # Travel Routes
//!
//! Data and map layer for a travel route planner.
//!
//! This library provides:
//! - Loading a JSON route dataset (index plus one document per route)
//! - GeoJSON segment and stop collections styled by transport mode
//! - Bounding boxes and a fallback pixel projector
//! - Map glue over any engine implementing [`MapSurface`]
//! - Route list filtering and card view models
//! - Custom routes, notes and saved POIs in key/value storage
//!
//! ## Features
//!
//! - **`http`** - Fetch dataset documents over HTTP
//! - **`persistence`** - SQLite-backed key/value storage
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use travel_routes::{DirectorySource, MemoryStorage, RouteLibrary, TravelApp, TravelConfig};
//!
//! let mut library = RouteLibrary::open(DirectorySource::new("public"), TravelConfig::default())?;
//! let report = library.load_all();
//! println!("{} routes loaded, {} skipped", report.loaded.len(), report.skipped.len());
//!
//! let mut app = TravelApp::new(library.into_dataset(), MemoryStorage::new());
//! if let Some(view) = app.select_route("north") {
//!     println!("{} segments, bounds {:?}", view.segments.features.len(), view.bounds);
//! }
//! # Ok::<(), travel_routes::TravelRouteError>(())
//! ```

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TravelRouteError};

// Dataset and route document types
pub mod types;
pub use types::{
    Coordinate, LatLng, LngLat, RouteDetail, RouteIndexEntry, RouteOrigin, RouteSegment,
    RouteStop, TransportMode, TransportModes, TravelRoutesDataset,
};

// Configuration (paths, storage keys, map defaults)
pub mod config;
pub use config::{StorageKeys, TravelConfig};

// Bounding boxes and fallback projection
pub mod bounds;
pub use bounds::{calculate_bounding_box, Bounds, FallbackProjector, PixelPoint, ProjectorOptions};

// Route -> GeoJSON transforms
pub mod geo_transform;
pub use geo_transform::{
    build_route_segment_library, build_segment_collection, build_stop_collection,
    compute_route_metrics, resolve_mode_appearance, SegmentCollection, SegmentSource,
    StopCollection,
};

// Dataset loading
pub mod loader;
pub use loader::{DatasetSource, DirectorySource, LoadReport, LoadedDataset, RouteLibrary};

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::HttpSource;

// Custom routes, notes and saved POIs
pub mod store;
pub use store::{CustomRouteStore, JsonFileStorage, KeyValueStorage, MemoryStorage, RouteEdit};

#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteStorage;

// Route list filtering and cards
pub mod route_list;
pub use route_list::{ListMode, RouteCard, RouteFilter};

// Map engine glue
pub mod map;
pub use map::{FeatureSelection, FitOptions, MapSurface, RouteMap};

// Application state
pub mod app;
pub use app::{RouteView, Selection, TravelApp};
