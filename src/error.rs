//! Unified error handling for the travel-routes library.
//!
//! Loading, storage and editing operations all report failures through
//! [`TravelRouteError`]. Failures that only affect one unit of work (a single
//! route document, a single storage read) are logged and isolated by the
//! caller rather than surfaced here.

use thiserror::Error;

/// Unified error type for travel-routes operations.
#[derive(Debug, Clone, Error)]
pub enum TravelRouteError {
    /// A dataset document could not be read from its source
    #[error("Document '{path}' could not be read: {message}")]
    DocumentUnavailable { path: String, message: String },

    /// A dataset document was read but is not valid JSON for its shape
    #[error("Document '{path}' could not be parsed: {message}")]
    InvalidDocument { path: String, message: String },

    /// A route document failed structural validation
    #[error("Route '{route_id}' is invalid: {message}")]
    InvalidRoute { route_id: String, message: String },

    /// HTTP transport error
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Key/value storage error
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No curated or custom route carries this id
    #[error("Unknown route '{route_id}'")]
    UnknownRoute { route_id: String },

    /// Curated routes are read-only
    #[error("Route '{route_id}' is curated and cannot be modified")]
    ImmutableRoute { route_id: String },
}

fn status_suffix(status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    }
}

/// Result type alias for travel-routes operations.
pub type Result<T> = std::result::Result<T, TravelRouteError>;

impl TravelRouteError {
    pub(crate) fn storage(message: impl Into<String>) -> Self {
        TravelRouteError::Storage {
            message: message.into(),
        }
    }
}

/// Extension trait for converting Option to TravelRouteError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an unknown route error.
    fn ok_or_unknown_route(self, route_id: &str) -> Result<T>;

    /// Convert Option to Result with an invalid route error.
    fn ok_or_invalid_route(self, route_id: &str, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unknown_route(self, route_id: &str) -> Result<T> {
        self.ok_or_else(|| TravelRouteError::UnknownRoute {
            route_id: route_id.to_string(),
        })
    }

    fn ok_or_invalid_route(self, route_id: &str, message: &str) -> Result<T> {
        self.ok_or_else(|| TravelRouteError::InvalidRoute {
            route_id: route_id.to_string(),
            message: message.to_string(),
        })
    }
}
