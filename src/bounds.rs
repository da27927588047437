//! Bounding boxes and the fallback overlay projector.
//!
//! When no map engine is available the route is drawn on a plain canvas. The
//! [`FallbackProjector`] maps coordinates linearly into a padded pixel box,
//! north up. It makes no attempt at a real map projection.

use geo::{BoundingRect, Coord, MultiPoint, Point};
use rstar::AABB;
use serde::{Deserialize, Serialize};

use crate::types::LngLat;

/// Smallest span used for a degenerate (single point) box.
const MIN_SPAN: f64 = 1e-6;
/// Padding ratios outside this range are clamped.
const MAX_PADDING_RATIO: f64 = 0.2;

/// Axis-aligned geographic envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl Bounds {
    /// `[[minLng, minLat], [maxLng, maxLat]]`, the shape map engines accept.
    pub fn corners(&self) -> [LngLat; 2] {
        [[self.min_lng, self.min_lat], [self.max_lng, self.max_lat]]
    }

    pub fn from_corners(corners: [LngLat; 2]) -> Self {
        let [[a_lng, a_lat], [b_lng, b_lat]] = corners;
        Self {
            min_lng: a_lng.min(b_lng),
            min_lat: a_lat.min(b_lat),
            max_lng: a_lng.max(b_lng),
            max_lat: a_lat.max(b_lat),
        }
    }

    pub fn center(&self) -> LngLat {
        [
            (self.min_lng + self.max_lng) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.min_lng.is_finite()
            && self.min_lat.is_finite()
            && self.max_lng.is_finite()
            && self.max_lat.is_finite()
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    pub(crate) fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lng, self.min_lat], [self.max_lng, self.max_lat])
    }
}

/// Envelope of every finite coordinate, `None` when there are none.
pub fn calculate_bounding_box(coordinates: &[LngLat]) -> Option<Bounds> {
    let points: MultiPoint<f64> = coordinates
        .iter()
        .filter(|[lng, lat]| lng.is_finite() && lat.is_finite())
        .map(|&[lng, lat]| Point::new(lng, lat))
        .collect();

    points.bounding_rect().map(|rect| {
        let Coord { x: min_lng, y: min_lat } = rect.min();
        let Coord { x: max_lng, y: max_lat } = rect.max();
        Bounds {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        }
    })
}

/// Pixel position on the overlay canvas, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorOptions {
    /// Fraction of each dimension kept free on both sides. Default: 0.06
    pub padding_ratio: f64,
}

impl Default for ProjectorOptions {
    fn default() -> Self {
        Self {
            padding_ratio: 0.06,
        }
    }
}

/// Linear lng/lat to pixel mapping for a fixed canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackProjector {
    bounds: Bounds,
    padding_x: f64,
    padding_y: f64,
    usable_width: f64,
    usable_height: f64,
    lng_span: f64,
    lat_span: f64,
}

impl FallbackProjector {
    /// Build a projector for `bounds` on a `width` × `height` canvas.
    ///
    /// Returns `None` when the bounds are not finite or the canvas size is
    /// not a positive finite number.
    pub fn new(bounds: Bounds, width: f64, height: f64, options: ProjectorOptions) -> Option<Self> {
        if !bounds.is_finite() {
            return None;
        }
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return None;
        }

        let ratio = if options.padding_ratio.is_finite() {
            options.padding_ratio.clamp(0.0, MAX_PADDING_RATIO)
        } else {
            ProjectorOptions::default().padding_ratio
        };
        let padding_x = width * ratio;
        let padding_y = height * ratio;

        Some(Self {
            bounds,
            padding_x,
            padding_y,
            usable_width: (width - padding_x * 2.0).max(1.0),
            usable_height: (height - padding_y * 2.0).max(1.0),
            lng_span: (bounds.max_lng - bounds.min_lng).max(MIN_SPAN),
            lat_span: (bounds.max_lat - bounds.min_lat).max(MIN_SPAN),
        })
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Project a `[lng, lat]` pair. Coordinates outside the bounds are
    /// clamped onto the edge; non-finite input yields `None`.
    pub fn project(&self, coordinate: LngLat) -> Option<PixelPoint> {
        let [lng, lat] = coordinate;
        if !lng.is_finite() || !lat.is_finite() {
            return None;
        }
        let lng = lng.clamp(self.bounds.min_lng, self.bounds.max_lng);
        let lat = lat.clamp(self.bounds.min_lat, self.bounds.max_lat);

        Some(PixelPoint {
            x: self.padding_x + (lng - self.bounds.min_lng) / self.lng_span * self.usable_width,
            y: self.padding_y + (self.bounds.max_lat - lat) / self.lat_span * self.usable_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_bounding_box() {
        let coords = [[-70.5, -32.3], [-70.9, -32.6], [-71.2, -33.1], [-72.4, -34.2]];
        let bounds = calculate_bounding_box(&coords).unwrap();
        assert_eq!(bounds.corners(), [[-72.4, -34.2], [-70.5, -32.3]]);
    }

    #[test]
    fn test_bounding_box_skips_invalid() {
        assert_eq!(calculate_bounding_box(&[]), None);
        assert_eq!(calculate_bounding_box(&[[f64::NAN, 1.0], [2.0, f64::INFINITY]]), None);

        let bounds = calculate_bounding_box(&[[f64::NAN, 0.0], [10.0, 20.0]]).unwrap();
        assert_eq!(bounds.corners(), [[10.0, 20.0], [10.0, 20.0]]);
    }

    #[test]
    fn test_projector_corners() {
        let bounds = Bounds::from_corners([[0.0, 0.0], [10.0, 10.0]]);
        let projector = FallbackProjector::new(bounds, 100.0, 100.0, ProjectorOptions::default()).unwrap();

        let top_left = projector.project([0.0, 10.0]).unwrap();
        assert_close(top_left.x, 6.0);
        assert_close(top_left.y, 6.0);

        let bottom_right = projector.project([10.0, 0.0]).unwrap();
        assert_close(bottom_right.x, 94.0);
        assert_close(bottom_right.y, 94.0);
    }

    #[test]
    fn test_projector_clamps_outside_points() {
        let bounds = Bounds::from_corners([[0.0, 0.0], [10.0, 10.0]]);
        let projector = FallbackProjector::new(bounds, 200.0, 100.0, ProjectorOptions::default()).unwrap();
        let p = projector.project([50.0, -50.0]).unwrap();
        assert_close(p.x, 188.0);
        assert_close(p.y, 94.0);
        assert_eq!(projector.project([f64::NAN, 0.0]), None);
    }

    #[test]
    fn test_projector_rejects_invalid_input() {
        let bounds = Bounds::from_corners([[0.0, 0.0], [1.0, 1.0]]);
        let options = ProjectorOptions::default();
        assert!(FallbackProjector::new(bounds, 0.0, 100.0, options).is_none());
        assert!(FallbackProjector::new(bounds, 100.0, f64::NAN, options).is_none());

        let broken = Bounds {
            min_lng: f64::NAN,
            ..bounds
        };
        assert!(FallbackProjector::new(broken, 100.0, 100.0, options).is_none());
    }

    #[test]
    fn test_projector_padding_clamped_and_point_bounds() {
        let bounds = Bounds::from_corners([[5.0, 5.0], [5.0, 5.0]]);
        let projector =
            FallbackProjector::new(bounds, 100.0, 100.0, ProjectorOptions { padding_ratio: 0.9 }).unwrap();
        let p = projector.project([5.0, 5.0]).unwrap();
        assert_close(p.x, 20.0);
        assert_close(p.y, 20.0);
    }

    #[test]
    fn test_bounds_intersects() {
        let a = Bounds::from_corners([[0.0, 0.0], [2.0, 2.0]]);
        let b = Bounds::from_corners([[1.0, 1.0], [3.0, 3.0]]);
        let c = Bounds::from_corners([[5.0, 5.0], [6.0, 6.0]]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.center(), [1.0, 1.0]);
    }
}
