use crate::math::{GeoCoordinate, EARTH_RADIUS};
use bevy::math::DVec2;
use serde::{Deserialize, Serialize};

/// The state of the map camera for a single frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    /// The aircraft position, which is drawn at the center of the map.
    pub map_center: GeoCoordinate,
    /// The angle in degrees spanned by the map from its top to its bottom edge.
    pub vertical_diameter: f64,
    /// The width of the map divided by its height.
    pub aspect_ratio: f64,
    /// The heading in radians, clockwise from north. It points towards the top edge of the map.
    pub heading: f64,
    /// The current altitude of the aircraft in feet.
    pub altitude: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            map_center: GeoCoordinate::default(),
            vertical_diameter: 1.0,
            aspect_ratio: 1.0,
            heading: 0.0,
            altitude: 0.0,
        }
    }
}

impl CameraState {
    /// Returns the same camera with the map rotated to north-up.
    pub fn north_up(self) -> Self {
        Self {
            heading: 0.0,
            ..self
        }
    }

    /// Converts a screen position to the angular offset from the map center in radians,
    /// with `x` pointing east and `y` pointing north.
    pub fn angular_offset(&self, uv: DVec2) -> DVec2 {
        let screen = DVec2::new((uv.x - 0.5) * self.aspect_ratio, 0.5 - uv.y);
        let (sin, cos) = self.heading.sin_cos();

        let rotated = DVec2::new(
            screen.x * cos + screen.y * sin,
            screen.y * cos - screen.x * sin,
        );

        rotated * self.vertical_diameter.to_radians()
    }

    /// The ground distance in meters covered by one pixel of an image `height` pixels high.
    pub fn meters_per_pixel(&self, height: u32) -> f64 {
        self.vertical_diameter.to_radians() * EARTH_RADIUS / height.max(1) as f64
    }
}

/// Projects a screen position in `[0, 1]²` (origin top left) onto the earth, using the
/// inverse azimuthal-equidistant projection centered on the camera's map center.
pub fn project(uv: DVec2, camera: &CameraState) -> GeoCoordinate {
    let DVec2 { x, y } = camera.angular_offset(uv);
    let center = camera.map_center;

    let c = (x * x + y * y).sqrt();

    // the general formula divides by c
    if c == 0.0 {
        return center;
    }

    let (lat_sin, lat_cos) = center.lat.sin_cos();
    let (c_sin, c_cos) = c.sin_cos();

    let lat = (c_cos * lat_sin + y * c_sin * lat_cos / c).clamp(-1.0, 1.0).asin();
    let lon = center.lon + (x * c_sin).atan2(c * lat_cos * c_cos - y * lat_sin * c_sin);

    GeoCoordinate { lat, lon }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn camera(lat: f64, lon: f64, vertical_diameter: f64) -> CameraState {
        CameraState {
            map_center: GeoCoordinate::from_degrees(lat, lon),
            vertical_diameter,
            ..CameraState::default()
        }
    }

    #[test]
    fn center_maps_to_map_center() {
        let mut rng = rand::rng();

        for _ in 0..1000 {
            let camera = CameraState {
                map_center: GeoCoordinate::from_degrees(
                    rng.random_range(-85.0..85.0),
                    rng.random_range(-180.0..180.0),
                ),
                vertical_diameter: rng.random_range(0.01..30.0),
                aspect_ratio: rng.random_range(0.5..2.0),
                heading: rng.random_range(0.0..std::f64::consts::TAU),
                altitude: 0.0,
            };

            let coordinate = project(DVec2::splat(0.5), &camera);

            assert!((coordinate.lat - camera.map_center.lat).abs() < 1e-12);
            assert!((coordinate.lon - camera.map_center.lon).abs() < 1e-12);
        }
    }

    #[test]
    fn top_edge_is_north() {
        let camera = camera(0.0, 0.0, 10.0);

        let center = project(DVec2::new(0.5, 0.5), &camera);
        assert!(center.lat.abs() < 1e-12 && center.lon.abs() < 1e-12);

        let top = project(DVec2::new(0.5, 0.0), &camera);
        assert!((top.lat_degrees() - 5.0).abs() < 1e-9);
        assert!(top.lon_degrees().abs() < 1e-9);

        let bottom = project(DVec2::new(0.5, 1.0), &camera);
        assert!((bottom.lat_degrees() + 5.0).abs() < 1e-9);
    }

    #[test]
    fn right_edge_is_east() {
        let camera = camera(0.0, 0.0, 10.0);
        let right = project(DVec2::new(1.0, 0.5), &camera);

        assert!(right.lat_degrees().abs() < 1e-9);
        assert!((right.lon_degrees() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn heading_rotates_the_map() {
        let camera = CameraState {
            heading: std::f64::consts::FRAC_PI_2,
            ..camera(0.0, 0.0, 10.0)
        };

        // heading east: the top of the map shows the terrain east of the aircraft
        let top = project(DVec2::new(0.5, 0.0), &camera);
        assert!(top.lat_degrees().abs() < 1e-9);
        assert!((top.lon_degrees() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn aspect_ratio_widens_the_map() {
        let camera = CameraState {
            aspect_ratio: 2.0,
            ..camera(0.0, 0.0, 10.0)
        };

        let right = project(DVec2::new(1.0, 0.5), &camera);
        assert!((right.lon_degrees() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn meters_per_pixel() {
        let camera = camera(0.0, 0.0, 1.0);
        let meters = camera.meters_per_pixel(1000);

        assert!((meters - 111.194_926_6).abs() < 1e-3);
    }
}
