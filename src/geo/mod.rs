use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::physics::refraction::{RefractionParams, effective_earth_radius};

pub const EARTH_RADIUS: f64 = 6378137.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64, // AMSL
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WebMercator {
    pub x: f64,
    pub y: f64,
}

/// Convert Lat/Lon (WGS84) to Web Mercator (EPSG:3857).
/// Not conformal at high latitudes; used as the projected raster CRS, the
/// same role it plays for gridded terrain products.
pub fn latlon_to_webmercator(coord: LatLon) -> WebMercator {
    let x = coord.longitude * (PI / 180.0) * EARTH_RADIUS;
    let y = ((coord.latitude * PI / 360.0 + PI / 4.0).tan()).ln() * EARTH_RADIUS;
    WebMercator { x, y }
}

pub fn webmercator_to_latlon(coord: WebMercator) -> LatLon {
    let longitude = (coord.x / EARTH_RADIUS) * (180.0 / PI);
    let latitude = (2.0 * (coord.y / EARTH_RADIUS).exp().atan() - PI / 2.0) * (180.0 / PI);
    LatLon {
        latitude,
        longitude,
        altitude: 0.0,
    }
}

/// Beam-center altitude (AMSL) and great-circle arc distance along the
/// ground for a gate at slant range `range_m` and elevation `elev_deg`,
/// launched from `site_alt` under the effective-earth-radius model
/// (Doviak & Zrnic eq. 2.28).
pub fn beam_height_and_arc(
    range_m: f64,
    elev_deg: f64,
    site_alt: f64,
    refraction: RefractionParams,
) -> (f64, f64) {
    let re = effective_earth_radius(refraction);
    let el = elev_deg.to_radians();

    let z = (range_m * range_m + re * re + 2.0 * range_m * re * el.sin()).sqrt() - re;
    let arc = re * (range_m * el.cos() / (re + z)).asin();
    (site_alt + z, arc)
}

/// Spherical direct geodesic: destination point at `arc_m` meters along
/// bearing `bearing_deg` from `origin`. Good to well under a gate width at
/// radar ranges; ellipsoidal corrections are below the raster resolution.
pub fn destination(origin: LatLon, bearing_deg: f64, arc_m: f64) -> LatLon {
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();
    let bearing = bearing_deg.to_radians();
    let delta = arc_m / EARTH_RADIUS;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    LatLon {
        latitude: lat2.to_degrees(),
        longitude: lon2.to_degrees(),
        altitude: 0.0,
    }
}

/// Map one polar gate (slant range, azimuth, elevation) to geographic
/// position and beam-center altitude.
pub fn polar_to_lonlat_alt(
    range_m: f64,
    azimuth_deg: f64,
    elev_deg: f64,
    site: LatLon,
    refraction: RefractionParams,
) -> LatLon {
    let (alt, arc) = beam_height_and_arc(range_m, elev_deg, site.altitude, refraction);
    let mut pos = destination(site, azimuth_deg, arc);
    pos.altitude = alt;
    pos
}
