use std::collections::BTreeMap;

use geo::{Coord, Distance, Euclidean, Haversine, LineString, Point};

use crate::models::{InfrastructureCategory, InfrastructureLayer, LineFeature, ProximityRelation, Site};

/// Threshold used when the caller does not pick one.
pub const DEFAULT_THRESHOLD_METERS: f64 = 500.0;

/// Mean earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two `[lon, lat]` positions in meters.
pub fn haversine_m(a: [f64; 2], b: [f64; 2]) -> f64 {
    Haversine.distance(Point::new(a[0], a[1]), Point::new(b[0], b[1]))
}

/// Project `[lon, lat]` onto a plane tangent at `origin`, in meters.
///
/// Equirectangular around the origin's latitude; accurate to well under a
/// percent across a county-sized area.
fn project(origin: [f64; 2], p: [f64; 2]) -> Coord<f64> {
    let mut d_lon = p[0] - origin[0];
    if d_lon > 180.0 {
        d_lon -= 360.0;
    } else if d_lon < -180.0 {
        d_lon += 360.0;
    }
    Coord {
        x: d_lon.to_radians() * origin[1].to_radians().cos() * EARTH_RADIUS_M,
        y: (p[1] - origin[1]).to_radians() * EARTH_RADIUS_M,
    }
}

/// Minimum distance in meters from `point` (`[lon, lat]`) to a polyline.
///
/// Returns `f64::INFINITY` for an empty line.
pub fn point_to_line_m(point: [f64; 2], line: &[[f64; 2]]) -> f64 {
    let origin = Point::new(0.0, 0.0);
    match line {
        [] => f64::INFINITY,
        [only] => Euclidean.distance(&origin, &Point::from(project(point, *only))),
        _ => {
            let projected: LineString<f64> = line.iter().map(|p| project(point, *p)).collect();
            Euclidean.distance(&origin, &projected)
        }
    }
}

fn site_position(site: &Site) -> [f64; 2] {
    [site.lng, site.lat]
}

/// Features of enabled layers within `threshold_m` of `site`, keyed by category.
///
/// Categories without a match are omitted; no site, no enabled layer or an
/// unusable threshold all give an empty mapping.
pub fn nearby(
    site: Option<&Site>,
    layers: &[InfrastructureLayer],
    threshold_m: f64,
) -> BTreeMap<InfrastructureCategory, Vec<LineFeature>> {
    let mut related = BTreeMap::new();
    let Some(site) = site else {
        return related;
    };
    if threshold_m.is_nan() || threshold_m < 0.0 {
        return related;
    }

    let origin = site_position(site);
    for layer in layers.iter().filter(|l| l.enabled) {
        let matches: Vec<LineFeature> = layer
            .features
            .iter()
            .filter(|f| point_to_line_m(origin, &f.geometry) <= threshold_m)
            .cloned()
            .collect();
        if !matches.is_empty() {
            related.insert(layer.key, matches);
        }
    }
    related
}

/// Same query as [`nearby`], reduced to id sets.
pub fn relations(
    site: &Site,
    layers: &[InfrastructureLayer],
    threshold_m: f64,
) -> Vec<ProximityRelation> {
    nearby(Some(site), layers, threshold_m)
        .into_iter()
        .map(|(layer_key, features)| ProximityRelation {
            site_id: site.id.clone(),
            layer_key,
            matching_feature_ids: features.into_iter().map(|f| f.id).collect(),
        })
        .collect()
}
