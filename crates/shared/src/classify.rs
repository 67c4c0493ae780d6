use std::collections::HashSet;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{ElementId, FeatureId, InfrastructureCategory, LineFeature, RawGeometryElement};

/// Minimum number of vertices for a usable polyline.
pub const MIN_VERTICES: usize = 2;

/// Prefix of ids derived from geometry when the upstream element has none.
pub const SYNTHETIC_ID_PREFIX: &str = "geom-";

/// Prefix for text ids that could otherwise collide with numeric or synthetic ids.
pub const TEXT_ID_PREFIX: &str = "text-";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("element {id} has {vertices} vertices, at least {MIN_VERTICES} are required")]
    InvalidElement { id: String, vertices: usize },
}

/// Resolve the category of an element from its tags.
///
/// Rules are evaluated in order and the first match wins, so a way tagged
/// both `power=line` and `highway=*` is electricity.
pub fn category_for(element: &RawGeometryElement) -> InfrastructureCategory {
    if element.tag("power") == Some("line") {
        return InfrastructureCategory::Electricity;
    }
    let water_pipeline =
        element.tag("man_made") == Some("pipeline") && element.tag("pipeline") == Some("water");
    if water_pipeline || element.tag("utility") == Some("water") {
        return InfrastructureCategory::Water;
    }
    if element.tags.contains_key("highway") {
        return InfrastructureCategory::Road;
    }
    if element.tags.contains_key("railway") {
        return InfrastructureCategory::Rail;
    }
    InfrastructureCategory::Other
}

/// Id derived from the vertex sequence, stable across ingestions of the same geometry.
pub fn synthetic_id(element: &RawGeometryElement) -> FeatureId {
    let mut hasher = Sha256::new();
    for v in &element.geometry {
        hasher.update(v.lon.to_le_bytes());
        hasher.update(v.lat.to_le_bytes());
    }
    let digest = hasher.finalize();
    FeatureId(format!("{}{}", SYNTHETIC_ID_PREFIX, hex::encode(&digest[..8])))
}

/// Numeric ids render as decimal and text ids are kept verbatim, unless a text
/// id looks like a number or carries a reserved prefix. Those get
/// [`TEXT_ID_PREFIX`], which keeps the mapping injective.
pub fn feature_id(element: &RawGeometryElement) -> FeatureId {
    match &element.id {
        Some(ElementId::Number(n)) => FeatureId(n.to_string()),
        Some(ElementId::Text(s)) => {
            let ambiguous = s.parse::<i64>().is_ok()
                || s.starts_with(SYNTHETIC_ID_PREFIX)
                || s.starts_with(TEXT_ID_PREFIX);
            if ambiguous {
                FeatureId(format!("{}{}", TEXT_ID_PREFIX, s))
            } else {
                FeatureId(s.clone())
            }
        }
        None => synthetic_id(element),
    }
}

/// Convert one raw element into a line feature.
pub fn classify(element: &RawGeometryElement) -> Result<LineFeature, ClassifyError> {
    let id = feature_id(element);
    if element.geometry.len() < MIN_VERTICES {
        return Err(ClassifyError::InvalidElement {
            id: id.0,
            vertices: element.geometry.len(),
        });
    }

    let category = category_for(element);
    let mut properties = element.tags.clone();
    // Resolved values take precedence over same-named tags.
    properties.insert("id".to_string(), id.0.clone());
    properties.insert("category".to_string(), category.key().to_string());

    Ok(LineFeature {
        id,
        category,
        geometry: element.geometry.iter().map(|v| v.to_lon_lat()).collect(),
        properties,
    })
}

/// Result of classifying a whole batch.
#[derive(Debug, Default)]
pub struct ClassifiedBatch {
    pub features: Vec<LineFeature>,
    pub rejected: Vec<ClassifyError>,
    /// Ids seen more than once; only the first occurrence is kept.
    pub duplicates: Vec<FeatureId>,
}

/// Classify every element, skipping invalid ones without aborting the batch.
pub fn classify_batch<'a, I>(elements: I) -> ClassifiedBatch
where
    I: IntoIterator<Item = &'a RawGeometryElement>,
{
    let mut batch = ClassifiedBatch::default();
    let mut seen = HashSet::new();
    for element in elements {
        match classify(element) {
            Ok(feature) => {
                if seen.insert(feature.id.clone()) {
                    batch.features.push(feature);
                } else {
                    batch.duplicates.push(feature.id);
                }
            }
            Err(e) => batch.rejected.push(e),
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LatLon;

    fn line() -> Vec<LatLon> {
        vec![
            LatLon { lat: 44.30, lon: -69.78 },
            LatLon { lat: 44.31, lon: -69.77 },
        ]
    }

    fn way(tags: &[(&str, &str)]) -> RawGeometryElement {
        RawGeometryElement::way(1, line(), tags)
    }

    #[test]
    fn test_power_line_is_electricity() {
        assert_eq!(category_for(&way(&[("power", "line")])), InfrastructureCategory::Electricity);
    }

    #[test]
    fn test_other_power_values_are_not_electricity() {
        assert_eq!(category_for(&way(&[("power", "minor_line")])), InfrastructureCategory::Other);
    }

    #[test]
    fn test_water_pipeline_is_water() {
        let el = way(&[("man_made", "pipeline"), ("pipeline", "water")]);
        assert_eq!(category_for(&el), InfrastructureCategory::Water);
    }

    #[test]
    fn test_gas_pipeline_is_not_water() {
        let el = way(&[("man_made", "pipeline"), ("pipeline", "gas")]);
        assert_eq!(category_for(&el), InfrastructureCategory::Other);
    }

    #[test]
    fn test_water_utility_is_water() {
        assert_eq!(category_for(&way(&[("utility", "water")])), InfrastructureCategory::Water);
    }

    #[test]
    fn test_any_highway_is_road() {
        for value in ["primary", "residential", "footway"] {
            assert_eq!(category_for(&way(&[("highway", value)])), InfrastructureCategory::Road);
        }
    }

    #[test]
    fn test_any_railway_is_rail() {
        for value in ["rail", "abandoned", "tram"] {
            assert_eq!(category_for(&way(&[("railway", value)])), InfrastructureCategory::Rail);
        }
    }

    #[test]
    fn test_untagged_is_other() {
        assert_eq!(category_for(&way(&[])), InfrastructureCategory::Other);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let el = way(&[("power", "line"), ("highway", "service"), ("railway", "rail")]);
        assert_eq!(category_for(&el), InfrastructureCategory::Electricity);

        let el = way(&[("utility", "water"), ("highway", "primary")]);
        assert_eq!(category_for(&el), InfrastructureCategory::Water);

        let el = way(&[("railway", "rail"), ("highway", "primary")]);
        assert_eq!(category_for(&el), InfrastructureCategory::Road);
    }

    #[test]
    fn test_classify_swaps_coordinates() {
        let el = RawGeometryElement::way(
            5,
            vec![LatLon { lat: 43.66, lon: -70.26 }, LatLon { lat: 43.67, lon: -70.25 }],
            &[("highway", "primary")],
        );
        let feature = classify(&el).unwrap();
        assert_eq!(feature.geometry[0], [-70.26, 43.66]);
        assert_eq!(feature.geometry[1], [-70.25, 43.67]);
    }

    #[test]
    fn test_classify_keeps_tags_and_adds_id_and_category() {
        let el = RawGeometryElement::way(42, line(), &[("power", "line"), ("voltage", "34500")]);
        let feature = classify(&el).unwrap();
        assert_eq!(feature.id, FeatureId::from("42"));
        assert_eq!(feature.properties["voltage"], "34500");
        assert_eq!(feature.properties["power"], "line");
        assert_eq!(feature.properties["id"], "42");
        assert_eq!(feature.properties["category"], "electricity");
    }

    #[test]
    fn test_classify_rejects_degenerate_geometry() {
        let single = RawGeometryElement::way(9, vec![LatLon { lat: 1.0, lon: 2.0 }], &[]);
        assert_eq!(
            classify(&single),
            Err(ClassifyError::InvalidElement { id: "9".to_string(), vertices: 1 })
        );
        let empty = RawGeometryElement::way(10, vec![], &[]);
        assert!(classify(&empty).is_err());
    }

    #[test]
    fn test_missing_id_gets_stable_synthetic_id() {
        let mut el = way(&[("highway", "primary")]);
        el.id = None;
        let a = classify(&el).unwrap();
        let b = classify(&el).unwrap();
        assert!(a.id.as_str().starts_with(SYNTHETIC_ID_PREFIX));
        assert_eq!(a.id, b.id);

        let mut other = el.clone();
        other.geometry.reverse();
        assert_ne!(classify(&other).unwrap().id, a.id);
    }

    #[test]
    fn test_text_ids_are_kept() {
        let mut el = way(&[]);
        el.id = Some(ElementId::Text("way/77".to_string()));
        assert_eq!(classify(&el).unwrap().id, FeatureId::from("way/77"));
    }

    #[test]
    fn test_text_ids_never_collide_with_other_kinds() {
        let with_id = |id: ElementId| {
            let mut el = way(&[]);
            el.id = Some(id);
            classify(&el).unwrap().id
        };
        let mut anonymous = way(&[]);
        anonymous.id = None;
        let synthetic = classify(&anonymous).unwrap().id;
        let numeric = with_id(ElementId::Number(1));
        let text_one = with_id(ElementId::Text("1".to_string()));
        let text_geom = with_id(ElementId::Text(synthetic.0.clone()));
        let text_prefixed = with_id(ElementId::Text("text-1".to_string()));

        assert_eq!(numeric, FeatureId::from("1"));
        assert_eq!(text_one, FeatureId::from("text-1"));
        assert_ne!(text_geom, synthetic);
        assert_ne!(text_prefixed, text_one);
    }

    #[test]
    fn test_batch_skips_invalid_elements() {
        let elements = vec![
            RawGeometryElement::way(1, line(), &[("power", "line")]),
            RawGeometryElement::way(2, vec![LatLon { lat: 0.0, lon: 0.0 }], &[("power", "line")]),
            RawGeometryElement::way(3, line(), &[("railway", "rail")]),
        ];
        let batch = classify_batch(&elements);
        assert_eq!(batch.features.len(), 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.features[1].id, FeatureId::from("3"));
    }

    #[test]
    fn test_batch_keeps_first_of_duplicate_ids() {
        let elements = vec![
            RawGeometryElement::way(1, line(), &[("power", "line")]),
            RawGeometryElement::way(1, line(), &[("highway", "primary")]),
        ];
        let batch = classify_batch(&elements);
        assert_eq!(batch.features.len(), 1);
        assert_eq!(batch.features[0].category, InfrastructureCategory::Electricity);
        assert_eq!(batch.duplicates, vec![FeatureId::from("1")]);
    }
}
