//! GeoJSON output for line features.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{InfrastructureLayer, LineFeature};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStringGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: LineStringGeometry,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl From<&LineFeature> for Feature {
    fn from(f: &LineFeature) -> Self {
        Feature {
            kind: "Feature".to_string(),
            geometry: LineStringGeometry {
                kind: "LineString".to_string(),
                coordinates: f.geometry.clone(),
            },
            properties: f.properties.clone(),
        }
    }
}

impl FeatureCollection {
    pub fn from_features<'a, I>(features: I) -> Self
    where
        I: IntoIterator<Item = &'a LineFeature>,
    {
        FeatureCollection {
            kind: "FeatureCollection".to_string(),
            features: features.into_iter().map(Feature::from).collect(),
        }
    }
}

impl From<&InfrastructureLayer> for FeatureCollection {
    fn from(layer: &InfrastructureLayer) -> Self {
        FeatureCollection::from_features(layer.features.iter())
    }
}
