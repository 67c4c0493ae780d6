use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Closed set of infrastructure categories a line feature can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfrastructureCategory {
    Electricity,
    Water,
    Road,
    Rail,
    Other,
}

impl InfrastructureCategory {
    /// Every category, in display order.
    pub const ALL: [InfrastructureCategory; 5] = [
        InfrastructureCategory::Electricity,
        InfrastructureCategory::Water,
        InfrastructureCategory::Road,
        InfrastructureCategory::Rail,
        InfrastructureCategory::Other,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            InfrastructureCategory::Electricity => "electricity",
            InfrastructureCategory::Water => "water",
            InfrastructureCategory::Road => "road",
            InfrastructureCategory::Rail => "rail",
            InfrastructureCategory::Other => "other",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl std::fmt::Display for InfrastructureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Upstream element identifier. Overpass sends numbers, other sources may send strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementId::Number(n) => write!(f, "{}", n),
            ElementId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A vertex as the upstream service encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    /// Interchange order: longitude first.
    pub fn to_lon_lat(self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

/// A raw line element as returned by the geodata query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGeometryElement {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub id: Option<ElementId>,
    #[serde(default)]
    pub geometry: Vec<LatLon>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RawGeometryElement {
    /// Convenience constructor for a way with the given vertices and tags.
    pub fn way(id: i64, geometry: Vec<LatLon>, tags: &[(&str, &str)]) -> Self {
        RawGeometryElement {
            kind: "way".to_string(),
            id: Some(ElementId::Number(id)),
            geometry,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Stable identifier of a line feature within one ingestion batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub String);

impl FeatureId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        FeatureId(s.to_string())
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized, immutable polyline feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFeature {
    pub id: FeatureId,
    pub category: InfrastructureCategory,
    /// `[longitude, latitude]` pairs, upstream order preserved.
    pub geometry: Vec<[f64; 2]>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureLayer {
    pub key: InfrastructureCategory,
    pub display_name: String,
    pub color: String,
    pub features: Arc<Vec<LineFeature>>,
    pub enabled: bool,
    pub metadata: BTreeMap<String, String>,
}

/// A point of interest supplied by the site explorer. Only its coordinates are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityRelation {
    pub site_id: String,
    pub layer_key: InfrastructureCategory,
    pub matching_feature_ids: Vec<FeatureId>,
}
