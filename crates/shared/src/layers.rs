use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{FeatureId, InfrastructureCategory, InfrastructureLayer, LineFeature};

/// Display metadata for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDefinition {
    pub key: InfrastructureCategory,
    pub display_name: String,
    pub color: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LayerDefinition {
    pub fn builtin(category: InfrastructureCategory) -> Self {
        let (display_name, color, source) = match category {
            InfrastructureCategory::Electricity => ("Electricity", "#f6c23e", "OSM power"),
            InfrastructureCategory::Water => ("Water", "#36b9cc", "OSM"),
            InfrastructureCategory::Road => ("Roads", "#38a169", "OSM highways"),
            InfrastructureCategory::Rail => ("Rail", "#ff9999", "OSM rail"),
            InfrastructureCategory::Other => ("Other", "#a0aec0", "OpenStreetMap or other"),
        };
        LayerDefinition {
            key: category,
            display_name: display_name.to_string(),
            color: color.to_string(),
            metadata: BTreeMap::from([("source".to_string(), source.to_string())]),
        }
    }
}

/// Per-category feature counts after an ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    pub replaced: BTreeMap<InfrastructureCategory, usize>,
}

impl IngestSummary {
    pub fn total(&self) -> usize {
        self.replaced.values().sum()
    }
}

/// Owner of the infrastructure layers: exactly one per category, in category order.
#[derive(Debug, Clone)]
pub struct LayerStore {
    layers: Vec<InfrastructureLayer>,
    index: HashMap<FeatureId, InfrastructureCategory>,
}

impl LayerStore {
    /// Create one empty layer per category. Only `default_enabled` starts enabled.
    ///
    /// Categories missing from `definitions` get their built-in definition.
    pub fn initialize<I>(definitions: I, default_enabled: Option<InfrastructureCategory>) -> Self
    where
        I: IntoIterator<Item = LayerDefinition>,
    {
        let mut defs: BTreeMap<InfrastructureCategory, LayerDefinition> = BTreeMap::new();
        for def in definitions {
            defs.entry(def.key).or_insert(def);
        }

        let layers = InfrastructureCategory::ALL
            .into_iter()
            .map(|category| {
                let def = defs
                    .remove(&category)
                    .unwrap_or_else(|| LayerDefinition::builtin(category));
                InfrastructureLayer {
                    key: category,
                    display_name: def.display_name,
                    color: def.color,
                    features: Arc::new(Vec::new()),
                    enabled: default_enabled == Some(category),
                    metadata: def.metadata,
                }
            })
            .collect();

        LayerStore { layers, index: HashMap::new() }
    }

    /// Replace the features of every category present in `batch`.
    ///
    /// All affected layers are swapped together; categories absent from the
    /// batch keep their previous features.
    pub fn ingest(&mut self, batch: Vec<LineFeature>) -> IngestSummary {
        self.ingest_replacing(batch, &[])
    }

    /// Like [`ingest`](Self::ingest), but every category in `covered` is
    /// replaced even when the batch holds nothing for it. Used when a batch
    /// is the complete result for those categories, e.g. a new area.
    pub fn ingest_replacing(
        &mut self,
        batch: Vec<LineFeature>,
        covered: &[InfrastructureCategory],
    ) -> IngestSummary {
        let mut grouped: BTreeMap<InfrastructureCategory, Vec<LineFeature>> =
            covered.iter().map(|c| (*c, Vec::new())).collect();
        for feature in batch {
            grouped.entry(feature.category).or_default().push(feature);
        }

        let mut summary = IngestSummary::default();
        for layer in &mut self.layers {
            if let Some(features) = grouped.remove(&layer.key) {
                summary.replaced.insert(layer.key, features.len());
                layer.features = Arc::new(features);
            }
        }

        self.rebuild_index();
        summary
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .layers
            .iter()
            .flat_map(|layer| layer.features.iter().map(move |f| (f.id.clone(), layer.key)))
            .collect();
    }

    /// Flip a layer's visibility and return the new value.
    pub fn toggle(&mut self, category: InfrastructureCategory) -> bool {
        let layer = self.layer_mut(category);
        layer.enabled = !layer.enabled;
        layer.enabled
    }

    pub fn snapshot(&self) -> &[InfrastructureLayer] {
        &self.layers
    }

    pub fn layer(&self, category: InfrastructureCategory) -> &InfrastructureLayer {
        &self.layers[Self::position(category)]
    }

    fn layer_mut(&mut self, category: InfrastructureCategory) -> &mut InfrastructureLayer {
        &mut self.layers[Self::position(category)]
    }

    fn position(category: InfrastructureCategory) -> usize {
        // declaration order matches `InfrastructureCategory::ALL`
        category as usize
    }

    /// Category of the layer holding `id`, if any.
    pub fn locate(&self, id: &FeatureId) -> Option<InfrastructureCategory> {
        self.index.get(id).copied()
    }

    pub fn feature(&self, id: &FeatureId) -> Option<&LineFeature> {
        let category = self.locate(id)?;
        self.layer(category).features.iter().find(|f| &f.id == id)
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|l| l.features.len()).sum()
    }
}
