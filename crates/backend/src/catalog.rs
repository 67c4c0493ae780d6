use enodia_shared::layers::LayerDefinition;
use enodia_shared::models::InfrastructureCategory;
use std::path::Path;

pub const CATALOG_FILE: &str = "layers.json";

/// Display definitions for every infrastructure layer.
pub struct LayerCatalog {
    pub definitions: Vec<LayerDefinition>,
}

impl LayerCatalog {
    pub fn builtin() -> Self {
        LayerCatalog {
            definitions: InfrastructureCategory::ALL
                .into_iter()
                .map(LayerDefinition::builtin)
                .collect(),
        }
    }

    /// Load `layers.json` from `assets_dir`, overriding the built-in definitions
    /// it names. A missing file is not an error.
    pub fn load(assets_dir: &Path) -> Result<Self, String> {
        let path = assets_dir.join(CATALOG_FILE);
        if !path.exists() {
            tracing::info!(path = %path.display(), "No layer catalog, using built-in layers");
            return Ok(Self::builtin());
        }

        let data = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let overrides: Vec<LayerDefinition> = serde_json::from_str(&data)
            .map_err(|e| format!("Failed to parse {}: {}", CATALOG_FILE, e))?;

        let mut catalog = Self::builtin();
        for def in overrides {
            if let Some(slot) = catalog.definitions.iter_mut().find(|d| d.key == def.key) {
                *slot = def;
            }
        }

        tracing::info!(layers = catalog.definitions.len(), "Loaded layer catalog");
        Ok(catalog)
    }

    pub fn find(&self, category: InfrastructureCategory) -> Option<&LayerDefinition> {
        self.definitions.iter().find(|d| d.key == category)
    }
}
