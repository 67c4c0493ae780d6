//! The infrastructure engine: ingestion pipeline plus the interface the map
//! rendering surface drives.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use enodia_shared::classify::classify_batch;
use enodia_shared::geojson::FeatureCollection;
use enodia_shared::layers::{LayerDefinition, LayerStore};
use enodia_shared::models::{
    FeatureId, InfrastructureCategory, InfrastructureLayer, LineFeature, RawGeometryElement, Site,
};
use enodia_shared::proximity::{self, point_to_line_m};
use enodia_shared::selection::{SelectionMachine, SelectionState, StyleDescriptor, Transition};
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::latest::{LatestWins, Ticket};
use crate::overpass::{AreaHandle, OverpassClient, QueryError};

/// Shown to users when the configured area cannot be resolved.
pub const AREA_UNAVAILABLE_MESSAGE: &str = "infrastructure data unavailable for this area";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("ingestion response discarded, a newer request was started")]
    StaleResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum IngestionStatus {
    Idle,
    Loading {
        generation: u64,
    },
    #[serde(rename_all = "camelCase")]
    Ready {
        generation: u64,
        features: usize,
        rejected: usize,
        finished_at: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        generation: u64,
        message: String,
        finished_at: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub generation: u64,
    pub area: AreaHandle,
    pub replaced: BTreeMap<InfrastructureCategory, usize>,
    pub rejected: usize,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub area_name: String,
    pub admin_level: u8,
    pub proximity_meters: f64,
    pub upstream_retries: u32,
    pub retry_backoff: Duration,
    pub categories: Vec<InfrastructureCategory>,
    pub default_layer: Option<InfrastructureCategory>,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        EngineSettings {
            area_name: config.area_name.clone(),
            admin_level: config.admin_level,
            proximity_meters: config.proximity_meters,
            upstream_retries: config.upstream_retries,
            retry_backoff: Duration::from_secs(2),
            categories: InfrastructureCategory::ALL.to_vec(),
            default_layer: config.default_layer,
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedArea {
    name: String,
    admin_level: u8,
    handle: AreaHandle,
}

struct EngineState {
    layers: LayerStore,
    selection: SelectionMachine,
    status: IngestionStatus,
    area_name: String,
    admin_level: u8,
    resolved: Option<ResolvedArea>,
}

pub struct Engine {
    client: OverpassClient,
    settings: EngineSettings,
    // Every event handler takes this briefly and never across an await,
    // so it acts as the single event queue.
    state: Mutex<EngineState>,
    ingestion: LatestWins,
}

fn failure_message(err: &QueryError) -> String {
    match err {
        QueryError::AreaNotFound { .. } => AREA_UNAVAILABLE_MESSAGE.to_string(),
        QueryError::UpstreamQueryFailed { status, .. } => {
            format!("infrastructure data could not be loaded (upstream status {})", status)
        }
        QueryError::Transport(_) => "infrastructure data could not be loaded".to_string(),
    }
}

impl Engine {
    pub fn new(
        client: OverpassClient,
        settings: EngineSettings,
        definitions: Vec<LayerDefinition>,
    ) -> Self {
        let state = EngineState {
            layers: LayerStore::initialize(definitions, settings.default_layer),
            selection: SelectionMachine::new(),
            status: IngestionStatus::Idle,
            area_name: settings.area_name.clone(),
            admin_level: settings.admin_level,
            resolved: None,
        };
        Engine {
            client,
            settings,
            state: Mutex::new(state),
            ingestion: LatestWins::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Rendering-surface interface

    pub fn layers(&self) -> Vec<InfrastructureLayer> {
        self.lock().layers.snapshot().to_vec()
    }

    pub fn layer_geojson(&self, category: InfrastructureCategory) -> FeatureCollection {
        FeatureCollection::from(self.lock().layers.layer(category))
    }

    /// Returns `None` when the id is not part of the current layer set.
    pub fn on_feature_click(&self, feature_id: &FeatureId) -> Option<Transition> {
        let mut state = self.lock();
        let Some(layer_key) = state.layers.locate(feature_id) else {
            tracing::warn!(feature_id = %feature_id, "Click on unknown feature ignored");
            return None;
        };
        let transition = state.selection.click(feature_id.clone(), layer_key);
        tracing::debug!(feature_id = %feature_id, state = ?transition.state, "Feature click");
        Some(transition)
    }

    pub fn on_map_background_click(&self) -> Transition {
        self.lock().selection.click_background()
    }

    pub fn reset_selection(&self) -> Transition {
        self.lock().selection.reset()
    }

    pub fn selection(&self) -> SelectionState {
        self.lock().selection.state().clone()
    }

    /// Style of one feature. With a `focus` site, features farther than the
    /// default threshold are dimmed.
    pub fn selection_style(&self, feature_id: &FeatureId, focus: Option<&Site>) -> Option<StyleDescriptor> {
        let state = self.lock();
        let feature = state.layers.feature(feature_id)?;
        let color = &state.layers.layer(feature.category).color;
        let related = match focus {
            Some(site) => {
                point_to_line_m([site.lng, site.lat], &feature.geometry) <= self.settings.proximity_meters
            }
            None => true,
        };
        Some(StyleDescriptor::resolve(
            state.selection.style_for(feature_id),
            color,
            related,
        ))
    }

    pub fn nearby(
        &self,
        site: Option<&Site>,
        threshold_m: Option<f64>,
    ) -> BTreeMap<InfrastructureCategory, Vec<LineFeature>> {
        let layers = self.layers();
        proximity::nearby(site, &layers, threshold_m.unwrap_or(self.settings.proximity_meters))
    }

    /// Flip a layer's visibility. Selection is left alone.
    pub fn toggle_layer(&self, category: InfrastructureCategory) -> bool {
        let enabled = self.lock().layers.toggle(category);
        tracing::debug!(%category, enabled, "Toggled layer");
        enabled
    }

    pub fn status(&self) -> IngestionStatus {
        self.lock().status.clone()
    }

    // Ingestion

    /// Supersede any in-flight ingestion and mark a new one as loading.
    pub fn begin_ingestion(&self) -> Ticket {
        // Hold the state lock so status writes follow generation order.
        let mut state = self.lock();
        let ticket = self.ingestion.begin();
        if self.ingestion.is_current(&ticket) {
            state.status = IngestionStatus::Loading { generation: ticket.generation() };
        }
        ticket
    }

    pub async fn refresh(&self) -> Result<IngestReport, IngestError> {
        let ticket = self.begin_ingestion();
        self.ingest(ticket).await
    }

    /// Start a refresh in the background and return its generation.
    pub fn spawn_refresh(self: &Arc<Self>) -> u64 {
        let ticket = self.begin_ingestion();
        let generation = ticket.generation();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            // Outcome is recorded in the status
            let _ = engine.ingest(ticket).await;
        });
        generation
    }

    /// Point the engine at another administrative area and reload.
    pub async fn change_area(&self, name: &str, admin_level: u8) -> Result<IngestReport, IngestError> {
        self.switch_area(name, admin_level);
        self.refresh().await
    }

    pub fn spawn_change_area(self: &Arc<Self>, name: &str, admin_level: u8) -> u64 {
        self.switch_area(name, admin_level);
        self.spawn_refresh()
    }

    fn switch_area(&self, name: &str, admin_level: u8) {
        let mut state = self.lock();
        state.area_name = name.to_string();
        state.admin_level = admin_level;
        state.resolved = None;
        state.selection.reset();
        tracing::info!(area = name, admin_level, "Area changed");
    }

    /// Abandon in-flight ingestion; later ones are ignored as well.
    pub fn shutdown(&self) {
        self.ingestion.shutdown();
    }

    async fn ingest(&self, ticket: Ticket) -> Result<IngestReport, IngestError> {
        let generation = ticket.generation();
        let (name, admin_level, cached) = {
            let state = self.lock();
            let cached = state
                .resolved
                .as_ref()
                .filter(|r| r.name == state.area_name && r.admin_level == state.admin_level)
                .map(|r| r.handle);
            (state.area_name.clone(), state.admin_level, cached)
        };
        tracing::info!(generation, area = %name, admin_level, "Starting ingestion");

        let fetched = match self.ingestion.run(&ticket, self.fetch(&name, admin_level, cached)).await {
            Ok(fetched) => fetched,
            Err(superseded) => {
                tracing::debug!(generation = superseded.generation, "Discarding stale ingestion");
                return Err(IngestError::StaleResponse);
            }
        };

        let mut state = self.lock();
        if !self.ingestion.is_current(&ticket) {
            tracing::debug!(generation, latest = self.ingestion.latest(), "Discarding stale ingestion");
            return Err(IngestError::StaleResponse);
        }
        let finished_at = chrono::Utc::now().to_rfc3339();

        let (area, elements) = match fetched {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!(generation, error = %err, "Ingestion failed, keeping existing layers");
                state.status = IngestionStatus::Failed {
                    generation,
                    message: failure_message(&err),
                    finished_at,
                };
                return Err(err.into());
            }
        };

        let batch = classify_batch(&elements);
        for rejected in &batch.rejected {
            tracing::warn!(error = %rejected, "Skipping invalid element");
        }
        for id in &batch.duplicates {
            tracing::warn!(feature_id = %id, "Skipping duplicate element id");
        }

        // A full fetch is authoritative for every requested category.
        let summary = state.layers.ingest_replacing(batch.features, &self.settings.categories);
        state.selection.reset();
        state.resolved = Some(ResolvedArea { name, admin_level, handle: area });
        state.status = IngestionStatus::Ready {
            generation,
            features: summary.total(),
            rejected: batch.rejected.len(),
            finished_at,
        };
        tracing::info!(
            generation,
            features = summary.total(),
            rejected = batch.rejected.len(),
            "Ingestion complete"
        );

        Ok(IngestReport {
            generation,
            area,
            replaced: summary.replaced,
            rejected: batch.rejected.len(),
        })
    }

    async fn fetch(
        &self,
        name: &str,
        admin_level: u8,
        cached: Option<AreaHandle>,
    ) -> Result<(AreaHandle, Vec<RawGeometryElement>), QueryError> {
        let area = match cached {
            Some(handle) => handle,
            None => {
                self.with_retries("area lookup", || self.client.resolve_area(name, admin_level))
                    .await?
            }
        };
        let elements = self
            .with_retries("geometry fetch", || {
                self.client.fetch_elements(area, &self.settings.categories)
            })
            .await?;
        Ok((area, elements))
    }

    async fn with_retries<T, F, Fut>(&self, step: &str, mut op: F) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QueryError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.settings.upstream_retries => {
                    attempt += 1;
                    tracing::warn!(step, attempt, error = %err, "Upstream query failed, retrying");
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
