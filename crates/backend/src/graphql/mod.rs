use std::collections::BTreeMap;
use std::sync::Arc;

use async_graphql::{Context, Enum, InputObject, Json, Object, SimpleObject};
use enodia_shared::geojson::FeatureCollection;
use enodia_shared::models::{FeatureId, InfrastructureCategory, InfrastructureLayer, Site};
use enodia_shared::selection::{SelectionState, StyleDescriptor, Transition};

use crate::engine::{Engine, IngestionStatus};

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
pub enum GqlCategory {
    Electricity,
    Water,
    Road,
    Rail,
    Other,
}

impl From<InfrastructureCategory> for GqlCategory {
    fn from(c: InfrastructureCategory) -> Self {
        match c {
            InfrastructureCategory::Electricity => GqlCategory::Electricity,
            InfrastructureCategory::Water => GqlCategory::Water,
            InfrastructureCategory::Road => GqlCategory::Road,
            InfrastructureCategory::Rail => GqlCategory::Rail,
            InfrastructureCategory::Other => GqlCategory::Other,
        }
    }
}

impl From<GqlCategory> for InfrastructureCategory {
    fn from(c: GqlCategory) -> Self {
        match c {
            GqlCategory::Electricity => InfrastructureCategory::Electricity,
            GqlCategory::Water => InfrastructureCategory::Water,
            GqlCategory::Road => InfrastructureCategory::Road,
            GqlCategory::Rail => InfrastructureCategory::Rail,
            GqlCategory::Other => InfrastructureCategory::Other,
        }
    }
}

// GraphQL output types

#[derive(SimpleObject)]
pub struct GqlLayer {
    pub key: GqlCategory,
    pub display_name: String,
    pub color: String,
    pub enabled: bool,
    pub feature_count: u64,
    pub metadata: Json<BTreeMap<String, String>>,
}

impl From<&InfrastructureLayer> for GqlLayer {
    fn from(l: &InfrastructureLayer) -> Self {
        GqlLayer {
            key: l.key.into(),
            display_name: l.display_name.clone(),
            color: l.color.clone(),
            enabled: l.enabled,
            feature_count: l.features.len() as u64,
            metadata: Json(l.metadata.clone()),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlSelection {
    pub feature_id: Option<String>,
    pub layer_key: Option<GqlCategory>,
}

impl From<&SelectionState> for GqlSelection {
    fn from(s: &SelectionState) -> Self {
        GqlSelection {
            feature_id: s.selected_feature_id().map(|id| id.to_string()),
            layer_key: s.selected_layer_key().map(GqlCategory::from),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlTransition {
    pub selection: GqlSelection,
    /// Features whose style changed and must be redrawn.
    pub restyle: Vec<String>,
}

impl From<Transition> for GqlTransition {
    fn from(t: Transition) -> Self {
        GqlTransition {
            selection: GqlSelection::from(&t.state),
            restyle: t.restyle.into_iter().map(|id| id.0).collect(),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlStyle {
    pub emphasized: bool,
    pub color: String,
    pub weight: u32,
    pub opacity: f64,
}

impl From<StyleDescriptor> for GqlStyle {
    fn from(s: StyleDescriptor) -> Self {
        GqlStyle {
            emphasized: s.emphasized,
            color: s.color,
            weight: s.weight,
            opacity: s.opacity,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlNearbyGroup {
    pub category: GqlCategory,
    pub feature_ids: Vec<String>,
    pub geojson: Json<FeatureCollection>,
}

#[derive(SimpleObject, Default)]
pub struct GqlIngestionStatus {
    pub state: String,
    pub generation: Option<u64>,
    pub features: Option<u64>,
    pub rejected: Option<u64>,
    pub message: Option<String>,
    pub finished_at: Option<String>,
}

impl From<IngestionStatus> for GqlIngestionStatus {
    fn from(s: IngestionStatus) -> Self {
        match s {
            IngestionStatus::Idle => GqlIngestionStatus {
                state: "idle".to_string(),
                ..Default::default()
            },
            IngestionStatus::Loading { generation } => GqlIngestionStatus {
                state: "loading".to_string(),
                generation: Some(generation),
                ..Default::default()
            },
            IngestionStatus::Ready { generation, features, rejected, finished_at } => {
                GqlIngestionStatus {
                    state: "ready".to_string(),
                    generation: Some(generation),
                    features: Some(features as u64),
                    rejected: Some(rejected as u64),
                    finished_at: Some(finished_at),
                    ..Default::default()
                }
            }
            IngestionStatus::Failed { generation, message, finished_at } => GqlIngestionStatus {
                state: "failed".to_string(),
                generation: Some(generation),
                message: Some(message),
                finished_at: Some(finished_at),
                ..Default::default()
            },
        }
    }
}

// Input types

#[derive(InputObject)]
pub struct SiteInput {
    pub id: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub name: Option<String>,
}

impl From<SiteInput> for Site {
    fn from(s: SiteInput) -> Self {
        Site {
            id: s.id.unwrap_or_default(),
            lat: s.lat,
            lng: s.lng,
            name: s.name.unwrap_or_default(),
        }
    }
}

fn engine<'a>(ctx: &Context<'a>) -> &'a Arc<Engine> {
    ctx.data_unchecked::<Arc<Engine>>()
}

// Query root

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn layers(&self, ctx: &Context<'_>) -> Vec<GqlLayer> {
        engine(ctx).layers().iter().map(GqlLayer::from).collect()
    }

    async fn layer_geojson(&self, ctx: &Context<'_>, category: GqlCategory) -> Json<FeatureCollection> {
        Json(engine(ctx).layer_geojson(category.into()))
    }

    async fn selection(&self, ctx: &Context<'_>) -> GqlSelection {
        GqlSelection::from(&engine(ctx).selection())
    }

    /// Style for one feature; `focus` dims features away from that site.
    async fn selection_style(
        &self,
        ctx: &Context<'_>,
        feature_id: String,
        focus: Option<SiteInput>,
    ) -> Option<GqlStyle> {
        let focus = focus.map(Site::from);
        engine(ctx)
            .selection_style(&FeatureId(feature_id), focus.as_ref())
            .map(GqlStyle::from)
    }

    async fn nearby(
        &self,
        ctx: &Context<'_>,
        site: Option<SiteInput>,
        threshold_meters: Option<f64>,
    ) -> Vec<GqlNearbyGroup> {
        let site = site.map(Site::from);
        engine(ctx)
            .nearby(site.as_ref(), threshold_meters)
            .into_iter()
            .map(|(category, features)| GqlNearbyGroup {
                category: category.into(),
                feature_ids: features.iter().map(|f| f.id.to_string()).collect(),
                geojson: Json(FeatureCollection::from_features(&features)),
            })
            .collect()
    }

    async fn ingestion_status(&self, ctx: &Context<'_>) -> GqlIngestionStatus {
        engine(ctx).status().into()
    }
}

// Mutation root

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Null when the feature is not loaded.
    async fn feature_click(&self, ctx: &Context<'_>, feature_id: String) -> Option<GqlTransition> {
        engine(ctx)
            .on_feature_click(&FeatureId(feature_id))
            .map(GqlTransition::from)
    }

    async fn background_click(&self, ctx: &Context<'_>) -> GqlTransition {
        engine(ctx).on_map_background_click().into()
    }

    async fn reset_selection(&self, ctx: &Context<'_>) -> GqlTransition {
        engine(ctx).reset_selection().into()
    }

    async fn toggle_layer(&self, ctx: &Context<'_>, category: GqlCategory) -> bool {
        engine(ctx).toggle_layer(category.into())
    }

    /// Start reloading the current area and return the ingestion generation.
    async fn refresh(&self, ctx: &Context<'_>) -> u64 {
        engine(ctx).spawn_refresh()
    }

    async fn change_area(
        &self,
        ctx: &Context<'_>,
        name: String,
        admin_level: u8,
    ) -> async_graphql::Result<u64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(async_graphql::Error::new("Area name must not be empty"));
        }
        Ok(engine(ctx).spawn_change_area(name, admin_level))
    }
}

pub type Schema = async_graphql::Schema<QueryRoot, MutationRoot, async_graphql::EmptySubscription>;

pub fn build_schema(engine: Arc<Engine>) -> Schema {
    async_graphql::Schema::build(QueryRoot, MutationRoot, async_graphql::EmptySubscription)
        .data(engine)
        .finish()
}
