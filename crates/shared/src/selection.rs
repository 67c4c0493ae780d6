use serde::{Deserialize, Serialize};

use crate::models::{FeatureId, InfrastructureCategory};

/// Color applied to the selected feature.
pub const SELECTED_COLOR: &str = "#d9a3ff";
pub const SELECTED_WEIGHT: u32 = 6;
/// Base line style of an unselected feature.
pub const NORMAL_WEIGHT: u32 = 4;
pub const NORMAL_OPACITY: f64 = 0.8;
/// Opacity of features outside the focused proximity set.
pub const DIMMED_OPACITY: f64 = 0.2;

/// At most one feature is selected system-wide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SelectionState {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Selected {
        feature_id: FeatureId,
        layer_key: InfrastructureCategory,
    },
}

impl SelectionState {
    pub fn selected_feature_id(&self) -> Option<&FeatureId> {
        match self {
            SelectionState::Idle => None,
            SelectionState::Selected { feature_id, .. } => Some(feature_id),
        }
    }

    pub fn selected_layer_key(&self) -> Option<InfrastructureCategory> {
        match self {
            SelectionState::Idle => None,
            SelectionState::Selected { layer_key, .. } => Some(*layer_key),
        }
    }
}

/// The only inputs that can move the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerEvent {
    FeatureClick {
        feature_id: FeatureId,
        layer_key: InfrastructureCategory,
    },
    BackgroundClick,
    /// Selection cleared from outside the map, e.g. a site search.
    Reset,
}

/// Outcome of one event: the new state and the features whose style changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SelectionState,
    pub restyle: Vec<FeatureId>,
}

/// Pure highlight decision for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureStyle {
    pub emphasized: bool,
}

/// Full presentation for the rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDescriptor {
    pub emphasized: bool,
    pub color: String,
    pub weight: u32,
    pub opacity: f64,
}

impl StyleDescriptor {
    /// Expand a [`FeatureStyle`] with the layer color. `related` is `false`
    /// only when a proximity focus is active and the feature falls outside it.
    pub fn resolve(style: FeatureStyle, layer_color: &str, related: bool) -> Self {
        if style.emphasized {
            return StyleDescriptor {
                emphasized: true,
                color: SELECTED_COLOR.to_string(),
                weight: SELECTED_WEIGHT,
                opacity: 1.0,
            };
        }
        StyleDescriptor {
            emphasized: false,
            color: layer_color.to_string(),
            weight: NORMAL_WEIGHT,
            opacity: if related { NORMAL_OPACITY } else { DIMMED_OPACITY },
        }
    }
}

#[derive(Debug, Default)]
pub struct SelectionMachine {
    state: SelectionState,
}

impl SelectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn handle(&mut self, event: PointerEvent) -> Transition {
        let previous = std::mem::take(&mut self.state);
        let next = match (&previous, event) {
            (
                SelectionState::Selected { feature_id: current, .. },
                PointerEvent::FeatureClick { feature_id, .. },
            ) if *current == feature_id => SelectionState::Idle,
            (_, PointerEvent::FeatureClick { feature_id, layer_key }) => {
                SelectionState::Selected { feature_id, layer_key }
            }
            (_, PointerEvent::BackgroundClick | PointerEvent::Reset) => SelectionState::Idle,
        };

        let mut restyle = Vec::new();
        if let Some(id) = previous.selected_feature_id() {
            restyle.push(id.clone());
        }
        if let Some(id) = next.selected_feature_id() {
            if !restyle.contains(id) {
                restyle.push(id.clone());
            }
        }

        self.state = next;
        Transition { state: self.state.clone(), restyle }
    }

    pub fn click(&mut self, feature_id: FeatureId, layer_key: InfrastructureCategory) -> Transition {
        self.handle(PointerEvent::FeatureClick { feature_id, layer_key })
    }

    pub fn click_background(&mut self) -> Transition {
        self.handle(PointerEvent::BackgroundClick)
    }

    pub fn reset(&mut self) -> Transition {
        self.handle(PointerEvent::Reset)
    }

    pub fn style_for(&self, feature_id: &FeatureId) -> FeatureStyle {
        FeatureStyle {
            emphasized: self.state.selected_feature_id() == Some(feature_id),
        }
    }
}
