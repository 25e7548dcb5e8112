// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-memory tactical board and the action executor that drives it.
//!
//! The board holds named layers of tactical elements. Two actions operate on it:
//!
//! * `mark_location` places a marker on a layer.
//! * `update_situation` correlates every element into a situation payload and
//!   publishes it on the situation channel, where a
//!   [`SituationFeed`](crate::engine::SituationFeed) hands it back to the engine.
//!
//! The action set is closed: any other action name is reported as unknown.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::engine::SituationSender;
use crate::errors::ActionError;
use crate::observability::messages::tactical::{ElementMarked, SituationPublished};
use crate::observability::messages::StructuredLog;
use crate::protocol::{now_millis, Context, Parameters, Value, ACTIVE_STEPS_KEY};
use crate::traits::ActionExecutor;

pub const OPERATIONS_LAYER: &str = "operations";
pub const INTEL_LAYER: &str = "intel";
pub const ASSETS_LAYER: &str = "assets";

/// Kilometres per degree of latitude.
const KM_PER_DEGREE: f64 = 111.32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Unit,
    Asset,
    Incident,
    Marker,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Unit => "unit",
            ElementKind::Asset => "asset",
            ElementKind::Incident => "incident",
            ElementKind::Marker => "marker",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TacticalElement {
    pub id: String,
    pub kind: ElementKind,
    /// `[lat, lon]`
    pub position: [f64; 2],
    pub metadata: BTreeMap<String, Value>,
}

impl TacticalElement {
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), Value::from(self.id.as_str()));
        map.insert("kind".to_string(), Value::from(self.kind.as_str()));
        map.insert("position".to_string(), coordinates(self.position));
        map.insert("metadata".to_string(), Value::Map(self.metadata.clone()));
        Value::Map(map)
    }
}

#[derive(Debug, Clone)]
pub struct TacticalLayer {
    pub id: String,
    pub name: String,
    pub visible: bool,
    elements: Vec<TacticalElement>,
}

impl TacticalLayer {
    pub fn elements(&self) -> &[TacticalElement] {
        &self.elements
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BoardError {
    #[error("Layer '{0}' not found")]
    LayerNotFound(String),
}

/// Layers of tactical elements, safe to share between concurrently running steps.
#[derive(Debug, Default)]
pub struct TacticalBoard {
    layers: Mutex<BTreeMap<String, TacticalLayer>>,
    sequence: AtomicU64,
}

impl TacticalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board with the `operations`, `intel` and `assets` layers.
    pub fn with_default_layers() -> Self {
        let board = Self::new();
        board.create_layer(OPERATIONS_LAYER, "Operations");
        board.create_layer(INTEL_LAYER, "Intelligence");
        board.create_layer(ASSETS_LAYER, "Assets");
        board
    }

    /// Create a layer, or rename it if it already exists. Existing elements are kept.
    pub fn create_layer(&self, id: &str, name: &str) {
        let mut layers = self.layers.lock().unwrap_or_else(PoisonError::into_inner);
        layers
            .entry(id.to_string())
            .and_modify(|layer| layer.name = name.to_string())
            .or_insert_with(|| TacticalLayer {
                id: id.to_string(),
                name: name.to_string(),
                visible: true,
                elements: Vec::new(),
            });
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Add an element and return its generated id. A `timestamp` is stamped into the metadata.
    pub fn add_element(
        &self,
        layer_id: &str,
        kind: ElementKind,
        position: [f64; 2],
        mut metadata: BTreeMap<String, Value>,
    ) -> Result<String, BoardError> {
        let mut layers = self.layers.lock().unwrap_or_else(PoisonError::into_inner);
        let layer = layers
            .get_mut(layer_id)
            .ok_or_else(|| BoardError::LayerNotFound(layer_id.to_string()))?;

        let timestamp = now_millis();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("tac-{}-{}", timestamp as u64, sequence);
        metadata.insert("timestamp".to_string(), Value::from(timestamp));

        layer.elements.push(TacticalElement {
            id: id.clone(),
            kind,
            position,
            metadata,
        });
        Ok(id)
    }

    pub fn layer(&self, layer_id: &str) -> Option<TacticalLayer> {
        self.layers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(layer_id)
            .cloned()
    }

    /// Elements of one layer in insertion order; empty for an unknown layer.
    pub fn elements(&self, layer_id: &str) -> Vec<TacticalElement> {
        self.layers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(layer_id)
            .map(|layer| layer.elements.clone())
            .unwrap_or_default()
    }

    /// Every element on the board, layer by layer.
    pub fn all_elements(&self) -> Vec<TacticalElement> {
        self.layers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flat_map(|layer| layer.elements.iter().cloned())
            .collect()
    }
}

/// `[min_lon, min_lat, max_lon, max_lat]` of a square around `center` (`[lat, lon]`).
pub fn bounding_box(center: [f64; 2], radius_km: f64) -> [f64; 4] {
    let [lat, lon] = center;
    let lat_radius = radius_km / KM_PER_DEGREE;
    let lon_radius = radius_km / (KM_PER_DEGREE * lat.to_radians().cos());
    [
        lon - lon_radius,
        lat - lat_radius,
        lon + lon_radius,
        lat + lat_radius,
    ]
}

fn coordinates(position: [f64; 2]) -> Value {
    position.iter().copied().collect()
}

/// The actions understood by [`TacticalActionExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TacticalAction {
    MarkLocation,
    UpdateSituation,
}

impl TacticalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TacticalAction::MarkLocation => "mark_location",
            TacticalAction::UpdateSituation => "update_situation",
        }
    }
}

impl FromStr for TacticalAction {
    type Err = ActionError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "mark_location" => Ok(TacticalAction::MarkLocation),
            "update_situation" => Ok(TacticalAction::UpdateSituation),
            other => Err(ActionError::ActionNotFound(other.to_string())),
        }
    }
}

pub struct TacticalActionExecutor {
    board: Arc<TacticalBoard>,
    situation: Option<SituationSender>,
}

impl TacticalActionExecutor {
    pub fn new(board: Arc<TacticalBoard>) -> Self {
        Self {
            board,
            situation: None,
        }
    }

    /// Publish `update_situation` payloads on `sender`.
    pub fn with_situation_channel(mut self, sender: SituationSender) -> Self {
        self.situation = Some(sender);
        self
    }

    pub fn board(&self) -> &TacticalBoard {
        &self.board
    }

    fn mark_location(&self, parameters: &Parameters) -> Result<(), ActionError> {
        let position = required_coordinates(parameters, "position", TacticalAction::MarkLocation)?;
        let layer_id = parameters
            .get("layer")
            .and_then(Value::as_str)
            .unwrap_or(OPERATIONS_LAYER);
        let metadata = parameters
            .get("metadata")
            .and_then(Value::as_map)
            .cloned()
            .unwrap_or_default();

        let element_id = self
            .board
            .add_element(layer_id, ElementKind::Marker, position, metadata)
            .map_err(|e| ActionError::execution(e.to_string()))?;

        ElementMarked {
            layer_id,
            element_id: &element_id,
            position,
        }
        .log();
        Ok(())
    }

    /// Builds on the invoking context so protocol conditions keep seeing the
    /// `environmental` and `tactical` values they were activated with.
    fn update_situation(
        &self,
        parameters: &Parameters,
        context: &Context,
    ) -> Result<(), ActionError> {
        let center = required_coordinates(parameters, "center", TacticalAction::UpdateSituation)?;
        let radius = parameters
            .get("radius")
            .and_then(Value::as_f64)
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| {
                ActionError::execution("update_situation requires a positive 'radius' in km")
            })?;

        let elements = self.board.all_elements();
        let element_count = elements.len();

        let mut payload = Context::new();
        for (key, value) in context.iter().filter(|(k, _)| k.as_str() != ACTIVE_STEPS_KEY) {
            payload.insert(key.clone(), value.clone());
        }
        payload.insert("timestamp", now_millis());
        payload.insert("center", coordinates(center));
        payload.insert("radius", radius);
        payload.insert(
            "bounding_box",
            bounding_box(center, radius).iter().copied().collect::<Value>(),
        );
        payload.insert(
            "tactical_elements",
            elements.iter().map(TacticalElement::to_value).collect::<Value>(),
        );

        let delivered = match &self.situation {
            Some(sender) => sender.send(payload).is_ok(),
            None => false,
        };

        SituationPublished {
            center,
            radius_km: radius,
            element_count,
            delivered,
        }
        .log();
        Ok(())
    }
}

fn required_coordinates(
    parameters: &Parameters,
    key: &str,
    action: TacticalAction,
) -> Result<[f64; 2], ActionError> {
    parameters
        .get(key)
        .and_then(Value::as_coordinates)
        .ok_or_else(|| {
            ActionError::execution(format!(
                "{} requires '{}' as [lat, lon]",
                action.as_str(),
                key
            ))
        })
}

#[async_trait]
impl ActionExecutor for TacticalActionExecutor {
    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        context: &Context,
    ) -> Result<(), ActionError> {
        match action.parse::<TacticalAction>()? {
            TacticalAction::MarkLocation => self.mark_location(parameters),
            TacticalAction::UpdateSituation => self.update_situation(parameters, context),
        }
    }

    fn name(&self) -> &'static str {
        "tactical"
    }
}
