// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the tactical action backend.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Element placed on a tactical layer.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ElementMarked<'a> {
    pub layer_id: &'a str,
    pub element_id: &'a str,
    pub position: [f64; 2],
}

impl Display for ElementMarked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Marked element '{}' on layer '{}' at [{:.5}, {:.5}]",
            self.element_id, self.layer_id, self.position[0], self.position[1]
        )
    }
}

impl StructuredLog for ElementMarked<'_> {
    fn log(&self) {
        tracing::info!(
            layer_id = self.layer_id,
            element_id = self.element_id,
            lat = self.position[0],
            lon = self.position[1],
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "element_marked",
            span_name = name,
            layer_id = self.layer_id,
            element_id = self.element_id,
        )
    }
}

/// Situation picture correlated and published to the situation channel.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SituationPublished {
    pub center: [f64; 2],
    pub radius_km: f64,
    pub element_count: usize,
    pub delivered: bool,
}

impl Display for SituationPublished {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Situation update around [{:.5}, {:.5}] r={}km with {} elements{}",
            self.center[0],
            self.center[1],
            self.radius_km,
            self.element_count,
            if self.delivered { "" } else { " (no listener)" }
        )
    }
}

impl StructuredLog for SituationPublished {
    fn log(&self) {
        tracing::info!(
            lat = self.center[0],
            lon = self.center[1],
            radius_km = self.radius_km,
            element_count = self.element_count,
            delivered = self.delivered,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "situation_published",
            span_name = name,
            element_count = self.element_count,
        )
    }
}
