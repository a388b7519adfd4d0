//! Gesture commands and the override modes they trigger.
//!
//! Commands arrive from the gesture recognizer collaborator; the core copies
//! only the first command of a tick, so at most one override mode is active
//! per tick.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Axis-aligned bounding box reported by the recognizer, in simulation
/// coordinates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Construct a new box.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Half of the box width; the converge mode's orbit radius.
    #[must_use]
    pub fn half_width(&self) -> f32 {
        self.width * 0.5
    }

    /// A box is usable when all fields are finite and both dimensions are
    /// positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// One recognized gesture, as delivered by the recognizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GestureCommand {
    pub name: String,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

impl GestureCommand {
    /// Construct a new command.
    #[must_use]
    pub fn new(name: impl Into<String>, bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            name: name.into(),
            bounding_box,
            confidence,
        }
    }
}

/// Behavior replacing the ambient state machine for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverrideMode {
    /// Pull the whole swarm toward a point ("palm").
    Converge(BoundingBox),
    /// Follow a path drawn across ticks ("peace").
    Trace(BoundingBox),
}

/// Resolve the override mode for this tick from the command list.
///
/// Only the first command is honored. Low-confidence and unrecognized
/// commands leave ambient behavior in place; a malformed bounding box skips
/// the override for the tick.
#[must_use]
pub fn resolve_override(commands: &[GestureCommand], min_confidence: f32) -> Option<OverrideMode> {
    let command = commands.first()?;
    if command.confidence < min_confidence {
        debug!(
            name = command.name.as_str(),
            confidence = command.confidence,
            "ignoring low-confidence gesture"
        );
        return None;
    }
    let mode = match command.name.as_str() {
        "palm" => OverrideMode::Converge(command.bounding_box),
        "peace" => OverrideMode::Trace(command.bounding_box),
        _ => return None,
    };
    if !command.bounding_box.is_valid() {
        warn!(
            name = command.name.as_str(),
            bounding_box = ?command.bounding_box,
            "skipping gesture with malformed bounding box"
        );
        return None;
    }
    Some(mode)
}
