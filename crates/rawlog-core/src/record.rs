//! Log records: either an action bundle followed by a sensory frame, or a
//! standalone observation.

use serde::{Deserialize, Serialize};

use crate::Observation;

/// Set of observations gathered at one step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensoryFrame {
    pub observations: Vec<Observation>,
}

/// One entry of a sensor log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRecord {
    /// Odometry/actions bundle and the frame sensed after it. Actions are
    /// opaque to this workspace.
    Frame {
        actions: Vec<serde_json::Value>,
        frame: SensoryFrame,
    },
    Observation(Observation),
}

impl LogRecord {
    /// All observations in the record, in stored order.
    pub fn observations(&self) -> &[Observation] {
        match self {
            LogRecord::Frame { frame, .. } => &frame.observations,
            LogRecord::Observation(obs) => std::slice::from_ref(obs),
        }
    }

    pub fn observations_mut(&mut self) -> std::slice::IterMut<'_, Observation> {
        match self {
            LogRecord::Frame { frame, .. } => frame.observations.iter_mut(),
            LogRecord::Observation(obs) => std::slice::from_mut(obs).iter_mut(),
        }
    }
}
