pub mod axes;

use serde::{Deserialize, Serialize};

use crate::core::{FeatureSet, Transaction};
use axes::Axis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisScore {
    pub axis: String,
    pub value: f64,
}

/// Five-dimensional display vector for one anomaly, in axis order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub scores: Vec<AxisScore>,
}

impl FeatureVector {
    pub fn get(&self, axis: &str) -> Option<f64> {
        self.scores.iter().find(|s| s.axis == axis).map(|s| s.value)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Projects a transaction's raw features onto the display axes.
pub struct FeatureProjector {
    axes: Vec<Box<dyn Axis + Send + Sync>>,
}

impl Default for FeatureProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureProjector {
    pub fn new() -> Self {
        Self {
            axes: axes::default_axes(),
        }
    }

    pub fn project(&self, features: &FeatureSet) -> FeatureVector {
        FeatureVector {
            scores: self
                .axes
                .iter()
                .map(|axis| AxisScore {
                    axis: axis.name().to_string(),
                    value: axis.evaluate(features),
                })
                .collect(),
        }
    }

    /// Nothing selected yields no projection.
    pub fn project_selection(&self, selected: Option<&Transaction>) -> Option<FeatureVector> {
        selected.map(|tx| self.project(&tx.features))
    }
}
