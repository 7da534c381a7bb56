//! Classifier capability
//!
//! The pipeline never knows where a model lives or how it was trained. It is
//! handed something implementing [`BehaviorClassifier`] and calls it with a
//! complete, ordered [`FeatureVector`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::error::ComputeError;
use crate::types::{FeatureVector, Label, FEATURE_COUNT, FEATURE_NAMES};

/// Model type tag accepted by [`CentroidClassifier`]
pub const CENTROID_MODEL_TYPE: &str = "nearest_centroid";

/// Errors raised by a classifier
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Non-finite input: {0}")]
    NonFiniteInput(String),
}

/// Pretrained driving-behavior classifier
pub trait BehaviorClassifier: Send + Sync {
    /// Classify one complete feature vector
    fn classify(&self, features: &FeatureVector) -> Result<Label, ClassifierError>;

    /// Human-readable name for logs and diagnostics
    fn name(&self) -> &str {
        "classifier"
    }
}

impl<F> BehaviorClassifier for F
where
    F: Fn(&FeatureVector) -> Result<Label, ClassifierError> + Send + Sync,
{
    fn classify(&self, features: &FeatureVector) -> Result<Label, ClassifierError> {
        self(features)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// One class of a nearest-centroid model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidClass {
    pub label: String,
    pub centroid: Vec<f64>,
}

/// Serialized nearest-centroid model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModel {
    pub model_type: String,
    pub feature_names: Vec<String>,
    /// Per-feature divisor applied before distances are taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec<f64>>,
    pub classes: Vec<CentroidClass>,
}

/// Nearest-centroid classifier over the nine driving features.
///
/// Ties go to the class declared first.
#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    scale: [f64; FEATURE_COUNT],
    classes: Vec<(Label, [f64; FEATURE_COUNT])>,
}

impl CentroidClassifier {
    pub fn from_model(model: CentroidModel) -> Result<Self, ClassifierError> {
        if model.model_type != CENTROID_MODEL_TYPE {
            return Err(ClassifierError::InvalidModel(format!(
                "unsupported model_type '{}', expected '{}'",
                model.model_type, CENTROID_MODEL_TYPE
            )));
        }

        // The model must be fitted on exactly our column order
        let names: Vec<&str> = model.feature_names.iter().map(String::as_str).collect();
        if names != FEATURE_NAMES {
            return Err(ClassifierError::InvalidModel(format!(
                "feature_names {:?} do not match {:?}",
                names, FEATURE_NAMES
            )));
        }

        if model.classes.is_empty() {
            return Err(ClassifierError::InvalidModel(
                "model declares no classes".to_string(),
            ));
        }

        let scale = match model.scale {
            Some(values) => {
                let scale = to_fixed(&values, "scale")?;
                if scale.iter().any(|s| *s <= 0.0) {
                    return Err(ClassifierError::InvalidModel(
                        "scale entries must be positive".to_string(),
                    ));
                }
                scale
            }
            None => [1.0; FEATURE_COUNT],
        };

        let mut classes = Vec::with_capacity(model.classes.len());
        for class in model.classes {
            let centroid = to_fixed(&class.centroid, &format!("centroid of '{}'", class.label))?;
            classes.push((Label::new(class.label), centroid));
        }

        Ok(Self { scale, classes })
    }

    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let model: CentroidModel = serde_json::from_str(json)
            .map_err(|e| ComputeError::ModelError(format!("cannot parse model: {}", e)))?;
        Ok(Self::from_model(model)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let json = fs::read_to_string(path).map_err(|e| {
            ComputeError::ModelError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> + '_ {
        self.classes.iter().map(|(label, _)| label)
    }

    fn distance(&self, features: &[f64; FEATURE_COUNT], centroid: &[f64; FEATURE_COUNT]) -> f64 {
        features
            .iter()
            .zip(centroid)
            .zip(&self.scale)
            .map(|((f, c), s)| {
                let d = (f - c) / s;
                d * d
            })
            .sum()
    }
}

impl BehaviorClassifier for CentroidClassifier {
    fn classify(&self, features: &FeatureVector) -> Result<Label, ClassifierError> {
        let values = features.as_array();
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(ClassifierError::NonFiniteInput(FEATURE_NAMES[idx].to_string()));
        }

        let mut best: Option<(&Label, f64)> = None;
        for (label, centroid) in &self.classes {
            let d = self.distance(values, centroid);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((label, d)),
            }
        }

        best.map(|(label, _)| label.clone())
            .ok_or_else(|| ClassifierError::Inference("model has no classes".to_string()))
    }

    fn name(&self) -> &str {
        CENTROID_MODEL_TYPE
    }
}

fn to_fixed(values: &[f64], what: &str) -> Result<[f64; FEATURE_COUNT], ClassifierError> {
    if values.len() != FEATURE_COUNT {
        return Err(ClassifierError::InvalidModel(format!(
            "{} has {} entries, expected {}",
            what,
            values.len(),
            FEATURE_COUNT
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ClassifierError::InvalidModel(format!(
            "{} contains non-finite values",
            what
        )));
    }
    let mut out = [0.0; FEATURE_COUNT];
    out.copy_from_slice(values);
    Ok(out)
}
