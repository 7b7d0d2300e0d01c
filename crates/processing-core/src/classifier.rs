//! Tremor classification and severity grading.
//!
//! The classifier is an opaque, pre-trained model behind the
//! [`TremorClassifier`] trait. The production implementation evaluates a
//! random forest exported to JSON:
//!
//! ```json
//! {
//!   "model_version": "2025.03-rf300",
//!   "feature_set": "wrist-motion-v1",
//!   "n_features": 16,
//!   "classes": ["Normal", "Parkinsonien", "Tremor_Essentiel", "Hyperkinetique",
//!               "Hypokinetique", "Ataxie", "Physiologique"],
//!   "feature_importances": [0.04, 0.11, ...],
//!   "train_accuracy": 0.97,
//!   "test_accuracy": 0.91,
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 11, "threshold": 0.0012, "left": 1, "right": 2 },
//!         { "value": [12.0, 0.0, 3.0, 0.0, 0.0, 0.0, 1.0] },
//!         { "value": [0.0, 9.0, 1.0, 0.0, 0.0, 0.0, 0.0] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Severity is independent of the classifier: it is a fixed heuristic over
//! the same feature vector.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tremor_common::{TremorError, TremorResult};
use tremor_model::{ClassificationResult, Severity, TremorType};

use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES, FEATURE_SET};
use crate::spectrum::std_dev;

/// Severity score at which a tremor is graded "Moyen".
pub const MODERATE_SEVERITY_SCORE: f64 = 0.002;

/// Severity score at which a tremor is graded "Élevé".
pub const HIGH_SEVERITY_SCORE: f64 = 0.005;

/// A pre-trained multi-class tremor classifier.
pub trait TremorClassifier: Send + Sync {
    /// Feature set the model was trained on.
    fn feature_set(&self) -> &str;

    /// Labels the model can produce.
    fn classes(&self) -> &[TremorType];

    /// Predict the tremor category for one feature vector.
    fn predict(&self, features: &FeatureVector) -> TremorResult<TremorType>;

    /// Relative importance of each feature, if the model exposes it.
    fn feature_importances(&self) -> &[f64] {
        &[]
    }
}

/// Heuristic severity score: `std(features) * max(|features|)`.
pub fn severity_score(features: &FeatureVector) -> f64 {
    let values = features.values();
    let max_abs = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    std_dev(values) * max_abs
}

/// Grade a severity score. Lower bounds are inclusive.
pub fn grade_severity(score: f64) -> Severity {
    if score < MODERATE_SEVERITY_SCORE {
        Severity::Low
    } else if score < HIGH_SEVERITY_SCORE {
        Severity::Moderate
    } else {
        Severity::High
    }
}

/// Run the classifier and the severity heuristic on the same vector.
pub fn classify(
    classifier: &dyn TremorClassifier,
    features: &FeatureVector,
) -> TremorResult<ClassificationResult> {
    let tremor_type = classifier.predict(features)?;
    let score = severity_score(features);
    let severity = grade_severity(score);

    tracing::debug!(
        tremor_type = %tremor_type,
        severity = %severity,
        score,
        "Classified feature vector"
    );

    Ok(ClassificationResult {
        tremor_type,
        severity,
    })
}

/// Exported random forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    pub model_version: String,
    pub feature_set: String,
    pub n_features: usize,
    pub classes: Vec<TremorType>,
    #[serde(default)]
    pub feature_importances: Vec<f64>,
    #[serde(default)]
    pub train_accuracy: Option<f64>,
    #[serde(default)]
    pub test_accuracy: Option<f64>,
    pub trees: Vec<DecisionTree>,
}

/// One tree, nodes in depth-first order with the root at index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// Go to `left` when `x[feature] <= threshold`, else `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class weights (sample counts or probabilities) in `classes` order.
    Leaf { value: Vec<f64> },
}

/// Random-forest classifier loaded from a JSON export.
#[derive(Debug, Clone)]
pub struct ForestClassifier {
    model: ForestModel,
}

impl ForestClassifier {
    /// Load and validate an exported forest.
    pub fn load(path: &Path) -> TremorResult<Self> {
        if !path.exists() {
            return Err(TremorError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let model: ForestModel = serde_json::from_str(&content)
            .map_err(|e| TremorError::model(format!("{}: {e}", path.display())))?;
        let classifier = Self::from_model(model)?;

        tracing::info!(
            path = %path.display(),
            version = %classifier.model.model_version,
            trees = classifier.model.trees.len(),
            train_accuracy = ?classifier.model.train_accuracy,
            test_accuracy = ?classifier.model.test_accuracy,
            "Loaded tremor classifier"
        );
        Ok(classifier)
    }

    /// Validate an in-memory model.
    pub fn from_model(model: ForestModel) -> TremorResult<Self> {
        if model.classes.is_empty() {
            return Err(TremorError::model("model declares no classes"));
        }
        if model.trees.is_empty() {
            return Err(TremorError::model("model has no trees"));
        }
        if model.feature_set == FEATURE_SET && model.n_features != FEATURE_COUNT {
            return Err(TremorError::model(format!(
                "{FEATURE_SET} has {FEATURE_COUNT} features, model declares {}",
                model.n_features
            )));
        }
        if !model.feature_importances.is_empty()
            && model.feature_importances.len() != model.n_features
        {
            return Err(TremorError::model(format!(
                "{} feature importances for {} features",
                model.feature_importances.len(),
                model.n_features
            )));
        }

        for (t, tree) in model.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(TremorError::model(format!("tree {t} is empty")));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                match node {
                    TreeNode::Split {
                        feature,
                        left,
                        right,
                        ..
                    } => {
                        if *feature >= model.n_features {
                            return Err(TremorError::model(format!(
                                "tree {t} node {i} splits on feature {feature} of {}",
                                model.n_features
                            )));
                        }
                        // Children after the parent rule out cycles.
                        let in_order = |child: usize| child > i && child < tree.nodes.len();
                        if !in_order(*left) || !in_order(*right) {
                            return Err(TremorError::model(format!(
                                "tree {t} node {i} has out-of-order children {left}/{right}"
                            )));
                        }
                    }
                    TreeNode::Leaf { value } => {
                        if value.len() != model.classes.len() {
                            return Err(TremorError::model(format!(
                                "tree {t} leaf {i} has {} weights for {} classes",
                                value.len(),
                                model.classes.len()
                            )));
                        }
                        if value.iter().any(|w| !w.is_finite() || *w < 0.0) {
                            return Err(TremorError::model(format!(
                                "tree {t} leaf {i} has invalid weights"
                            )));
                        }
                    }
                }
            }
        }

        Ok(Self { model })
    }

    pub fn model_version(&self) -> &str {
        &self.model.model_version
    }

    pub fn tree_count(&self) -> usize {
        self.model.trees.len()
    }

    /// Averaged class probabilities over all trees.
    pub fn predict_proba(&self, features: &FeatureVector) -> TremorResult<Vec<f64>> {
        self.check_features(features)?;
        let x = features.values();

        let mut totals = vec![0.0; self.model.classes.len()];
        for tree in &self.model.trees {
            let leaf = leaf_for(tree, x)?;
            let sum: f64 = leaf.iter().sum();
            if sum > 0.0 {
                for (total, w) in totals.iter_mut().zip(leaf) {
                    *total += w / sum;
                }
            }
        }
        let trees = self.model.trees.len() as f64;
        Ok(totals.into_iter().map(|t| t / trees).collect())
    }

    /// Names of the `n` most important features, most important first.
    pub fn top_features(&self, n: usize) -> Vec<(&'static str, f64)> {
        let mut ranked: Vec<(usize, f64)> = self
            .model
            .feature_importances
            .iter()
            .copied()
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
            .into_iter()
            .take(n)
            .map(|(i, w)| (FEATURE_NAMES.get(i).copied().unwrap_or("unknown"), w))
            .collect()
    }

    fn check_features(&self, features: &FeatureVector) -> TremorResult<()> {
        if features.feature_set() != self.model.feature_set {
            return Err(TremorError::config(format!(
                "classifier expects feature set '{}', got '{}'",
                self.model.feature_set,
                features.feature_set()
            )));
        }
        if features.len() != self.model.n_features {
            return Err(TremorError::config(format!(
                "classifier expects {} features, got {}",
                self.model.n_features,
                features.len()
            )));
        }
        Ok(())
    }
}

impl TremorClassifier for ForestClassifier {
    fn feature_set(&self) -> &str {
        &self.model.feature_set
    }

    fn classes(&self) -> &[TremorType] {
        &self.model.classes
    }

    fn predict(&self, features: &FeatureVector) -> TremorResult<TremorType> {
        let proba = self.predict_proba(features)?;
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }

        tracing::debug!(
            predicted = %self.model.classes[best],
            probability = proba[best],
            top_features = ?self.top_features(3),
            "Forest prediction"
        );
        Ok(self.model.classes[best])
    }

    fn feature_importances(&self) -> &[f64] {
        &self.model.feature_importances
    }
}

fn leaf_for<'a>(tree: &'a DecisionTree, x: &[f64]) -> TremorResult<&'a [f64]> {
    let mut index = 0;
    loop {
        match tree.nodes.get(index) {
            Some(TreeNode::Leaf { value }) => return Ok(value),
            Some(TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            }) => {
                index = if x[*feature] <= *threshold {
                    *left
                } else {
                    *right
                };
            }
            None => {
                return Err(TremorError::classifier(format!(
                    "tree walk reached missing node {index}"
                )))
            }
        }
    }
}
