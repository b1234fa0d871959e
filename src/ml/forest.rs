use crate::config::TrainingConfig;
use crate::error::{AppError, Result};
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Ensemble hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParameters {
    pub n_estimators: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl From<&TrainingConfig> for ForestParameters {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            seed: config.random_seed,
        }
    }
}

/// Bagged decision trees over class-balanced bootstraps.
///
/// Every tree sees the same number of rows from each class, drawn with
/// replacement, so rare classes (Fatal) weigh as much as common ones.
/// Tree `t` uses the RNG seeded with `seed + t`, making the ensemble
/// independent of thread scheduling.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalancedRandomForest {
    trees: Vec<Tree>,
    n_classes: usize,
    n_features: usize,
    feature_importances: Vec<f64>,
    parameters: ForestParameters,
}

impl BalancedRandomForest {
    /// Fit on a feature matrix and class indices in `0..n_classes`
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        parameters: &ForestParameters,
    ) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(AppError::Internal(format!(
                "Feature rows ({}) and labels ({}) differ",
                n_samples,
                y.len()
            )));
        }
        if parameters.n_estimators == 0 {
            return Err(AppError::Training("n_estimators must be positive".to_string()));
        }

        let mut rows_by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
        for (row, &label) in y.iter().enumerate() {
            rows_by_class
                .get_mut(label)
                .ok_or_else(|| {
                    AppError::Internal(format!("Label {} outside {} classes", label, n_classes))
                })?
                .push(row);
        }

        let present: Vec<&Vec<usize>> = rows_by_class.iter().filter(|r| !r.is_empty()).collect();
        if present.len() < 2 {
            return Err(AppError::InsufficientData(format!(
                "need at least 2 classes to train, found {}",
                present.len()
            )));
        }

        let per_class = n_samples.div_ceil(present.len());
        let tree_parameters = DecisionTreeClassifierParameters {
            criterion: SplitCriterion::Gini,
            max_depth: Some(parameters.max_depth),
            min_samples_leaf: parameters.min_samples_leaf,
            min_samples_split: parameters.min_samples_split,
            seed: Some(parameters.seed),
        };

        let trees = (0..parameters.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(parameters.seed.wrapping_add(t as u64));
                let mut sample = Vec::with_capacity(per_class * present.len());
                for class_rows in &present {
                    for _ in 0..per_class {
                        sample.push(class_rows[rng.gen_range(0..class_rows.len())]);
                    }
                }

                let mut values = Vec::with_capacity(sample.len() * n_features);
                for &row in &sample {
                    values.extend(x.row(row).iter().copied());
                }
                let x_boot = DenseMatrix::new(sample.len(), n_features, values, false)
                    .map_err(|e| AppError::Training(e.to_string()))?;
                let y_boot: Vec<i32> = sample.iter().map(|&row| y[row] as i32).collect();

                Tree::fit(&x_boot, &y_boot, tree_parameters.clone())
                    .map_err(|e| AppError::Training(format!("Tree {} failed to fit: {}", t, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let feature_importances = mean_importances(&trees, n_features);

        Ok(Self {
            trees,
            n_classes,
            n_features,
            feature_importances,
            parameters: parameters.clone(),
        })
    }

    /// Class probabilities for one row: the fraction of trees voting for each class
    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> Result<Vec<f64>> {
        if row.len() != self.n_features {
            return Err(AppError::Internal(format!(
                "Expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }

        let x = DenseMatrix::new(1, self.n_features, row.to_vec(), false)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            let predicted = tree
                .predict(&x)
                .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;
            let class = predicted.first().copied().unwrap_or_default() as usize;
            if let Some(count) = votes.get_mut(class) {
                *count += 1;
            }
        }

        let total = self.trees.len() as f64;
        Ok(votes.into_iter().map(|v| v as f64 / total).collect())
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let rows = x
            .rows()
            .into_iter()
            .map(|row| self.predict_proba_row(row))
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array2::zeros((rows.len(), self.n_classes));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, p) in row.into_iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    /// Arg-max class per row; ties go to the lower class index
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(row.iter().copied())).collect())
    }

    /// Mean impurity decrease per feature, summing to 1
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn parameters(&self) -> &ForestParameters {
        &self.parameters
    }
}

/// Index of the largest value; the first wins ties
pub fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

fn mean_importances(trees: &[Tree], n_features: usize) -> Vec<f64> {
    let mut totals = vec![0.0; n_features];
    for tree in trees {
        for (total, value) in totals.iter_mut().zip(tree.compute_feature_importances(false)) {
            if value.is_finite() {
                *total += value;
            }
        }
    }

    let sum: f64 = totals.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        totals.iter_mut().for_each(|v| *v /= sum);
    }
    totals
}
