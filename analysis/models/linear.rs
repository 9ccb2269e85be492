// analysis/models/linear.rs

//! # Linear Estimators
//!
//! Logistic regression fit by iteratively reweighted least squares and ridge
//! regression in closed form. Both carry an L2 penalty on the slope
//! coefficients (never the intercept): the logistic penalty matches the
//! conventional unit-strength default, the ridge penalty is the alpha = 1
//! setting of the reference analysis. Neither family has a native
//! feature-importance notion, so both report `None`.

use crate::linalg::cholesky_solve;
use crate::models::{sigmoid, Classifier, ModelError, Regressor};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_TOL: f64 = 1e-6;
const LOGISTIC_L2: f64 = 1.0;
const RIDGE_ALPHA: f64 = 1.0;
const PROBABILITY_FLOOR: f64 = 1e-10;

/// L2-penalized logistic regression with per-sample weights.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LogisticModel {
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        sample_weights: ArrayView1<f64>,
    ) -> Result<Self, ModelError> {
        let n = x.nrows();
        let p = x.ncols();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let mut design = Array2::ones((n, p + 1));
        design.slice_mut(s![.., 1..]).assign(&x);

        let mut beta: Array1<f64> = Array1::zeros(p + 1);
        let mut last_deviance = f64::INFINITY;
        let mut converged = false;

        for _ in 0..MAX_ITERATIONS {
            let eta = design.dot(&beta);
            let mu = eta.mapv(|e| sigmoid(e).clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR));

            let deviance = -2.0
                * y.iter()
                    .zip(mu.iter())
                    .zip(sample_weights.iter())
                    .map(|((&yi, &mi), &wi)| wi * (yi * mi.ln() + (1.0 - yi) * (1.0 - mi).ln()))
                    .sum::<f64>();
            if (last_deviance - deviance).abs() < CONVERGENCE_TOL * (deviance.abs() + 1.0) {
                converged = true;
                break;
            }
            last_deviance = deviance;

            // Working response and weights for this round.
            let variance = mu.mapv(|m| m * (1.0 - m));
            let irls_weights = &variance * &sample_weights;
            let z = &eta + &((&y - &mu) / &variance);

            let weighted_design = &design * &irls_weights.view().insert_axis(Axis(1));
            let mut normal = design.t().dot(&weighted_design);
            for j in 1..=p {
                normal[[j, j]] += LOGISTIC_L2;
            }
            let rhs = design.t().dot(&(&irls_weights * &z));
            beta = cholesky_solve(&normal, &rhs)?;
        }

        if !converged {
            log::warn!("logistic IRLS did not converge within {MAX_ITERATIONS} iterations");
        }

        Ok(LogisticModel {
            coefficients: beta.slice(s![1..]).to_owned(),
            intercept: beta[0],
        })
    }

    fn decision(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }
}

impl Classifier for LogisticModel {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.predict_proba(x)
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 })
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.decision(x).mapv(sigmoid)
    }

    fn feature_importance(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Ridge regression via the normal equations on centered data.
#[derive(Debug, Clone)]
pub struct RidgeModel {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl RidgeModel {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self, ModelError> {
        let p = x.ncols();
        let x_mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let y_mean = y.mean().unwrap_or(0.0);

        let x_centered = &x - &x_mean;
        let y_centered = &y - y_mean;

        let mut normal = x_centered.t().dot(&x_centered);
        for j in 0..p {
            normal[[j, j]] += RIDGE_ALPHA;
        }
        let rhs = x_centered.t().dot(&y_centered);
        let coefficients = cholesky_solve(&normal, &rhs)?;
        let intercept = y_mean - x_mean.dot(&coefficients);

        Ok(RidgeModel {
            coefficients,
            intercept,
        })
    }
}

impl Regressor for RidgeModel {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }

    fn feature_importance(&self) -> Option<Array1<f64>> {
        None
    }
}
