//! Linear regression family: OLS, ridge, lasso and elastic net

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `a x = b` by Cholesky.
/// Returns `None` when `a` is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 1e-12 * a[[i, i]].abs().max(1.0) || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    // L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    Some(x)
}

/// Gaussian elimination with partial pivoting, for systems Cholesky rejects.
fn gauss_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| {
            m[[r1, col]]
                .abs()
                .partial_cmp(&m[[r2, col]].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for j in 0..n {
                m.swap([col, j], [pivot, j]);
            }
            rhs.swap(col, pivot);
        }
        for row in (col + 1)..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                m[[row, j]] -= factor * m[[col, j]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| m[[i, j]] * x[j]).sum();
        x[i] = (rhs[i] - sum) / m[[i, i]];
    }
    Some(x)
}

/// Solve `(XᵀX + alpha·I) w = Xᵀy` on centered data.
fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    for i in 0..xtx.nrows() {
        xtx[[i, i]] += alpha;
    }
    let xty = x.t().dot(y);

    cholesky_solve(&xtx, &xty)
        .or_else(|| gauss_solve(&xtx, &xty))
        .ok_or_else(|| {
            PipelineError::ComputationError(
                "normal equations are singular; add regularization".to_string(),
            )
        })
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// Cyclic coordinate descent for `1/(2n)‖y − Xw‖² + α·ρ‖w‖₁ + α(1−ρ)/2‖w‖²`.
fn coordinate_descent(
    x: &Array2<f64>,
    y: &Array1<f64>,
    alpha: f64,
    l1_ratio: f64,
    max_iter: usize,
    tol: f64,
) -> Array1<f64> {
    let n = x.nrows() as f64;
    let n_features = x.ncols();
    let l1 = alpha * l1_ratio * n;
    let l2 = alpha * (1.0 - l1_ratio) * n;
    let col_norms: Vec<f64> = x.axis_iter(Axis(1)).map(|c| c.dot(&c)).collect();

    let mut w = Array1::<f64>::zeros(n_features);
    let mut residual = y.clone();

    for _ in 0..max_iter {
        let mut max_delta = 0.0f64;
        for j in 0..n_features {
            let denom = col_norms[j] + l2;
            if denom < 1e-15 {
                continue;
            }
            let column = x.column(j);
            let rho = column.dot(&residual) + col_norms[j] * w[j];
            let updated = soft_threshold(rho, l1) / denom;
            let delta = updated - w[j];
            if delta != 0.0 {
                residual.scaled_add(-delta, &column);
                w[j] = updated;
                max_delta = max_delta.max(delta.abs());
            }
        }
        if max_delta < tol {
            break;
        }
    }
    w
}

fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(PipelineError::ComputationError("cannot fit on zero rows".to_string()));
    }
    Ok(())
}

/// Center features and target; returns the means used for the intercept.
fn center(x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>, f64)> {
    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| PipelineError::ComputationError("empty feature matrix".to_string()))?;
    let y_mean = y.mean().unwrap_or(0.0);
    let x_c = x - &x_mean.view().insert_axis(Axis(0));
    let y_c = y - y_mean;
    Ok((x_c, y_c, x_mean, y_mean))
}

/// Fitted weights shared by every linear family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
}

impl LinearFit {
    fn from_centered(coefficients: Array1<f64>, x_mean: &Array1<f64>, y_mean: f64) -> Self {
        let intercept = y_mean - coefficients.dot(x_mean);
        Self {
            coefficients,
            intercept,
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

/// Ordinary least squares
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    fitted: Option<LinearFit>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;
        let w = solve_normal_equations(&x_c, &y_c, 0.0)?;
        self.fitted = Some(LinearFit::from_centered(w, &x_mean, y_mean));
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(PipelineError::ModelNotFitted)?.predict(x)
    }

    pub fn coefficients(&self) -> Option<&LinearFit> {
        self.fitted.as_ref()
    }
}

/// L2-penalized least squares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub alpha: f64,
    fitted: Option<LinearFit>,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            fitted: None,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;
        let w = solve_normal_equations(&x_c, &y_c, self.alpha)?;
        self.fitted = Some(LinearFit::from_centered(w, &x_mean, y_mean));
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(PipelineError::ModelNotFitted)?.predict(x)
    }
}

/// Elastic net; `l1_ratio = 1` is the lasso
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticNetRegression {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
    fitted: Option<LinearFit>,
}

impl Default for ElasticNetRegression {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

impl ElasticNetRegression {
    pub fn new(alpha: f64, l1_ratio: f64) -> Self {
        Self {
            alpha,
            l1_ratio: l1_ratio.clamp(0.0, 1.0),
            max_iter: 1000,
            tol: 1e-6,
            fitted: None,
        }
    }

    pub fn lasso(alpha: f64) -> Self {
        Self::new(alpha, 1.0)
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;
        let w = coordinate_descent(&x_c, &y_c, self.alpha, self.l1_ratio, self.max_iter, self.tol);
        self.fitted = Some(LinearFit::from_centered(w, &x_mean, y_mean));
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(PipelineError::ModelNotFitted)?.predict(x)
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }
}
