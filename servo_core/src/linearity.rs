//! Least-squares line through measured (percent, speed) pairs.

use crate::error::{Result, ServoError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// `None` when either variable is constant.
    pub pearson_r: Option<f64>,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Ordinary least squares `y = slope * x + intercept`.
pub fn linear_fit(points: &[(f64, f64)]) -> Result<LinearFit> {
    if points.len() < 2 {
        return Err(ServoError::InvalidRequest("need at least two points for a line".into()).into());
    }
    if points.iter().any(|(x, y)| !(x.is_finite() && y.is_finite())) {
        return Err(ServoError::InvalidRequest("points must be finite".into()).into());
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in points {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 {
        return Err(ServoError::InvalidRequest("x values are all equal".into()).into());
    }
    let slope = sxy / sxx;
    let pearson_r = (syy > 0.0).then(|| sxy / (sxx * syy).sqrt());
    Ok(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
        pearson_r,
    })
}
