//! Z-score standardization.
//!
//! A [`StandardScaler`] is fit once on a reference sample and then applied,
//! unchanged, to any other value. Fitting rejects empty and non-finite samples
//! so a bad column can never silently turn into `NaN` features.

use crate::descriptive::DescriptiveStats;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ScaleError {
    #[display("cannot fit a scaler on an empty sample")]
    EmptySample,
    #[display("sample contains a non-finite value ({value})")]
    NonFinite { value: f64 },
}

/// Mean/standard-deviation scaling fit on a reference sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardScaler {
    mean: f64,
    scale: f64,
}

impl StandardScaler {
    pub const IDENTITY: Self = Self {
        mean: 0.0,
        scale: 1.0,
    };

    /// Fits the scaler on `values`.
    ///
    /// A sample whose standard deviation is zero (up to rounding relative to its
    /// mean) gets a unit scale, so every value of that sample maps to `0.0`
    /// instead of dividing by zero.
    pub fn fit<I>(values: I) -> Result<Self, ScaleError>
    where
        I: IntoIterator<Item = f64>,
    {
        let values = values.into_iter().collect::<Vec<_>>();
        if let Some(&value) = values.iter().find(|v| !v.is_finite()) {
            return Err(ScaleError::NonFinite { value });
        }
        let stats = DescriptiveStats::new(values).ok_or(ScaleError::EmptySample)?;
        Ok(Self::from_stats(&stats))
    }

    /// Like [`StandardScaler::fit`], but an empty sample yields the identity
    /// scaler (mean `0.0`, scale `1.0`) instead of an error.
    pub fn fit_or_identity<I>(values: I) -> Result<Self, ScaleError>
    where
        I: IntoIterator<Item = f64>,
    {
        match Self::fit(values) {
            Err(ScaleError::EmptySample) => Ok(Self::IDENTITY),
            fitted => fitted,
        }
    }

    #[must_use]
    pub fn from_stats(stats: &DescriptiveStats) -> Self {
        let degenerate = stats.std_dev <= 10.0 * f64::EPSILON * stats.mean.abs();
        Self {
            mean: stats.mean,
            scale: if degenerate { 1.0 } else { stats.std_dev },
        }
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }

    /// Transforms `value`, imputing the fitted mean (which maps to `0.0`) for
    /// missing values.
    #[must_use]
    pub fn transform_or_mean(&self, value: Option<f64>) -> f64 {
        value.map_or(0.0, |v| self.transform(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_transform() {
        let scaler = StandardScaler::fit([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(scaler.mean(), 5.0);
        assert_eq!(scaler.scale(), 2.0);
        assert_eq!(scaler.transform(9.0), 2.0);
        assert_eq!(scaler.transform(1.0), -2.0);
    }

    #[test]
    fn test_zero_variance_maps_to_zero() {
        let scaler = StandardScaler::fit([0.1, 0.1, 0.1]).unwrap();
        assert_eq!(scaler.scale(), 1.0);
        assert!(scaler.transform(0.1).abs() < 1e-12);
        assert!(scaler.transform(0.1).is_finite());
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        assert_eq!(
            StandardScaler::fit(std::iter::empty()),
            Err(ScaleError::EmptySample)
        );
        assert!(matches!(
            StandardScaler::fit([1.0, f64::NAN]),
            Err(ScaleError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_fit_or_identity_on_empty_sample() {
        let scaler = StandardScaler::fit_or_identity(std::iter::empty()).unwrap();
        assert_eq!(scaler, StandardScaler::IDENTITY);
        assert_eq!(scaler.transform_or_mean(None), 0.0);
        assert_eq!(scaler.transform(2.5), 2.5);

        let fitted = StandardScaler::fit_or_identity([1.0, 3.0]).unwrap();
        assert_eq!(fitted, StandardScaler::fit([1.0, 3.0]).unwrap());
        assert!(matches!(
            StandardScaler::fit_or_identity([f64::INFINITY]),
            Err(ScaleError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_missing_imputes_mean() {
        let scaler = StandardScaler::fit([1.0, 3.0]).unwrap();
        assert_eq!(scaler.transform_or_mean(None), 0.0);
        assert_eq!(scaler.transform_or_mean(Some(3.0)), 1.0);
    }
}
