//! Statistical helpers for feature derivation.
//!
//! This crate provides the numeric building blocks used when deriving
//! continuous features from event tables:
//!
//! - **Descriptive statistics**: range, mean, variance and standard deviation
//! - **Standardization**: z-score scaling fit on one sample and applied to others
//! - **Grouped means**: per-key averages, e.g. mean correctness per item
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`scaler`]: Z-score standardization with explicit zero-variance handling
//! - [`grouped`]: Per-key mean aggregation
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use kt_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```
//!
//! ## Standardizing with statistics fit on another sample
//!
//! ```
//! use kt_stats::scaler::StandardScaler;
//!
//! let scaler = StandardScaler::fit([1.0, 3.0]).unwrap();
//! assert_eq!(scaler.transform(3.0), 1.0);
//! assert_eq!(scaler.transform(5.0), 3.0);
//! ```
//!
//! ## Averaging by key
//!
//! ```
//! use kt_stats::grouped::GroupedMean;
//!
//! let means = GroupedMean::from_pairs([("a", 1.0), ("a", 0.0), ("b", 1.0)]);
//! assert_eq!(means.get(&"a"), Some(0.5));
//! assert_eq!(means.get(&"c"), None);
//! ```

pub mod descriptive;
pub mod grouped;
pub mod scaler;
