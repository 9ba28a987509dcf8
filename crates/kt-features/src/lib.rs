//! Feature derivation, categorical encoding and persistence for
//! knowledge-tracing datasets.
//!
//! A run takes the raw `train` and `test` event tables through three stages:
//!
//! 1. a [`derive::FeatureDeriver`] adds the feature columns of one [`derive::Variant`],
//! 2. `Timestamp` is dropped,
//! 3. the [`encoding::CategoricalEncoder`] maps every categorical column into
//!    one shared integer ID space fit on the training table.
//!
//! [`pipeline::run`] chains the stages and saves the result with [`dataset::save`].

pub mod dataset;
pub mod derive;
pub mod encoding;
pub mod pipeline;
