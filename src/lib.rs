//! Aggregation of MHC class I / class II binding predictions.
//!
//! Per-sample prediction tables written by external predictors (mhcflurry,
//! FRED2, mhcnuggets, ...) are parsed into [`data::model::PeptideRecord`]s,
//! annotated with gene ids, deduplicated per (peptide, allele, sample), split
//! by MHC class and written as sorted, byte-reproducible tables together with
//! a provenance record.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod provenance;
pub mod tool;

pub use error::{PipelineError, Result};
