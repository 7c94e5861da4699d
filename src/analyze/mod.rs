// src/analyze/mod.rs
//! Per-topic ranking: scoring, near-duplicate clustering and diverse selection.

pub mod cluster;
pub mod scoring;
pub mod select;

pub use crate::analyze::cluster::{cluster, similarity, ScoredItem};
pub use crate::analyze::scoring::{Scorer, ScoringConfig};
pub use crate::analyze::select::{select, select_many, Selection, SelectionConfig};
