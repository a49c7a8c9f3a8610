//! Graph-based phrase table expansion
//!
//! Translation distributions of known ("labeled") source phrases are spread
//! to unknown phrases over a similarity graph built from monolingual
//! context features:
//!
//! 1. [`features`]: directional context counts, pruning, PMI
//! 2. [`graph`]: inverted-index k-NN graph, symmetrized and row-normalized,
//!    or an on-demand cosine oracle
//! 3. [`propagation`]: candidate seeding and the two update rules
//!
//! The surrounding modules handle the line-oriented file formats
//! ([`phrases`], [`corpus`], [`lexical`]), matrix storage ([`sparse`]) and
//! the pipeline configuration ([`config`]).

pub mod config;
pub mod corpus;
pub mod error;
pub mod features;
pub mod graph;
pub mod lexical;
pub mod phrases;
pub mod propagation;
pub mod sparse;

pub use error::{PropError, Result};

/// Progress hook, called with (items done, total items)
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;
