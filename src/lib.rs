//! Temporal trust-network snapshots and REV2-style fairness / goodness
//! scoring.
//!
//! Ratings are loaded once into a [`TemporalStore`], sliced by time into a
//! fresh [`SnapshotGraph`], and scored in place by [`Rev2Scorer`]. The
//! annotated graph is what downstream renderers consume.

pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod rev2;
pub mod snapshot;
pub mod store;

pub use config::ScoringConfig;
pub use error::{Result, TrustError};
pub use models::{EdgeRecord, Period, PeriodBound, RawRecord, TrustEdge, TrustNode};
pub use rev2::{Convergence, Rev2Scorer, RoundDeltas};
pub use snapshot::SnapshotGraph;
pub use store::{TemporalStore, TimeWindow};
