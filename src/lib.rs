//! Ingest oceanographic sensor NetCDF files: map raw sensor identities to
//! canonical ones, reconcile time and vertical axes into dense grids, write
//! CF-1.6 time-series files, and crawl, merge and aggregate a corpus of them.

pub mod builder;
pub mod config;
pub mod corpus;
pub mod crawl;
pub mod dataset;
pub mod error;
pub mod merge;
pub mod ncml;
pub mod reconcile;
pub mod store;
pub mod timefmt;
pub mod urn;

#[cfg(test)]
mod testing;

pub use builder::{BuildOutcome, BuildRequest, TimeSeriesBuilder};
pub use config::Config;
pub use crawl::{crawl, write_report, CopyPolicy, CrawlReport, FileRecord};
pub use error::{Error, Result};
pub use merge::{merge, CoordinatePolicy, MergeOptions, MergeSummary};
pub use ncml::{write_descriptors, write_manifest};
pub use reconcile::{reconcile, reconcile_observations, Grid, Observation, Reconciled};
pub use store::{FileOps, LocalFs, NcStore, NetcdfStore};
pub use urn::{map_identity, IdentityMaps, MappedIdentity, SensorUrn};
