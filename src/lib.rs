//! Consensus clustering: how stable is a clustering, and for which k?
//!
//! Items are repeatedly subsampled and clustered; the fraction of rounds in
//! which two items share a cluster (given both were drawn) forms a consensus
//! matrix per candidate k. The area under each matrix's empirical CDF, and its
//! relative growth from one k to the next, picks the most stable count.
//!
//! ```no_run
//! use conscluster::ml::driver::analyze;
//! use conscluster::ml::runners::KMeansRunner;
//! use conscluster::{CancelFlag, ConsensusConfig};
//! use ndarray::Array2;
//!
//! let data = Array2::<f64>::zeros((50, 3));
//! let report = analyze(
//!     data.view(),
//!     &KMeansRunner::default(),
//!     &ConsensusConfig::default(),
//!     &CancelFlag::new(),
//! )?;
//! println!("recommended k: {:?}", report.recommended_k);
//! # Ok::<(), conscluster::ConsensusError>(())
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::uninlined_format_args, clippy::module_name_repetitions)]

pub mod csv_reader;
pub mod ml;
pub mod structs;

pub use structs::{
    CancelFlag, CdfCurve, CdfPoint, ClusterRunner, ConsensusConfig, ConsensusError,
    ConsensusMatrix, ConsensusReport, Result, Sample, StabilitySummary,
};
