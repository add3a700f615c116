//! Within-sample aberration scoring for binned genomic read depth.
//!
//! A reference population is turned into a table of, per bin, the bins on
//! other chromosomes that behave most alike ([`reference`]). A test sample
//! is then scored bin by bin against its own values at those reference bins,
//! iteratively excluding outliers ([`marking`]), and the scores are combined
//! over a sliding window ([`smoothing`]).

pub mod config;
pub mod error;
pub mod marking;
pub mod output;
pub mod reference;
pub mod reference_io;
pub mod sample_reader;
pub mod smoothing;
pub mod statistics;
pub mod types;
