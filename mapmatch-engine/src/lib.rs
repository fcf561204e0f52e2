//! GPS trace to road-network map matching.
//!
//! Pipeline: [`condition`] → [`candidate`] → [`router`]/[`hmm`] →
//! [`viterbi`] → [`reconstruct`], orchestrated by [`engine`].

pub mod candidate;
pub mod condition;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod hmm;
pub mod reconstruct;
pub mod router;
pub mod viterbi;
pub mod way;

pub use config::Config;
pub use engine::{match_trace, MatchOutput};
