//! Shared primitives for the map-matching engine: the error taxonomy, spherical
//! geodesy functions, and small identifier/coordinate newtypes used across the
//! candidate search, router, HMM and reconstruction stages.

pub mod error;
pub mod geodesy;
pub mod ids;

pub use error::{Error, MatchResultTag};
pub use geodesy::LonLat;
pub use ids::{NodeId, WayId};
