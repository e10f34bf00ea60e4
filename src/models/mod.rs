//! Data models for the songbook application.
//!
//! Field names serialize in camelCase to match the web client.

mod group;
mod ids;
mod lyrics;
mod media;
mod repertoire;
mod song;
mod user;

pub use group::*;
pub use ids::*;
pub use lyrics::*;
pub use media::*;
pub use repertoire::*;
pub use song::*;
pub use user::*;
