//! Audio data model and WAV codec.

pub mod buffer;
pub mod wav;

pub use buffer::{AudioBuffer, db_to_gain};
