//! Audio Module
//!
//! Signal container plus the I/O and resampling collaborators:
//! - Mono signal type and level helpers
//! - WAV import/export
//! - Rate conversion scoped to a source/target pair

pub mod io;
pub mod resample;
pub mod signal;

pub use io::{load_audio, save_audio};
pub use resample::{resample, ResampleMethod, Resampler};
pub use signal::{db_to_linear, linear_to_db, peak_db, rms_db, Signal};
