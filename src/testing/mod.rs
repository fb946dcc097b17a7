//! Testability utilities.
//!
//! Deterministic signal generators and WAV I/O shared by the unit tests, the
//! integration tests and the `synth` CLI subcommand.

pub mod synth;

pub use synth::{click_track, read_wav, write_wav, SyntheticPattern, SyntheticSpec};
