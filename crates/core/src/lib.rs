//! Core library for the Beatscope analysis pipeline.
//!
//! The crate turns a live spectral source into what a music visualiser draws
//! from: six perceptual band energies, the raw spectrum and waveform, and a
//! beat flag with bass and treble energies. Everything is synchronous and
//! allocation free per frame so it can be driven from an animation callback,
//! a timer or a test.
//!
//! Sources implement [`AudioSource`]. [`SpectrumSampler`] and
//! [`BeatDetector`] each read from a source on their own, while
//! [`AnalysisSession`] reads once per frame and feeds both computations from
//! that single snapshot.

pub mod analyser;
pub mod audio;
pub mod beat;
pub mod clock;
pub mod config;
pub mod error;
pub mod session;
pub mod spectrum;

pub use analyser::LiveAnalyser;
pub use audio::{AudioSource, SnapshotSource};
pub use beat::{BandEnergy, BeatDetector, BeatResult, BeatState, EnergyHistory};
pub use clock::{Clock, PlaybackClock, SystemClock};
pub use config::{
    AnalyserConfig, AppConfig, BeatConfig, EnergyCompression, ReferencePolicy, TuningProfile,
};
pub use error::{BeatscopeError, Result};
pub use session::{AnalysisFrame, AnalysisSession, AnalysisSummary};
pub use spectrum::{BandRanges, FrequencyBands, SpectrumSampler};
