use std::{sync::Arc, time::Duration};

use beatscope_core::{
    AnalysisSession, AnalysisSummary, AppConfig, BeatscopeError, LiveAnalyser, PlaybackClock,
    Result,
};
use serde::Serialize;

/// One detected beat, timed in media seconds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatEvent {
    pub time: f32,
    pub energy: f32,
    pub bass_energy: f32,
    pub treble_energy: f32,
}

/// JSON document written by the `analyze` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub source: String,
    pub duration_seconds: f32,
    pub frames_per_second: u32,
    pub summary: AnalysisSummary,
    pub beats: Vec<BeatEvent>,
}

/// Streams PCM through a [`LiveAnalyser`] one animation frame at a time, with
/// the clock following media time instead of the wall clock.
pub struct Pipeline {
    analyser: Arc<LiveAnalyser>,
    session: AnalysisSession<Arc<LiveAnalyser>, PlaybackClock>,
    clock: PlaybackClock,
    hop: usize,
    sample_rate: u32,
    fps: u32,
}

impl Pipeline {
    pub fn new(sample_rate: u32, config: &AppConfig, fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(BeatscopeError::invalid_config("frame rate must be positive"));
        }
        let analyser = Arc::new(LiveAnalyser::new(sample_rate, config.analyser.clone())?);
        let clock = PlaybackClock::new();
        let session =
            AnalysisSession::with_clock(analyser.clone(), config.beat.clone(), clock.clone())?;

        Ok(Self {
            analyser,
            session,
            clock,
            hop: (sample_rate / fps).max(1) as usize,
            sample_rate,
            fps,
        })
    }

    pub fn frames_per_second(&self) -> u32 {
        self.fps
    }

    pub fn summary(&self) -> &AnalysisSummary {
        self.session.summary()
    }

    /// Analyses `samples` frame by frame and returns the beats found.
    pub fn run(&mut self, samples: &[f32]) -> Result<Vec<BeatEvent>> {
        let mut beats = Vec::new();
        for chunk in samples.chunks(self.hop) {
            self.analyser.push_samples(chunk)?;
            self.clock.advance(Duration::from_secs_f64(
                chunk.len() as f64 / f64::from(self.sample_rate),
            ));

            let frame = match self.session.next_frame() {
                Ok(frame) => frame,
                Err(err) if err.is_recoverable() => continue,
                Err(err) => return Err(err),
            };
            if frame.beat.is_beat {
                tracing::info!(
                    time = frame.time,
                    energy = frame.beat.energy,
                    bass = frame.beat.bass_energy,
                    "beat"
                );
                beats.push(BeatEvent {
                    time: frame.time,
                    energy: frame.beat.energy,
                    bass_energy: frame.beat.bass_energy,
                    treble_energy: frame.beat.treble_energy,
                });
            }
        }
        Ok(beats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::click_track;

    #[test]
    fn click_track_beats_follow_tempo() {
        let audio = click_track(44_100, 120.0, 8.0, 0.25);
        let mut pipeline = Pipeline::new(audio.sample_rate, &AppConfig::default(), 60).unwrap();

        let beats = pipeline.run(&audio.samples).unwrap();

        assert!(
            (14..=17).contains(&beats.len()),
            "unexpected beat count {}",
            beats.len()
        );
        let tempo = pipeline.summary().tempo_bpm.expect("tempo should be detected");
        assert!((tempo - 120.0).abs() < 10.0, "tempo {tempo}");
    }

    #[test]
    fn silence_produces_no_beats() {
        let mut pipeline = Pipeline::new(48_000, &AppConfig::default(), 60).unwrap();
        let beats = pipeline.run(&vec![0.0; 48_000]).unwrap();

        assert!(beats.is_empty());
        assert_eq!(pipeline.summary().frames, 60);
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        assert!(Pipeline::new(48_000, &AppConfig::default(), 0).is_err());
    }
}
