use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    audio::validate_source, AudioSource, BeatConfig, BeatResult, BeatState, Clock,
    FrequencyBands, Result, SystemClock,
};

const MAX_BEAT_HISTORY: usize = 32;

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFrame {
    /// Clock time of the frame in seconds.
    pub time: f32,
    pub bands: FrequencyBands,
    pub beat: BeatResult,
}

/// Metadata accumulated over the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub sample_rate: f32,
    pub bin_count: usize,
    pub frames: u64,
    pub beats: u64,
    pub tempo_bpm: Option<f32>,
}

/// Per-frame driver over one audio source.
///
/// Each call to [`AnalysisSession::next_frame`] reads a single frequency
/// snapshot and a single waveform, and derives both the band summary and the
/// beat decision from that one snapshot. Attaching a new source starts a new
/// session: history, cooldown and summary are discarded.
pub struct AnalysisSession<S, C = SystemClock> {
    source: S,
    clock: C,
    beat: BeatState,
    spectrum: Vec<u8>,
    waveform: Vec<u8>,
    scratch_spectrum: Vec<u8>,
    scratch_waveform: Vec<u8>,
    summary: AnalysisSummary,
    beat_times: Vec<f32>,
    last_frame: Option<AnalysisFrame>,
}

impl<S: AudioSource> AnalysisSession<S> {
    pub fn new(source: S, config: BeatConfig) -> Result<Self> {
        Self::with_clock(source, config, SystemClock::new())
    }
}

impl<S: AudioSource, C: Clock> AnalysisSession<S, C> {
    pub fn with_clock(source: S, config: BeatConfig, clock: C) -> Result<Self> {
        validate_source(&source)?;
        let beat = BeatState::new(config)?;
        let bin_count = source.bin_count();
        let wave_len = source.time_domain_len();
        tracing::debug!(
            bin_count,
            sample_rate = source.sample_rate(),
            "analysis session started"
        );

        Ok(Self {
            summary: summary_for(&source),
            spectrum: vec![0; bin_count],
            waveform: vec![128; wave_len],
            scratch_spectrum: vec![0; bin_count],
            scratch_waveform: vec![128; wave_len],
            beat,
            beat_times: Vec::new(),
            last_frame: None,
            source,
            clock,
        })
    }

    /// Swaps in a new source and starts over with a fresh beat history.
    /// On failure the current source and state are kept.
    pub fn attach(&mut self, source: S) -> Result<()> {
        validate_source(&source)?;
        let bin_count = source.bin_count();
        let wave_len = source.time_domain_len();

        self.spectrum = vec![0; bin_count];
        self.waveform = vec![128; wave_len];
        self.scratch_spectrum = vec![0; bin_count];
        self.scratch_waveform = vec![128; wave_len];
        self.summary = summary_for(&source);
        self.source = source;
        self.beat.reset();
        self.beat_times.clear();
        self.last_frame = None;
        tracing::debug!(bin_count, "attached new audio source");
        Ok(())
    }

    /// Reads the source once and analyses the snapshot.
    ///
    /// A failed read is logged and returned; nothing observable changes, so
    /// the caller can skip the frame and retry on the next one.
    pub fn next_frame(&mut self) -> Result<AnalysisFrame> {
        if let Err(err) = self.read_snapshots() {
            tracing::warn!(error = %err, "skipping analysis frame");
            return Err(err);
        }
        std::mem::swap(&mut self.spectrum, &mut self.scratch_spectrum);
        std::mem::swap(&mut self.waveform, &mut self.scratch_waveform);

        let now = self.clock.now();
        let bands = FrequencyBands::from_spectrum(&self.spectrum, self.summary.sample_rate);
        let beat = self.beat.update(&self.spectrum, now);
        let frame = AnalysisFrame {
            time: now.as_secs_f32(),
            bands,
            beat,
        };

        self.summary.frames += 1;
        if beat.is_beat {
            self.record_beat(frame.time);
        }
        self.last_frame = Some(frame);
        Ok(frame)
    }

    /// Like [`AnalysisSession::next_frame`] but degrades to the last good
    /// frame (or a silent one) when the source cannot deliver.
    pub fn frame_or_last_good(&mut self) -> AnalysisFrame {
        match self.next_frame() {
            Ok(frame) => frame,
            Err(_) => self.last_frame.unwrap_or_default(),
        }
    }

    pub fn last_frame(&self) -> Option<&AnalysisFrame> {
        self.last_frame.as_ref()
    }

    /// Magnitude snapshot behind the last good frame.
    pub fn spectrum(&self) -> &[u8] {
        &self.spectrum
    }

    /// Waveform snapshot behind the last good frame.
    pub fn waveform(&self) -> &[u8] {
        &self.waveform
    }

    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }

    /// Clock times, in seconds, of the most recent beats.
    pub fn recent_beats(&self) -> &[f32] {
        &self.beat_times
    }

    pub fn beat_state(&self) -> &BeatState {
        &self.beat
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now()
    }

    fn read_snapshots(&mut self) -> Result<()> {
        self.source.read_frequency_data(&mut self.scratch_spectrum)?;
        self.source.read_time_domain_data(&mut self.scratch_waveform)
    }

    fn record_beat(&mut self, time: f32) {
        self.summary.beats += 1;
        self.beat_times.push(time);
        if self.beat_times.len() > MAX_BEAT_HISTORY {
            let overflow = self.beat_times.len() - MAX_BEAT_HISTORY;
            self.beat_times.drain(0..overflow);
        }
        if let Some(tempo) = estimate_tempo(&self.beat_times) {
            self.summary.tempo_bpm = Some(tempo);
        }
    }
}

fn summary_for<S: AudioSource>(source: &S) -> AnalysisSummary {
    AnalysisSummary {
        sample_rate: source.sample_rate(),
        bin_count: source.bin_count(),
        ..Default::default()
    }
}

/// Tempo implied by the mean interval between consecutive beats.
pub fn estimate_tempo(beat_times: &[f32]) -> Option<f32> {
    let mut sum = 0.0;
    let mut count = 0;
    for window in beat_times.windows(2) {
        let interval = window[1] - window[0];
        if interval > f32::EPSILON {
            sum += interval;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }
    let average_interval = sum / count as f32;
    (average_interval > 0.0).then(|| 60.0 / average_interval)
}

impl<S, C> fmt::Debug for AnalysisSession<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("summary", &self.summary)
            .field("history", &self.beat.history().len())
            .field("beat_times", &self.beat_times.len())
            .finish()
    }
}
