use std::{
    f32::consts::PI,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{AnalyserConfig, AudioSource, BeatscopeError, Result};

const BLACKMAN_ALPHA: f32 = 0.16;

/// Spectral analyser fed with mono PCM blocks.
///
/// Mirrors the behaviour of a browser `AnalyserNode`: the most recent
/// `fft_size` samples are Blackman windowed, transformed, smoothed over time
/// and mapped from a decibel window onto bytes. Every frequency read advances
/// the smoothing, so a frame should read the spectrum once and share it.
pub struct LiveAnalyser {
    config: AnalyserConfig,
    sample_rate: u32,
    window: Vec<f32>,
    state: Mutex<AnalyserState>,
}

impl LiveAnalyser {
    pub fn new(sample_rate: u32, config: AnalyserConfig) -> Result<Self> {
        config.validate()?;
        if sample_rate == 0 {
            return Err(BeatscopeError::invalid_source(
                "analyser sample rate must be positive",
            ));
        }

        let size = config.fft_size;
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let fft = FftResources {
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
        };

        Ok(Self {
            window: blackman_window(size),
            state: Mutex::new(AnalyserState {
                ring: vec![0.0; size],
                write_pos: 0,
                smoothed: vec![0.0; config.bin_count()],
                fft,
                closed: false,
            }),
            config,
            sample_rate,
        })
    }

    pub fn with_defaults(sample_rate: u32) -> Result<Self> {
        Self::new(sample_rate, AnalyserConfig::default())
    }

    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }

    /// Appends samples to the analysis window. Only the newest `fft_size`
    /// samples are retained.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        let mut state = self.lock()?;
        if state.closed {
            tracing::debug!(count = samples.len(), "dropping samples pushed after close");
            return Ok(());
        }

        let size = state.ring.len();
        let tail = &samples[samples.len().saturating_sub(size)..];
        for &sample in tail {
            let pos = state.write_pos;
            state.ring[pos] = sample;
            state.write_pos = (pos + 1) % size;
        }
        Ok(())
    }

    /// Shuts the analyser down. Further reads report the analysis as
    /// unavailable.
    pub fn close(&self) -> Result<()> {
        self.lock()?.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|state| state.closed).unwrap_or(true)
    }

    fn lock(&self) -> Result<MutexGuard<'_, AnalyserState>> {
        self.state
            .lock()
            .map_err(|_| BeatscopeError::unavailable("analyser state has been poisoned"))
    }

    fn open_state(&self) -> Result<MutexGuard<'_, AnalyserState>> {
        let state = self.lock()?;
        if state.closed {
            return Err(BeatscopeError::unavailable("analyser has been closed"));
        }
        Ok(state)
    }
}

impl AudioSource for LiveAnalyser {
    fn bin_count(&self) -> usize {
        self.config.bin_count()
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }

    fn time_domain_len(&self) -> usize {
        self.config.fft_size
    }

    fn read_frequency_data(&self, out: &mut [u8]) -> Result<()> {
        let mut state = self.open_state()?;
        state.update_spectrum(&self.window, self.config.smoothing_time_constant)?;

        let min_db = self.config.min_decibels;
        let scale = 255.0 / (self.config.max_decibels - min_db);
        for (byte, magnitude) in out.iter_mut().zip(&state.smoothed) {
            let db = 20.0 * magnitude.log10();
            *byte = ((db - min_db) * scale).clamp(0.0, 255.0) as u8;
        }
        Ok(())
    }

    fn read_time_domain_data(&self, out: &mut [u8]) -> Result<()> {
        let state = self.open_state()?;
        let size = state.ring.len();
        for (i, byte) in out.iter_mut().take(size).enumerate() {
            let sample = state.ring[(state.write_pos + i) % size];
            *byte = (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8;
        }
        Ok(())
    }
}

struct AnalyserState {
    ring: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    fft: FftResources,
    closed: bool,
}

impl AnalyserState {
    fn update_spectrum(&mut self, window: &[f32], smoothing: f32) -> Result<()> {
        let size = self.ring.len();
        for (i, (input, weight)) in self.fft.input.iter_mut().zip(window).enumerate() {
            *input = self.ring[(self.write_pos + i) % size] * weight;
        }

        self.fft
            .plan
            .process_with_scratch(&mut self.fft.input, &mut self.fft.spectrum, &mut self.fft.scratch)
            .map_err(|err| BeatscopeError::unavailable(format!("fft failed: {err}")))?;

        let norm = 1.0 / size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.fft.spectrum) {
            let magnitude = bin.norm() * norm;
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
        }
        Ok(())
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl fmt::Debug for LiveAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveAnalyser")
            .field("config", &self.config)
            .field("sample_rate", &self.sample_rate)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn blackman_window(len: usize) -> Vec<f32> {
    let a0 = 0.5 * (1.0 - BLACKMAN_ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * BLACKMAN_ALPHA;
    (0..len)
        .map(|n| {
            let x = n as f32 / len as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
