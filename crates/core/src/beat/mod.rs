//! Energy based onset detection with an adaptive threshold and a refractory
//! cooldown.
//!
//! Every snapshot is reduced to a total energy that is pushed into a bounded
//! history. A beat fires when the newest energy exceeds the history reference
//! scaled by the threshold multiplier, unless a beat already fired within the
//! cooldown.

use std::{collections::VecDeque, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    audio::validate_source, AudioSource, BeatConfig, Clock, ReferencePolicy, Result, SystemClock,
};

/// Outcome of one detection step. Energies are non-negative but not bounded
/// by one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatResult {
    pub is_beat: bool,
    pub energy: f32,
    pub bass_energy: f32,
    pub treble_energy: f32,
}

/// Mean energies of one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergy {
    pub total: f32,
    pub bass: f32,
    pub treble: f32,
}

/// Fixed-capacity FIFO of recent total energies.
#[derive(Debug, Clone)]
pub struct EnergyHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl EnergyHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, returning the evicted oldest one once full.
    pub fn push(&mut self, energy: f32) -> Option<f32> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(energy);
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    /// Mean where the i-th oldest sample has weight `i + 1`.
    pub fn weighted_mean(&self) -> f32 {
        let (sum, weights) = self
            .samples
            .iter()
            .enumerate()
            .fold((0.0f32, 0.0f32), |(sum, weights), (i, &energy)| {
                let weight = (i + 1) as f32;
                (sum + energy * weight, weights + weight)
            });
        if weights > 0.0 {
            sum / weights
        } else {
            0.0
        }
    }

    pub fn reference(&self, policy: ReferencePolicy) -> f32 {
        match policy {
            ReferencePolicy::Mean => self.mean(),
            ReferencePolicy::RecencyWeighted => self.weighted_mean(),
        }
    }
}

/// Detector state independent of any source: the energy history, the time
/// of the last confirmed beat and the tunables.
///
/// Hosts that already hold a snapshot for the frame can feed it through
/// [`BeatState::update`] instead of letting a [`BeatDetector`] read again.
#[derive(Debug, Clone)]
pub struct BeatState {
    config: BeatConfig,
    history: EnergyHistory,
    last_beat: Option<Duration>,
}

impl BeatState {
    pub fn new(config: BeatConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            history: EnergyHistory::new(config.history_len),
            last_beat: None,
            config,
        })
    }

    pub fn config(&self) -> &BeatConfig {
        &self.config
    }

    pub fn history(&self) -> &EnergyHistory {
        &self.history
    }

    pub fn last_beat(&self) -> Option<Duration> {
        self.last_beat
    }

    /// Forgets the history and the cooldown, keeping the tunables.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_beat = None;
    }

    /// `true` while a beat fired less than one cooldown before `now`. A beat
    /// stamped after `now` (the clock was rewound) does not hold the detector.
    pub fn is_cooling_down(&self, now: Duration) -> bool {
        self.last_beat
            .and_then(|last| now.checked_sub(last))
            .is_some_and(|elapsed| elapsed <= self.config.cooldown())
    }

    /// Mean total, bass and treble energy of a snapshot. Empty ranges yield 0.
    pub fn measure(&self, spectrum: &[u8]) -> BandEnergy {
        let bin_count = spectrum.len();
        let bass_end = (bin_count as f32 * self.config.bass_fraction).floor() as usize;
        let treble_start = (bin_count as f32 * self.config.treble_start_fraction).floor() as usize;
        let compression = self.config.compression;

        let mut energy = BandEnergy::default();
        for (i, &byte) in spectrum.iter().enumerate() {
            let value = compression.energy(f32::from(byte) / 255.0);
            energy.total += value;
            if i < bass_end {
                energy.bass += value;
            } else if i >= treble_start {
                energy.treble += value;
            }
        }

        energy.total = mean(energy.total, bin_count);
        energy.bass = mean(energy.bass, bass_end.min(bin_count));
        energy.treble = mean(energy.treble, bin_count.saturating_sub(treble_start));
        energy
    }

    /// Runs one detection step over `spectrum` observed at `now`.
    pub fn update(&mut self, spectrum: &[u8], now: Duration) -> BeatResult {
        let energy = self.measure(spectrum);
        self.history.push(energy.total);

        let reference = self.history.reference(self.config.reference);
        let onset = energy.total > reference * self.config.threshold_multiplier;
        let is_beat = onset && !self.is_cooling_down(now);
        if is_beat {
            self.last_beat = Some(now);
            tracing::trace!(energy = energy.total, reference, ?now, "beat");
        }

        BeatResult {
            is_beat,
            energy: energy.total,
            bass_energy: energy.bass,
            treble_energy: energy.treble,
        }
    }
}

fn mean(sum: f32, count: usize) -> f32 {
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Beat detector bound to a live source and a clock.
///
/// One instance per playback session; hosts needing several independent
/// detectors create one per consumer over the same shared source.
#[derive(Debug)]
pub struct BeatDetector<S, C = SystemClock> {
    source: S,
    clock: C,
    spectrum: Vec<u8>,
    state: BeatState,
}

impl<S: AudioSource> BeatDetector<S> {
    /// Creates a detector measuring cooldowns with the wall clock.
    pub fn new(source: S, config: BeatConfig) -> Result<Self> {
        Self::with_clock(source, config, SystemClock::new())
    }
}

impl<S: AudioSource, C: Clock> BeatDetector<S, C> {
    pub fn with_clock(source: S, config: BeatConfig, clock: C) -> Result<Self> {
        validate_source(&source)?;
        Ok(Self {
            spectrum: vec![0; source.bin_count()],
            state: BeatState::new(config)?,
            source,
            clock,
        })
    }

    /// Reads a fresh snapshot and decides whether it is a beat.
    ///
    /// A failed read is returned as is and leaves the history and cooldown
    /// untouched.
    pub fn detect_beat(&mut self) -> Result<BeatResult> {
        self.source.read_frequency_data(&mut self.spectrum)?;
        let now = self.clock.now();
        Ok(self.state.update(&self.spectrum, now))
    }

    /// Runs detection over a snapshot the caller already read this frame.
    pub fn detect_in(&mut self, spectrum: &[u8]) -> BeatResult {
        let now = self.clock.now();
        self.state.update(spectrum, now)
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn history_len(&self) -> usize {
        self.state.history().len()
    }

    pub fn is_cooling_down(&self) -> bool {
        self.state.is_cooling_down(self.clock.now())
    }

    pub fn config(&self) -> &BeatConfig {
        self.state.config()
    }

    pub fn state(&self) -> &BeatState {
        &self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{BeatscopeError, EnergyCompression, PlaybackClock, SnapshotSource};

    // 114/255 squared is ~0.2, 151/255 squared is ~0.35.
    const LOW: u8 = 114;
    const SPIKE: u8 = 151;

    fn detector(
        source: &SnapshotSource,
        config: BeatConfig,
    ) -> (BeatDetector<&SnapshotSource, PlaybackClock>, PlaybackClock) {
        let clock = PlaybackClock::new();
        let detector = BeatDetector::with_clock(source, config, clock.clone()).unwrap();
        (detector, clock)
    }

    fn step(
        detector: &mut BeatDetector<&SnapshotSource, PlaybackClock>,
        clock: &PlaybackClock,
        level: u8,
        millis: u64,
    ) -> BeatResult {
        clock.advance_millis(millis);
        detector.source().fill_frequency_data(level).unwrap();
        detector.detect_beat().unwrap()
    }

    #[test]
    fn spike_after_steady_warm_up_fires() {
        let source = SnapshotSource::new(128, 44_100.0);
        let config = BeatConfig::default()
            .with_threshold_multiplier(1.3)
            .with_history_len(43);
        let (mut detector, clock) = detector(&source, config);

        for _ in 0..43 {
            let result = step(&mut detector, &clock, LOW, 23);
            assert!(!result.is_beat);
            assert!((result.energy - 0.2).abs() < 0.001);
        }

        let spike = step(&mut detector, &clock, SPIKE, 23);
        assert!(spike.is_beat);
        assert!((spike.energy - 0.35).abs() < 0.001);
    }

    #[test]
    fn second_spike_within_cooldown_is_suppressed() {
        let source = SnapshotSource::new(128, 44_100.0);
        let config = BeatConfig::default()
            .with_threshold_multiplier(1.3)
            .with_cooldown_ms(250);
        let (mut detector, clock) = detector(&source, config);

        for _ in 0..10 {
            step(&mut detector, &clock, LOW, 16);
        }

        assert!(step(&mut detector, &clock, SPIKE, 16).is_beat);
        assert!(detector.is_cooling_down());

        let too_soon = step(&mut detector, &clock, SPIKE, 100);
        assert!(!too_soon.is_beat);

        clock.advance_millis(200);
        assert!(!detector.is_cooling_down());
    }

    #[test]
    fn rewound_clock_rearms_detector() {
        let source = SnapshotSource::new(128, 44_100.0);
        let (mut detector, clock) = detector(&source, BeatConfig::default());

        clock.advance_millis(60_000);
        for _ in 0..20 {
            step(&mut detector, &clock, LOW, 16);
        }
        assert!(step(&mut detector, &clock, SPIKE, 16).is_beat);

        clock.reset();
        assert!(!detector.is_cooling_down());
        for _ in 0..20 {
            step(&mut detector, &clock, LOW, 16);
        }
        assert!(step(&mut detector, &clock, SPIKE, 16).is_beat);
    }

    #[test]
    fn spike_fires_only_above_scaled_average() {
        // 121/255 squared is ~0.225, under 0.2 * 1.15; 125/255 squared is ~0.24, over it.
        let spike_result = |spike: u8| {
            let config = BeatConfig::default().with_threshold_multiplier(1.15);
            let mut state = BeatState::new(config).unwrap();
            let mut now = Duration::ZERO;
            for _ in 0..20 {
                now += Duration::from_millis(16);
                assert!(!state.update(&[LOW; 128], now).is_beat);
            }
            now += Duration::from_millis(16);
            state.update(&[spike; 128], now)
        };

        let below = spike_result(121);
        assert!((below.energy - 0.225).abs() < 0.001);
        assert!(!below.is_beat);

        let above = spike_result(125);
        assert!((above.energy - 0.240).abs() < 0.001);
        assert!(above.is_beat);
    }

    #[test]
    fn first_call_never_fires() {
        let source = SnapshotSource::new(64, 44_100.0);
        source.fill_frequency_data(255).unwrap();
        let (mut detector, _clock) = detector(&source, BeatConfig::default());

        let result = detector.detect_beat().unwrap();
        assert!(!result.is_beat);
        assert!((result.energy - 1.0).abs() < 1e-6);
    }

    #[test]
    fn splits_bass_and_treble_energy() {
        let source = SnapshotSource::new(128, 44_100.0);
        let mut bins = vec![0u8; 128];
        bins[..12].fill(255);
        source.set_frequency_data(&bins).unwrap();
        let (mut detector, _clock) = detector(&source, BeatConfig::default());

        let result = detector.detect_beat().unwrap();
        assert!((result.bass_energy - 1.0).abs() < 1e-6);
        assert_eq!(result.treble_energy, 0.0);
        assert!((result.energy - 12.0 / 128.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_ranges_yield_zero_not_nan() {
        let state = BeatState::new(BeatConfig::default()).unwrap();

        let energy = state.measure(&[255]);
        assert_eq!(energy.bass, 0.0);
        assert!((energy.treble - 1.0).abs() < 1e-6);

        let empty = state.measure(&[]);
        assert_eq!(empty, BandEnergy::default());
    }

    #[test]
    fn log_compression_lifts_quiet_material() {
        let linear = BeatState::new(BeatConfig::default()).unwrap();
        let log = BeatState::new(
            BeatConfig::default().with_compression(EnergyCompression::Logarithmic),
        )
        .unwrap();

        let bins = [128u8; 64];
        assert!(log.measure(&bins).total > linear.measure(&bins).total);
    }

    #[test]
    fn weighted_reference_favours_recent_samples() {
        let mut history = EnergyHistory::new(3);
        for energy in [1.0, 2.0, 3.0] {
            history.push(energy);
        }

        assert!((history.mean() - 2.0).abs() < 1e-6);
        assert!((history.weighted_mean() - 14.0 / 6.0).abs() < 1e-6);
        assert_eq!(history.push(4.0), Some(1.0));
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn failed_read_leaves_state_untouched() {
        let source = SnapshotSource::new(128, 44_100.0);
        let config = BeatConfig::default().with_threshold_multiplier(1.3);
        let (mut detector, clock) = detector(&source, config);

        for _ in 0..5 {
            step(&mut detector, &clock, LOW, 16);
        }
        let history: Vec<f32> = detector.state().history().iter().collect();

        source.set_available(false).unwrap();
        let err = detector.detect_beat().unwrap_err();
        assert!(matches!(err, BeatscopeError::AnalysisUnavailable(_)));
        assert_eq!(
            detector.state().history().iter().collect::<Vec<_>>(),
            history
        );
        assert_eq!(detector.state().last_beat(), None);

        source.set_available(true).unwrap();
        assert!(step(&mut detector, &clock, SPIKE, 16).is_beat);
    }

    #[test]
    fn reset_rearms_and_clears_history() {
        let source = SnapshotSource::new(128, 44_100.0);
        let (mut detector, clock) = detector(&source, BeatConfig::default());
        for _ in 0..5 {
            step(&mut detector, &clock, LOW, 16);
        }
        step(&mut detector, &clock, SPIKE, 16);

        detector.reset();
        assert_eq!(detector.history_len(), 0);
        assert!(!detector.is_cooling_down());
    }

    #[test]
    fn zero_bin_source_is_rejected() {
        let err = BeatDetector::new(SnapshotSource::new(0, 44_100.0), BeatConfig::default())
            .unwrap_err();
        assert!(matches!(err, BeatscopeError::InvalidSource(_)));
    }

    #[test]
    fn shared_snapshot_matches_own_read() {
        let source = SnapshotSource::new(32, 48_000.0);
        let mut bins = vec![0u8; 32];
        bins[3] = 200;
        source.set_frequency_data(&bins).unwrap();

        let (mut reading, _) = detector(&source, BeatConfig::default());
        let (mut fed, _) = detector(&source, BeatConfig::default());
        assert_eq!(reading.detect_beat().unwrap(), fed.detect_in(&bins));
    }

    fn fires_on_spike(low: u8, spike: u8, multiplier: f32) -> bool {
        let mut state =
            BeatState::new(BeatConfig::default().with_threshold_multiplier(multiplier)).unwrap();
        let mut now = Duration::ZERO;
        for _ in 0..20 {
            now += Duration::from_millis(16);
            state.update(&[low; 64], now);
        }
        now += Duration::from_millis(16);
        state.update(&[spike; 64], now).is_beat
    }

    proptest! {
        #[test]
        fn history_never_exceeds_capacity(
            capacity in 1usize..50,
            levels in prop::collection::vec(any::<u8>(), 0..200),
        ) {
            let mut state =
                BeatState::new(BeatConfig::default().with_history_len(capacity)).unwrap();
            let mut now = Duration::ZERO;
            for level in levels {
                now += Duration::from_millis(16);
                state.update(&[level; 32], now);
                prop_assert!(state.history().len() <= capacity);
            }
        }

        #[test]
        fn beats_are_separated_by_cooldown(
            cooldown_ms in 150u64..300,
            frames in prop::collection::vec((any::<u8>(), 1u64..120), 1..300),
        ) {
            let config = BeatConfig::default().with_cooldown_ms(cooldown_ms);
            let mut state = BeatState::new(config).unwrap();
            let mut now = Duration::ZERO;
            let mut previous: Option<Duration> = None;
            for (level, delta) in frames {
                now += Duration::from_millis(delta);
                if state.update(&[level; 32], now).is_beat {
                    if let Some(previous) = previous {
                        prop_assert!(now - previous >= Duration::from_millis(cooldown_ms));
                    }
                    previous = Some(now);
                }
            }
        }

        #[test]
        fn raising_threshold_never_adds_beats(
            low in 0u8..=255,
            spike in 0u8..=255,
            lower in 1.1f32..1.3,
            raise in 0.0f32..0.5,
        ) {
            let higher = lower + raise;
            if fires_on_spike(low, spike, higher) {
                prop_assert!(fires_on_spike(low, spike, lower));
            }
        }
    }
}
