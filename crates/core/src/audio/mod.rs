use std::sync::{Arc, Mutex, MutexGuard};

use crate::{BeatscopeError, Result};

/// Read-only view over a live spectral analyser owned by the host.
///
/// Implementations deliver byte snapshots on demand. Reading may advance the
/// source's analysis window (smoothing, for example), which is why the reads
/// take `&self` and rely on interior mutability where needed. The core never
/// writes into a source.
pub trait AudioSource {
    /// Number of frequency bins in a snapshot. Fixed for the source lifetime.
    fn bin_count(&self) -> usize;

    /// Sample rate of the analysed signal in Hz.
    fn sample_rate(&self) -> f32;

    /// Number of samples in a time-domain snapshot.
    fn time_domain_len(&self) -> usize {
        self.bin_count()
    }

    /// Fills `out` with the current magnitude of each frequency bin, scaled to
    /// `[0, 255]`. `out` is at most [`AudioSource::bin_count`] long.
    fn read_frequency_data(&self, out: &mut [u8]) -> Result<()>;

    /// Fills `out` with the current waveform, `128` being silence.
    fn read_time_domain_data(&self, out: &mut [u8]) -> Result<()>;
}

impl<T: AudioSource + ?Sized> AudioSource for &T {
    fn bin_count(&self) -> usize {
        (**self).bin_count()
    }

    fn sample_rate(&self) -> f32 {
        (**self).sample_rate()
    }

    fn time_domain_len(&self) -> usize {
        (**self).time_domain_len()
    }

    fn read_frequency_data(&self, out: &mut [u8]) -> Result<()> {
        (**self).read_frequency_data(out)
    }

    fn read_time_domain_data(&self, out: &mut [u8]) -> Result<()> {
        (**self).read_time_domain_data(out)
    }
}

impl<T: AudioSource + ?Sized> AudioSource for Arc<T> {
    fn bin_count(&self) -> usize {
        (**self).bin_count()
    }

    fn sample_rate(&self) -> f32 {
        (**self).sample_rate()
    }

    fn time_domain_len(&self) -> usize {
        (**self).time_domain_len()
    }

    fn read_frequency_data(&self, out: &mut [u8]) -> Result<()> {
        (**self).read_frequency_data(out)
    }

    fn read_time_domain_data(&self, out: &mut [u8]) -> Result<()> {
        (**self).read_time_domain_data(out)
    }
}

/// Rejects sources that cannot back an analyser.
pub fn validate_source<S: AudioSource + ?Sized>(source: &S) -> Result<()> {
    if source.bin_count() == 0 {
        return Err(BeatscopeError::invalid_source("source reports zero bins"));
    }
    let sample_rate = source.sample_rate();
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(BeatscopeError::invalid_source(format!(
            "sample rate must be positive, got {sample_rate}"
        )));
    }
    Ok(())
}

/// Source backed by snapshots injected from the outside.
///
/// Useful when the host already runs its own FFT and for driving the
/// analysers from synthetic data.
pub struct SnapshotSource {
    bin_count: usize,
    sample_rate: f32,
    state: Mutex<SnapshotState>,
}

#[derive(Debug)]
struct SnapshotState {
    frequency: Vec<u8>,
    time_domain: Vec<u8>,
    available: bool,
}

impl SnapshotSource {
    /// Creates a silent source. Validation happens when a component wraps it.
    pub fn new(bin_count: usize, sample_rate: f32) -> Self {
        Self {
            bin_count,
            sample_rate,
            state: Mutex::new(SnapshotState {
                frequency: vec![0; bin_count],
                time_domain: vec![128; bin_count],
                available: true,
            }),
        }
    }

    /// Replaces the frequency snapshot. Shorter input is zero padded, longer
    /// input is truncated to the bin count.
    pub fn set_frequency_data(&self, bins: &[u8]) -> Result<()> {
        let mut state = self.lock()?;
        copy_padded(&mut state.frequency, bins, 0);
        Ok(())
    }

    /// Sets every bin to the same magnitude.
    pub fn fill_frequency_data(&self, value: u8) -> Result<()> {
        let mut state = self.lock()?;
        state.frequency.fill(value);
        Ok(())
    }

    /// Replaces the waveform snapshot, padding with silence.
    pub fn set_time_domain_data(&self, samples: &[u8]) -> Result<()> {
        let mut state = self.lock()?;
        copy_padded(&mut state.time_domain, samples, 128);
        Ok(())
    }

    /// Marks the source as (un)able to deliver snapshots.
    pub fn set_available(&self, available: bool) -> Result<()> {
        let mut state = self.lock()?;
        state.available = available;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SnapshotState>> {
        self.state
            .lock()
            .map_err(|_| BeatscopeError::unavailable("snapshot source has been poisoned"))
    }

    fn available_state(&self) -> Result<MutexGuard<'_, SnapshotState>> {
        let state = self.lock()?;
        if state.available {
            Ok(state)
        } else {
            Err(BeatscopeError::unavailable("snapshot source is not available"))
        }
    }
}

impl AudioSource for SnapshotSource {
    fn bin_count(&self) -> usize {
        self.bin_count
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn read_frequency_data(&self, out: &mut [u8]) -> Result<()> {
        let state = self.available_state()?;
        let len = out.len().min(state.frequency.len());
        out[..len].copy_from_slice(&state.frequency[..len]);
        Ok(())
    }

    fn read_time_domain_data(&self, out: &mut [u8]) -> Result<()> {
        let state = self.available_state()?;
        let len = out.len().min(state.time_domain.len());
        out[..len].copy_from_slice(&state.time_domain[..len]);
        Ok(())
    }
}

impl std::fmt::Debug for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSource")
            .field("bin_count", &self.bin_count)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

fn copy_padded(dst: &mut [u8], src: &[u8], fill: u8) {
    let len = dst.len().min(src.len());
    dst[..len].copy_from_slice(&src[..len]);
    dst[len..].fill(fill);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_sources() {
        let err = validate_source(&SnapshotSource::new(0, 44_100.0)).unwrap_err();
        assert!(matches!(err, BeatscopeError::InvalidSource(_)));

        assert!(validate_source(&SnapshotSource::new(128, 0.0)).is_err());
        assert!(validate_source(&SnapshotSource::new(128, f32::NAN)).is_err());
        assert!(validate_source(&SnapshotSource::new(128, 44_100.0)).is_ok());
    }

    #[test]
    fn snapshots_are_padded_and_shared_through_arc() {
        let source = Arc::new(SnapshotSource::new(4, 48_000.0));
        source.set_frequency_data(&[9, 8]).unwrap();
        source.set_time_domain_data(&[0]).unwrap();

        let shared: Arc<SnapshotSource> = source.clone();
        let mut bins = [1u8; 4];
        shared.read_frequency_data(&mut bins).unwrap();
        assert_eq!(bins, [9, 8, 0, 0]);

        let mut wave = [0u8; 4];
        shared.read_time_domain_data(&mut wave).unwrap();
        assert_eq!(wave, [0, 128, 128, 128]);
    }

    #[test]
    fn unavailable_source_fails_reads() {
        let source = SnapshotSource::new(8, 48_000.0);
        source.set_available(false).unwrap();

        let mut bins = [0u8; 8];
        let err = source.read_frequency_data(&mut bins).unwrap_err();
        assert!(err.is_recoverable());
    }
}
