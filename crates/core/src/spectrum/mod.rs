use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{audio::validate_source, AudioSource, Result};

/// Upper edges of the first five bands in Hz. The last band runs up to Nyquist.
const BAND_EDGES_HZ: [f32; 5] = [60.0, 250.0, 500.0, 2_000.0, 4_000.0];

/// Mean normalised magnitude per perceptual band, each within `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyBands {
    /// 20–60 Hz
    pub sub_bass: f32,
    /// 60–250 Hz
    pub bass: f32,
    /// 250–500 Hz
    pub low_mid: f32,
    /// 500–2000 Hz
    pub high_mid: f32,
    /// 2000–4000 Hz
    pub presence: f32,
    /// 4000 Hz up to Nyquist
    pub brilliance: f32,
}

impl FrequencyBands {
    /// Summarises a magnitude snapshot taken at `sample_rate`.
    pub fn from_spectrum(bins: &[u8], sample_rate: f32) -> Self {
        let ranges = BandRanges::for_source(sample_rate, bins.len());
        let [sub_bass, bass, low_mid, high_mid, presence, brilliance] =
            ranges.0.map(|range| mean_normalised(bins, range));
        Self {
            sub_bass,
            bass,
            low_mid,
            high_mid,
            presence,
            brilliance,
        }
    }

    pub fn as_array(&self) -> [f32; 6] {
        [
            self.sub_bass,
            self.bass,
            self.low_mid,
            self.high_mid,
            self.presence,
            self.brilliance,
        ]
    }
}

/// Bin index ranges of the six bands for a given source geometry.
///
/// The first band starts at bin 0 so the DC bin counts towards sub-bass. A
/// range may be empty when the bins are too coarse to resolve a band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandRanges(pub [Range<usize>; 6]);

impl BandRanges {
    pub fn for_source(sample_rate: f32, bin_count: usize) -> Self {
        let bin_width = sample_rate / 2.0 / bin_count as f32;
        let edges = BAND_EDGES_HZ.map(|hz| {
            let index = (hz / bin_width).floor();
            if index.is_finite() && index > 0.0 {
                (index as usize).min(bin_count)
            } else {
                0
            }
        });

        Self([
            0..edges[0],
            edges[0]..edges[1],
            edges[1]..edges[2],
            edges[2]..edges[3],
            edges[3]..edges[4],
            edges[4]..bin_count,
        ])
    }
}

fn mean_normalised(bins: &[u8], range: Range<usize>) -> f32 {
    let end = range.end.min(bins.len());
    if range.start >= end {
        return 0.0;
    }
    let slice = &bins[range.start..end];
    let sum: u32 = slice.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / slice.len() as f32 / 255.0
}

/// Turns live magnitude snapshots into band summaries and hands out raw
/// snapshots for full-resolution consumers.
#[derive(Debug)]
pub struct SpectrumSampler<S> {
    source: S,
    sample_rate: f32,
    spectrum: Vec<u8>,
    waveform: Vec<u8>,
}

impl<S: AudioSource> SpectrumSampler<S> {
    /// Fails with [`crate::BeatscopeError::InvalidSource`] when the source has
    /// no bins or no usable sample rate.
    pub fn new(source: S) -> Result<Self> {
        validate_source(&source)?;
        Ok(Self {
            sample_rate: source.sample_rate(),
            spectrum: vec![0; source.bin_count()],
            waveform: vec![128; source.time_domain_len()],
            source,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn bin_count(&self) -> usize {
        self.spectrum.len()
    }

    /// Reads a fresh snapshot and summarises it per band.
    pub fn get_frequency_bands(&mut self) -> Result<FrequencyBands> {
        self.source.read_frequency_data(&mut self.spectrum)?;
        Ok(FrequencyBands::from_spectrum(&self.spectrum, self.sample_rate))
    }

    /// Reads a fresh magnitude snapshot and returns it unmodified.
    pub fn get_full_spectrum(&mut self) -> Result<&[u8]> {
        self.source.read_frequency_data(&mut self.spectrum)?;
        Ok(&self.spectrum)
    }

    /// Reads a fresh time-domain snapshot and returns it unmodified.
    pub fn get_waveform(&mut self) -> Result<&[u8]> {
        self.source.read_time_domain_data(&mut self.waveform)?;
        Ok(&self.waveform)
    }
}
