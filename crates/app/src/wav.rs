use std::{f32::consts::PI, path::Path};

use beatscope_core::{BeatscopeError, Result};

/// Mono PCM in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }
}

/// Decodes a WAV file and averages its channels down to mono.
pub fn read_mono(path: &Path) -> Result<DecodedAudio> {
    let decode_err =
        |err: hound::Error| BeatscopeError::msg(format!("failed to decode {}: {err}", path.display()));

    let reader = hound::WavReader::open(path).map_err(decode_err)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(decode_err)?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    tracing::debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels,
        "decoded wav file"
    );
    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// Synthesises a kick drum every beat over a faint high hum. The first kick
/// lands after `offset_seconds`.
pub fn click_track(sample_rate: u32, bpm: f32, seconds: f32, offset_seconds: f32) -> DecodedAudio {
    let rate = sample_rate as f32;
    let total = (seconds * rate) as usize;
    let period = (60.0 / bpm.max(1.0) * rate) as usize;
    let offset = (offset_seconds * rate) as usize;
    let kick_len = (0.2 * rate) as usize;

    let mut samples: Vec<f32> = (0..total)
        .map(|i| 0.01 * (2.0 * PI * 3_000.0 * i as f32 / rate).sin())
        .collect();

    let mut start = offset;
    while start < total {
        let mut phase = 0.0f32;
        for (n, sample) in samples[start..total.min(start + kick_len)]
            .iter_mut()
            .enumerate()
        {
            let t = n as f32 / rate;
            let frequency = 50.0 + 100.0 * (-t / 0.03).exp();
            phase += 2.0 * PI * frequency / rate;
            *sample += 0.8 * (-t / 0.05).exp() * phase.sin();
        }
        start += period.max(1);
    }

    DecodedAudio {
        sample_rate,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmixes_stereo_integer_files() {
        let path = std::env::temp_dir().join(format!("beatscope-wav-{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(i16::MAX).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_mono(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.samples.len(), 10);
        assert!(audio.samples.iter().all(|s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_mono(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(format!("{err}").contains("not/here.wav"));
    }

    #[test]
    fn click_track_has_expected_length() {
        let audio = click_track(8_000, 120.0, 2.0, 0.0);
        assert_eq!(audio.samples.len(), 16_000);
        assert!((audio.duration_seconds() - 2.0).abs() < 1e-6);
        assert!(audio.samples[0..400].iter().any(|s| s.abs() > 0.3));
    }
}
