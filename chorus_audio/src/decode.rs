//! Whole-stem decoding.
//!
//! Stems are a few minutes of audio at most, so the player decodes the
//! entire file up front into interleaved f32 samples. That keeps the trim
//! arithmetic exact (whole frames off the head) and leaves the playback
//! thread with nothing to do but feed the device.

use crate::AudioError;
use std::path::Path;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// One fully decoded stem, interleaved.
#[derive(Debug, Clone)]
pub(crate) struct DecodedStem {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedStem {
    /// Applies a flat gain reduction of `db` decibels.
    pub fn attenuate_db(&mut self, db: f32) {
        let gain = 10f32.powf(-db / 20.0);
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }

    /// Drops whole frames covering the first `ms` milliseconds.
    pub fn trim_head_ms(&mut self, ms: u64) {
        let frames = ms * self.sample_rate as u64 / 1000;
        let samples = (frames as usize).saturating_mul(self.channels as usize);
        if samples >= self.samples.len() {
            self.samples.clear();
        } else {
            self.samples.drain(..samples);
        }
    }
}

pub(crate) fn decode_stem(path: &Path) -> Result<DecodedStem, AudioError> {
    let decode_err = |source| AudioError::Decode {
        path: path.to_owned(),
        source,
    };

    let file = std::fs::File::open(path).map_err(|source| AudioError::OpenStem {
        path: path.to_owned(),
        source,
    })?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_err)?;
    let mut reader = probed.format;

    let track = reader
        .default_track()
        .ok_or_else(|| AudioError::NoAudioTrack(path.to_owned()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;

    let mut samples = Vec::new();
    let mut spec: Option<SignalSpec> = None;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            // Both are end-of-stream conditions for a plain file.
            Err(SymphoniaError::IoError(ref io))
                if io.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(source) => return Err(decode_err(source)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                log::debug!("skipping bad packet in {}: {reason}", path.display());
                continue;
            }
            Err(source) => return Err(decode_err(source)),
        };

        let this_spec = *decoded.spec();
        match spec {
            None => spec = Some(this_spec),
            // A mid-stream format change ends the usable part of the stem.
            Some(first) if first != this_spec => break,
            Some(_) => {}
        }

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, this_spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let spec = spec.ok_or_else(|| AudioError::NoAudioTrack(path.to_owned()))?;
    Ok(DecodedStem {
        samples,
        channels: spec.channels.count() as u16,
        sample_rate: spec.rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stem(samples: Vec<f32>, channels: u16, sample_rate: u32) -> DecodedStem {
        DecodedStem {
            samples,
            channels,
            sample_rate,
        }
    }

    #[test]
    fn attenuation_follows_the_decibel_law() {
        let mut s = stem(vec![1.0, -1.0, 0.5], 1, 48_000);
        s.attenuate_db(5.0);
        // -5 dB is a factor of 10^(-5/20).
        let expected = 10f32.powf(-0.25);
        assert!((s.samples[0] - expected).abs() < 1e-6);
        assert!((s.samples[1] + expected).abs() < 1e-6);
        assert!((s.samples[2] - 0.5 * expected).abs() < 1e-6);
    }

    #[test]
    fn head_trim_drops_whole_frames() {
        // 1 kHz stereo: one frame per millisecond, two samples per frame.
        let mut s = stem((0..20).map(|i| i as f32).collect(), 2, 1000);
        s.trim_head_ms(3);
        assert_eq!(s.samples.len(), 14);
        assert_eq!(s.samples[0], 6.0);
    }

    #[test]
    fn trimming_past_the_end_leaves_silence() {
        let mut s = stem(vec![0.0; 8], 2, 1000);
        s.trim_head_ms(60_000);
        assert!(s.samples.is_empty());
    }
}
