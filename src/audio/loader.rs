//! Audio file decoding using Symphonia.
//!
//! Supports WAV, MP3, FLAC, and AAC formats. Tracks are decoded at their
//! native sample rate and downmixed to mono before feature extraction.

use std::fs::File;
use std::io;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use thiserror::Error;

/// Errors that can occur while decoding a track.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to decode audio: {0}")]
    DecodeError(#[from] SymphoniaError),

    #[error("No audio track found in file")]
    NoAudioTrack,

    #[error("Unknown sample rate")]
    UnknownSampleRate,

    #[error("Audio file contains no samples")]
    Empty,
}

/// Decoded audio, interleaved.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples (f32, normalized to -1.0..1.0)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: usize,
}

impl AudioData {
    /// Duration of the audio in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Number of frames (samples per channel).
    pub fn num_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }
}

/// First audio track of a probed file, ready to decode.
struct TrackReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    buffer: Option<SampleBuffer<f32>>,
}

impl TrackReader {
    fn open(path: &Path) -> Result<Self, AudioError> {
        let source = MediaSourceStream::new(Box::new(File::open(path)?), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format = symphonia::default::get_probe()
            .format(
                &hint,
                source,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )?
            .format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(AudioError::NoAudioTrack)?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params.sample_rate.ok_or(AudioError::UnknownSampleRate)?;
        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels: params.channels.map_or(0, |c| c.count()),
            buffer: None,
        })
    }

    /// Next packet of this track, or `None` at end of stream.
    fn next_packet(&mut self) -> Result<Option<Packet>, AudioError> {
        loop {
            match self.format.next_packet() {
                Ok(packet) if packet.track_id() == self.track_id => return Ok(Some(packet)),
                Ok(_) => {}
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(None)
                }
                Err(SymphoniaError::ResetRequired) => self.decoder.reset(),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decode packets until the stream ends, handing each block of
    /// interleaved samples to `sink` with its channel count.
    fn decode_blocks(mut self, mut sink: impl FnMut(&[f32], usize)) -> Result<Stream, AudioError> {
        while let Some(packet) = self.next_packet()? {
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packets are dropped, the rest of the stream still decodes.
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            self.channels = spec.channels.count();
            let buffer = self
                .buffer
                .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
            buffer.copy_interleaved_ref(decoded);
            sink(buffer.samples(), self.channels);
        }

        Ok(Stream {
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

/// Format of a fully decoded stream.
struct Stream {
    sample_rate: u32,
    channels: usize,
}

/// Decode an audio file into interleaved samples.
///
/// Packets that fail to decode are skipped; any other decoder failure is
/// returned. A file that decodes to zero samples is [`AudioError::Empty`].
///
/// # Example
///
/// ```no_run
/// use phobz_segments::audio::loader::load_audio;
/// use std::path::Path;
///
/// let audio = load_audio(Path::new("song.mp3")).unwrap();
/// println!("{:.2}s @ {}Hz", audio.duration(), audio.sample_rate);
/// ```
pub fn load_audio(path: &Path) -> Result<AudioData, AudioError> {
    let mut samples = Vec::new();
    let stream = TrackReader::open(path)?
        .decode_blocks(|block, _| samples.extend_from_slice(block))?;

    if samples.is_empty() {
        return Err(AudioError::Empty);
    }

    Ok(AudioData {
        samples,
        sample_rate: stream.sample_rate,
        channels: stream.channels,
    })
}

/// Decode a file straight to mono at its native sample rate.
///
/// Channels are averaged block by block, so the interleaved stream is never
/// held in memory.
pub fn load_mono(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let mut mono = Vec::new();
    let stream = TrackReader::open(path)?.decode_blocks(|block, channels| {
        downmix_into(&mut mono, block, channels);
    })?;

    if mono.is_empty() {
        return Err(AudioError::Empty);
    }

    log::debug!(
        "Decoded {:?}: {} mono samples at {} Hz from {} channel(s)",
        path,
        mono.len(),
        stream.sample_rate,
        stream.channels
    );
    Ok((mono, stream.sample_rate))
}

/// Append the channel average of each interleaved frame in `block`.
fn downmix_into(mono: &mut Vec<f32>, block: &[f32], channels: usize) {
    if channels <= 1 {
        mono.extend_from_slice(block);
        return;
    }
    let scale = 1.0 / channels as f32;
    mono.extend(
        block
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
