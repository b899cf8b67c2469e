//! Audio extraction to MP3.
//!
//! [`Converter`] is the seam between the dispatcher and the media library:
//! the dispatcher only knows it can turn one [`ConversionJob`] into a result.
//! [`Mp3Converter`] is the FFmpeg-backed implementation, built on
//! [`extract_mp3`].
//!
//! # Example
//!
//! ```no_run
//! use mp4_to_mp3::{AudioOptions, ConversionJob, Converter, Mp3Converter};
//!
//! let converter = Mp3Converter::new(AudioOptions::new().with_bit_rate(192_000));
//! converter.convert(&ConversionJob::new("talk.mp4"))?;
//! # Ok::<(), mp4_to_mp3::ConversionError>(())
//! ```

use std::{fs, path::Path};

use ffmpeg_next::{
    ChannelLayout, Error as FfmpegError, Packet, Rational,
    codec::{Id, context::Context as CodecContext},
    decoder::Audio as AudioDecoder,
    encoder::Audio as AudioEncoder,
    format::{Sample, context::Output, sample::Type as SampleType},
    frame::Audio as AudioFrame,
    media::Type,
    software::resampling::Context as ResamplingContext,
};

use crate::{config::AudioOptions, error::ConversionError, job::ConversionJob};

/// Container name FFmpeg uses for the MP3 muxer.
const MP3_CONTAINER: &str = "mp3";

/// Converts one job's input into its output file.
///
/// Implementations are shared by every worker thread, so they must be
/// [`Send`] and [`Sync`] and must not rely on per-call mutable state.
pub trait Converter: Send + Sync {
    fn convert(&self, job: &ConversionJob) -> Result<(), ConversionError>;
}

/// Extracts the best audio stream of each input and encodes it as MP3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp3Converter {
    options: AudioOptions,
}

impl Mp3Converter {
    pub fn new(options: AudioOptions) -> Self {
        Self { options }
    }
}

impl Converter for Mp3Converter {
    fn convert(&self, job: &ConversionJob) -> Result<(), ConversionError> {
        extract_mp3(&job.input, &job.output, &self.options)
    }
}

/// Extract the best audio stream of `input` into an MP3 file at `output`.
///
/// An existing file at `output` is overwritten. If encoding fails after the
/// output was created, the partial file is removed. Audio packets the
/// decoder rejects are logged and skipped, so a slightly damaged input still
/// converts; only [`FfmpegError::Eof`] from the decoder is fatal.
///
/// # Errors
///
/// - [`ConversionError::FileOpen`] if `input` is missing or not a media file.
/// - [`ConversionError::NoAudioStream`] if `input` has no audio.
/// - [`ConversionError::UnsupportedEncoder`] if FFmpeg lacks an MP3 encoder.
/// - [`ConversionError::AudioDecode`] / [`ConversionError::AudioEncode`] if
///   transcoding fails part way.
pub fn extract_mp3(
    input: &Path,
    output: &Path,
    options: &AudioOptions,
) -> Result<(), ConversionError> {
    log::debug!("Extracting audio {} -> {}", input.display(), output.display());

    ffmpeg_next::init().map_err(|error| ConversionError::FileOpen {
        path: input.to_path_buf(),
        reason: format!("FFmpeg initialisation failed: {error}"),
    })?;

    let mut input_context =
        ffmpeg_next::format::input(&input).map_err(|error| ConversionError::FileOpen {
            path: input.to_path_buf(),
            reason: error.to_string(),
        })?;

    let (audio_stream_index, codec_parameters) = {
        let stream = input_context
            .streams()
            .best(Type::Audio)
            .ok_or_else(|| ConversionError::NoAudioStream(input.to_path_buf()))?;
        (stream.index(), stream.parameters())
    };

    let decoder_context = CodecContext::from_parameters(codec_parameters)?;
    let mut decoder = decoder_context
        .decoder()
        .audio()
        .map_err(|error| ConversionError::AudioDecode(error.to_string()))?;

    let (encoder, encoder_time_base) = create_mp3_encoder(&decoder, options)?;

    let mut output_context = ffmpeg_next::format::output_as(&output, MP3_CONTAINER)
        .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;

    let result = (|| -> Result<(), ConversionError> {
        {
            let codec = encoder.codec().ok_or(ConversionError::UnsupportedEncoder)?;
            let mut output_stream = output_context.add_stream(codec)?;
            output_stream.set_parameters(&encoder);
            output_stream.set_time_base(encoder_time_base);
        }

        output_context
            .write_header()
            .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;

        // The muxer may pick its own time base during write_header.
        let stream_time_base = output_context
            .stream(0)
            .map(|stream| stream.time_base())
            .unwrap_or(encoder_time_base);

        let mut pipeline = EncodePipeline::new(
            &decoder,
            encoder,
            encoder_time_base,
            stream_time_base,
        )?;

        for (stream, packet) in input_context.packets() {
            if stream.index() != audio_stream_index {
                continue;
            }
            match decoder.send_packet(&packet) {
                Ok(()) => {}
                Err(FfmpegError::Eof) => {
                    return Err(ConversionError::AudioDecode(FfmpegError::Eof.to_string()));
                }
                Err(error) => {
                    log::warn!("Skipping undecodable packet in {}: {error}", input.display());
                    continue;
                }
            }
            pipeline.drain_decoder(&mut decoder, &mut output_context, input)?;
        }

        let _ = decoder.send_eof();
        pipeline.drain_decoder(&mut decoder, &mut output_context, input)?;
        pipeline.finish(&mut output_context)?;

        output_context
            .write_trailer()
            .map_err(|error| ConversionError::AudioEncode(error.to_string()))
    })();

    drop(output_context);
    if result.is_err() {
        log::debug!("Removing partial output {}", output.display());
        let _ = fs::remove_file(output);
    }
    result
}

/// Open an MP3 encoder matching the decoder's audio as closely as the
/// encoder allows.
fn create_mp3_encoder(
    decoder: &AudioDecoder,
    options: &AudioOptions,
) -> Result<(AudioEncoder, Rational), ConversionError> {
    let codec = ffmpeg_next::encoder::find(Id::MP3).ok_or(ConversionError::UnsupportedEncoder)?;
    let audio_codec = codec
        .audio()
        .map_err(|_| ConversionError::UnsupportedEncoder)?;

    let sample_format = audio_codec
        .formats()
        .and_then(|mut formats| formats.next())
        .unwrap_or(Sample::I16(SampleType::Planar));

    let supported_rates: Vec<u32> = audio_codec
        .rates()
        .map(|rates| rates.filter(|&rate| rate > 0).map(|rate| rate as u32).collect())
        .unwrap_or_default();
    let sample_rate = pick_sample_rate(decoder.rate(), &supported_rates);
    let channel_layout = output_channel_layout(decoder.channel_layout());

    log::debug!(
        "MP3 encoder: {:?} @ {} Hz, {} ch, {} bit/s",
        sample_format,
        sample_rate,
        channel_layout.channels(),
        options.bit_rate
    );

    let mut encoder_context = CodecContext::new()
        .encoder()
        .audio()
        .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;

    let time_base = Rational(1, sample_rate as i32);
    encoder_context.set_rate(sample_rate as i32);
    encoder_context.set_channel_layout(channel_layout);
    encoder_context.set_format(sample_format);
    encoder_context.set_time_base(time_base);
    encoder_context.set_bit_rate(options.bit_rate);

    let encoder = encoder_context
        .open_as(codec)
        .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;

    Ok((encoder, time_base))
}

/// Keep `input` if the encoder accepts it, otherwise the nearest supported
/// rate (ties go to the higher rate). An empty list means "anything goes".
pub(crate) fn pick_sample_rate(input: u32, supported: &[u32]) -> u32 {
    if supported.is_empty() || supported.contains(&input) {
        return input;
    }
    supported
        .iter()
        .copied()
        .min_by_key(|&rate| (rate.abs_diff(input), u32::MAX - rate))
        .unwrap_or(input)
}

/// MP3 carries at most two channels; anything wider, or an unknown layout,
/// is downmixed to stereo.
pub(crate) fn output_channel_layout(input: ChannelLayout) -> ChannelLayout {
    if input.is_empty() || input.channels() > 2 {
        ChannelLayout::STEREO
    } else {
        input
    }
}

/// Whether a decoder error only means "no frame right now".
pub(crate) fn is_drained(error: &FfmpegError) -> bool {
    match error {
        FfmpegError::Eof => true,
        FfmpegError::Other { errno } => *errno == ffmpeg_next::util::error::EAGAIN,
        _ => false,
    }
}

/// Decoded frames → resampler → fixed-size frames → encoder → muxer.
struct EncodePipeline {
    resampler: ResamplingContext,
    encoder: AudioEncoder,
    buffer: SampleBuffer,
    format: Sample,
    layout: ChannelLayout,
    rate: u32,
    /// Samples per encoder frame; 0 if the encoder takes any size.
    frame_size: usize,
    samples_written: i64,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    decoded: AudioFrame,
    packet: Packet,
}

impl EncodePipeline {
    fn new(
        decoder: &AudioDecoder,
        encoder: AudioEncoder,
        encoder_time_base: Rational,
        stream_time_base: Rational,
    ) -> Result<Self, ConversionError> {
        let format = encoder.format();
        let layout = encoder.channel_layout();
        let rate = encoder.rate();

        let resampler = ResamplingContext::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            format,
            layout,
            rate,
        )
        .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;

        let planes = if format.is_planar() {
            layout.channels().max(1) as usize
        } else {
            1
        };
        let bytes_per_sample = if format.is_planar() {
            format.bytes()
        } else {
            format.bytes() * layout.channels().max(1) as usize
        };

        Ok(Self {
            resampler,
            frame_size: encoder.frame_size() as usize,
            encoder,
            buffer: SampleBuffer::new(planes, bytes_per_sample),
            format,
            layout,
            rate,
            samples_written: 0,
            encoder_time_base,
            stream_time_base,
            decoded: AudioFrame::empty(),
            packet: Packet::empty(),
        })
    }

    /// Pull every frame the decoder has ready and push it downstream.
    ///
    /// Stops when the decoder wants more input or is drained. A decode error
    /// is logged against `source` and ends this round without failing the job.
    fn drain_decoder(
        &mut self,
        decoder: &mut AudioDecoder,
        output: &mut Output,
        source: &Path,
    ) -> Result<(), ConversionError> {
        loop {
            match decoder.receive_frame(&mut self.decoded) {
                Ok(()) => {
                    let mut resampled = AudioFrame::empty();
                    self.resampler
                        .run(&self.decoded, &mut resampled)
                        .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;
                    self.push(&resampled, output)?;
                }
                Err(error) if is_drained(&error) => return Ok(()),
                Err(error) => {
                    log::warn!("Error while decoding {}: {error}", source.display());
                    return Ok(());
                }
            }
        }
    }

    /// Buffer a resampled frame and encode every full encoder frame.
    fn push(&mut self, frame: &AudioFrame, output: &mut Output) -> Result<(), ConversionError> {
        let samples = frame.samples();
        if samples == 0 {
            return Ok(());
        }

        let length = samples * self.buffer.bytes_per_sample();
        let planes: Vec<&[u8]> = (0..self.buffer.plane_count())
            .map(|plane| &frame.data(plane)[..length])
            .collect();
        self.buffer.push(&planes);

        let chunk = if self.frame_size == 0 {
            self.buffer.len()
        } else {
            self.frame_size
        };
        while self.buffer.len() >= chunk {
            self.encode_buffered(chunk, output)?;
        }
        Ok(())
    }

    fn encode_buffered(&mut self, samples: usize, output: &mut Output) -> Result<(), ConversionError> {
        let planes = self.buffer.take(samples);
        let taken = planes
            .first()
            .map_or(0, |plane| plane.len() / self.buffer.bytes_per_sample());
        if taken == 0 {
            return Ok(());
        }

        let mut frame = AudioFrame::new(self.format, taken, self.layout);
        frame.set_rate(self.rate);
        for (index, plane) in planes.iter().enumerate() {
            frame.data_mut(index)[..plane.len()].copy_from_slice(plane);
        }
        frame.set_pts(Some(self.samples_written));
        self.samples_written += taken as i64;

        self.encoder
            .send_frame(&frame)
            .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;
        self.write_packets(output)
    }

    fn write_packets(&mut self, output: &mut Output) -> Result<(), ConversionError> {
        while self.encoder.receive_packet(&mut self.packet).is_ok() {
            self.packet.set_stream(0);
            self.packet
                .rescale_ts(self.encoder_time_base, self.stream_time_base);
            self.packet
                .write_interleaved(output)
                .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;
        }
        Ok(())
    }

    /// Flush the resampler tail, encode the final short frame and drain the
    /// encoder.
    fn finish(&mut self, output: &mut Output) -> Result<(), ConversionError> {
        if let Some(delay) = self.resampler.delay()
            && delay.output > 0
        {
            let mut tail = AudioFrame::new(self.format, delay.output as usize, self.layout);
            tail.set_rate(self.rate);
            self.resampler
                .flush(&mut tail)
                .map_err(|error| ConversionError::AudioEncode(error.to_string()))?;
            self.push(&tail, output)?;
        }

        while !self.buffer.is_empty() {
            let remaining = self.buffer.len();
            self.encode_buffered(remaining, output)?;
        }

        let _ = self.encoder.send_eof();
        self.write_packets(output)
    }
}

/// FIFO of raw sample bytes, one byte vector per plane.
///
/// Decoders and encoders disagree on frame sizes (AAC decodes 1024 samples,
/// MP3 encodes 1152), so samples are regrouped here between the two.
#[derive(Debug)]
pub(crate) struct SampleBuffer {
    planes: Vec<Vec<u8>>,
    /// Bytes one sample occupies within a single plane.
    bytes_per_sample: usize,
}

impl SampleBuffer {
    pub(crate) fn new(plane_count: usize, bytes_per_sample: usize) -> Self {
        Self {
            planes: vec![Vec::new(); plane_count.max(1)],
            bytes_per_sample: bytes_per_sample.max(1),
        }
    }

    pub(crate) fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub(crate) fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    /// Samples currently buffered.
    pub(crate) fn len(&self) -> usize {
        self.planes[0].len() / self.bytes_per_sample
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one frame's worth of plane data. Extra planes are ignored.
    pub(crate) fn push(&mut self, planes: &[&[u8]]) {
        for (buffered, incoming) in self.planes.iter_mut().zip(planes) {
            buffered.extend_from_slice(incoming);
        }
    }

    /// Remove up to `samples` samples from the front of every plane.
    pub(crate) fn take(&mut self, samples: usize) -> Vec<Vec<u8>> {
        let length = samples.min(self.len()) * self.bytes_per_sample;
        self.planes
            .iter_mut()
            .map(|plane| plane.drain(..length).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_kept_when_supported() {
        assert_eq!(pick_sample_rate(44_100, &[32_000, 44_100, 48_000]), 44_100);
        assert_eq!(pick_sample_rate(96_000, &[]), 96_000);
    }

    #[test]
    fn sample_rate_falls_back_to_nearest() {
        let mp3_rates = [44_100, 48_000, 32_000, 22_050, 24_000, 16_000, 11_025, 12_000, 8_000];
        assert_eq!(pick_sample_rate(96_000, &mp3_rates), 48_000);
        assert_eq!(pick_sample_rate(7_000, &mp3_rates), 8_000);
        assert_eq!(pick_sample_rate(46_050, &[44_100, 48_000]), 48_000);
    }

    #[test]
    fn wide_layouts_are_downmixed() {
        assert_eq!(output_channel_layout(ChannelLayout::MONO), ChannelLayout::MONO);
        assert_eq!(output_channel_layout(ChannelLayout::STEREO), ChannelLayout::STEREO);
        assert_eq!(output_channel_layout(ChannelLayout::_5POINT1), ChannelLayout::STEREO);
    }

    #[test]
    fn only_eof_and_eagain_count_as_drained() {
        assert!(is_drained(&FfmpegError::Eof));
        assert!(is_drained(&FfmpegError::Other {
            errno: ffmpeg_next::util::error::EAGAIN,
        }));
        assert!(!is_drained(&FfmpegError::InvalidData));
    }

    #[test]
    fn sample_buffer_regroups_planar_data() {
        // Two planes, 2 bytes per sample.
        let mut buffer = SampleBuffer::new(2, 2);
        buffer.push(&[&[1, 1, 2, 2, 3, 3], &[9, 9, 8, 8, 7, 7]]);
        assert_eq!(buffer.len(), 3);

        let first = buffer.take(2);
        assert_eq!(first, vec![vec![1, 1, 2, 2], vec![9, 9, 8, 8]]);
        assert_eq!(buffer.len(), 1);

        buffer.push(&[&[4, 4], &[6, 6]]);
        let rest = buffer.take(10);
        assert_eq!(rest, vec![vec![3, 3, 4, 4], vec![7, 7, 6, 6]]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn sample_buffer_packed_single_plane() {
        // One interleaved plane, stereo 16-bit: 4 bytes per sample.
        let mut buffer = SampleBuffer::new(1, 4);
        buffer.push(&[&[0; 4 * 1152]]);
        buffer.push(&[&[0; 4 * 100]]);
        assert_eq!(buffer.len(), 1252);
        assert_eq!(buffer.take(1152)[0].len(), 4 * 1152);
        assert_eq!(buffer.len(), 100);
    }
}
