//! Inline rate conversion used by the output stage when a stream's format
//! doesn't match the device rate.
//!
//! `spec.md` §4.4 calls rate conversion "optional... does not change the
//! algorithms here" and treats an unresolved rate mismatch as fatal. This
//! project keeps the teacher's Rubato-based resampler (`audio-player::resample`,
//! originally a background thread feeding a `SharedAudio` queue) but
//! inlines it into a synchronous, per-packet converter the output stage
//! drives directly ahead of its own conversion matrix (`convert.rs`), so
//! that in practice the matrix almost never sees a rate mismatch — see
//! `DESIGN.md`'s Open Question entry. Same Rubato sinc parameters as the
//! teacher's stage; only the threading/queue plumbing around it changed.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    calculate_cutoff, Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::error::EngineError;

/// Input chunk size (in frames) the underlying sinc resampler is built
/// for; matches the teacher's default steady-state chunk size.
const CHUNK_FRAMES: usize = 1024;

/// Streaming sample-rate converter for interleaved `f32` PCM. Accumulates
/// partial input chunks across calls and emits whatever whole chunks of
/// output it can produce each time, so the output stage can feed it
/// packet-sized pushes without worrying about Rubato's fixed input size.
pub struct StreamResampler {
    resampler: Box<dyn Resampler<f32>>,
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
    input_pending: Vec<f32>,
    output_scratch: Vec<f32>,
}

impl StreamResampler {
    pub fn new(channels: usize, src_rate: u32, dst_rate: u32) -> Result<Self, EngineError> {
        let f_ratio = dst_rate as f64 / src_rate as f64;
        let sinc_len = 128;
        let oversampling_factor = 256;
        let interpolation = SincInterpolationType::Cubic;
        let window = WindowFunction::BlackmanHarris2;
        let f_cutoff = calculate_cutoff(sinc_len, window);

        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff,
            interpolation,
            oversampling_factor,
            window,
        };

        let resampler: Box<dyn Resampler<f32>> = Box::new(
            Async::<f32>::new_sinc(f_ratio, 1.1, &params, CHUNK_FRAMES, channels, FixedAsync::Input)
                .map_err(|e| EngineError::UnsupportedConversion(format!("resampler init: {e}")))?,
        );

        Ok(StreamResampler {
            resampler,
            channels,
            src_rate,
            dst_rate,
            input_pending: Vec::new(),
            output_scratch: vec![0.0f32; channels * CHUNK_FRAMES * 3],
        })
    }

    pub fn src_rate(&self) -> u32 {
        self.src_rate
    }

    pub fn dst_rate(&self) -> u32 {
        self.dst_rate
    }

    /// Feed interleaved input samples, returning every interleaved output
    /// sample the resampler can produce from whole chunks so far. Partial
    /// input is retained for the next call (or `flush`).
    pub fn process(&mut self, interleaved: &mut Vec<f32>) -> Result<Vec<f32>, EngineError> {
        self.input_pending.append(interleaved);
        let chunk_samples = CHUNK_FRAMES * self.channels;
        let mut produced = Vec::new();

        while self.input_pending.len() >= chunk_samples {
            let chunk: Vec<f32> = self.input_pending.drain(..chunk_samples).collect();
            let out = self.run_chunk(&chunk, None)?;
            produced.extend_from_slice(&out);
        }
        Ok(produced)
    }

    /// Run the last partial chunk (if any) through the resampler, for use
    /// at stream end / flush. Clears any pending input.
    pub fn flush(&mut self) -> Result<Vec<f32>, EngineError> {
        if self.input_pending.is_empty() {
            return Ok(Vec::new());
        }
        let tail_frames = self.input_pending.len() / self.channels;
        let mut chunk = std::mem::take(&mut self.input_pending);
        chunk.resize(CHUNK_FRAMES * self.channels, 0.0);
        let out = self.run_chunk(&chunk, Some(tail_frames))?;
        Ok(out)
    }

    fn run_chunk(&mut self, chunk: &[f32], partial_len: Option<usize>) -> Result<Vec<f32>, EngineError> {
        let input_adapter = InterleavedSlice::new(chunk, self.channels, CHUNK_FRAMES)
            .map_err(|e| EngineError::UnsupportedConversion(format!("resample input adapter: {e}")))?;

        let out_capacity_frames = self.output_scratch.len() / self.channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.output_scratch, self.channels, out_capacity_frames)
                .map_err(|e| EngineError::UnsupportedConversion(format!("resample output adapter: {e}")))?;

        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len,
        };

        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| EngineError::UnsupportedConversion(format!("resample process: {e}")))?;

        Ok(self.output_scratch[..nbr_out * self.channels].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rate_would_be_bypassed_by_the_caller() {
        // The output stage only constructs a StreamResampler when rates
        // differ; this just checks construction succeeds for a real ratio.
        let r = StreamResampler::new(2, 44_100, 48_000);
        assert!(r.is_ok());
    }

    #[test]
    fn process_accumulates_until_a_full_chunk_is_available() {
        let mut r = StreamResampler::new(1, 44_100, 48_000).unwrap();
        let mut small = vec![0.0f32; 16];
        let out = r.process(&mut small).unwrap();
        assert!(out.is_empty(), "a 16-sample push is far short of one chunk");
    }

    #[test]
    fn flush_drains_a_short_final_chunk() {
        let mut r = StreamResampler::new(1, 44_100, 48_000).unwrap();
        let mut small = vec![0.0f32; 100];
        let _ = r.process(&mut small).unwrap();
        let tail = r.flush().unwrap();
        assert!(tail.len() <= CHUNK_FRAMES * 4);
    }
}
