//! # Audio Capture Module
//!
//! Real-time microphone capture via CPAL. The stream callback slices incoming
//! audio into fixed-size frames and forwards them over a bounded channel; the
//! analysis thread drains the channel at its own pace, and frames dropped
//! under backpressure are simply lost rather than blocking the audio thread.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::Sender;

/// Default capture rate requested from the device.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Starts audio capture from the default input device.
///
/// `frame_size` is the number of samples per delivered frame and must match
/// the analyzer's configured frame size. Returns the live stream handle
/// (capture stops when it is dropped) and the negotiated sample rate.
pub fn start_audio_capture(
    sender: Sender<Vec<f32>>,
    frame_size: usize,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    eprintln!("[AUDIO] Using input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = clamp_sample_rate(&supported_config, TARGET_SAMPLE_RATE);
    let config = supported_config.with_sample_rate(cpal::SampleRate(sample_rate));
    let config: cpal::StreamConfig = config.into();

    eprintln!("[AUDIO] Capturing at {sample_rate} Hz, {frame_size}-sample frames");

    let err_fn = |err| eprintln!("[AUDIO] Stream error: {err}");

    // Accumulates callback deliveries until a full frame is available
    let mut pending = Vec::with_capacity(frame_size * 2);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            pending.extend_from_slice(data);
            while pending.len() >= frame_size {
                let frame = pending[..frame_size].to_vec();
                // Dropped on backpressure; never block the audio thread
                let _ = sender.try_send(frame);
                pending.drain(..frame_size);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks the input configuration closest to the target rate among mono f32
/// formats.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            min_diff.min(max_diff)
        })
}

/// The supported rate nearest the target within the config's range.
fn clamp_sample_rate(config: &SupportedStreamConfigRange, target_rate: u32) -> u32 {
    target_rate.clamp(config.min_sample_rate().0, config.max_sample_rate().0)
}
