//! # Overtone CLI
//!
//! Terminal tuner front-end for the streaming pitch analyzer.
//!
//! ## Architecture
//! - **Analysis Thread**: owns the capture stream and the analyzer, turns raw
//!   audio frames into snapshots
//! - **Main Thread**: renders a one-line tuner read-out from the latest
//!   snapshot
//! - **Communication**: crossbeam channels; the snapshot channel is bounded
//!   at one so the display always sees the freshest frame

use std::collections::VecDeque;
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender};
use overtone_core::{audio, AnalysisSnapshot, AnalyzerConfig, PitchAnalyzer};

/// Display refresh interval.
const DISPLAY_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshots whose median dominant magnitude falls below this render as
/// "listening" instead of a note.
const MIN_DISPLAY_MAGNITUDE: f32 = 0.2;

/// Dominant magnitudes remembered for the median validity check.
const MAGNITUDE_HISTORY: usize = 9;

/// Analysis worker thread management structure.
struct AnalysisWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.thread_handle.take() {
            eprintln!("[MAIN] Waiting for analysis thread to finish...");
            let _ = handle.join();
        }
    }
}

fn main() -> Result<()> {
    let config = load_config()?;
    eprintln!(
        "[MAIN] frame={} padding={} window={:?} method={:?}",
        config.frame_size, config.padding_factor, config.window, config.method
    );

    let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded::<AnalysisSnapshot>(1);
    let worker = start_analysis(config, snapshot_tx);

    println!("Press Enter to quit.");
    let quit_rx = watch_stdin();
    run_display(snapshot_rx, quit_rx);

    worker.stop();
    Ok(())
}

/// Loads the analyzer configuration from the JSON file named on the command
/// line, or falls back to defaults.
fn load_config() -> Result<AnalyzerConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {path}"))?;
            let config = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config file {path}"))?;
            eprintln!("[MAIN] Loaded config from {path}");
            Ok(config)
        }
        None => Ok(AnalyzerConfig::default()),
    }
}

/// Spawns the dedicated analysis thread: capture stream, analyzer, and the
/// frame loop, with cycle-time accounting against the real-time budget.
fn start_analysis(config: AnalyzerConfig, snapshot_tx: Sender<AnalysisSnapshot>) -> AnalysisWorker {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let thread_handle = thread::spawn(move || {
        eprintln!("[ANALYSIS] Starting analysis thread...");
        let (raw_audio_tx, raw_audio_rx) = crossbeam_channel::unbounded::<Vec<f32>>();

        let (stream, sample_rate) =
            match audio::start_audio_capture(raw_audio_tx, config.frame_size) {
                Ok(tuple) => tuple,
                Err(e) => {
                    eprintln!("[ANALYSIS] Fatal error starting audio: {e}");
                    return;
                }
            };

        let mut analyzer = PitchAnalyzer::new(config, sample_rate as f32);
        // Wall-clock budget per frame at the negotiated rate
        let frame_budget =
            Duration::from_secs_f64(config.frame_size as f64 / sample_rate as f64);
        let mut average_cycle = Duration::ZERO;
        let mut last_overrun_warning = Instant::now();

        loop {
            crossbeam_channel::select! {
                recv(raw_audio_rx) -> msg => match msg {
                    Ok(audio_frame) => {
                        let started = Instant::now();
                        let snapshot = analyzer.process_frame(&audio_frame);
                        let elapsed = started.elapsed();

                        average_cycle = average_cycle.mul_f64(0.9) + elapsed.mul_f64(0.1);
                        if average_cycle > frame_budget
                            && last_overrun_warning.elapsed() > Duration::from_secs(1)
                        {
                            eprintln!(
                                "[ANALYSIS] Falling behind: {:.1} ms average against a {:.1} ms frame budget",
                                average_cycle.as_secs_f64() * 1000.0,
                                frame_budget.as_secs_f64() * 1000.0
                            );
                            last_overrun_warning = Instant::now();
                        }

                        // Dropped when the display has not consumed the
                        // previous snapshot yet
                        let _ = snapshot_tx.try_send(snapshot);
                    },
                    Err(_) => {
                        eprintln!("[ANALYSIS] Audio channel closed");
                        break;
                    },
                },
                recv(shutdown_rx) -> _ => {
                    eprintln!("[ANALYSIS] Received shutdown signal");
                    break;
                },
            }
        }

        if let Err(e) = stream.pause() {
            eprintln!("[ANALYSIS] Error pausing stream: {e}");
        }
        drop(stream);
        eprintln!("[ANALYSIS] Analysis thread finished");
    });

    AnalysisWorker {
        shutdown_tx,
        thread_handle: Some(thread_handle),
    }
}

/// Signals once stdin delivers a line (or closes).
fn watch_stdin() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = tx.send(());
    });
    rx
}

/// Tuner read-out state: exponential frequency smoothing plus a median
/// magnitude check so single noisy frames cannot flash a note.
#[derive(Default)]
struct DisplayState {
    smoothed_frequency: Option<f32>,
    recent_magnitudes: VecDeque<f32>,
}

impl DisplayState {
    fn observe(&mut self, snapshot: &AnalysisSnapshot) -> Option<f32> {
        let dominant = snapshot.candidates.first()?;

        if self.recent_magnitudes.len() == MAGNITUDE_HISTORY {
            self.recent_magnitudes.pop_front();
        }
        self.recent_magnitudes.push_back(dominant.magnitude);

        let frequency = match self.smoothed_frequency {
            // Smooth small jitter, jump on real note changes
            Some(previous) if (dominant.frequency / previous - 1.0).abs() < 0.05 => {
                previous * 0.8 + dominant.frequency * 0.2
            }
            _ => dominant.frequency,
        };
        self.smoothed_frequency = Some(frequency);

        if self.median_magnitude() < MIN_DISPLAY_MAGNITUDE {
            return None;
        }
        Some(frequency)
    }

    fn silent(&mut self) {
        self.smoothed_frequency = None;
        if self.recent_magnitudes.len() == MAGNITUDE_HISTORY {
            self.recent_magnitudes.pop_front();
        }
        self.recent_magnitudes.push_back(0.0);
    }

    fn median_magnitude(&self) -> f32 {
        if self.recent_magnitudes.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f32> = self.recent_magnitudes.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sorted[sorted.len() / 2]
    }
}

/// Renders the latest snapshot until quit is signalled or the analysis
/// thread goes away.
fn run_display(snapshot_rx: Receiver<AnalysisSnapshot>, quit_rx: Receiver<()>) {
    let mut state = DisplayState::default();
    let mut stdout = std::io::stdout();

    loop {
        crossbeam_channel::select! {
            recv(snapshot_rx) -> msg => match msg {
                Ok(snapshot) => {
                    if snapshot.candidates.is_empty() {
                        state.silent();
                    }
                    let line = render_line(&mut state, &snapshot);
                    let _ = write!(stdout, "\r\x1b[K{line}");
                    let _ = stdout.flush();
                    // Keep the refresh rate bounded even if analysis is fast
                    thread::sleep(DISPLAY_INTERVAL);
                },
                Err(_) => {
                    eprintln!("\n[MAIN] Analysis thread stopped");
                    break;
                },
            },
            recv(quit_rx) -> _ => {
                println!();
                break;
            },
        }
    }
}

fn render_line(state: &mut DisplayState, snapshot: &AnalysisSnapshot) -> String {
    let Some(frequency) = state.observe(snapshot) else {
        return String::from("  ...                  listening");
    };

    match overtone_core::tuning::frequency_to_note(frequency) {
        Some(reading) => format!(
            "  {:<4} {:>8.2} Hz  {:+6.1} cents  {}  [{} partials]",
            reading.name,
            frequency,
            reading.cents,
            cents_bar(reading.cents),
            snapshot.candidates.len()
        ),
        None => String::from("  ...                  listening"),
    }
}

/// A 21-column bar centered on zero cents, one column per ~5 cents.
fn cents_bar(cents: f32) -> String {
    const WIDTH: usize = 21;
    let center = WIDTH / 2;
    let offset = ((cents / 5.0).round() as i32 + center as i32).clamp(0, WIDTH as i32 - 1) as usize;
    let mut bar: Vec<char> = "-".repeat(WIDTH).chars().collect();
    bar[center] = '|';
    bar[offset] = if cents.abs() < 2.5 { '#' } else { '*' };
    bar.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use overtone_core::Peak;

    fn snapshot_with(frequency: f32, magnitude: f32) -> AnalysisSnapshot {
        AnalysisSnapshot {
            candidates: vec![Peak { frequency, magnitude }],
            ..AnalysisSnapshot::default()
        }
    }

    #[test]
    fn one_loud_frame_after_silence_is_not_displayed() {
        let mut state = DisplayState::default();
        for _ in 0..4 {
            state.silent();
        }
        // The magnitude median is still dominated by silence
        assert!(state.observe(&snapshot_with(440.0, 1.0)).is_none());
    }

    #[test]
    fn sustained_tone_is_displayed_and_smoothed() {
        let mut state = DisplayState::default();
        for _ in 0..5 {
            state.observe(&snapshot_with(440.0, 1.0));
        }
        let shown = state.observe(&snapshot_with(441.0, 1.0)).unwrap();
        assert!(shown > 440.0);
        assert!(shown < 441.0);
    }

    #[test]
    fn note_change_resets_the_smoother() {
        let mut state = DisplayState::default();
        for _ in 0..5 {
            state.observe(&snapshot_with(440.0, 1.0));
        }
        let shown = state.observe(&snapshot_with(660.0, 1.0)).unwrap();
        assert_eq!(shown, 660.0);
    }

    #[test]
    fn cents_bar_is_centered_when_in_tune() {
        let bar = cents_bar(0.0);
        assert_eq!(bar.len(), 21);
        assert_eq!(bar.chars().nth(10), Some('#'));
    }
}
