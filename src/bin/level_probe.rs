//! Microphone level probe: captures a few seconds of audio through the real
//! input device and prints a per-frame RMS meter. Useful for verifying
//! device access and capture-path health without a voice service.

use hearth_voice::audio::provider::{AudioCapabilityProvider, CpalProvider};
use hearth_voice::audio::{CaptureFrame, MicSession};
use hearth_voice::VoiceConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const PROBE_SECONDS: u64 = 5;
const METER_WIDTH: usize = 40;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run().await {
        eprintln!("level-probe failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> hearth_voice::Result<()> {
    let config = VoiceConfig::from_env();
    let provider: Arc<dyn AudioCapabilityProvider> =
        Arc::new(CpalProvider::new(&config.audio));

    println!(
        "capturing {PROBE_SECONDS}s at {} Hz (native input {} Hz)",
        config.audio.capture_sample_rate,
        provider.input_sample_rate()?
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<CaptureFrame>(64);
    let mut mic = MicSession::new(Arc::clone(&provider));
    // No playback runs during the probe, so there is no echo to cancel.
    mic.start(config.audio.capture_sample_rate, None, tx)?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(PROBE_SECONDS);
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                print_meter(frame.rms);
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }

    mic.stop();
    println!("done");
    Ok(())
}

fn print_meter(rms: f32) {
    // Full scale at 0.5 RMS; normal speech sits well below that.
    let filled = ((rms * 2.0).clamp(0.0, 1.0) * METER_WIDTH as f32) as usize;
    let bar: String = "#".repeat(filled) + &" ".repeat(METER_WIDTH - filled);
    println!("[{bar}] rms={rms:.4}");
}
