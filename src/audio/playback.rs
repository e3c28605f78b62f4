//! Gapless playback scheduling for inbound synthesized speech.
//!
//! Chunks arrive from the network at arbitrary sizes and timing; the
//! scheduler appends them to the output in strict arrival order and
//! tracks a running "next available time" cursor so consecutive chunks
//! neither gap nor overlap.

use crate::audio::aec::ReferenceHandle;
use crate::audio::provider::PlaybackSink;
use crate::error::{Result, VoiceError};
use std::time::{Duration, Instant};
use tracing::info;

/// One scheduled playback unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledUnit {
    /// When the unit begins playing.
    pub start: Instant,
    /// Audible length of the unit.
    pub duration: Duration,
    /// Number of mono samples in the unit.
    pub samples: usize,
}

impl ScheduledUnit {
    /// When the unit finishes playing.
    pub fn end(&self) -> Instant {
        self.start + self.duration
    }
}

/// Schedules inbound PCM chunks for gapless, low-latency output.
///
/// The output rate is fixed at construction; no resampling or format
/// negotiation happens here. All methods run on the control loop, so the
/// cursor needs no locking beyond loop-level serialization.
pub struct PlaybackScheduler {
    sink: Option<Box<dyn PlaybackSink>>,
    sample_rate: u32,
    lookahead: Duration,
    next_available: Option<Instant>,
    scheduled: Vec<ScheduledUnit>,
    reference: Option<ReferenceHandle>,
}

impl PlaybackScheduler {
    /// Create a scheduler over the given sink at a fixed sample rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate is zero.
    pub fn new(sink: Box<dyn PlaybackSink>, sample_rate: u32, lookahead: Duration) -> Result<Self> {
        if sample_rate == 0 {
            return Err(VoiceError::Config("sample rate must be greater than 0".into()));
        }
        Ok(Self {
            sink: Some(sink),
            sample_rate,
            lookahead,
            next_available: None,
            scheduled: Vec::new(),
            reference: None,
        })
    }

    /// Mirror scheduled samples into an echo-cancellation reference
    /// buffer so the capture path can subtract them.
    pub fn set_reference(&mut self, reference: ReferenceHandle) {
        self.reference = Some(reference);
    }

    /// Decode a signed 16-bit little-endian chunk and schedule it.
    ///
    /// The unit starts at `max(next_available, now + lookahead)` and the
    /// cursor advances by its duration, so arrival order is playback
    /// order with no overlap.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Protocol`] for an odd-length chunk and
    /// [`VoiceError::Audio`] after `close`.
    pub fn play_chunk(&mut self, bytes: &[u8]) -> Result<ScheduledUnit> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| VoiceError::Audio("playback scheduler closed".into()))?;

        if bytes.len() % 2 != 0 {
            return Err(VoiceError::Protocol(format!(
                "audio frame of {} bytes is not 16-bit aligned",
                bytes.len()
            )));
        }

        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
            .collect();

        let now = Instant::now();
        let earliest = now + self.lookahead;
        let start = match self.next_available {
            Some(t) if t > earliest => t,
            _ => earliest,
        };
        let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(self.sample_rate));

        sink.write(&samples);
        if let Some(reference) = &self.reference {
            reference.push(&samples);
        }

        let unit = ScheduledUnit {
            start,
            duration,
            samples: samples.len(),
        };
        self.next_available = Some(unit.end());
        self.scheduled.retain(|u| u.end() > now);
        self.scheduled.push(unit);

        Ok(unit)
    }

    /// Number of units still pending or playing.
    pub fn pending(&mut self) -> usize {
        let now = Instant::now();
        self.scheduled.retain(|u| u.end() > now);
        self.scheduled.len()
    }

    /// Halt every pending unit and reset the cursor.
    ///
    /// Used on interruption/cancellation so stale audio never plays after
    /// a session ends. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.clear();
        }
        if let Some(reference) = &self.reference {
            reference.clear();
        }
        if !self.scheduled.is_empty() {
            info!("playback stopped, {} unit(s) discarded", self.scheduled.len());
        }
        self.scheduled.clear();
        self.next_available = None;
    }

    /// Stop and release the output path. Tolerant of double-close.
    pub fn close(&mut self) {
        self.stop();
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct SinkLog {
        written: Vec<Vec<f32>>,
        clears: usize,
        closes: usize,
    }

    struct RecordingSink {
        log: Arc<Mutex<SinkLog>>,
    }

    impl RecordingSink {
        fn new() -> (Box<dyn PlaybackSink>, Arc<Mutex<SinkLog>>) {
            let log = Arc::new(Mutex::new(SinkLog::default()));
            (
                Box::new(Self {
                    log: Arc::clone(&log),
                }),
                log,
            )
        }
    }

    impl PlaybackSink for RecordingSink {
        fn write(&mut self, samples: &[f32]) {
            self.log.lock().unwrap().written.push(samples.to_vec());
        }
        fn clear(&mut self) {
            self.log.lock().unwrap().clears += 1;
        }
        fn close(&mut self) {
            self.log.lock().unwrap().closes += 1;
        }
    }

    fn chunk_of(samples: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples * 2);
        for i in 0..samples {
            bytes.extend_from_slice(&((i % 100) as i16 * 300).to_le_bytes());
        }
        bytes
    }

    fn scheduler() -> (PlaybackScheduler, Arc<Mutex<SinkLog>>) {
        let (sink, log) = RecordingSink::new();
        (
            PlaybackScheduler::new(sink, 24_000, Duration::from_millis(50)).unwrap(),
            log,
        )
    }

    #[test]
    fn zero_rate_rejected() {
        let (sink, _log) = RecordingSink::new();
        assert!(PlaybackScheduler::new(sink, 0, Duration::ZERO).is_err());
    }

    #[test]
    fn chunks_play_in_order_without_overlap() {
        let (mut sched, _log) = scheduler();

        let u1 = sched.play_chunk(&chunk_of(2400)).unwrap();
        let u2 = sched.play_chunk(&chunk_of(1200)).unwrap();
        let u3 = sched.play_chunk(&chunk_of(4800)).unwrap();

        assert!(u1.start <= u2.start && u2.start <= u3.start);
        assert!(u2.start >= u1.end());
        assert!(u3.start >= u2.end());
    }

    #[test]
    fn duration_matches_sample_count() {
        let (mut sched, _log) = scheduler();
        let unit = sched.play_chunk(&chunk_of(2400)).unwrap();
        assert_eq!(unit.samples, 2400);
        assert_eq!(unit.duration, Duration::from_millis(100));
    }

    #[test]
    fn odd_length_chunk_is_protocol_error() {
        let (mut sched, _log) = scheduler();
        assert!(matches!(
            sched.play_chunk(&[0x01, 0x02, 0x03]),
            Err(VoiceError::Protocol(_))
        ));
    }

    #[test]
    fn decoded_samples_are_normalized() {
        let (mut sched, log) = scheduler();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&i16::MIN.to_le_bytes());
        bytes.extend_from_slice(&0i16.to_le_bytes());
        sched.play_chunk(&bytes).unwrap();

        let written = &log.lock().unwrap().written;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], vec![-1.0, 0.0]);
    }

    #[test]
    fn stop_clears_pending_and_resets_cursor() {
        let (mut sched, log) = scheduler();
        sched.play_chunk(&chunk_of(24_000)).unwrap();
        assert_eq!(sched.pending(), 1);

        sched.stop();
        assert_eq!(sched.pending(), 0);
        assert_eq!(log.lock().unwrap().clears, 1);

        // Cursor is empty again: the next chunk schedules from now.
        let unit = sched.play_chunk(&chunk_of(240)).unwrap();
        assert!(unit.start >= Instant::now() - Duration::from_millis(1));
    }

    #[test]
    fn stop_twice_then_close_is_safe() {
        let (mut sched, log) = scheduler();
        sched.play_chunk(&chunk_of(2400)).unwrap();

        sched.stop();
        sched.stop();
        sched.close();
        sched.close();

        let log = log.lock().unwrap();
        assert_eq!(log.closes, 1);
        assert_eq!(sched.scheduled.len(), 0);
    }

    #[test]
    fn reference_tap_mirrors_scheduled_audio_and_clears_on_stop() {
        use crate::audio::aec::ReferenceBuffer;

        let (mut sched, _log) = scheduler();
        let buffer = ReferenceBuffer::new(24_000, 24_000);
        sched.set_reference(buffer.handle());

        sched.play_chunk(&chunk_of(1_200)).unwrap();
        let mirrored = buffer.drain_frame(1_200);
        assert!(mirrored.iter().any(|&s| s != 0.0));

        sched.play_chunk(&chunk_of(1_200)).unwrap();
        sched.stop();
        // Stopped playback never sounds, so it must not be subtracted
        // from the microphone either.
        assert!(buffer.drain_frame(1_200).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn play_after_close_fails() {
        let (mut sched, _log) = scheduler();
        sched.close();
        assert!(matches!(
            sched.play_chunk(&chunk_of(240)),
            Err(VoiceError::Audio(_))
        ));
    }

    #[test]
    fn lookahead_defers_first_chunk() {
        let (mut sched, _log) = scheduler();
        let before = Instant::now();
        let unit = sched.play_chunk(&chunk_of(240)).unwrap();
        assert!(unit.start >= before + Duration::from_millis(50));
    }
}
