// Copyright 2025-2026 CEMAXECUTER LLC

//! Interfaces to the signal-processing and output code that plugs into an
//! instance's stage threads.

use std::sync::Arc;

use rx_stream::{AudioPacket, AudioQueue, IqPacket, Packet, PostIqPacket};

use crate::params::{DemodParams, DemodType};

/// First stage: shift, filter and resample raw IQ toward the target bandwidth.
pub trait Preprocessor: Send {
    /// Called once before the first frame and again after every committed
    /// parameter change.
    fn configure(&mut self, _params: &DemodParams) {}

    /// Fill `out.samples` (and adjust `out.sample_rate` if resampling).
    /// `out` arrives stamped with the frame's frequency, rates and bandwidth.
    fn process(&mut self, params: &DemodParams, input: &IqPacket, out: &mut PostIqPacket);
}

/// Second stage: turn post-IQ into audio for the active mode.
pub trait Demodulator: Send {
    /// Re-initialize for a new mode. Called once at startup as well.
    fn reset(&mut self, demod_type: DemodType);

    /// Fill `out.samples`. `out` arrives stamped with frequency, audio rate
    /// and one channel.
    fn demodulate(&mut self, input: &PostIqPacket, out: &mut AudioPacket);

    /// Frame level in dB used for squelch gating.
    fn signal_level_db(&mut self, input: &PostIqPacket) -> f32 {
        mean_power_db(input)
    }
}

/// Final consumer of audio packets.
pub trait AudioSink: Send {
    /// Take one packet. Dropping it is the final release.
    fn play(&mut self, packet: Packet<AudioPacket>);

    /// Called once after the last packet, before the stage acknowledges.
    fn flush(&mut self) {}
}

/// Mean power of a frame in dB (relative to full scale).
pub fn mean_power_db(input: &PostIqPacket) -> f32 {
    if input.samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let power: f32 =
        input.samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / input.samples.len() as f32;
    10.0 * (power + 1e-20).log10()
}

/// Sink that forwards audio onto a queue, e.g. the input of a distributor
/// feeding several consumers. Parks while the queue is full.
pub struct QueueSink {
    queue: Arc<AudioQueue>,
    close_on_flush: bool,
}

impl QueueSink {
    pub fn new(queue: Arc<AudioQueue>) -> Self {
        Self {
            queue,
            close_on_flush: true,
        }
    }

    /// Leave the queue open when the instance shuts down.
    pub fn keep_open(mut self) -> Self {
        self.close_on_flush = false;
        self
    }
}

impl AudioSink for QueueSink {
    fn play(&mut self, packet: Packet<AudioPacket>) {
        if self.queue.push(packet).is_err() {
            log::debug!("audio queue closed, dropping packet");
        }
    }

    fn flush(&mut self) {
        if self.close_on_flush {
            self.queue.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;
    use rx_stream::BoundedQueue;

    #[test]
    fn test_mean_power_db() {
        let mut frame = PostIqPacket::default();
        assert_eq!(mean_power_db(&frame), f32::NEG_INFINITY);

        frame.samples = vec![Complex32::new(1.0, 0.0); 32];
        assert!(mean_power_db(&frame).abs() < 1e-3);

        frame.samples = vec![Complex32::new(0.01, 0.0); 32];
        assert!((mean_power_db(&frame) + 40.0).abs() < 0.01);
    }

    #[test]
    fn test_queue_sink_closes_on_flush() {
        let q: Arc<AudioQueue> = Arc::new(BoundedQueue::new(4));
        let mut sink = QueueSink::new(Arc::clone(&q));
        sink.play(Packet::new(AudioPacket::mono(0, 48_000, vec![0.5; 8])));
        sink.flush();
        assert!(q.is_closed());
        assert_eq!(q.pop().map(|p| p.frames()), Some(8));
        assert!(q.pop().is_none());
    }
}
