//! Payload types carried between pipeline stages.

use num_complex::Complex32;

use crate::packet::{Packet, Recycle};
use crate::queue::BoundedQueue;

/// Raw IQ block from acquisition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IqPacket {
    /// Tuned center frequency in Hz
    pub frequency: i64,
    /// Sample rate in Hz
    pub sample_rate: i64,
    pub samples: Vec<Complex32>,
}

impl Recycle for IqPacket {
    fn recycle(&mut self) {
        self.frequency = 0;
        self.sample_rate = 0;
        self.samples.clear();
    }
}

/// IQ after first-stage shifting/filtering/resampling, ready for demodulation.
///
/// Carries the bandwidth and audio rate it was produced under, so the
/// demodulator finishes the frame with the parameters it started with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostIqPacket {
    /// Frequency the block was shifted to, in Hz
    pub frequency: i64,
    /// Sample rate after resampling, in Hz
    pub sample_rate: i64,
    pub bandwidth: u32,
    pub audio_sample_rate: u32,
    pub samples: Vec<Complex32>,
}

impl Recycle for PostIqPacket {
    fn recycle(&mut self) {
        self.frequency = 0;
        self.sample_rate = 0;
        self.bandwidth = 0;
        self.audio_sample_rate = 0;
        self.samples.clear();
    }
}

/// Demodulated audio. The sample buffer travels with the packet and is
/// freed (or recycled) by the last consumer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioPacket {
    pub frequency: i64,
    pub sample_rate: u32,
    pub channels: u8,
    /// Interleaved when `channels > 1`
    pub samples: Vec<f32>,
}

impl AudioPacket {
    /// Mono audio packet.
    pub fn mono(frequency: i64, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            frequency,
            sample_rate,
            channels: 1,
            samples,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

impl Recycle for AudioPacket {
    fn recycle(&mut self) {
        self.frequency = 0;
        self.sample_rate = 0;
        self.channels = 0;
        self.samples.clear();
    }
}

/// Bounded queue of shared packets.
pub type PacketQueue<T> = BoundedQueue<Packet<T>>;
pub type IqQueue = PacketQueue<IqPacket>;
pub type PostIqQueue = PacketQueue<PostIqPacket>;
pub type AudioQueue = PacketQueue<AudioPacket>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frames() {
        let mut pkt = AudioPacket::mono(100_000_000, 48_000, vec![0.0; 480]);
        assert_eq!(pkt.frames(), 480);
        pkt.channels = 2;
        assert_eq!(pkt.frames(), 240);
        pkt.recycle();
        assert_eq!(pkt.frames(), 0);
        assert!(pkt.samples.capacity() >= 480);
    }

    #[test]
    fn test_iq_recycle_clears_metadata() {
        let mut pkt = IqPacket {
            frequency: 145_500_000,
            sample_rate: 2_400_000,
            samples: vec![Complex32::new(1.0, -1.0); 64],
        };
        pkt.recycle();
        assert_eq!(pkt, IqPacket::default());
    }
}
