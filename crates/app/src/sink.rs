//! Consumers at the edges of the pipeline: the audio file writer and the
//! IQ level monitor fed by the snapshot redistributor.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rx_demod::AudioSink;
use rx_stream::{AudioPacket, IqPacket, Packet, PacketQueue};

/// Writes audio as raw little-endian f32, interleaved, to any writer.
pub struct RawAudioWriter<W: Write + Send> {
    writer: W,
    frames: u64,
    failed: bool,
}

impl<W: Write + Send> RawAudioWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames: 0,
            failed: false,
        }
    }

    fn write_packet(&mut self, packet: &AudioPacket) -> io::Result<()> {
        for s in &packet.samples {
            self.writer.write_all(&s.to_le_bytes())?;
        }
        Ok(())
    }
}

impl<W: Write + Send> AudioSink for RawAudioWriter<W> {
    fn play(&mut self, packet: Packet<AudioPacket>) {
        if self.failed {
            return;
        }
        if let Err(e) = self.write_packet(&packet) {
            log::error!("audio write failed: {}", e);
            self.failed = true;
            return;
        }
        self.frames += packet.frames() as u64;
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::error!("audio flush failed: {}", e);
        }
        log::info!("audio: {} frames written", self.frames);
    }
}

/// Discards audio, counting frames.
#[derive(Default)]
pub struct NullSink {
    frames: u64,
}

impl AudioSink for NullSink {
    fn play(&mut self, packet: Packet<AudioPacket>) {
        self.frames += packet.frames() as u64;
    }

    fn flush(&mut self) {
        log::info!("audio: {} frames discarded (no --audio-out)", self.frames);
    }
}

/// Peak and latest level seen by the monitor.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LevelReport {
    pub snapshots: u64,
    pub last_db: f32,
    pub peak_db: f32,
}

/// Remove the DC offset in place and return the remaining power in dB.
///
/// The snapshot is private to this consumer, so mutating it never touches
/// what other subscribers of the IQ stream see.
pub fn measure(snapshot: &mut Packet<IqPacket>) -> f32 {
    let iq = snapshot.make_mut();
    if iq.samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let n = iq.samples.len() as f32;
    let mean = iq.samples.iter().sum::<num_complex::Complex32>() / n;
    for s in iq.samples.iter_mut() {
        *s -= mean;
    }
    let power = iq.samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / n;
    10.0 * (power + 1e-20).log10()
}

/// Drain snapshots until the queue closes, logging levels every `every` snapshots.
pub fn spawn_monitor(
    queue: Arc<PacketQueue<IqPacket>>,
    every: u64,
) -> io::Result<JoinHandle<LevelReport>> {
    thread::Builder::new()
        .name("iq-monitor".to_string())
        .spawn(move || {
            let mut report = LevelReport {
                peak_db: f32::NEG_INFINITY,
                ..LevelReport::default()
            };
            while let Some(mut snapshot) = queue.pop() {
                let db = measure(&mut snapshot);
                report.snapshots += 1;
                report.last_db = db;
                report.peak_db = report.peak_db.max(db);
                if every > 0 && report.snapshots % every == 0 {
                    log::info!(
                        "IQ level {:.1} dB (peak {:.1} dB) at {} Hz",
                        db,
                        report.peak_db,
                        snapshot.frequency
                    );
                }
            }
            report
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;
    use rx_stream::BufferPool;

    #[test]
    fn test_raw_writer_encodes_le_f32() {
        let mut sink = RawAudioWriter::new(Vec::new());
        sink.play(Packet::new(AudioPacket::mono(0, 48_000, vec![1.0, -0.5])));
        sink.flush();
        let mut want = Vec::new();
        want.extend_from_slice(&1.0f32.to_le_bytes());
        want.extend_from_slice(&(-0.5f32).to_le_bytes());
        assert_eq!(sink.writer, want);
        assert_eq!(sink.frames, 2);
    }

    #[test]
    fn test_measure_leaves_shared_copy_alone() {
        let pool: BufferPool<IqPacket> = BufferPool::new(4);
        let mut buf = pool.acquire();
        buf.samples = vec![Complex32::new(1.5, 0.0), Complex32::new(0.5, 0.0)];
        let shared = buf.freeze();
        let mut mine = shared.clone();

        let db = measure(&mut mine);
        assert!((db - 10.0 * 0.25f32.log10()).abs() < 1e-3, "got {}", db);
        assert_eq!(shared.samples[0], Complex32::new(1.5, 0.0));
        assert!(!Packet::ptr_eq(&shared, &mine));

        drop(shared);
        drop(mine);
        assert_eq!(pool.stats().outstanding(), 0);
    }
}
