// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use num_complex::Complex32;
use rx_stream::{BufferPool, IqPacket, IqQueue};

use crate::{IqSource, SourceError};

/// IQ sample format for file input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Complex int8 (CS8): pairs of i8
    Ci8,
    /// Complex int16 (CS16): pairs of i16, little-endian
    Ci16,
    /// Complex float32 (CF32): pairs of f32, little-endian
    Cf32,
}

impl SampleFormat {
    /// Bytes per complex sample
    pub fn sample_bytes(self) -> usize {
        match self {
            SampleFormat::Ci8 => 2,
            SampleFormat::Ci16 => 4,
            SampleFormat::Cf32 => 8,
        }
    }

    fn decode(self, raw: &[u8], out: &mut Vec<Complex32>) {
        let step = self.sample_bytes();
        out.extend(raw.chunks_exact(step).map(|b| match self {
            SampleFormat::Ci8 => Complex32::new(b[0] as i8 as f32 / 128.0, b[1] as i8 as f32 / 128.0),
            SampleFormat::Ci16 => Complex32::new(
                i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0,
                i16::from_le_bytes([b[2], b[3]]) as f32 / 32768.0,
            ),
            SampleFormat::Cf32 => Complex32::new(
                f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                f32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            ),
        }));
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ci8" | "cs8" | "cu8" => Ok(SampleFormat::Ci8),
            "ci16" | "cs16" => Ok(SampleFormat::Ci16),
            "cf32" | "fc32" => Ok(SampleFormat::Cf32),
            other => Err(format!("unknown sample format '{}' (ci8, ci16, cf32)", other)),
        }
    }
}

/// IQ file reader: reads samples from a file and pushes them as pooled IqPacket blocks.
pub struct FileSource {
    path: PathBuf,
    format: SampleFormat,
    sample_rate: i64,
    center_freq: i64,
    /// Number of complex samples per block
    block_size: usize,
    /// Pace blocks at the nominal sample rate instead of reading flat out
    throttle: bool,
    pool: BufferPool<IqPacket>,
    running: Arc<AtomicBool>,
    blocks: u64,
}

impl FileSource {
    pub fn new(
        path: impl Into<PathBuf>,
        format: SampleFormat,
        sample_rate: i64,
        center_freq: i64,
    ) -> Self {
        Self {
            path: path.into(),
            format,
            sample_rate,
            center_freq,
            block_size: 65536, // 64K complex samples per block
            throttle: false,
            pool: BufferPool::new(16),
            running: Arc::new(AtomicBool::new(false)),
            blocks: 0,
        }
    }

    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    pub fn set_throttle(&mut self, throttle: bool) {
        self.throttle = throttle;
    }

    /// Pool the IQ packets are drawn from.
    pub fn pool(&self) -> &BufferPool<IqPacket> {
        &self.pool
    }

    /// Flag that stops a running `start` from another thread when cleared.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Blocks pushed by the last `start`.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Fill `buf` as far as the file allows. Returns the bytes read.
    fn read_block(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn block_duration(&self) -> Duration {
        if self.sample_rate <= 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }
}

impl IqSource for FileSource {
    fn start(&mut self, out: &IqQueue) -> Result<(), SourceError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SourceError::Busy);
        }
        let result = self.stream(out);
        self.running.store(false, Ordering::SeqCst);
        result
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn sample_rate(&self) -> i64 {
        self.sample_rate
    }

    fn center_frequency(&self) -> i64 {
        self.center_freq
    }
}

impl FileSource {
    fn stream(&mut self, out: &IqQueue) -> Result<(), SourceError> {
        let file = File::open(&self.path).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);

        log::info!(
            "reading IQ from {} ({:?}, {} Hz, {} MHz)",
            self.path.display(),
            self.format,
            self.sample_rate,
            self.center_freq / 1_000_000
        );

        let mut raw = vec![0u8; self.block_size * self.format.sample_bytes()];
        let pace = self.block_duration();
        let mut next_due = Instant::now();
        self.blocks = 0;

        while self.running.load(Ordering::SeqCst) {
            let n = Self::read_block(&mut reader, &mut raw)?;
            let whole = n - n % self.format.sample_bytes();
            if whole == 0 {
                log::info!("end of file: {}", self.path.display());
                break;
            }

            let mut pkt = self.pool.acquire();
            pkt.frequency = self.center_freq;
            pkt.sample_rate = self.sample_rate;
            self.format.decode(&raw[..whole], &mut pkt.samples);

            if self.throttle {
                next_due += pace;
                let now = Instant::now();
                if next_due > now {
                    std::thread::sleep(next_due - now);
                }
            }

            if out.push(pkt.freeze()).is_err() {
                log::debug!("IQ queue closed, stopping {}", self.path.display());
                break;
            }
            self.blocks += 1;
        }

        log::debug!("{}: {} blocks", self.path.display(), self.blocks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rx_stream::BoundedQueue;
    use std::io::Write;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("rx-sdr-{}-{}", std::process::id(), name));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_decode_formats() {
        let mut out = Vec::new();
        SampleFormat::Ci8.decode(&[64, 0xC0], &mut out);
        assert_eq!(out[0], Complex32::new(0.5, -0.5));

        out.clear();
        let mut raw = Vec::new();
        raw.extend_from_slice(&16384i16.to_le_bytes());
        raw.extend_from_slice(&(-32768i16).to_le_bytes());
        SampleFormat::Ci16.decode(&raw, &mut out);
        assert_eq!(out[0], Complex32::new(0.5, -1.0));

        out.clear();
        let mut raw = Vec::new();
        raw.extend_from_slice(&0.25f32.to_le_bytes());
        raw.extend_from_slice(&(-0.75f32).to_le_bytes());
        SampleFormat::Cf32.decode(&raw, &mut out);
        assert_eq!(out[0], Complex32::new(0.25, -0.75));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("CS16".parse::<SampleFormat>(), Ok(SampleFormat::Ci16));
        assert_eq!("cf32".parse::<SampleFormat>(), Ok(SampleFormat::Cf32));
        assert!("wav".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn test_file_blocks_and_trailing_partial() {
        // 10 CI8 samples plus one dangling byte
        let mut bytes: Vec<u8> = (0..20).map(|i| i as u8).collect();
        bytes.push(7);
        let path = temp_file("blocks.ci8", &bytes);

        let mut src = FileSource::new(&path, SampleFormat::Ci8, 1_000_000, 433_920_000);
        src.set_block_size(4);
        let q: IqQueue = BoundedQueue::new(8);
        src.start(&q).unwrap();
        q.close();

        let sizes: Vec<usize> = std::iter::from_fn(|| q.pop()).map(|p| {
            assert_eq!(p.frequency, 433_920_000);
            assert_eq!(p.sample_rate, 1_000_000);
            p.samples.len()
        }).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(src.blocks(), 3);
        assert_eq!(src.pool().stats().outstanding(), 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_closed_queue_stops_source() {
        let path = temp_file("closed.cf32", &vec![0u8; 8 * 64]);
        let mut src = FileSource::new(&path, SampleFormat::Cf32, 1_000_000, 0);
        src.set_block_size(8);
        let q: IqQueue = BoundedQueue::new(2);
        q.close();
        src.start(&q).unwrap();
        assert_eq!(src.blocks(), 0);
        assert_eq!(src.pool().stats().outstanding(), 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file() {
        let mut src = FileSource::new("/nonexistent/iq.bin", SampleFormat::Ci16, 1, 0);
        let q: IqQueue = BoundedQueue::new(1);
        assert!(matches!(src.start(&q), Err(SourceError::Open { .. })));
    }
}
