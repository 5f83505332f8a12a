//! Minimal signal chain plugged into the demod instance: a mixing
//! integrate-and-dump decimator and a handful of analog detectors.

use std::f64::consts::TAU;

use num_complex::Complex32;
use rx_demod::{DemodParams, DemodType, Demodulator, Preprocessor};
use rx_stream::{AudioPacket, IqPacket, PostIqPacket};

/// Shift the tuned frequency to baseband and decimate toward `bandwidth`.
pub struct Downconverter {
    phase: f64,
    decimation: usize,
    acc: Complex32,
    acc_len: usize,
}

impl Downconverter {
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            decimation: 1,
            acc: Complex32::new(0.0, 0.0),
            acc_len: 0,
        }
    }
}

impl Default for Downconverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for Downconverter {
    fn configure(&mut self, params: &DemodParams) {
        let decimation = params.decimation();
        if decimation != self.decimation {
            self.decimation = decimation;
            self.acc = Complex32::new(0.0, 0.0);
            self.acc_len = 0;
        }
    }

    fn process(&mut self, params: &DemodParams, input: &IqPacket, out: &mut PostIqPacket) {
        if input.sample_rate <= 0 {
            return;
        }
        // Frequency 0 means "stay on the capture center".
        let offset = if params.frequency == 0 {
            0
        } else {
            params.frequency - input.frequency
        };
        let step = -TAU * offset as f64 / input.sample_rate as f64;

        out.sample_rate = input.sample_rate / self.decimation as i64;
        out.samples.reserve(input.samples.len() / self.decimation + 1);
        let scale = 1.0 / self.decimation as f32;
        for &s in &input.samples {
            let (sin, cos) = self.phase.sin_cos();
            self.acc += s * Complex32::new(cos as f32, sin as f32);
            self.phase = (self.phase + step) % TAU;
            self.acc_len += 1;
            if self.acc_len == self.decimation {
                out.samples.push(self.acc * scale);
                self.acc = Complex32::new(0.0, 0.0);
                self.acc_len = 0;
            }
        }
    }
}

/// Analog detectors with a linear-interpolating resampler to the audio rate.
/// Digital modes fall back to the raw in-phase component.
pub struct AnalogDemod {
    demod_type: DemodType,
    prev: Complex32,
    dc: f32,
    last: f32,
    /// Position of the next output sample, in input samples from `last`
    frac: f64,
    scratch: Vec<f32>,
}

impl AnalogDemod {
    pub fn new() -> Self {
        Self {
            demod_type: DemodType::default(),
            prev: Complex32::new(0.0, 0.0),
            dc: 0.0,
            last: 0.0,
            frac: 0.0,
            scratch: Vec::new(),
        }
    }

    fn detect(&mut self, samples: &[Complex32]) {
        // kf = 0.5 normalization, as in the FSK discriminator
        const KF_NORM: f32 = std::f32::consts::FRAC_1_PI;
        self.scratch.clear();
        match self.demod_type {
            DemodType::Fm => {
                for &s in samples {
                    self.scratch.push((s * self.prev.conj()).arg() * KF_NORM);
                    self.prev = s;
                }
            }
            DemodType::Am => {
                for &s in samples {
                    let env = s.norm();
                    self.dc += 0.001 * (env - self.dc);
                    self.scratch.push(env - self.dc);
                }
            }
            DemodType::Usb => self.scratch.extend(samples.iter().map(|s| s.re + s.im)),
            DemodType::Lsb => self.scratch.extend(samples.iter().map(|s| s.re - s.im)),
            _ => self.scratch.extend(samples.iter().map(|s| s.re)),
        }
    }

    fn resample(&mut self, from: i64, to: u32, out: &mut Vec<f32>) {
        if from <= 0 || to == 0 {
            return;
        }
        let step = from as f64 / f64::from(to);
        for &x in &self.scratch {
            while self.frac < 1.0 {
                let y = self.last + (x - self.last) * self.frac as f32;
                out.push(y.clamp(-1.0, 1.0));
                self.frac += step;
            }
            self.frac -= 1.0;
            self.last = x;
        }
    }
}

impl Default for AnalogDemod {
    fn default() -> Self {
        Self::new()
    }
}

impl Demodulator for AnalogDemod {
    fn reset(&mut self, demod_type: DemodType) {
        self.demod_type = demod_type;
        self.prev = Complex32::new(0.0, 0.0);
        self.dc = 0.0;
        self.last = 0.0;
        self.frac = 0.0;
    }

    fn demodulate(&mut self, input: &PostIqPacket, out: &mut AudioPacket) {
        self.detect(&input.samples);
        self.resample(input.sample_rate, out.sample_rate, &mut out.samples);
    }
}
