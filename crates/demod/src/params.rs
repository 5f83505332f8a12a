//! Parameter snapshot of one instance.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use crate::command::Command;
use crate::error::ControlError;

/// Fixed device rate used when the caller does not pick one.
pub const DEFAULT_SAMPLE_RATE: i64 = 2_500_000;
/// Target post-resample bandwidth.
pub const DEFAULT_BANDWIDTH: u32 = 200_000;
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Demodulation modes an instance can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DemodType {
    #[default]
    Fm,
    Am,
    Lsb,
    Usb,
    Dsb,
    Ask,
    Apsk,
    Bpsk,
    Dpsk,
    Psk,
    Ook,
    St,
    Sqam,
    Qam,
    Qpsk,
    Raw,
}

impl DemodType {
    pub const ALL: [DemodType; 16] = [
        DemodType::Fm,
        DemodType::Am,
        DemodType::Lsb,
        DemodType::Usb,
        DemodType::Dsb,
        DemodType::Ask,
        DemodType::Apsk,
        DemodType::Bpsk,
        DemodType::Dpsk,
        DemodType::Psk,
        DemodType::Ook,
        DemodType::St,
        DemodType::Sqam,
        DemodType::Qam,
        DemodType::Qpsk,
        DemodType::Raw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DemodType::Fm => "FM",
            DemodType::Am => "AM",
            DemodType::Lsb => "LSB",
            DemodType::Usb => "USB",
            DemodType::Dsb => "DSB",
            DemodType::Ask => "ASK",
            DemodType::Apsk => "APSK",
            DemodType::Bpsk => "BPSK",
            DemodType::Dpsk => "DPSK",
            DemodType::Psk => "PSK",
            DemodType::Ook => "OOK",
            DemodType::St => "ST",
            DemodType::Sqam => "SQAM",
            DemodType::Qam => "QAM",
            DemodType::Qpsk => "QPSK",
            DemodType::Raw => "RAW",
        }
    }

    /// Analog voice modes (everything else is a digital mode).
    pub fn is_analog(self) -> bool {
        matches!(
            self,
            DemodType::Fm | DemodType::Am | DemodType::Lsb | DemodType::Usb | DemodType::Dsb
        )
    }
}

impl fmt::Display for DemodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DemodType {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DemodType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ControlError::UnknownDemodType(s.to_string()))
    }
}

/// Current configuration of one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DemodParams {
    /// Tuned frequency in Hz
    pub frequency: i64,
    /// Input (device) sample rate in Hz
    pub sample_rate: i64,
    /// Target bandwidth after first-stage resampling, in Hz
    pub bandwidth: u32,
    pub audio_sample_rate: u32,
    pub demod_type: DemodType,
}

impl Default for DemodParams {
    fn default() -> Self {
        Self {
            frequency: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bandwidth: DEFAULT_BANDWIDTH,
            audio_sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            demod_type: DemodType::default(),
        }
    }
}

impl DemodParams {
    /// Apply a parameter command. Returns whether anything changed.
    ///
    /// Invalid values leave `self` untouched. Commands that carry no
    /// parameter (termination requests, acknowledgments) are ignored.
    pub fn apply(&mut self, cmd: &Command) -> Result<bool, ControlError> {
        match *cmd {
            Command::SetFrequency(frequency) => Ok(replace(&mut self.frequency, frequency)),
            Command::SetBandwidth(bandwidth) => {
                if bandwidth == 0 || i64::from(bandwidth) > self.sample_rate {
                    return Err(ControlError::InvalidBandwidth {
                        bandwidth,
                        sample_rate: self.sample_rate,
                    });
                }
                Ok(replace(&mut self.bandwidth, bandwidth))
            }
            Command::SetAudioRate(rate) => {
                if rate == 0 {
                    return Err(ControlError::InvalidAudioRate(rate));
                }
                Ok(replace(&mut self.audio_sample_rate, rate))
            }
            _ => Ok(false),
        }
    }

    /// Switch demodulation mode by name.
    pub fn set_demod_type(&mut self, name: &str) -> Result<bool, ControlError> {
        let demod_type = name.parse()?;
        Ok(replace(&mut self.demod_type, demod_type))
    }

    /// Integer decimation from the input rate down to roughly `bandwidth`.
    pub fn decimation(&self) -> usize {
        if self.bandwidth == 0 || self.sample_rate <= 0 {
            return 1;
        }
        (self.sample_rate / i64::from(self.bandwidth)).max(1) as usize
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Read-only copy of an instance's committed parameters, published by the
/// stage threads that own them.
#[derive(Debug, Default)]
pub struct ParamsMirror {
    inner: Mutex<DemodParams>,
}

impl ParamsMirror {
    pub fn new(params: DemodParams) -> Self {
        Self {
            inner: Mutex::new(params),
        }
    }

    pub fn get(&self) -> DemodParams {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish the tuning fields owned by the preprocess stage.
    pub(crate) fn publish_tuning(&self, params: &DemodParams) {
        let mut current = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        current.frequency = params.frequency;
        current.sample_rate = params.sample_rate;
        current.bandwidth = params.bandwidth;
        current.audio_sample_rate = params.audio_sample_rate;
    }

    /// Publish the mode owned by the demod stage.
    pub(crate) fn publish_type(&self, demod_type: DemodType) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .demod_type = demod_type;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = DemodParams::default();
        assert_eq!(p.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(p.bandwidth, 200_000);
        assert_eq!(p.demod_type, DemodType::Fm);
        assert_eq!(p.decimation(), 12);
    }

    #[test]
    fn test_apply_parameter_commands() {
        let mut p = DemodParams::default();
        assert_eq!(p.apply(&Command::SetFrequency(145_500_000)), Ok(true));
        assert_eq!(p.apply(&Command::SetFrequency(145_500_000)), Ok(false));
        assert_eq!(p.apply(&Command::SetBandwidth(12_500)), Ok(true));
        assert_eq!(p.apply(&Command::SetAudioRate(44_100)), Ok(true));
        assert_eq!(p.apply(&Command::Terminate), Ok(false));
        assert_eq!(p.frequency, 145_500_000);
        assert_eq!(p.bandwidth, 12_500);
        assert_eq!(p.audio_sample_rate, 44_100);
    }

    #[test]
    fn test_invalid_values_leave_snapshot_intact() {
        let mut p = DemodParams::default();
        let before = p.clone();
        assert!(matches!(
            p.apply(&Command::SetBandwidth(0)),
            Err(ControlError::InvalidBandwidth { .. })
        ));
        assert!(p.apply(&Command::SetBandwidth(3_000_000)).is_err());
        assert_eq!(
            p.apply(&Command::SetAudioRate(0)),
            Err(ControlError::InvalidAudioRate(0))
        );
        assert_eq!(
            p.set_demod_type("WOBBLE"),
            Err(ControlError::UnknownDemodType("WOBBLE".to_string()))
        );
        assert_eq!(p, before);
    }

    #[test]
    fn test_demod_type_parsing() {
        assert_eq!("fm".parse::<DemodType>(), Ok(DemodType::Fm));
        assert_eq!(" USB ".parse::<DemodType>(), Ok(DemodType::Usb));
        assert_eq!("qpsk".parse::<DemodType>(), Ok(DemodType::Qpsk));
        for t in DemodType::ALL {
            assert_eq!(t.name().parse::<DemodType>(), Ok(t));
        }
        assert!("".parse::<DemodType>().is_err());
        assert!(DemodType::Lsb.is_analog());
        assert!(!DemodType::Bpsk.is_analog());
    }
}
