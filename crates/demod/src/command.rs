// Copyright 2025-2026 CEMAXECUTER LLC

//! Command and control messages exchanged with a running instance.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rx_stream::BoundedQueue;

use crate::error::ControlError;

/// Identifies one demodulator instance in acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

impl InstanceId {
    pub fn next() -> Self {
        InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "demod#{}", self.0)
    }
}

/// The three stages of an instance, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    Preprocess,
    Demod,
    Audio,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [StageKind::Preprocess, StageKind::Demod, StageKind::Audio];

    /// Acknowledgment this stage sends once it has terminated.
    pub fn terminated(self, instance: InstanceId) -> Command {
        match self {
            StageKind::Preprocess => Command::PreprocessTerminated(instance),
            StageKind::Demod => Command::DemodTerminated(instance),
            StageKind::Audio => Command::AudioTerminated(instance),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Preprocess => "preprocess",
            StageKind::Demod => "demod",
            StageKind::Audio => "audio",
        }
    }
}

/// Bulk commands: parameter changes, termination requests, and the
/// acknowledgments stages send back to their orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetBandwidth(u32),
    SetFrequency(i64),
    SetAudioRate(u32),
    /// Ask the instance to flush and shut down.
    Terminate,
    PreprocessTerminated(InstanceId),
    DemodTerminated(InstanceId),
    AudioTerminated(InstanceId),
    /// A command or control-command was refused; the snapshot is unchanged.
    Rejected {
        instance: InstanceId,
        error: ControlError,
    },
}

impl Command {
    /// True for messages that flow from a stage back to the orchestrator.
    pub fn is_ack(&self) -> bool {
        self.terminated_stage().is_some() || matches!(self, Command::Rejected { .. })
    }

    /// Which stage a termination acknowledgment belongs to.
    pub fn terminated_stage(&self) -> Option<StageKind> {
        match self {
            Command::PreprocessTerminated(_) => Some(StageKind::Preprocess),
            Command::DemodTerminated(_) => Some(StageKind::Demod),
            Command::AudioTerminated(_) => Some(StageKind::Audio),
            _ => None,
        }
    }
}

/// Low-volume control messages, kept off the bulk command queue so a mode
/// or squelch change never waits behind termination bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    SquelchOn,
    SquelchOff,
    /// Switch demodulation mode by name ("FM", "AM", ...).
    SetType(String),
}

pub type CommandQueue = BoundedQueue<Command>;
pub type ControlQueue = BoundedQueue<ControlCommand>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_are_unique() {
        let a = InstanceId::next();
        let b = InstanceId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_ack_classification() {
        let id = InstanceId(7);
        for (i, stage) in StageKind::ALL.iter().enumerate() {
            let ack = stage.terminated(id);
            assert!(ack.is_ack());
            assert_eq!(ack.terminated_stage(), Some(StageKind::ALL[i]));
        }
        assert!(!Command::SetFrequency(1).is_ack());
        assert!(!Command::Terminate.is_ack());
        let rejected = Command::Rejected {
            instance: id,
            error: ControlError::InvalidAudioRate(0),
        };
        assert!(rejected.is_ack());
        assert_eq!(rejected.terminated_stage(), None);
    }
}
