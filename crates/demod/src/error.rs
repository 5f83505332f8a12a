// Copyright 2025-2026 CEMAXECUTER LLC

use thiserror::Error;

use crate::command::{Command, InstanceId};
use crate::instance::InstanceState;

/// Why a parameter or mode change was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("unknown demodulation type '{0}'")]
    UnknownDemodType(String),
    #[error("bandwidth {bandwidth} Hz is outside 1..={sample_rate} Hz")]
    InvalidBandwidth { bandwidth: u32, sample_rate: i64 },
    #[error("audio sample rate {0} Hz is invalid")]
    InvalidAudioRate(u32),
}

/// Errors returned to the orchestrator by instance operations.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("{id} cannot {operation} while {state:?}")]
    InvalidState {
        id: InstanceId,
        state: InstanceState,
        operation: &'static str,
    },
    #[error("{0} has terminated")]
    Terminated(InstanceId),
    #[error("{0} command queue full")]
    CommandQueueFull(InstanceId),
    #[error("{0:?} cannot be sent as a request")]
    NotARequest(Command),
    #[error("{id} shutdown timed out after {timeout_ms}ms")]
    ShutdownTimedOut { id: InstanceId, timeout_ms: u128 },
    #[error("{id} {stage} thread panicked")]
    StagePanicked { id: InstanceId, stage: &'static str },
    #[error("failed to spawn stage thread: {0}")]
    Spawn(#[from] std::io::Error),
}
