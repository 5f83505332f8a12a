// Copyright 2025-2026 CEMAXECUTER LLC

//! Demodulator pipeline instances.
//!
//! An instance owns three stage threads (preprocess, demod, audio) joined by
//! bounded packet queues, plus a command queue for tuning changes and a
//! control queue for mode and squelch changes. Stages report back on a
//! notify queue: rejected commands, and one termination acknowledgment per
//! stage in pipeline order.

pub mod collab;
pub mod command;
pub mod config;
pub mod error;
pub mod instance;
pub mod params;
mod stage;

pub use collab::{mean_power_db, AudioSink, Demodulator, Preprocessor, QueueSink};
pub use command::{Command, CommandQueue, ControlCommand, ControlQueue, InstanceId, StageKind};
pub use config::InstanceConfig;
pub use error::{ControlError, InstanceError};
pub use instance::{DemodInstance, InstanceState};
pub use params::{
    DemodParams, DemodType, ParamsMirror, DEFAULT_AUDIO_SAMPLE_RATE, DEFAULT_BANDWIDTH,
    DEFAULT_SAMPLE_RATE,
};
pub use stage::{InstanceStats, StatsSnapshot};
