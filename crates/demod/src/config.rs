use std::time::Duration;

use crate::params::DemodParams;

/// Construction-time settings of one instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Slots in the IQ input queue
    pub iq_capacity: usize,
    /// Slots between preprocess and demod
    pub post_iq_capacity: usize,
    /// Slots between demod and audio
    pub audio_capacity: usize,
    /// Slots in each of the command and control queues
    pub command_capacity: usize,
    /// Slots in the acknowledgment queue read by the orchestrator
    pub notify_capacity: usize,
    /// Idle buffers each internal pool keeps for reuse
    pub pool_idle: usize,
    /// How long an idle stage waits for input before re-checking commands
    pub tick: Duration,
    /// Frames below this level are gated while squelch is on
    pub squelch_level_db: f32,
    /// Starting parameter snapshot
    pub params: DemodParams,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            iq_capacity: 32,
            post_iq_capacity: 32,
            audio_capacity: 64,
            command_capacity: 64,
            notify_capacity: 64,
            pool_idle: 32,
            tick: Duration::from_millis(10),
            squelch_level_db: -60.0,
            params: DemodParams::default(),
        }
    }
}
