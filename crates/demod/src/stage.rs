// Copyright 2025-2026 CEMAXECUTER LLC

//! Stage threads of an instance.
//!
//! Each stage pops from its input queue with a short timeout so it can pick
//! up commands while idle. Commands are also drained right after a frame is
//! popped and before it is processed, so anything the orchestrator sent
//! before pushing a frame applies to that frame. Parameters never change
//! while a frame is being processed.
//!
//! Shutdown runs front to back: each stage acknowledges on the notify queue
//! and only then closes its output, which is what lets the next stage finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rx_stream::{
    AudioPacket, AudioQueue, BufferPool, IqPacket, IqQueue, Packet, PopError, PostIqPacket,
    PostIqQueue,
};

use crate::collab::{AudioSink, Demodulator, Preprocessor};
use crate::command::{Command, CommandQueue, ControlCommand, ControlQueue, InstanceId, StageKind};
use crate::error::ControlError;
use crate::params::{DemodParams, DemodType, ParamsMirror};

/// Counters shared between an instance's stages and its owner.
#[derive(Debug, Default)]
pub struct InstanceStats {
    pub iq_frames: AtomicU64,
    pub post_iq_frames: AtomicU64,
    pub audio_frames: AtomicU64,
    pub squelched: AtomicU64,
    pub discarded: AtomicU64,
    pub rejected: AtomicU64,
}

/// Plain copy of [`InstanceStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub iq_frames: u64,
    pub post_iq_frames: u64,
    pub audio_frames: u64,
    pub squelched: u64,
    pub discarded: u64,
    pub rejected: u64,
}

impl InstanceStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            iq_frames: self.iq_frames.load(Ordering::Relaxed),
            post_iq_frames: self.post_iq_frames.load(Ordering::Relaxed),
            audio_frames: self.audio_frames.load(Ordering::Relaxed),
            squelched: self.squelched.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// What every stage needs to talk back to the orchestrator.
#[derive(Clone)]
pub(crate) struct Link {
    pub id: InstanceId,
    pub notify: Arc<CommandQueue>,
    pub stats: Arc<InstanceStats>,
    pub mirror: Arc<ParamsMirror>,
}

impl Link {
    fn reject(&self, error: ControlError) {
        log::warn!("{}: rejected: {}", self.id, error);
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        let msg = Command::Rejected {
            instance: self.id,
            error,
        };
        if self.notify.try_push(msg).is_err() {
            log::warn!("{}: notify queue full, rejection not reported", self.id);
        }
    }

    fn acknowledge(&self, stage: StageKind) {
        log::debug!("{}: {} terminated", self.id, stage.name());
        if self.notify.push(stage.terminated(self.id)).is_err() {
            log::warn!("{}: notify queue closed before {} ack", self.id, stage.name());
        }
    }
}

pub(crate) struct PreprocessStage {
    pub link: Link,
    pub params: DemodParams,
    pub preprocessor: Box<dyn Preprocessor>,
    pub input: Arc<IqQueue>,
    pub output: Arc<PostIqQueue>,
    pub commands: Arc<CommandQueue>,
    pub pool: BufferPool<PostIqPacket>,
    pub tick: Duration,
}

impl PreprocessStage {
    pub fn run(mut self) {
        self.preprocessor.configure(&self.params);
        self.link.mirror.publish_tuning(&self.params);

        loop {
            if self.drain_commands() {
                break;
            }
            match self.input.pop_timeout(self.tick) {
                Ok(frame) => {
                    let terminate = self.drain_commands();
                    self.process(frame);
                    if terminate {
                        break;
                    }
                }
                Err(PopError::Timeout) => {}
                Err(PopError::Closed) => break,
            }
        }

        self.input.close();
        let discarded = self.input.clear();
        if discarded > 0 {
            log::debug!("{}: discarded {} queued IQ frames", self.link.id, discarded);
            self.link
                .stats
                .discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
        }
        self.link.acknowledge(StageKind::Preprocess);
        self.output.close();
    }

    /// Apply every pending command as one commit. Returns true once a
    /// termination request has been seen, or the command queue has been
    /// closed and drained.
    fn drain_commands(&mut self) -> bool {
        let mut staged = self.params.clone();
        let mut changed = false;
        let mut terminate = false;

        while let Some(cmd) = self.commands.try_pop() {
            if cmd == Command::Terminate {
                terminate = true;
                break;
            }
            match staged.apply(&cmd) {
                Ok(c) => changed |= c,
                Err(e) => self.link.reject(e),
            }
        }
        if !terminate && self.commands.is_closed() && self.commands.is_empty() {
            log::debug!("{}: command queue closed", self.link.id);
            terminate = true;
        }

        if changed {
            log::debug!(
                "{}: tuned to {} Hz, bandwidth {} Hz, audio {} Hz",
                self.link.id,
                staged.frequency,
                staged.bandwidth,
                staged.audio_sample_rate
            );
            self.params = staged;
            self.preprocessor.configure(&self.params);
            self.link.mirror.publish_tuning(&self.params);
        }
        terminate
    }

    fn process(&mut self, frame: Packet<IqPacket>) {
        self.link.stats.iq_frames.fetch_add(1, Ordering::Relaxed);

        let mut out = self.pool.acquire();
        out.frequency = self.params.frequency;
        out.sample_rate = frame.sample_rate;
        out.bandwidth = self.params.bandwidth;
        out.audio_sample_rate = self.params.audio_sample_rate;
        self.preprocessor.process(&self.params, &frame, &mut out);
        frame.release();

        if out.samples.is_empty() {
            return;
        }
        self.link.stats.post_iq_frames.fetch_add(1, Ordering::Relaxed);
        if self.output.push(out.freeze()).is_err() {
            log::warn!("{}: post-IQ queue closed early", self.link.id);
        }
    }
}

pub(crate) struct DemodStage {
    pub link: Link,
    pub demod_type: DemodType,
    pub squelch: bool,
    pub squelch_level_db: f32,
    pub demodulator: Box<dyn Demodulator>,
    pub input: Arc<PostIqQueue>,
    pub output: Arc<AudioQueue>,
    pub controls: Arc<ControlQueue>,
    pub pool: BufferPool<AudioPacket>,
    pub tick: Duration,
}

impl DemodStage {
    pub fn run(mut self) {
        self.demodulator.reset(self.demod_type);
        self.link.mirror.publish_type(self.demod_type);

        // Runs until preprocess closes our input and everything it sent
        // has been demodulated.
        loop {
            match self.input.pop_timeout(self.tick) {
                Ok(frame) => {
                    self.drain_controls();
                    self.process(frame);
                }
                Err(PopError::Timeout) => self.drain_controls(),
                Err(PopError::Closed) => break,
            }
        }

        self.link.acknowledge(StageKind::Demod);
        self.output.close();
    }

    fn drain_controls(&mut self) {
        while let Some(ctl) = self.controls.try_pop() {
            match ctl {
                ControlCommand::SquelchOn => self.squelch = true,
                ControlCommand::SquelchOff => self.squelch = false,
                ControlCommand::SetType(name) => match name.parse::<DemodType>() {
                    Ok(t) if t == self.demod_type => {}
                    Ok(t) => {
                        log::debug!("{}: demod type {} -> {}", self.link.id, self.demod_type, t);
                        self.demod_type = t;
                        self.demodulator.reset(t);
                        self.link.mirror.publish_type(t);
                    }
                    Err(e) => self.link.reject(e),
                },
            }
        }
    }

    fn process(&mut self, frame: Packet<PostIqPacket>) {
        if self.squelch && self.demodulator.signal_level_db(&frame) < self.squelch_level_db {
            self.link.stats.squelched.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut out = self.pool.acquire();
        out.frequency = frame.frequency;
        out.sample_rate = frame.audio_sample_rate;
        out.channels = 1;
        self.demodulator.demodulate(&frame, &mut out);
        frame.release();

        if out.samples.is_empty() {
            return;
        }
        self.link.stats.audio_frames.fetch_add(1, Ordering::Relaxed);
        if self.output.push(out.freeze()).is_err() {
            log::warn!("{}: audio queue closed early", self.link.id);
        }
    }
}

pub(crate) struct AudioStage {
    pub link: Link,
    pub sink: Box<dyn AudioSink>,
    pub input: Arc<AudioQueue>,
}

impl AudioStage {
    pub fn run(mut self) {
        while let Some(packet) = self.input.pop() {
            self.sink.play(packet);
        }
        self.sink.flush();
        self.link.acknowledge(StageKind::Audio);
    }
}
