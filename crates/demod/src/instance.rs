// Copyright 2025-2026 CEMAXECUTER LLC

//! One demodulator pipeline instance: preprocess → demod → audio, each on its
//! own thread, driven by an orchestrator through command and control queues.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rx_stream::{
    AudioPacket, AudioQueue, BoundedQueue, BufferPool, IqPacket, IqQueue, Packet, PopError,
    PostIqPacket, PostIqQueue, PushError,
};

use crate::collab::{AudioSink, Demodulator, Preprocessor};
use crate::command::{Command, CommandQueue, ControlCommand, ControlQueue, InstanceId, StageKind};
use crate::config::InstanceConfig;
use crate::error::InstanceError;
use crate::params::{DemodParams, ParamsMirror};
use crate::stage::{AudioStage, DemodStage, InstanceStats, Link, PreprocessStage, StatsSnapshot};

/// Lifecycle of an instance. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstanceState {
    Idle,
    Running,
    Stopping,
    Terminated,
}

struct Collaborators {
    preprocessor: Box<dyn Preprocessor>,
    demodulator: Box<dyn Demodulator>,
    sink: Box<dyn AudioSink>,
}

pub struct DemodInstance {
    id: InstanceId,
    config: InstanceConfig,
    state: InstanceState,
    iq_input: Arc<IqQueue>,
    post_iq: Arc<PostIqQueue>,
    audio: Arc<AudioQueue>,
    commands: Arc<CommandQueue>,
    controls: Arc<ControlQueue>,
    notify: Arc<CommandQueue>,
    post_iq_pool: BufferPool<PostIqPacket>,
    audio_pool: BufferPool<AudioPacket>,
    link: Link,
    collaborators: Option<Collaborators>,
    threads: Vec<(StageKind, JoinHandle<()>)>,
    acks: Vec<StageKind>,
}

impl DemodInstance {
    pub fn new(
        config: InstanceConfig,
        preprocessor: Box<dyn Preprocessor>,
        demodulator: Box<dyn Demodulator>,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        let id = InstanceId::next();
        let notify = Arc::new(BoundedQueue::new(config.notify_capacity));
        let link = Link {
            id,
            notify: Arc::clone(&notify),
            stats: Arc::new(InstanceStats::default()),
            mirror: Arc::new(ParamsMirror::new(config.params.clone())),
        };
        Self {
            id,
            state: InstanceState::Idle,
            iq_input: Arc::new(BoundedQueue::new(config.iq_capacity)),
            post_iq: Arc::new(BoundedQueue::new(config.post_iq_capacity)),
            audio: Arc::new(BoundedQueue::new(config.audio_capacity)),
            commands: Arc::new(BoundedQueue::new(config.command_capacity)),
            controls: Arc::new(BoundedQueue::new(config.command_capacity)),
            notify,
            post_iq_pool: BufferPool::new(config.pool_idle),
            audio_pool: BufferPool::new(config.pool_idle),
            link,
            collaborators: Some(Collaborators {
                preprocessor,
                demodulator,
                sink,
            }),
            threads: Vec::new(),
            acks: Vec::new(),
            config,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Queue acquisition pushes IQ frames into.
    pub fn input(&self) -> Arc<IqQueue> {
        Arc::clone(&self.iq_input)
    }

    /// Last parameters committed by the stage threads.
    pub fn params(&self) -> DemodParams {
        self.link.mirror.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.link.stats.snapshot()
    }

    pub fn post_iq_pool(&self) -> &BufferPool<PostIqPacket> {
        &self.post_iq_pool
    }

    pub fn audio_pool(&self) -> &BufferPool<AudioPacket> {
        &self.audio_pool
    }

    /// Spawn the stage threads (Idle → Running).
    pub fn start(&mut self) -> Result<(), InstanceError> {
        let collab = match (self.state, self.collaborators.take()) {
            (InstanceState::Idle, Some(collab)) => collab,
            (state, collab) => {
                self.collaborators = collab;
                return Err(InstanceError::InvalidState {
                    id: self.id,
                    state,
                    operation: "start",
                });
            }
        };

        let preprocess = PreprocessStage {
            link: self.link.clone(),
            params: self.config.params.clone(),
            preprocessor: collab.preprocessor,
            input: Arc::clone(&self.iq_input),
            output: Arc::clone(&self.post_iq),
            commands: Arc::clone(&self.commands),
            pool: self.post_iq_pool.clone(),
            tick: self.config.tick,
        };
        let demod = DemodStage {
            link: self.link.clone(),
            demod_type: self.config.params.demod_type,
            squelch: false,
            squelch_level_db: self.config.squelch_level_db,
            demodulator: collab.demodulator,
            input: Arc::clone(&self.post_iq),
            output: Arc::clone(&self.audio),
            controls: Arc::clone(&self.controls),
            pool: self.audio_pool.clone(),
            tick: self.config.tick,
        };
        let audio = AudioStage {
            link: self.link.clone(),
            sink: collab.sink,
            input: Arc::clone(&self.audio),
        };

        // Spawn back to front so every consumer exists before its producer.
        let audio_thread = self.spawn(StageKind::Audio, move || audio.run());
        let demod_thread = audio_thread.and_then(|_| self.spawn(StageKind::Demod, move || demod.run()));
        let started = demod_thread.and_then(|_| self.spawn(StageKind::Preprocess, move || preprocess.run()));
        if let Err(e) = started {
            // Unwind whatever did start.
            self.post_iq.close();
            self.audio.close();
            self.state = InstanceState::Stopping;
            return Err(e);
        }

        self.state = InstanceState::Running;
        log::debug!("{}: running ({:?})", self.id, self.config.params);
        Ok(())
    }

    fn spawn<F>(&mut self, stage: StageKind, body: F) -> Result<(), InstanceError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.id, stage.name()))
            .spawn(body)?;
        self.threads.push((stage, handle));
        Ok(())
    }

    /// Push one IQ frame, parking while the input is full.
    pub fn push_iq(&self, frame: Packet<IqPacket>) -> Result<(), InstanceError> {
        if self.state >= InstanceState::Stopping {
            return Err(InstanceError::Terminated(self.id));
        }
        self.iq_input.push(frame).map_err(|_| InstanceError::Terminated(self.id))
    }

    /// Queue a parameter command for the preprocess stage.
    pub fn send(&self, cmd: Command) -> Result<(), InstanceError> {
        if cmd.is_ack() || cmd == Command::Terminate {
            return Err(InstanceError::NotARequest(cmd));
        }
        if self.state >= InstanceState::Stopping {
            return Err(InstanceError::Terminated(self.id));
        }
        self.commands.try_push(cmd).map_err(|e| match e {
            PushError::Full(_) => InstanceError::CommandQueueFull(self.id),
            PushError::Closed(_) => InstanceError::Terminated(self.id),
        })
    }

    /// Queue a control command for the demod stage.
    pub fn control(&self, ctl: ControlCommand) -> Result<(), InstanceError> {
        if self.state >= InstanceState::Stopping {
            return Err(InstanceError::Terminated(self.id));
        }
        self.controls.try_push(ctl).map_err(|e| match e {
            PushError::Full(_) => InstanceError::CommandQueueFull(self.id),
            PushError::Closed(_) => InstanceError::Terminated(self.id),
        })
    }

    pub fn set_frequency(&self, frequency: i64) -> Result<(), InstanceError> {
        self.send(Command::SetFrequency(frequency))
    }

    pub fn set_bandwidth(&self, bandwidth: u32) -> Result<(), InstanceError> {
        self.send(Command::SetBandwidth(bandwidth))
    }

    pub fn set_audio_rate(&self, rate: u32) -> Result<(), InstanceError> {
        self.send(Command::SetAudioRate(rate))
    }

    pub fn set_demod_type(&self, name: &str) -> Result<(), InstanceError> {
        self.control(ControlCommand::SetType(name.to_string()))
    }

    pub fn set_squelch(&self, on: bool) -> Result<(), InstanceError> {
        self.control(if on {
            ControlCommand::SquelchOn
        } else {
            ControlCommand::SquelchOff
        })
    }

    /// Ask the instance to shut down (Running → Stopping).
    ///
    /// The IQ input is closed right away, so acquisition sees its pushes
    /// fail. Never blocks: if the command queue is full it is closed
    /// instead, which preprocess reads as the same request once it has
    /// applied what is already queued. An instance that never started goes
    /// straight to Terminated.
    pub fn terminate(&mut self) {
        match self.state {
            InstanceState::Idle => {
                self.close_all();
                self.collaborators = None;
                self.state = InstanceState::Terminated;
            }
            InstanceState::Running => {
                self.iq_input.close();
                match self.commands.try_push(Command::Terminate) {
                    Ok(()) => {}
                    Err(PushError::Full(_)) => {
                        log::debug!("{}: command queue full, closing it to stop", self.id);
                        self.commands.close();
                    }
                    Err(PushError::Closed(_)) => {
                        log::warn!("{}: command queue closed before terminate", self.id);
                    }
                }
                self.state = InstanceState::Stopping;
                log::debug!("{}: stopping", self.id);
            }
            InstanceState::Stopping | InstanceState::Terminated => {}
        }
    }

    /// Next message from the stages (acknowledgment or rejection), if any.
    pub fn poll(&mut self) -> Option<Command> {
        let msg = self.notify.try_pop()?;
        self.observe(&msg);
        Some(msg)
    }

    /// Wait up to `timeout` for the next message from the stages.
    pub fn next_event(&mut self, timeout: Duration) -> Option<Command> {
        let msg = self.notify.pop_timeout(timeout).ok()?;
        self.observe(&msg);
        Some(msg)
    }

    fn observe(&mut self, msg: &Command) {
        let Some(stage) = msg.terminated_stage() else {
            return;
        };
        let expected = StageKind::ALL.get(self.acks.len()).copied();
        if expected != Some(stage) {
            log::error!(
                "{}: {} acknowledged out of order (expected {:?})",
                self.id,
                stage.name(),
                expected
            );
        }
        self.acks.push(stage);
        if stage == StageKind::Audio {
            self.finish();
        }
    }

    /// Block until every stage has acknowledged termination.
    ///
    /// Returns every message observed while waiting, acknowledgments in the
    /// order they arrived.
    pub fn wait_terminated(&mut self, timeout: Duration) -> Result<Vec<Command>, InstanceError> {
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        while self.state == InstanceState::Stopping {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.notify.pop_timeout(remaining) {
                Ok(msg) => {
                    self.observe(&msg);
                    seen.push(msg);
                }
                Err(PopError::Timeout) | Err(PopError::Closed) => {
                    return Err(InstanceError::ShutdownTimedOut {
                        id: self.id,
                        timeout_ms: timeout.as_millis(),
                    });
                }
            }
        }
        if self.state != InstanceState::Terminated {
            return Err(InstanceError::InvalidState {
                id: self.id,
                state: self.state,
                operation: "wait for termination",
            });
        }
        self.join_threads()?;
        Ok(seen)
    }

    fn finish(&mut self) {
        self.close_all();
        self.state = InstanceState::Terminated;
        log::debug!("{}: terminated", self.id);
    }

    fn close_all(&self) {
        self.iq_input.close();
        self.post_iq.close();
        self.audio.close();
        self.commands.close();
        self.controls.close();
    }

    fn join_threads(&mut self) -> Result<(), InstanceError> {
        let mut result = Ok(());
        for (stage, handle) in self.threads.drain(..) {
            if handle.join().is_err() && result.is_ok() {
                result = Err(InstanceError::StagePanicked {
                    id: self.id,
                    stage: stage.name(),
                });
            }
        }
        result
    }
}

impl Drop for DemodInstance {
    fn drop(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.terminate();
        // Nobody is left to read acknowledgments.
        self.notify.close();
        self.close_all();
        let _ = self.join_threads();
    }
}
