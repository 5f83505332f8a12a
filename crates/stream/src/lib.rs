// Copyright 2025-2026 CEMAXECUTER LLC

//! Streaming core for the receiver pipeline.
//!
//! Sample data moves between independently scheduled stages as shared
//! [`Packet`]s over [`BoundedQueue`]s. Buffers come from [`BufferPool`]s so the
//! hot path does not allocate per frame, and [`Distributor`]/[`Redistributor`]
//! stages branch a queue out to any number of consumers.

pub mod packet;
pub mod payload;
pub mod pool;
pub mod processor;
pub mod pump;
pub mod queue;

pub use packet::{Packet, PacketMut, Recycle};
pub use payload::{AudioPacket, AudioQueue, IqPacket, IqQueue, PacketQueue, PostIqPacket, PostIqQueue};
pub use pool::{BufferPool, PoolStats};
pub use processor::{
    Delivery, Distributor, EmptyPolicy, Forward, OutputHandle, Outputs, PooledCopy, Process,
    Processor, Redistributor, StageStats,
};
pub use pump::Runnable;
pub use queue::{BoundedQueue, PopError, PushError};
