// Copyright 2025-2026 CEMAXECUTER LLC

//! Fan-out pipeline stages.
//!
//! A [`Processor`] pulls packets from one input queue, turns each into zero
//! or more output packets, and publishes every output to all attached
//! subscriber queues. A subscriber whose queue is full simply misses that
//! packet; if every subscriber is full the stage stops pulling input so the
//! backlog stays bounded upstream instead of being thrown away.
//!
//! The subscriber set can be changed from any thread through an
//! [`OutputHandle`]. Changes are queued and applied by the stage itself
//! between packets, so a pass never runs against a half-updated set.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use crate::packet::{Packet, Recycle};
use crate::payload::PacketQueue;
use crate::pool::BufferPool;

/// Turns one input packet into zero or more outputs.
pub trait Process<I: Recycle, O: Recycle>: Send {
    fn process(&mut self, input: Packet<I>, out: &mut Vec<Packet<O>>);
}

/// Republish the input packet itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct Forward;

impl<T: Recycle> Process<T, T> for Forward {
    fn process(&mut self, input: Packet<T>, out: &mut Vec<Packet<T>>) {
        out.push(input);
    }
}

/// Copy the input into a pooled buffer and publish the copy.
///
/// The input is released as soon as it has been copied, so subscribers never
/// extend its lifetime and may freely `make_mut` their snapshot.
pub struct PooledCopy<T> {
    pool: BufferPool<T>,
}

impl<T: Recycle> PooledCopy<T> {
    pub fn new(pool: BufferPool<T>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &BufferPool<T> {
        &self.pool
    }
}

impl<T: Recycle + Clone + Send + Sync> Process<T, T> for PooledCopy<T> {
    fn process(&mut self, input: Packet<T>, out: &mut Vec<Packet<T>>) {
        let mut copy = self.pool.acquire();
        copy.clone_from(&*input);
        input.release();
        out.push(copy.freeze());
    }
}

/// What a stage does with input while it has no subscribers at all.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPolicy {
    /// Keep consuming and drop everything.
    #[default]
    Discard,
    /// Leave the input queued until someone subscribes.
    Stall,
}

/// Per-stage counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    /// Packets popped from the input
    pub consumed: u64,
    /// Per-subscriber deliveries
    pub delivered: u64,
    /// Per-subscriber drops because that subscriber was full
    pub dropped: u64,
    /// Passes cut short because no subscriber had room
    pub stalls: u64,
}

/// Outcome of publishing one packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

pub enum OutputChange<T: Recycle> {
    Attach(Arc<PacketQueue<T>>),
    Detach(Arc<PacketQueue<T>>),
}

/// Cloneable, thread-safe handle for changing a stage's subscriber set.
pub struct OutputHandle<T: Recycle> {
    tx: Sender<OutputChange<T>>,
}

impl<T: Recycle> Clone for OutputHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Recycle> OutputHandle<T> {
    /// Subscribe a queue. Takes effect at the stage's next safe point.
    pub fn attach(&self, queue: Arc<PacketQueue<T>>) {
        // The receiver lives as long as the stage; once the stage is gone
        // there is nothing left to subscribe to.
        let _ = self.tx.send(OutputChange::Attach(queue));
    }

    /// Unsubscribe a queue. Takes effect at the stage's next safe point.
    pub fn detach(&self, queue: &Arc<PacketQueue<T>>) {
        let _ = self.tx.send(OutputChange::Detach(Arc::clone(queue)));
    }
}

/// Subscriber set owned by a stage.
pub struct Outputs<T: Recycle> {
    queues: Vec<Arc<PacketQueue<T>>>,
    changes: Receiver<OutputChange<T>>,
    handle: OutputHandle<T>,
}

impl<T: Recycle> Default for Outputs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Recycle> Outputs<T> {
    pub fn new() -> Self {
        let (tx, changes) = channel::unbounded();
        Self {
            queues: Vec::new(),
            changes,
            handle: OutputHandle { tx },
        }
    }

    pub fn handle(&self) -> OutputHandle<T> {
        self.handle.clone()
    }

    /// Apply queued attach/detach requests, then unsubscribe every queue
    /// that has been closed. Returns how many requests were applied.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(change) = self.changes.try_recv() {
            applied += 1;
            match change {
                OutputChange::Attach(queue) => {
                    if self.queues.iter().any(|q| Arc::ptr_eq(q, &queue)) {
                        log::debug!("output already attached, ignoring");
                    } else {
                        self.queues.push(queue);
                    }
                }
                OutputChange::Detach(queue) => {
                    self.queues.retain(|q| !Arc::ptr_eq(q, &queue));
                }
            }
        }
        self.prune_closed();
        applied
    }

    fn prune_closed(&mut self) {
        let before = self.queues.len();
        self.queues.retain(|q| !q.is_closed());
        let pruned = before - self.queues.len();
        if pruned > 0 {
            log::debug!("{} subscriber queue(s) closed, detaching", pruned);
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// True if at least one open subscriber has room.
    pub fn any_ready(&self) -> bool {
        self.queues.iter().any(|q| !q.is_closed() && !q.is_full())
    }

    /// True if no open subscriber is full.
    pub fn all_ready(&self) -> bool {
        self.queues.iter().all(|q| q.is_closed() || !q.is_full())
    }

    /// Hand one holder of `packet` to every subscriber with room.
    ///
    /// The handle for a full subscriber is released on the spot, so every
    /// holder created here is either queued or released exactly once.
    /// Subscribers that closed their queue are unsubscribed.
    pub fn distribute(&mut self, packet: Packet<T>) -> Delivery {
        let mut delivery = Delivery::default();
        let count = self.queues.len();
        if count == 0 {
            packet.release();
            return delivery;
        }

        let mut packet = Some(packet);
        let mut closed = Vec::new();
        for (i, queue) in self.queues.iter().enumerate() {
            let holder = if i + 1 == count {
                packet.take()
            } else {
                packet.clone()
            };
            let Some(holder) = holder else { break };
            match queue.try_push(holder) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    if e.is_closed() {
                        closed.push(i);
                    }
                    delivery.dropped += 1;
                }
            }
        }

        for i in closed.into_iter().rev() {
            log::debug!("subscriber queue closed, detaching");
            self.queues.remove(i);
        }
        delivery
    }
}

/// One stage: an input queue, a strategy, and a set of subscriber queues.
pub struct Processor<I: Recycle, O: Recycle, P> {
    name: String,
    input: Option<Arc<PacketQueue<I>>>,
    outputs: Outputs<O>,
    strategy: P,
    empty_policy: EmptyPolicy,
    scratch: Vec<Packet<O>>,
    stats: StageStats,
}

/// Republishes each input packet to every subscriber (shared payload).
pub type Distributor<T> = Processor<T, T, Forward>;

/// Publishes a private pooled copy of each input packet.
pub type Redistributor<T> = Processor<T, T, PooledCopy<T>>;

impl<T: Recycle> Processor<T, T, Forward> {
    pub fn distributor(name: impl Into<String>) -> Self {
        Processor::new(name, Forward)
    }
}

impl<T: Recycle + Clone + Send + Sync> Processor<T, T, PooledCopy<T>> {
    pub fn redistributor(name: impl Into<String>, pool: BufferPool<T>) -> Self {
        Processor::new(name, PooledCopy::new(pool))
    }
}

impl<I: Recycle, O: Recycle, P: Process<I, O>> Processor<I, O, P> {
    pub fn new(name: impl Into<String>, strategy: P) -> Self {
        Self {
            name: name.into(),
            input: None,
            outputs: Outputs::new(),
            strategy,
            empty_policy: EmptyPolicy::default(),
            scratch: Vec::new(),
            stats: StageStats::default(),
        }
    }

    pub fn with_empty_policy(mut self, policy: EmptyPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_input(&mut self, input: Arc<PacketQueue<I>>) {
        self.input = Some(input);
    }

    pub fn input(&self) -> Option<&Arc<PacketQueue<I>>> {
        self.input.as_ref()
    }

    /// Handle for attaching/detaching subscribers from other threads.
    pub fn output_handle(&self) -> OutputHandle<O> {
        self.outputs.handle()
    }

    /// Subscribe a queue (applied at the next safe point).
    pub fn attach_output(&self, queue: Arc<PacketQueue<O>>) {
        self.outputs.handle.attach(queue);
    }

    /// Unsubscribe a queue (applied at the next safe point).
    pub fn detach_output(&self, queue: &Arc<PacketQueue<O>>) {
        self.outputs.handle.detach(queue);
    }

    /// Number of subscribers as of the last safe point.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_input_empty(&self) -> bool {
        self.input.as_ref().map_or(true, |q| q.is_empty())
    }

    /// True if no subscriber is full.
    pub fn is_output_ready(&self) -> bool {
        self.outputs.all_ready()
    }

    /// True if at least one subscriber has room.
    pub fn is_any_output_ready(&self) -> bool {
        self.outputs.any_ready()
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }

    pub fn strategy(&self) -> &P {
        &self.strategy
    }

    /// One processing pass. Returns the number of input packets consumed.
    ///
    /// The pass is bounded by the input length seen when it starts, so a
    /// producer that keeps up cannot keep `run` busy forever.
    pub fn run(&mut self) -> usize {
        self.outputs.apply_pending();
        let Some(input) = self.input.clone() else {
            return 0;
        };
        if input.is_empty() {
            return 0;
        }
        self.process(&input)
    }

    fn can_accept(&self) -> bool {
        if self.outputs.is_empty() {
            self.empty_policy == EmptyPolicy::Discard
        } else {
            self.outputs.any_ready()
        }
    }

    fn process(&mut self, input: &PacketQueue<I>) -> usize {
        let budget = input.len();
        let mut consumed = 0;
        while consumed < budget {
            self.outputs.apply_pending();
            if !self.can_accept() {
                self.stats.stalls += 1;
                log::trace!("{}: all outputs full, stalling with {} queued", self.name, input.len());
                break;
            }
            let Some(packet) = input.try_pop() else {
                break;
            };
            consumed += 1;
            self.stats.consumed += 1;

            self.strategy.process(packet, &mut self.scratch);
            for out in self.scratch.drain(..) {
                let delivery = self.outputs.distribute(out);
                self.stats.delivered += delivery.delivered as u64;
                self.stats.dropped += delivery.dropped as u64;
            }
        }
        if consumed > 0 {
            log::trace!(
                "{}: consumed {} (delivered {}, dropped {})",
                self.name,
                consumed,
                self.stats.delivered,
                self.stats.dropped
            );
        }
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::IqPacket;
    use crate::queue::BoundedQueue;
    use num_complex::Complex32;

    fn iq_pool() -> BufferPool<IqPacket> {
        BufferPool::new(64)
    }

    fn iq(pool: &BufferPool<IqPacket>, value: f32) -> Packet<IqPacket> {
        let mut buf = pool.acquire();
        buf.frequency = 100_000_000;
        buf.sample_rate = 2_000_000;
        buf.samples.push(Complex32::new(value, 0.0));
        buf.freeze()
    }

    fn queue(capacity: usize) -> Arc<PacketQueue<IqPacket>> {
        Arc::new(BoundedQueue::new(capacity))
    }

    fn drain_values(q: &PacketQueue<IqPacket>) -> Vec<f32> {
        std::iter::from_fn(|| q.try_pop())
            .map(|p| p.samples[0].re)
            .collect()
    }

    #[test]
    fn test_distributor_delivers_to_every_subscriber() {
        let pool = iq_pool();
        let input = queue(32);
        let subs: Vec<_> = (0..3).map(|_| queue(32)).collect();

        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        for s in &subs {
            dist.attach_output(Arc::clone(s));
        }

        for i in 0..10 {
            input.push(iq(&pool, i as f32)).unwrap();
        }
        assert_eq!(dist.run(), 10);
        assert!(input.is_empty());

        for s in &subs {
            assert_eq!(drain_values(s), (0..10).map(|i| i as f32).collect::<Vec<_>>());
        }

        let stats = pool.stats();
        assert_eq!(stats.released, 30, "N x M holders released");
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(dist.stats().delivered, 30);
        assert_eq!(dist.stats().dropped, 0);
    }

    #[test]
    fn test_saturated_subscriber_is_skipped() {
        let pool = iq_pool();
        let input = queue(32);
        let slow = queue(1);
        let fast = queue(32);

        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        dist.attach_output(Arc::clone(&slow));
        dist.attach_output(Arc::clone(&fast));

        // Keep the slow subscriber saturated.
        slow.push(iq(&pool, -1.0)).unwrap();

        for i in 0..8 {
            input.push(iq(&pool, i as f32)).unwrap();
        }
        dist.run();

        assert_eq!(drain_values(&slow), vec![-1.0]);
        assert_eq!(drain_values(&fast).len(), 8);
        assert_eq!(dist.stats().dropped, 8);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_all_saturated_stalls_input() {
        let pool = iq_pool();
        let input = queue(32);
        let a = queue(1);
        let b = queue(1);
        a.push(iq(&pool, -1.0)).unwrap();
        b.push(iq(&pool, -2.0)).unwrap();

        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        dist.attach_output(Arc::clone(&a));
        dist.attach_output(Arc::clone(&b));

        for i in 0..5 {
            input.push(iq(&pool, i as f32)).unwrap();
        }
        assert_eq!(dist.run(), 0);
        assert_eq!(input.len(), 5, "nothing may be popped while every output is full");
        assert_eq!(dist.stats().stalls, 1);

        // Free one slot: exactly one packet goes through, then it stalls again.
        a.try_pop().unwrap();
        assert_eq!(dist.run(), 1);
        assert_eq!(input.len(), 4);
    }

    #[test]
    fn test_no_subscribers_discards_by_default() {
        let pool = iq_pool();
        let input = queue(8);
        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        for i in 0..4 {
            input.push(iq(&pool, i as f32)).unwrap();
        }
        assert_eq!(dist.run(), 4);
        assert!(input.is_empty());
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_no_subscribers_stall_policy() {
        let pool = iq_pool();
        let input = queue(8);
        let mut dist = Distributor::distributor("iq").with_empty_policy(EmptyPolicy::Stall);
        dist.set_input(Arc::clone(&input));
        for i in 0..4 {
            input.push(iq(&pool, i as f32)).unwrap();
        }
        assert_eq!(dist.run(), 0);
        assert_eq!(input.len(), 4);

        let sub = queue(8);
        dist.attach_output(Arc::clone(&sub));
        assert_eq!(dist.run(), 4);
        assert_eq!(drain_values(&sub), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_attach_detach_between_passes() {
        let pool = iq_pool();
        let input = queue(8);
        let a = queue(8);
        let b = queue(8);
        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));

        let handle = dist.output_handle();
        handle.attach(Arc::clone(&a));
        handle.attach(Arc::clone(&a));
        input.push(iq(&pool, 1.0)).unwrap();
        dist.run();
        assert_eq!(dist.output_count(), 1, "duplicate attach must be ignored");

        let other_thread = {
            let handle = handle.clone();
            let b = Arc::clone(&b);
            let a = Arc::clone(&a);
            std::thread::spawn(move || {
                handle.attach(b);
                handle.detach(&a);
            })
        };
        other_thread.join().unwrap();

        input.push(iq(&pool, 2.0)).unwrap();
        dist.run();
        assert_eq!(drain_values(&a), vec![1.0]);
        assert_eq!(drain_values(&b), vec![2.0]);
    }

    #[test]
    fn test_closed_subscriber_is_detached() {
        let pool = iq_pool();
        let input = queue(8);
        let gone = queue(8);
        let live = queue(8);
        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        dist.attach_output(Arc::clone(&gone));
        dist.attach_output(Arc::clone(&live));
        gone.close();

        input.push(iq(&pool, 1.0)).unwrap();
        dist.run();
        assert_eq!(dist.output_count(), 1);
        assert_eq!(drain_values(&live), vec![1.0]);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_closed_subscriber_does_not_count_as_ready() {
        let pool = iq_pool();
        let input = queue(8);
        let live = queue(1);
        let gone = queue(8);
        live.push(iq(&pool, -1.0)).unwrap();
        gone.close();

        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        dist.attach_output(Arc::clone(&live));
        dist.attach_output(Arc::clone(&gone));
        for i in 0..4 {
            input.push(iq(&pool, i as f32)).unwrap();
        }

        assert_eq!(dist.run(), 0, "the only open subscriber is saturated");
        assert_eq!(input.len(), 4);
        assert_eq!(dist.output_count(), 1);
        assert_eq!(dist.stats().dropped, 0);
        assert_eq!(dist.stats().stalls, 1);
        assert!(!dist.is_any_output_ready());

        live.try_pop().unwrap();
        assert_eq!(dist.run(), 1);
        assert_eq!(drain_values(&live), vec![0.0]);
    }

    #[test]
    fn test_subscriber_closed_while_full_is_detached() {
        let pool = iq_pool();
        let input = queue(8);
        let stuck = queue(1);
        stuck.push(iq(&pool, -1.0)).unwrap();

        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        dist.attach_output(Arc::clone(&stuck));
        for i in 0..4 {
            input.push(iq(&pool, i as f32)).unwrap();
        }
        assert_eq!(dist.run(), 0);
        assert_eq!(dist.output_count(), 1);

        stuck.close();
        let mut consumed = 0;
        for _ in 0..100 {
            consumed += dist.run();
        }
        assert_eq!(dist.output_count(), 0);
        // With no subscribers left the default policy discards.
        assert_eq!(consumed, 4);
        assert!(input.is_empty());

        stuck.clear();
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_attach_detach_while_pumping() {
        use crate::pump;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        const FRAMES: usize = 500;
        let pool = iq_pool();
        let input = queue(16);
        let steady = queue(1024);

        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        dist.attach_output(Arc::clone(&steady));
        let handle = dist.output_handle();

        let running = Arc::new(AtomicBool::new(true));
        let pumping =
            pump::spawn("iq-churn", dist, Arc::clone(&running), Duration::from_millis(1)).unwrap();

        let churning = Arc::new(AtomicBool::new(true));
        let churn = {
            let churning = Arc::clone(&churning);
            std::thread::spawn(move || {
                let mut seen = Vec::new();
                while churning.load(Ordering::Acquire) {
                    let sub = queue(512);
                    handle.attach(Arc::clone(&sub));
                    std::thread::sleep(Duration::from_micros(200));
                    handle.detach(&sub);
                    seen.push(sub);
                }
                seen
            })
        };

        for i in 0..FRAMES {
            input.push(iq(&pool, i as f32)).unwrap();
        }
        while !input.is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
        churning.store(false, Ordering::Release);
        let churned = churn.join().unwrap();
        running.store(false, Ordering::Release);
        let dist = pumping.join().unwrap();

        assert_eq!(
            drain_values(&steady),
            (0..FRAMES).map(|i| i as f32).collect::<Vec<_>>()
        );
        let mut partial = 0;
        for sub in &churned {
            let values = drain_values(sub);
            assert!(values.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", values);
            partial += values.len();
        }
        assert!(!churned.is_empty());
        assert_eq!(dist.stats().consumed, FRAMES as u64);
        assert_eq!(dist.stats().delivered, (FRAMES + partial) as u64);

        drop(churned);
        let stats = pool.stats();
        assert_eq!(stats.holds, stats.released);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_redistributor_copies_are_private() {
        let src_pool = iq_pool();
        let copy_pool = iq_pool();
        let input = queue(8);
        let a = queue(8);
        let b = queue(8);

        let mut redist = Redistributor::redistributor("iq-copy", copy_pool.clone());
        redist.set_input(Arc::clone(&input));
        redist.attach_output(Arc::clone(&a));
        redist.attach_output(Arc::clone(&b));

        let original = iq(&src_pool, 5.0);
        input.push(original.clone()).unwrap();
        redist.run();

        // The input holder was released right after the copy was taken.
        assert_eq!(original.ref_count(), 1);

        let mut seen_by_a = a.try_pop().unwrap();
        let seen_by_b = b.try_pop().unwrap();
        assert!(!Packet::ptr_eq(&seen_by_a, &original));

        seen_by_a.make_mut().samples[0] = Complex32::new(-7.0, 0.0);
        assert_eq!(seen_by_a.samples[0].re, -7.0);
        assert_eq!(seen_by_b.samples[0].re, 5.0);
        assert_eq!(original.samples[0].re, 5.0);

        drop((seen_by_a, seen_by_b, original));
        assert_eq!(src_pool.stats().outstanding(), 0);
        assert_eq!(copy_pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_redistributor_stalls_like_distributor() {
        let pool = iq_pool();
        let input = queue(8);
        let full = queue(1);
        full.push(iq(&pool, 0.0)).unwrap();

        let mut redist = Redistributor::redistributor("iq-copy", iq_pool());
        redist.set_input(Arc::clone(&input));
        redist.attach_output(Arc::clone(&full));
        input.push(iq(&pool, 1.0)).unwrap();

        assert_eq!(redist.run(), 0);
        assert_eq!(input.len(), 1);
        assert_eq!(redist.strategy().pool().stats().acquired, 0);
    }

    #[test]
    fn test_release_accounting_mixed_paths() {
        let pool = iq_pool();
        let input = queue(64);
        let subs: Vec<_> = [2usize, 64, 5].iter().map(|&c| queue(c)).collect();
        let mut dist = Distributor::distributor("iq");
        dist.set_input(Arc::clone(&input));
        for s in &subs {
            dist.attach_output(Arc::clone(s));
        }

        for round in 0..4 {
            for i in 0..16 {
                input.push(iq(&pool, (round * 16 + i) as f32)).unwrap();
            }
            dist.run();
            // The slowest subscriber drains only every other round.
            if round % 2 == 1 {
                subs[0].clear();
            }
            subs[1].clear();
        }
        for s in &subs {
            s.clear();
        }
        input.clear();

        let stats = pool.stats();
        assert_eq!(stats.holds, stats.released);
        assert_eq!(stats.outstanding(), 0);
        let st = dist.stats();
        assert_eq!(st.delivered + st.dropped, st.consumed * 3);
    }
}
