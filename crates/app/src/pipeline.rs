use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use serde_json::{json, Value};

use rx_demod::{AudioSink, Command, DemodInstance, DemodParams, InstanceConfig};
use rx_sdr::{FileSource, IqSource, SampleFormat};
use rx_stream::{pump, BoundedQueue, BufferPool, Distributor, IqPacket, IqQueue, Redistributor};

use crate::console::{self, Request};
use crate::dsp::{AnalogDemod, Downconverter};
use crate::sink::{self, NullSink, RawAudioWriter};

/// Everything `run_file` needs, filled in from the command line.
pub struct RunConfig {
    pub file: PathBuf,
    pub format: SampleFormat,
    pub center_freq: i64,
    pub sample_rate: i64,
    pub params: DemodParams,
    pub squelch: bool,
    pub squelch_db: f32,
    pub audio_out: Option<PathBuf>,
    pub throttle: bool,
    pub console: bool,
    pub print_stats: bool,
}

const PUMP_TICK: Duration = Duration::from_millis(2);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the pipeline from an IQ file to raw audio:
///
/// file → capture → iq-fanout ─┬→ demod instance → audio sink
///                             └→ iq-snapshot → level monitor
pub fn run_file(cfg: RunConfig) -> Result<(), String> {
    let sink: Box<dyn AudioSink> = match &cfg.audio_out {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
            Box::new(RawAudioWriter::new(BufWriter::new(file)))
        }
        None => Box::new(NullSink::default()),
    };

    let config = InstanceConfig {
        squelch_level_db: cfg.squelch_db,
        params: DemodParams {
            sample_rate: cfg.sample_rate,
            ..cfg.params.clone()
        },
        ..InstanceConfig::default()
    };
    let mut instance = DemodInstance::new(
        config,
        Box::new(Downconverter::new()),
        Box::new(AnalogDemod::new()),
        sink,
    );
    log::info!(
        "{}: {} at {} Hz, bandwidth {} Hz, audio {} Hz",
        instance.id(),
        cfg.params.demod_type,
        cfg.params.frequency,
        cfg.params.bandwidth,
        cfg.params.audio_sample_rate
    );

    // Stages between acquisition and the instance
    let capture: Arc<IqQueue> = Arc::new(BoundedQueue::new(64));
    let tap: Arc<IqQueue> = Arc::new(BoundedQueue::new(4));
    let snapshots: Arc<IqQueue> = Arc::new(BoundedQueue::new(4));

    let mut fanout = Distributor::<IqPacket>::distributor("iq-fanout");
    fanout.set_input(Arc::clone(&capture));
    fanout.attach_output(instance.input());
    fanout.attach_output(Arc::clone(&tap));

    let mut snapshot = Redistributor::redistributor("iq-snapshot", BufferPool::new(8));
    snapshot.set_input(Arc::clone(&tap));
    snapshot.attach_output(Arc::clone(&snapshots));

    instance.start().map_err(|e| format!("failed to start instance: {}", e))?;
    if cfg.squelch {
        instance
            .set_squelch(true)
            .map_err(|e| format!("failed to enable squelch: {}", e))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let fanout_pump = pump::spawn("iq-fanout", fanout, Arc::clone(&running), PUMP_TICK)
        .map_err(|e| format!("failed to spawn iq-fanout: {}", e))?;
    let snapshot_pump = pump::spawn("iq-snapshot", snapshot, Arc::clone(&running), PUMP_TICK)
        .map_err(|e| format!("failed to spawn iq-snapshot: {}", e))?;
    let monitor = sink::spawn_monitor(Arc::clone(&snapshots), 50)
        .map_err(|e| format!("failed to spawn monitor: {}", e))?;

    // File source (blocking read on its own thread)
    let mut source = FileSource::new(&cfg.file, cfg.format, cfg.sample_rate, cfg.center_freq);
    source.set_throttle(cfg.throttle);
    let source_running = source.running_flag();
    let iq_pool = source.pool().clone();
    let reader_capture = Arc::clone(&capture);
    let reader_thread = std::thread::Builder::new()
        .name("file-reader".to_string())
        .spawn(move || {
            if let Err(e) = source.start(&reader_capture) {
                log::error!("file reader error: {}", e);
            }
            reader_capture.close();
        })
        .map_err(|e| format!("failed to spawn file reader: {}", e))?;

    let (req_tx, req_rx) = channel::bounded::<Request>(16);
    if cfg.console {
        console::spawn(req_tx).map_err(|e| format!("failed to spawn console: {}", e))?;
    } else {
        drop(req_tx);
    }

    let stats_start = Instant::now();
    let mut last_stats = Instant::now();
    let mut console_open = cfg.console;

    // Main loop: dispatch console requests, report stage messages, and stop
    // once the file is exhausted and the fan-out has drained.
    loop {
        if console_open {
            match req_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(Request::Terminate) => {
                    log::info!("terminate requested");
                    source_running.store(false, Ordering::SeqCst);
                    capture.close();
                    break;
                }
                Ok(Request::Status) => report_status(&instance),
                Ok(Request::Command(cmd)) => {
                    if let Err(e) = instance.send(cmd) {
                        log::warn!("command not sent: {}", e);
                    }
                }
                Ok(Request::Control(ctl)) => {
                    if let Err(e) = instance.control(ctl) {
                        log::warn!("control not sent: {}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => console_open = false,
            }
        } else {
            std::thread::sleep(Duration::from_millis(50));
        }

        while let Some(msg) = instance.poll() {
            report_event(&msg, cfg.console);
        }

        if capture.is_closed() && capture.is_empty() {
            break;
        }

        if cfg.print_stats && last_stats.elapsed().as_secs() >= 5 {
            print_stats(&instance, stats_start);
            last_stats = Instant::now();
        }
    }

    if reader_thread.join().is_err() {
        log::error!("file reader panicked");
    }
    running.store(false, Ordering::Release);
    let fanout = fanout_pump
        .join()
        .map_err(|_| "iq-fanout pump panicked".to_string())?;
    let snapshot = snapshot_pump
        .join()
        .map_err(|_| "iq-snapshot pump panicked".to_string())?;
    snapshots.close();

    // Let the instance work through what the fan-out already handed it.
    let input = instance.input();
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while !input.is_empty() && Instant::now() < deadline {
        std::thread::sleep(PUMP_TICK);
    }

    instance.terminate();
    let events = instance
        .wait_terminated(SHUTDOWN_TIMEOUT)
        .map_err(|e| format!("shutdown failed: {}", e))?;
    for msg in &events {
        report_event(msg, cfg.console);
    }

    let levels = monitor
        .join()
        .map_err(|_| "monitor panicked".to_string())?;

    if cfg.print_stats {
        print_stats(&instance, stats_start);
        let f = fanout.stats();
        let s = snapshot.stats();
        eprintln!(
            "iq-fanout: consumed {} delivered {} dropped {} stalls {}",
            f.consumed, f.delivered, f.dropped, f.stalls
        );
        eprintln!(
            "iq-snapshot: consumed {} delivered {} dropped {}; level peak {:.1} dB over {} snapshots",
            s.consumed, s.delivered, s.dropped, levels.peak_db, levels.snapshots
        );
        let pool = iq_pool.stats();
        eprintln!(
            "iq pool: created {} acquired {} outstanding {}",
            pool.created,
            pool.acquired,
            pool.outstanding()
        );
    }

    Ok(())
}

/// Log a stage message, echoing it on the console when one is attached.
fn report_event(msg: &Command, console: bool) {
    match msg {
        Command::Rejected { instance, error } => log::warn!("{}: {}", instance, error),
        other => match other.terminated_stage() {
            Some(stage) => log::debug!("{} acknowledged termination", stage.name()),
            None => return,
        },
    }
    if let Some(event) = console_event(msg, console) {
        console::event(event);
    }
}

/// JSON line for a stage message, or `None` when there is no console.
fn console_event(msg: &Command, console: bool) -> Option<Value> {
    if !console {
        return None;
    }
    match msg {
        Command::Rejected { instance, error } => Some(json!({
            "type": "rejected",
            "instance": instance.to_string(),
            "error": error.to_string(),
        })),
        other => other
            .terminated_stage()
            .map(|stage| json!({"type": "terminated", "stage": stage.name()})),
    }
}

fn report_status(instance: &DemodInstance) {
    let p = instance.params();
    let s = instance.stats();
    console::event(json!({
        "type": "status",
        "instance": instance.id().to_string(),
        "state": format!("{:?}", instance.state()),
        "frequency": p.frequency,
        "bandwidth": p.bandwidth,
        "audio_rate": p.audio_sample_rate,
        "demod_type": p.demod_type.name(),
        "iq_frames": s.iq_frames,
        "audio_frames": s.audio_frames,
        "squelched": s.squelched,
    }));
}

fn print_stats(instance: &DemodInstance, start: Instant) {
    let s = instance.stats();
    eprintln!(
        "[{:.1}s] {}: iq {} post-iq {} audio {} squelched {} rejected {}",
        start.elapsed().as_secs_f64(),
        instance.id(),
        s.iq_frames,
        s.post_iq_frames,
        s.audio_frames,
        s.squelched,
        s.rejected,
    );
}
