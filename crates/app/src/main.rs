mod console;
mod dsp;
mod pipeline;
mod sink;

use clap::Parser;
use std::path::PathBuf;

use rx_demod::{DemodParams, DemodType};
use rx_sdr::SampleFormat;

#[derive(Parser, Debug)]
#[command(name = "rx-pipeline")]
#[command(about = "Demodulate an IQ recording through the streaming pipeline")]
struct Cli {
    /// IQ file input
    #[arg(short = 'f', long)]
    file: PathBuf,

    /// Sample format for file input: ci8, ci16, cf32
    #[arg(long, default_value = "ci16")]
    format: SampleFormat,

    /// Capture center frequency in Hz
    #[arg(short = 'c', long, default_value = "100000000")]
    center_freq: i64,

    /// Capture sample rate in Hz
    #[arg(short = 'r', long, default_value = "2500000")]
    sample_rate: i64,

    /// Frequency to demodulate in Hz (defaults to the center frequency)
    #[arg(short = 't', long)]
    tune: Option<i64>,

    /// Channel bandwidth in Hz
    #[arg(short = 'b', long, default_value = "200000")]
    bandwidth: u32,

    /// Audio sample rate in Hz
    #[arg(short = 'a', long, default_value = "48000")]
    audio_rate: u32,

    /// Demodulation type (FM, AM, USB, LSB, RAW, ...)
    #[arg(short = 'm', long, default_value = "FM")]
    mode: DemodType,

    /// Enable squelch at this level in dB
    #[arg(short = 's', long)]
    squelch: Option<f32>,

    /// Raw f32 little-endian audio output file
    #[arg(short = 'w', long)]
    audio_out: Option<PathBuf>,

    /// Read the file as fast as possible instead of at the sample rate
    #[arg(long)]
    no_throttle: bool,

    /// Accept JSON-lines commands on stdin
    #[arg(long)]
    console: bool,

    /// Print statistics
    #[arg(long)]
    stats: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.bandwidth == 0 || i64::from(cli.bandwidth) > cli.sample_rate {
        eprintln!(
            "bandwidth must be between 1 and the sample rate ({} Hz)",
            cli.sample_rate
        );
        std::process::exit(1);
    }

    let cfg = pipeline::RunConfig {
        file: cli.file,
        format: cli.format,
        center_freq: cli.center_freq,
        sample_rate: cli.sample_rate,
        params: DemodParams {
            frequency: cli.tune.unwrap_or(cli.center_freq),
            sample_rate: cli.sample_rate,
            bandwidth: cli.bandwidth,
            audio_sample_rate: cli.audio_rate,
            demod_type: cli.mode,
        },
        squelch: cli.squelch.is_some(),
        squelch_db: cli.squelch.unwrap_or(-60.0),
        audio_out: cli.audio_out,
        throttle: !cli.no_throttle,
        console: cli.console,
        print_stats: cli.stats,
    };

    if let Err(e) = pipeline::run_file(cfg) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
