pub mod file;

use std::io;
use std::path::PathBuf;

use rx_stream::IqQueue;
use thiserror::Error;

pub use file::{FileSource, SampleFormat};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read error: {0}")]
    Read(#[from] io::Error),
    #[error("source is already streaming")]
    Busy,
}

/// Common trait for all IQ acquisition backends
pub trait IqSource: Send {
    /// Stream IQ packets into `out`, parking while it is full.
    /// Runs until stop() is called, the source is exhausted, or `out` is closed.
    fn start(&mut self, out: &IqQueue) -> Result<(), SourceError>;

    /// Signal the source to stop streaming
    fn stop(&mut self);

    /// Sample rate in Hz
    fn sample_rate(&self) -> i64;

    /// Center frequency in Hz
    fn center_frequency(&self) -> i64;
}
