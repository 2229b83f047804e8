use std::fmt::Debug;

use thiserror::Error;

use crate::backpack::BUFFER_SIZE;

/// Errors surfaced by the backpack driver.
///
/// `E` is the error type of the underlying [`Transport`](crate::Transport).
/// Out-of-domain brightness, blink rate and digit values are never errors,
/// they are clamped or ignored instead.
#[derive(Debug, Error)]
pub enum Error<E: Debug> {
    /// The bus could not be opened. Terminal, nothing was sent.
    #[error("unable to open bus {bus}: {cause:?}")]
    Open { bus: u8, cause: E },

    /// A single-byte control command was rejected by the transport.
    #[error("unable to execute command \"{label}\": {cause:?}")]
    Command { label: &'static str, cause: E },

    /// The display RAM block write failed.
    #[error("unable to write display buffer: {0:?}")]
    Write(E),

    /// A buffer cell outside `0..BUFFER_SIZE` was addressed.
    #[error("buffer block {index} is out of range 0-{max}", max = BUFFER_SIZE - 1)]
    BufferRange { index: usize },
}

impl<E: Debug> Error<E> {
    /// The transport error behind this failure, if there is one.
    pub fn cause(&self) -> Option<&E> {
        match self {
            Error::Open { cause, .. } | Error::Command { cause, .. } => Some(cause),
            Error::Write(cause) => Some(cause),
            Error::BufferRange { .. } => None,
        }
    }
}
