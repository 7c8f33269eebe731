//! Error types.
//!
//! A tool that cannot be resolved or a flash that does not verify are not
//! errors; they are reported as a [`FlashOutcome`](crate::flash::FlashOutcome).

use crate::session::SessionState;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A precondition that failed before `mdb` was started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Given mdb-path \"{}\" is invalid. Typical location on Linux is: \"/opt/microchip/mplabx/vX.XX/mplab_ide/bin/mdb.sh\"",
        .0.display()
    )]
    InvalidMdbPath(PathBuf),

    #[error("No such hex file: \"{}\".", .0.display())]
    MissingHexFile(PathBuf),

    #[error("No mcu was specified")]
    MissingMcu,
}

/// Failure while talking to a running `mdb`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error talking to mdb: {0}")]
    Io(#[from] io::Error),

    #[error("mdb did not prompt for input within {0:?}")]
    PromptTimeout(Duration),

    #[error("{operation} is not valid while the session is {state:?}")]
    OutOfTurn {
        operation: &'static str,
        state: SessionState,
    },
}
