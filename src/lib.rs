//! # mdb-flash
//!
//! Program a Microchip PIC by driving the `mdb` command-line debugger that
//! ships with MPLAB X.
//!
//! `mdb` is interactive: it prints a `>` at the start of a line whenever it
//! wants the next command, and reports everything else (attached tools,
//! warnings, programming results) as free-form text. This crate runs that
//! conversation unattended:
//!
//! 1. list the attached hardware tools and pick one by type and serial number,
//! 2. select the MCU and force EEPROM into the programmed memory ranges,
//! 3. attach the tool, answering "Do you wish to continue?" if asked,
//! 4. program the image and check that `mdb` reported both a completed
//!    program/verify cycle and success,
//! 5. quit.
//!
//! ## Quick start
//!
//! ```no_run
//! use mdb_flash::{FlashPlan, HwTool, Session, flash, process};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (mut mdb, streams) = process::spawn(
//!         "/opt/microchip/mplabx/v3.10/mplab_ide/bin/mdb.sh".as_ref(),
//!         process::Transport::Pipe,
//!     )?;
//!     let mut session = Session::attach(streams.input, streams.output);
//!
//!     let plan = FlashPlan {
//!         image: "app.hex".into(),
//!         mcu: "PIC18F87K90".into(),
//!         hwtool: HwTool::Icd3,
//!         hwtool_serial: Some("JIT140210129".into()),
//!         settle_delay: Duration::from_secs(1),
//!     };
//!
//!     let outcome = flash::run(&mut session, &plan).await?;
//!     drop(session);
//!     mdb.wait()?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Watching the session
//!
//! [`Session::with_mirror`] copies the transcript to any sink, each output
//! line prefixed with `[mdb out] ` and each command with `[send] `.
//! [`console_mirror`] writes it to stdout.
//!
//! ## Hardware tools
//!
//! `mdb` accepts PICkit3, ICD3, RealICE, SIM and PM3, but only the ICD3 and
//! PICkit3 listing formats are known to [`hwtool::resolve`]. Selecting one of
//! the others always ends in [`FlashOutcome::HwToolNotFound`].

pub mod cli;
pub mod command;
pub mod duration;
pub mod error;
pub mod flash;
pub mod hwtool;
pub mod process;
pub mod reader;
pub mod scanner;
pub mod session;

pub use cli::{Args, FlashConfig};
pub use command::MdbCommand;
pub use error::{ConfigError, SessionError};
pub use flash::{FlashOutcome, FlashPlan};
pub use hwtool::{HwTool, HwToolEntry};
pub use scanner::{CapturedBlock, PromptScanner};
pub use session::{Handoff, OutputHandler, PromptSession, Session, SessionState, console_mirror};
