//! Command-line arguments and the checks run before `mdb` is started.

use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::flash::FlashPlan;
use crate::hwtool::HwTool;
use crate::process::Transport;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "mdb-flash",
    about = "Program a PIC through Microchip's mdb debugger",
    version
)]
pub struct Args {
    /// Path to hex file to program
    #[arg(long, env = "MDB_FLASH_HEX")]
    pub hex: PathBuf,

    /// Path to mdb.bat (mdb.sh on Linux), typically
    /// /opt/microchip/mplabx/vX.XX/mplab_ide/bin/mdb.sh
    #[arg(long, env = "MDB_PATH")]
    pub mdb_path: PathBuf,

    /// MCU type to program, for example PIC18F87K90
    #[arg(long)]
    pub mcu: String,

    /// Hardware tool to use
    #[arg(long, value_enum, ignore_case = true)]
    pub hwtool: HwTool,

    /// Serial number of the tool to use when several are attached, e.g. JIT140210129
    #[arg(long)]
    pub hwtool_serial: Option<String>,

    /// How to attach to mdb
    #[arg(long, value_enum, default_value = "pipe")]
    pub transport: Transport,

    /// Give up if mdb does not prompt within this long (e.g. 90s). Waits forever by default
    #[arg(long, value_parser = parse_duration)]
    pub prompt_timeout: Option<Duration>,

    /// Pause between a finished program and quit
    #[arg(long, value_parser = parse_duration, default_value = "1s")]
    pub settle_delay: Duration,

    /// Do not copy mdb's output to stdout
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Everything a run needs, checked.
#[derive(Debug, Clone)]
pub struct FlashConfig {
    pub mdb_path: PathBuf,
    pub transport: Transport,
    pub prompt_timeout: Option<Duration>,
    pub mirror: bool,
    pub plan: FlashPlan,
}

impl Args {
    /// Check the preconditions for a run: mdb and the image must be files
    /// and an MCU must be named.
    pub fn into_config(self) -> Result<FlashConfig, ConfigError> {
        if !self.mdb_path.is_file() {
            return Err(ConfigError::InvalidMdbPath(self.mdb_path));
        }

        if !self.hex.is_file() {
            return Err(ConfigError::MissingHexFile(self.hex));
        }

        let mcu = self.mcu.trim();
        if mcu.is_empty() {
            return Err(ConfigError::MissingMcu);
        }

        Ok(FlashConfig {
            mdb_path: self.mdb_path,
            transport: self.transport,
            prompt_timeout: self.prompt_timeout,
            mirror: !self.quiet,
            plan: FlashPlan {
                image: self.hex,
                mcu: mcu.to_string(),
                hwtool: self.hwtool,
                hwtool_serial: self.hwtool_serial,
                settle_delay: self.settle_delay,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["mdb-flash"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_minimal() {
        let args = parse(&[
            "--hex", "fw.hex", "--mdb-path", "mdb.sh", "--mcu", "PIC18F87K90", "--hwtool", "ICD3",
        ]);
        assert_eq!(args.hwtool, HwTool::Icd3);
        assert_eq!(args.hwtool_serial, None);
        assert_eq!(args.transport, Transport::Pipe);
        assert_eq!(args.prompt_timeout, None);
        assert_eq!(args.settle_delay, Duration::from_secs(1));
        assert!(!args.quiet);
    }

    #[test]
    fn test_parse_full() {
        let args = parse(&[
            "--hex", "fw.hex", "--mdb-path", "mdb.sh", "--mcu", "PIC18F87K90", "--hwtool",
            "pickit3", "--hwtool-serial", "BUR1", "--transport", "pty", "--prompt-timeout", "90s",
            "--settle-delay", "250ms", "-q", "-vv",
        ]);
        assert_eq!(args.hwtool, HwTool::PicKit3);
        assert_eq!(args.hwtool_serial.as_deref(), Some("BUR1"));
        assert_eq!(args.transport, Transport::Pty);
        assert_eq!(args.prompt_timeout, Some(Duration::from_secs(90)));
        assert_eq!(args.settle_delay, Duration::from_millis(250));
        assert!(args.quiet);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_unknown_hwtool_rejected() {
        let result = Args::try_parse_from([
            "mdb-flash", "--hex", "fw.hex", "--mdb-path", "mdb.sh", "--mcu", "X", "--hwtool",
            "JTAG",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_preconditions() {
        let dir = tempfile::tempdir().unwrap();
        let mdb = dir.path().join("mdb.sh");
        let hex = dir.path().join("fw.hex");
        fs::write(&mdb, "#!/bin/sh\n").unwrap();
        fs::write(&hex, ":00000001FF\n").unwrap();

        let args = |mdb: &PathBuf, hex: &PathBuf, mcu: &str| {
            parse(&[
                "--hex",
                hex.to_str().unwrap(),
                "--mdb-path",
                mdb.to_str().unwrap(),
                "--mcu",
                mcu,
                "--hwtool",
                "ICD3",
            ])
        };

        let missing = dir.path().join("missing");
        assert!(matches!(
            args(&missing, &hex, "PIC18F87K90").into_config(),
            Err(ConfigError::InvalidMdbPath(_))
        ));
        assert!(matches!(
            args(&mdb, &missing, "PIC18F87K90").into_config(),
            Err(ConfigError::MissingHexFile(_))
        ));
        assert!(matches!(
            args(&mdb, &hex, " ").into_config(),
            Err(ConfigError::MissingMcu)
        ));

        let config = args(&mdb, &hex, "PIC18F87K90").into_config().unwrap();
        assert_eq!(config.plan.mcu, "PIC18F87K90");
        assert_eq!(config.plan.image, hex);
        assert!(config.mirror);
    }

    #[test]
    fn test_precondition_messages() {
        let err = ConfigError::MissingHexFile(PathBuf::from("/nope/fw.hex"));
        assert_eq!(err.to_string(), "No such hex file: \"/nope/fw.hex\".");
        let err = ConfigError::InvalidMdbPath(PathBuf::from("mdb"));
        assert!(err.to_string().contains("mplab_ide/bin/mdb.sh"));
    }
}
