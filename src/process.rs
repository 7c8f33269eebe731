use anyhow::{Context, Result};
use clap::ValueEnum;
use portable_pty::{ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// How `mdb` is attached to this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Plain pipes for stdin, stdout and stderr.
    #[default]
    Pipe,
    /// A pseudo-terminal, for launchers that buffer output unless they run on a TTY.
    Pty,
}

/// The running `mdb` child.
pub struct ToolProcess {
    child: ToolChild,
}

enum ToolChild {
    Pipe(std::process::Child),
    Pty {
        child: Box<dyn portable_pty::Child + Send + Sync>,
        #[allow(dead_code)]
        master: Box<dyn MasterPty + Send>,
    },
}

/// The child's streams, handed to the session and the readers.
pub struct ToolStreams {
    pub input: Box<dyn Write + Send>,
    pub output: Box<dyn Read + Send>,
    /// Separate stderr; a PTY merges it into `output`.
    pub diagnostics: Option<Box<dyn Read + Send>>,
}

/// Start `program` and wire up its standard streams.
pub fn spawn(program: &Path, transport: Transport) -> Result<(ToolProcess, ToolStreams)> {
    debug!(program = %program.display(), ?transport, "starting mdb");
    match transport {
        Transport::Pipe => spawn_piped(program),
        Transport::Pty => spawn_pty(program),
    }
}

fn spawn_piped(program: &Path) -> Result<(ToolProcess, ToolStreams)> {
    let mut child = Command::new(program)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program.display()))?;

    let input = child.stdin.take().context("mdb stdin is not piped")?;
    let output = child.stdout.take().context("mdb stdout is not piped")?;
    let diagnostics = child.stderr.take().context("mdb stderr is not piped")?;

    let streams = ToolStreams {
        input: Box::new(input),
        output: Box::new(output),
        diagnostics: Some(Box::new(diagnostics)),
    };

    Ok((
        ToolProcess {
            child: ToolChild::Pipe(child),
        },
        streams,
    ))
}

fn spawn_pty(program: &Path) -> Result<(ToolProcess, ToolStreams)> {
    let pty_system = portable_pty::native_pty_system();

    // Wide enough that mdb never wraps a listing line.
    let pty_size = PtySize {
        rows: 24,
        cols: 200,
        pixel_width: 0,
        pixel_height: 0,
    };

    let pair = pty_system
        .openpty(pty_size)
        .context("Failed to open PTY")?;

    let mut cmd = CommandBuilder::new(program);
    cmd.cwd(std::env::current_dir().context("Failed to read current directory")?);

    let child = pair
        .slave
        .spawn_command(cmd)
        .with_context(|| format!("Failed to spawn {} in a PTY", program.display()))?;

    let input = pair
        .master
        .take_writer()
        .context("Failed to get PTY writer")?;

    let output = pair
        .master
        .try_clone_reader()
        .context("Failed to get PTY reader")?;

    let streams = ToolStreams {
        input,
        output,
        diagnostics: None,
    };

    Ok((
        ToolProcess {
            child: ToolChild::Pty {
                child,
                master: pair.master,
            },
        },
        streams,
    ))
}

impl ToolProcess {
    /// Wait for `mdb` to exit after `quit`.
    pub fn wait(&mut self) -> Result<()> {
        match &mut self.child {
            ToolChild::Pipe(child) => {
                let status = child.wait().context("Failed to wait for mdb")?;
                info!(%status, "mdb exited");
            }
            ToolChild::Pty { child, .. } => {
                let status = child.wait().context("Failed to wait for mdb")?;
                info!(code = status.exit_code(), "mdb exited");
            }
        }
        Ok(())
    }

    /// Stop an `mdb` that no longer answers.
    pub fn kill(&mut self) {
        let killed = match &mut self.child {
            ToolChild::Pipe(child) => child.kill().and_then(|()| child.wait().map(drop)),
            ToolChild::Pty { child, .. } => child.kill().and_then(|()| child.wait().map(drop)),
        };
        match killed {
            Ok(()) => warn!("mdb killed"),
            Err(err) => warn!(error = %err, "failed to kill mdb"),
        }
    }
}
