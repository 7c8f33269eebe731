//! The interactive `mdb` session.
//!
//! A [`Session`] owns the tool's stdin and the channel carrying its output. It
//! runs the [`PromptScanner`] over that output and stops at each prompt,
//! handing the captured block to the caller. Nothing more is scanned until the
//! caller answers with the next command, so there is never more than one block
//! in flight.

use crate::error::SessionError;
use crate::reader;
use crate::scanner::{CapturedBlock, PromptScanner};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Receives a copy of the session's console transcript.
pub type OutputHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

const OUTPUT_PREFIX: &[u8] = b"[mdb out] ";
const SEND_PREFIX: &[u8] = b"\n[send] ";

/// Where the conversation with `mdb` currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `mdb` is producing output.
    Running,
    /// `mdb` printed a prompt and waits for a command.
    AwaitingInput,
    /// `mdb` closed its output; nothing more will be sent.
    Closed,
}

/// The result of waiting for `mdb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    /// `mdb` prompted for input after printing this block.
    Prompt(CapturedBlock),
    /// `mdb` closed its output instead of prompting.
    Closed,
}

impl Handoff {
    pub fn into_block(self) -> Option<CapturedBlock> {
        match self {
            Handoff::Prompt(block) => Some(block),
            Handoff::Closed => None,
        }
    }
}

/// The operations a command script needs from a prompt-driven tool.
#[async_trait(?Send)]
pub trait PromptSession {
    /// Wait for the tool's first prompt. No command is sent.
    async fn await_first_prompt(&mut self) -> Result<Handoff, SessionError>;

    /// Answer the pending prompt with `command` (newline included) and wait
    /// for the next one. A closed session sends nothing and returns
    /// [`Handoff::Closed`].
    async fn send_and_await(&mut self, command: &str) -> Result<Handoff, SessionError>;

    /// Best-effort last command. Succeeds quietly if the tool is already gone.
    async fn send_final(&mut self, command: &str) -> Result<(), SessionError>;
}

/// A live session with `mdb`.
pub struct Session {
    input: Box<dyn Write + Send>,
    output: UnboundedReceiver<Vec<u8>>,
    pending: VecDeque<u8>,
    scanner: PromptScanner,
    state: SessionState,
    prompts: usize,
    prompt_timeout: Option<Duration>,
    mirror: Option<OutputHandler>,
}

impl Session {
    /// Create a session writing commands to `input` and scanning the chunks
    /// arriving on `output`.
    pub fn new(input: Box<dyn Write + Send>, output: UnboundedReceiver<Vec<u8>>) -> Self {
        Session {
            input,
            output,
            pending: VecDeque::new(),
            scanner: PromptScanner::new(),
            state: SessionState::Running,
            prompts: 0,
            prompt_timeout: None,
            mirror: None,
        }
    }

    /// Create a session over a tool's stdin and stdout, reading the output on
    /// a background thread.
    pub fn attach<R: Read + Send + 'static>(input: Box<dyn Write + Send>, output: R) -> Self {
        Self::new(input, reader::forward_output(output))
    }

    /// Give up on a prompt that has not arrived within `timeout`.
    /// `None` waits forever.
    pub fn with_prompt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    /// Copy the transcript to `handler` as it happens.
    pub fn with_mirror(mut self, handler: OutputHandler) -> Self {
        self.mirror = Some(handler);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn emit(&self, data: &[u8]) {
        if let Some(mirror) = &self.mirror {
            mirror(data);
        }
    }

    /// Write `command` to `mdb`. Returns `false` if the pipe is already gone.
    fn write_command(&mut self, command: &str) -> Result<bool, SessionError> {
        info!(command = command.trim_end(), "send");
        self.emit(SEND_PREFIX);
        self.emit(command.as_bytes());

        let written = self
            .input
            .write_all(command.as_bytes())
            .and_then(|()| self.input.flush());

        match written {
            Ok(()) => {
                self.state = SessionState::Running;
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                debug!("mdb stdin already closed");
                self.state = SessionState::Closed;
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Scan output until the next prompt or the end of the stream.
    async fn advance(&mut self) -> Result<Handoff, SessionError> {
        let deadline = self.prompt_timeout.map(|limit| (Instant::now() + limit, limit));

        loop {
            let Some(byte) = self.next_byte(deadline).await? else {
                debug!(unscanned = self.scanner.buffered(), "mdb closed its output");
                self.state = SessionState::Closed;
                return Ok(Handoff::Closed);
            };

            if self.scanner.at_line_start() {
                self.emit(OUTPUT_PREFIX);
            }
            self.emit(&[byte]);

            if let Some(block) = self.scanner.push(byte) {
                self.prompts += 1;
                self.state = SessionState::AwaitingInput;
                debug!(prompt = self.prompts, bytes = block.len(), "mdb awaits input");
                return Ok(Handoff::Prompt(block));
            }
        }
    }

    async fn next_byte(
        &mut self,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<Option<u8>, SessionError> {
        while self.pending.is_empty() {
            let chunk = match deadline {
                Some((at, limit)) => tokio::time::timeout_at(at, self.output.recv())
                    .await
                    .map_err(|_| SessionError::PromptTimeout(limit))?,
                None => self.output.recv().await,
            };

            match chunk {
                Some(chunk) => {
                    trace!(bytes = chunk.len(), "mdb output");
                    self.pending.extend(chunk);
                }
                None => return Ok(None),
            }
        }

        Ok(self.pending.pop_front())
    }
}

#[async_trait(?Send)]
impl PromptSession for Session {
    async fn await_first_prompt(&mut self) -> Result<Handoff, SessionError> {
        match self.state {
            SessionState::Closed => Ok(Handoff::Closed),
            SessionState::Running if self.prompts == 0 => self.advance().await,
            state => Err(SessionError::OutOfTurn {
                operation: "await_first_prompt",
                state,
            }),
        }
    }

    async fn send_and_await(&mut self, command: &str) -> Result<Handoff, SessionError> {
        match self.state {
            SessionState::Closed => {
                debug!(command = command.trim_end(), "session closed, not sending");
                Ok(Handoff::Closed)
            }
            SessionState::Running => Err(SessionError::OutOfTurn {
                operation: "send_and_await",
                state: SessionState::Running,
            }),
            SessionState::AwaitingInput => {
                if !self.write_command(command)? {
                    return Ok(Handoff::Closed);
                }
                self.advance().await
            }
        }
    }

    async fn send_final(&mut self, command: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            debug!(command = command.trim_end(), "session already closed");
            return Ok(());
        }

        if !self.write_command(command)? {
            return Ok(());
        }

        match self.advance().await? {
            Handoff::Closed => {
                self.emit(b"\n");
                info!("mdb finished");
            }
            Handoff::Prompt(_) => debug!("mdb prompted again after the final command"),
        }

        Ok(())
    }
}

/// An [`OutputHandler`] that copies the transcript to stdout.
pub fn console_mirror() -> OutputHandler {
    Arc::new(|data: &[u8]| {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(data);
        let _ = stdout.flush();
    })
}
