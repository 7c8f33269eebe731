//! Prompt detection over the raw byte stream coming out of `mdb`.
//!
//! `mdb` signals that it is ready for the next command by printing `>` as the
//! first character of a line. [`PromptScanner`] is fed one byte at a time and
//! hands back everything printed since the previous prompt once it sees one.

use std::borrow::Cow;

/// The byte `mdb` prints when it waits for input.
pub const PROMPT: u8 = b'>';

/// Output produced by the tool since the previous prompt, including the
/// terminating `>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedBlock(Vec<u8>);

impl CapturedBlock {
    /// The block as text. `mdb` talks ASCII; anything else is replaced lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for CapturedBlock {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

/// Byte-at-a-time prompt detector.
///
/// Keeps the bytes seen since the last hand-off (the block) and since the last
/// newline (the line). A hand-off happens when a `>` arrives either as the
/// very first byte of a block or directly after a `\n`; a `>` in the middle
/// of a line is ordinary output.
#[derive(Debug, Default)]
pub struct PromptScanner {
    block: Vec<u8>,
    line: Vec<u8>,
}

impl PromptScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns the finished block when `byte` completes a prompt;
    /// both buffers start empty again afterwards.
    pub fn push(&mut self, byte: u8) -> Option<CapturedBlock> {
        self.block.push(byte);
        self.line.push(byte);

        if byte == b'\n' {
            self.line.clear();
        }

        let len = self.block.len();
        if byte == PROMPT && (len < 2 || self.block[len - 2] == b'\n') {
            self.line.clear();
            return Some(CapturedBlock(std::mem::take(&mut self.block)));
        }

        None
    }

    /// True when the next byte will start a new output line.
    pub fn at_line_start(&self) -> bool {
        self.line.is_empty()
    }

    /// Number of bytes buffered towards the next block.
    pub fn buffered(&self) -> usize {
        self.block.len()
    }
}
