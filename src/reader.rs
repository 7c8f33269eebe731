use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::thread;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, warn};

/// Starts the thread that feeds `mdb`'s output to a [`Session`](crate::Session).
///
/// Chunks are forwarded as they arrive; the receiver yields `None` once the
/// tool is gone, whether it closed the stream or the read failed.
pub fn forward_output<R: Read + Send + 'static>(mut output: R) -> UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = unbounded_channel();

    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        let mut total = 0usize;
        let end = loop {
            match output.read(&mut buffer) {
                Ok(0) => break "eof",
                Ok(n) => {
                    total += n;
                    if tx.send(buffer[..n].to_vec()).is_err() {
                        break "session dropped";
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // A PTY reports EIO once the child is gone.
                Err(err) => {
                    debug!(error = %err, "mdb output read failed");
                    break "read error";
                }
            }
        };
        debug!(bytes = total, end, "mdb output finished");
    });

    rx
}

/// Drains the tool's stderr into the log so it can never fill up and block `mdb`.
pub fn spawn_diagnostics<R: Read + Send + 'static>(reader: R) {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => warn!(target: "mdb", "{line}"),
                Err(_) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Fails the first read with `Interrupted`, then serves `data`.
    struct InterruptedOnce {
        interrupted: bool,
        data: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(ErrorKind::Interrupted.into());
            }
            self.data.read(buf)
        }
    }

    async fn collect(mut rx: UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.extend(chunk);
        }
        received
    }

    #[tokio::test]
    async fn test_forwards_until_eof() {
        let rx = forward_output(Cursor::new(b"hello\n>".to_vec()));
        assert_eq!(collect(rx).await, b"hello\n>");
    }

    #[tokio::test]
    async fn test_interrupted_read_is_retried() {
        let rx = forward_output(InterruptedOnce {
            interrupted: false,
            data: Cursor::new(b"Microchip Debugger\n>".to_vec()),
        });
        assert_eq!(collect(rx).await, b"Microchip Debugger\n>");
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        struct Gone;
        impl Read for Gone {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from_raw_os_error(5))
            }
        }
        assert!(collect(forward_output(Gone)).await.is_empty());
    }
}
