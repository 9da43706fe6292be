//! Runs a transport on a worker thread and bounds every transaction by a deadline.
//!
//! A hung transaction yields [`BusError::Timeout`] to the caller instead of
//! blocking the test forever. The worker stays busy with the hung call;
//! later requests queue behind it and time out on their own deadlines until
//! it returns. Replies that arrive after their deadline are discarded by
//! sequence number.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use super::BusTransport;
use crate::BusError;

#[derive(Debug)]
enum Request {
    Write { address: u8, bytes: Vec<u8> },
    Read { address: u8, length: usize },
    Scan,
}

#[derive(Debug)]
enum Reply {
    Write(Result<(), BusError>),
    Read(Result<Vec<u8>, BusError>),
    Scan(Vec<u8>),
}

/// Deadline-bounded transport handle.
#[derive(Debug)]
pub struct TimedBus {
    requests: Sender<(u64, Request)>,
    replies: Receiver<(u64, Reply)>,
    timeout: Duration,
    next_seq: u64,
}

impl TimedBus {
    /// Moves `transport` onto a dedicated worker thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the worker thread cannot be spawned.
    pub fn spawn<T>(transport: T, timeout: Duration) -> io::Result<Self>
    where
        T: BusTransport + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<(u64, Request)>();
        let (reply_tx, reply_rx) = mpsc::channel::<(u64, Reply)>();

        thread::Builder::new()
            .name("bus-worker".into())
            .spawn(move || serve(transport, &request_rx, &reply_tx))?;

        Ok(Self {
            requests: request_tx,
            replies: reply_rx,
            timeout,
            next_seq: 0,
        })
    }

    /// Deadline applied to each transaction.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn transact(&mut self, request: Request) -> Result<Reply, RecvTimeoutError> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.requests
            .send((seq, request))
            .map_err(|_| RecvTimeoutError::Disconnected)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (reply_seq, reply) = self.replies.recv_timeout(remaining)?;
            if reply_seq == seq {
                return Ok(reply);
            }
        }
    }

    fn bus_error(&self, address: u8, error: RecvTimeoutError) -> BusError {
        match error {
            RecvTimeoutError::Timeout => {
                warn!(address, timeout = ?self.timeout, "bus transaction timed out");
                BusError::Timeout {
                    address,
                    timeout: self.timeout,
                }
            }
            RecvTimeoutError::Disconnected => BusError::Disconnected,
        }
    }
}

fn serve<T: BusTransport>(
    mut transport: T,
    requests: &Receiver<(u64, Request)>,
    replies: &Sender<(u64, Reply)>,
) {
    for (seq, request) in requests {
        let reply = match request {
            Request::Write { address, bytes } => Reply::Write(transport.write(address, &bytes)),
            Request::Read { address, length } => Reply::Read(transport.read(address, length)),
            Request::Scan => Reply::Scan(transport.scan()),
        };
        if replies.send((seq, reply)).is_err() {
            break;
        }
    }
}

impl BusTransport for TimedBus {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        let request = Request::Write {
            address,
            bytes: bytes.to_vec(),
        };
        match self.transact(request) {
            Ok(Reply::Write(result)) => result,
            Ok(_) => Err(BusError::Transport {
                address,
                reason: "mismatched reply kind".into(),
            }),
            Err(error) => Err(self.bus_error(address, error)),
        }
    }

    fn read(&mut self, address: u8, length: usize) -> Result<Vec<u8>, BusError> {
        match self.transact(Request::Read { address, length }) {
            Ok(Reply::Read(result)) => result,
            Ok(_) => Err(BusError::Transport {
                address,
                reason: "mismatched reply kind".into(),
            }),
            Err(error) => Err(self.bus_error(address, error)),
        }
    }

    fn scan(&mut self) -> Vec<u8> {
        match self.transact(Request::Scan) {
            Ok(Reply::Scan(found)) => found,
            Ok(_) => Vec::new(),
            Err(error) => {
                warn!(?error, "bus scan did not complete");
                Vec::new()
            }
        }
    }
}
