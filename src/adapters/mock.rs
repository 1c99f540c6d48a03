//! Scripted in-memory transport for tests and dry runs.
//!
//! Every command and binary block sent through a [`MockTransport`] is
//! recorded. Queries are answered from a reply table keyed by the exact
//! command text. Clones share the same state, so a test can keep one handle
//! while the driver owns another.

use super::{ieee_block, Transport};
use crate::error::{IviError, IviResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// One recorded outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    /// An ASCII command, without its line terminator.
    Command(String),
    /// A binary block, recorded unframed.
    Block {
        /// Command text preceding the `#` header
        prefix: String,
        /// Payload bytes
        data: Vec<u8>,
    },
}

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<Sent>,
    replies: HashMap<String, VecDeque<String>>,
    pending: VecDeque<String>,
    last_command: Option<String>,
    reads: usize,
    fail_on: Option<String>,
}

/// In-memory [`Transport`] that records traffic and replays scripted
/// replies. Also backs simulated instruments, where nothing is ever sent.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// An empty mock: no replies scripted, nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `reply`. Multiple replies for the same command
    /// are consumed in order; the last one repeats.
    pub fn reply(&self, command: &str, reply: &str) -> &Self {
        self.state
            .lock()
            .replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply.to_string());
        self
    }

    /// Queue a reply returned by the next bare `read()` regardless of command.
    pub fn push_read(&self, reply: &str) -> &Self {
        self.state.lock().pending.push_back(reply.to_string());
        self
    }

    /// Make any write of `command` fail with a transport error.
    pub fn fail_on(&self, command: &str) -> &Self {
        self.state.lock().fail_on = Some(command.to_string());
        self
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().sent.clone()
    }

    /// ASCII commands sent so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|entry| match entry {
                Sent::Command(command) => Some(command.clone()),
                Sent::Block { .. } => None,
            })
            .collect()
    }

    /// Binary blocks sent so far.
    pub fn blocks(&self) -> Vec<(String, Vec<u8>)> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|entry| match entry {
                Sent::Block { prefix, data } => Some((prefix.clone(), data.clone())),
                Sent::Command(_) => None,
            })
            .collect()
    }

    /// Number of replies read from the instrument.
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    /// Forget recorded traffic, keeping the reply table.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.sent.clear();
        state.reads = 0;
    }
}

impl Transport for MockTransport {
    fn write(&mut self, command: &str) -> IviResult<()> {
        let mut state = self.state.lock();
        if state.fail_on.as_deref() == Some(command) {
            return Err(IviError::Transport(format!("mock write failed: {}", command)));
        }
        state.sent.push(Sent::Command(command.to_string()));
        state.last_command = Some(command.to_string());
        Ok(())
    }

    fn read(&mut self) -> IviResult<String> {
        let mut state = self.state.lock();
        state.reads += 1;

        if let Some(reply) = state.pending.pop_front() {
            return Ok(reply);
        }

        let command = state
            .last_command
            .clone()
            .ok_or_else(|| IviError::Transport("mock read with no preceding command".into()))?;

        let queue = state
            .replies
            .get_mut(&command)
            .ok_or_else(|| IviError::Transport(format!("no scripted reply for '{}'", command)))?;

        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply.ok_or_else(|| IviError::Transport(format!("no scripted reply for '{}'", command)))
    }

    fn write_block(&mut self, data: &[u8], prefix: &str) -> IviResult<()> {
        let mut state = self.state.lock();
        if state.fail_on.as_deref() == Some(prefix) {
            return Err(IviError::Transport(format!("mock block write failed: {}", prefix)));
        }
        state.sent.push(Sent::Block {
            prefix: prefix.to_string(),
            data: data.to_vec(),
        });
        Ok(())
    }

    fn info(&self) -> String {
        format!("MockTransport({} sent)", self.state.lock().sent.len())
    }
}

impl MockTransport {
    /// The block as it would appear on the wire.
    pub fn framed_blocks(&self) -> Vec<Vec<u8>> {
        self.blocks()
            .iter()
            .map(|(prefix, data)| ieee_block(data, prefix))
            .collect()
    }
}
