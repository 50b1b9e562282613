//! Outbound half of a session.
//!
//! Any thread may enqueue marshalled packets on the [`OutboundQueue`]; only
//! the multiplexer thread drives the [`SessionWriter`] that flushes them.

use std::io::{ErrorKind, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::protocol::MessageKind;

use super::SessionError;

/// Correlates a queued packet with its completion or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketToken {
    pub seq: u64,
    pub kind: MessageKind,
}

#[derive(Debug)]
pub struct OutboundPacket {
    pub bytes: Vec<u8>,
    pub token: PacketToken,
}

/// Lock-free FIFO of packets waiting to be written.
///
/// The bound is soft: concurrent producers may overshoot it by at most their
/// own count. `len` includes the packet currently being written.
#[derive(Debug)]
pub struct OutboundQueue {
    queue: SegQueue<OutboundPacket>,
    pending: AtomicUsize,
    max_len: AtomicUsize,
    next_seq: AtomicU64,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: SegQueue::new(),
            pending: AtomicUsize::new(0),
            max_len: AtomicUsize::new(0),
            next_seq: AtomicU64::new(1),
            capacity,
        }
    }

    /// Enqueue marshalled bytes, failing when the queue is at capacity.
    pub fn push(&self, bytes: Vec<u8>, kind: MessageKind) -> Result<PacketToken, SessionError> {
        if self.pending.load(Ordering::Acquire) >= self.capacity {
            return Err(SessionError::OutboundQueueFull {
                capacity: self.capacity,
            });
        }
        let len = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_len.fetch_max(len, Ordering::Relaxed);

        let token = PacketToken {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            kind,
        };
        self.queue.push(OutboundPacket { bytes, token });
        Ok(token)
    }

    fn pop(&self) -> Option<OutboundPacket> {
        self.queue.pop()
    }

    /// A popped packet finished, successfully or not.
    fn complete(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest length observed since creation.
    pub fn max_len(&self) -> usize {
        self.max_len.load(Ordering::Relaxed)
    }

    /// Fill ratio in `[0, 1]`.
    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        (self.len() as f64 / self.capacity as f64).clamp(0.0, 1.0)
    }

    /// Drop every queued packet. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.queue.pop().is_some() {
            self.complete();
            dropped += 1;
        }
        dropped
    }
}

#[derive(Debug, Default)]
enum WriteState {
    #[default]
    Idle,
    Writing {
        packet: OutboundPacket,
        offset: usize,
    },
}

/// Single-writer flush state machine for one session.
#[derive(Debug)]
pub struct SessionWriter {
    session_id: ConnectionId,
    state: WriteState,
}

impl SessionWriter {
    pub fn new(session_id: ConnectionId) -> Self {
        Self {
            session_id,
            state: WriteState::Idle,
        }
    }

    pub fn is_writing(&self) -> bool {
        matches!(self.state, WriteState::Writing { .. })
    }

    /// A packet is in flight or waiting in `queue`.
    pub fn has_pending(&self, queue: &OutboundQueue) -> bool {
        self.is_writing() || !queue.is_empty()
    }

    /// Write queued packets in FIFO order until the queue is empty or the
    /// socket would block. Returns the number of bytes written.
    ///
    /// Any I/O error other than `WouldBlock` fails the packet in flight and
    /// is returned; the caller tears the session down.
    pub fn flush<W: Write>(&mut self, sink: &mut W, queue: &OutboundQueue) -> Result<usize, SessionError> {
        let mut written = 0;
        loop {
            let (packet, mut offset) = match std::mem::take(&mut self.state) {
                WriteState::Writing { packet, offset } => (packet, offset),
                WriteState::Idle => match queue.pop() {
                    Some(packet) => (packet, 0),
                    None => return Ok(written),
                },
            };

            while offset < packet.bytes.len() {
                match sink.write(&packet.bytes[offset..]) {
                    Ok(0) => {
                        self.fail(queue, &packet);
                        return Err(SessionError::WriteZero);
                    }
                    Ok(n) => {
                        offset += n;
                        written += n;
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        self.state = WriteState::Writing { packet, offset };
                        return Ok(written);
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.fail(queue, &packet);
                        return Err(SessionError::Io(e));
                    }
                }
            }

            queue.complete();
            tracing::trace!(
                session_id = %self.session_id,
                seq = packet.token.seq,
                kind = %packet.token.kind,
                bytes = packet.bytes.len(),
                "Packet written"
            );
            metrics::record_packet_sent(packet.token.kind, packet.bytes.len());
        }
    }

    /// Abandon the packet in flight, if any, and everything still queued.
    pub fn abort(&mut self, queue: &OutboundQueue) -> usize {
        let mut dropped = queue.clear();
        if let WriteState::Writing { packet, .. } = std::mem::take(&mut self.state) {
            self.fail(queue, &packet);
            dropped += 1;
        }
        dropped
    }

    fn fail(&self, queue: &OutboundQueue, packet: &OutboundPacket) {
        queue.complete();
        tracing::debug!(
            session_id = %self.session_id,
            seq = packet.token.seq,
            kind = %packet.token.kind,
            "Packet write failed"
        );
        metrics::record_packet_failed(packet.token.kind);
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    /// Accepts at most `budget` bytes per call, then blocks once exhausted.
    struct ThrottledSink {
        out: Vec<u8>,
        per_call: usize,
        budget: usize,
        fail: Option<ErrorKind>,
    }

    impl ThrottledSink {
        fn new(per_call: usize, budget: usize) -> Self {
            Self {
                out: Vec::new(),
                per_call,
                budget,
                fail: None,
            }
        }
    }

    impl Write for ThrottledSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(kind) = self.fail {
                return Err(kind.into());
            }
            if self.budget == 0 {
                return Err(ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.per_call).min(self.budget);
            self.out.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn flushes_in_fifo_order() {
        let queue = OutboundQueue::new(8);
        queue.push(b"first".to_vec(), MessageKind::Text).unwrap();
        queue.push(b"second".to_vec(), MessageKind::Binary).unwrap();
        let mut writer = SessionWriter::new(ConnectionId::new());
        let mut sink = ThrottledSink::new(3, usize::MAX);

        let written = writer.flush(&mut sink, &queue).unwrap();

        assert_eq!(written, 11);
        assert_eq!(sink.out, b"firstsecond");
        assert!(queue.is_empty());
        assert!(!writer.has_pending(&queue));
    }

    #[test]
    fn partial_write_resumes_the_same_packet() {
        let queue = OutboundQueue::new(8);
        queue.push(b"abcdefgh".to_vec(), MessageKind::Text).unwrap();
        let mut writer = SessionWriter::new(ConnectionId::new());
        let mut sink = ThrottledSink::new(8, 5);

        assert_eq!(writer.flush(&mut sink, &queue).unwrap(), 5);
        assert!(writer.is_writing());
        assert_eq!(queue.len(), 1, "in-flight packet still counts");

        sink.budget = usize::MAX;
        assert_eq!(writer.flush(&mut sink, &queue).unwrap(), 3);
        assert_eq!(sink.out, b"abcdefgh");
        assert!(!writer.has_pending(&queue));
    }

    #[test]
    fn hard_error_fails_the_packet() {
        let queue = OutboundQueue::new(8);
        queue.push(b"doomed".to_vec(), MessageKind::Text).unwrap();
        let mut writer = SessionWriter::new(ConnectionId::new());
        let mut sink = ThrottledSink::new(8, usize::MAX);
        sink.fail = Some(ErrorKind::BrokenPipe);

        let err = writer.flush(&mut sink, &queue).unwrap_err();
        assert!(matches!(err, SessionError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_fails_loudly() {
        let queue = OutboundQueue::new(2);
        queue.push(vec![1], MessageKind::Binary).unwrap();
        queue.push(vec![2], MessageKind::Binary).unwrap();

        let err = queue.push(vec![3], MessageKind::Binary).unwrap_err();
        assert!(matches!(err, SessionError::OutboundQueueFull { capacity: 2 }));
        assert_eq!(queue.max_len(), 2);
        assert_eq!(queue.load_factor(), 1.0);
    }

    #[test]
    fn abort_discards_everything() {
        let queue = OutboundQueue::new(8);
        queue.push(b"abcdef".to_vec(), MessageKind::Text).unwrap();
        queue.push(b"ghi".to_vec(), MessageKind::Text).unwrap();
        let mut writer = SessionWriter::new(ConnectionId::new());
        let mut sink = ThrottledSink::new(8, 2);
        writer.flush(&mut sink, &queue).unwrap();

        assert_eq!(writer.abort(&queue), 2);
        assert!(queue.is_empty());
        assert!(!writer.is_writing());
    }
}
