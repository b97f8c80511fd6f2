//! Per-task FIFO message queue.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{self, Receiver, Sender};

use super::pack::Packed;

/// Unbounded multi-producer queue owned by one task.
///
/// Both channel ends live here, so the channel never disconnects while the
/// task is reachable and `take` blocks until a message arrives. Once the
/// owner finishes the mailbox is closed and anything posted is dropped, so a
/// queued copy of the owner's own handle cannot keep it alive.
pub(crate) struct Mailbox {
    tx: Sender<Packed>,
    rx: Receiver<Packed>,
    closed: AtomicBool,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx, closed: AtomicBool::new(false) }
    }

    pub(crate) fn post(&self, msg: Packed) {
        if self.tx.send(msg).is_err() {
            fatal!("mailbox disconnected while its owner is alive");
        }
        // A post racing with `close` must not leave its message behind.
        if self.closed.load(Ordering::SeqCst) {
            self.drain();
        }
    }

    /// Stop keeping messages and drop the queued ones. Returns how many were
    /// dropped.
    pub(crate) fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.drain()
    }

    fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub(crate) fn take(&self) -> Packed {
        match self.rx.recv() {
            Ok(msg) => msg,
            Err(_) => fatal!("mailbox disconnected while its owner is alive"),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_come_out_in_send_order() {
        let mb = Mailbox::new();
        for i in 0..3 {
            mb.post(Packed::Int(i));
        }
        assert_eq!(mb.len(), 3);
        for i in 0..3 {
            assert!(matches!(mb.take(), Packed::Int(n) if n == i));
        }
        assert_eq!(mb.len(), 0);
    }

    #[test]
    fn closing_drops_queued_and_later_messages() {
        let mb = Mailbox::new();
        mb.post(Packed::Int(1));
        mb.post(Packed::Int(2));
        assert_eq!(mb.close(), 2);
        mb.post(Packed::Int(3));
        assert_eq!(mb.len(), 0);
    }

    #[test]
    fn take_blocks_until_a_sender_posts() {
        let mb = std::sync::Arc::new(Mailbox::new());
        let producer = {
            let mb = mb.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                mb.post(Packed::Bool(true));
            })
        };
        assert!(matches!(mb.take(), Packed::Bool(true)));
        producer.join().unwrap();
    }
}
