//! In-process message bus: reliable, FIFO-per-sender frame transport between
//! workers, slaves, and the master. Frames are byte-encoded on send and
//! decoded on receive so the wire format is exercised on every hop, exactly
//! as it would be across process boundaries.

pub mod frame;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use frame::{Frame, FrameError};

/// Sending half of a bus link. Cheap to clone; every clone preserves FIFO
/// order relative to itself.
#[derive(Clone)]
pub struct BusSender {
    tx: Sender<Bytes>,
}

/// Receiving half of a bus link.
pub struct BusReceiver {
    rx: Receiver<Bytes>,
}

/// Create one bus link. Unbounded: the simulator's own window protocol is the
/// flow control.
pub fn link() -> (BusSender, BusReceiver) {
    let (tx, rx) = channel::unbounded();
    (BusSender { tx }, BusReceiver { rx })
}

impl BusSender {
    /// Encode and send. A send to a hung-up receiver is ignored: the peer has
    /// already completed or failed, and either way it no longer consumes
    /// frames.
    pub fn send(&self, frame: &Frame) {
        let _ = self.tx.send(frame.encode());
    }
}

impl BusReceiver {
    /// Non-blocking receive of the next decoded frame.
    pub fn try_recv(&self) -> Result<Option<Frame>, FrameError> {
        match self.rx.try_recv() {
            Ok(mut wire) => Frame::decode(&mut wire).map(Some),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    /// Blocking receive with a wall-clock timeout, used by idle workers
    /// waiting for peer state. Returns `None` on timeout or hangup.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<Frame>, FrameError> {
        match self.rx.recv_timeout(timeout) {
            Ok(mut wire) => Frame::decode(&mut wire).map(Some),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WorkerId;

    #[test]
    fn test_link_preserves_fifo_order() {
        let (tx, rx) = link();
        for i in 0..10u16 {
            tx.send(&Frame::DoneWorker { worker: WorkerId(i) });
        }
        for i in 0..10u16 {
            match rx.try_recv().unwrap() {
                Some(Frame::DoneWorker { worker }) => assert_eq!(worker, WorkerId(i)),
                other => panic!("expected DoneWorker, got {:?}", other),
            }
        }
        assert!(rx.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_send_after_receiver_drop_is_ignored() {
        let (tx, rx) = link();
        drop(rx);
        tx.send(&Frame::DoneWorker { worker: WorkerId(0) });
    }

    #[test]
    fn test_recv_timeout_returns_none_when_idle() {
        let (_tx, rx) = link();
        let got = rx
            .recv_timeout(std::time::Duration::from_millis(1))
            .unwrap();
        assert!(got.is_none());
    }
}
