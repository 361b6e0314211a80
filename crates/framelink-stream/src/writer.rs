//! Single-threaded writer fed by a bounded queue.
//!
//! ```text
//! producer 1 ─┐
//! producer 2 ─┼─► sync_channel(capacity) ─► worker thread ─► handler(item)
//! producer N ─┘
//! ```
//!
//! Items reach the handler in FIFO order, one at a time, so the handler can
//! own a non-thread-safe sink such as a `FrameWriter`. A full queue either
//! blocks the producer ([`SerializedWriter::must_input`]) or hands the item
//! straight back ([`SerializedWriter::input`]).

use std::fmt;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};
use std::thread::{JoinHandle, ThreadId};

use tracing::{debug, error};

/// Why an item could not be queued. The item is handed back.
#[derive(thiserror::Error)]
pub enum InputError<T> {
    #[error("write queue full")]
    Full(T),
    #[error("writer stopped")]
    Stopped(T),
}

impl<T> InputError<T> {
    pub fn into_inner(self) -> T {
        match self {
            InputError::Full(item) | InputError::Stopped(item) => item,
        }
    }
}

impl<T> fmt::Debug for InputError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Full(_) => f.write_str("Full(..)"),
            InputError::Stopped(_) => f.write_str("Stopped(..)"),
        }
    }
}

pub struct SerializedWriter<T> {
    sender: Mutex<Option<SyncSender<T>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    capacity: usize,
}

impl<T: Send + 'static> SerializedWriter<T> {
    /// Spawn the worker thread `name`, draining a queue of `capacity` items
    /// (at least 1) through `handler`.
    pub fn start<F>(name: impl Into<String>, capacity: usize, mut handler: F) -> std::io::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel::<T>(capacity);
        let name = name.into();

        let worker = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                // Ends once every sender is gone and the queue is empty.
                for item in receiver {
                    handler(item);
                }
                debug!(thread = %name, "writer drained");
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            capacity,
        })
    }

    /// Queue `item` without blocking.
    pub fn input(&self, item: T) -> Result<(), InputError<T>> {
        let Some(sender) = self.sender() else {
            return Err(InputError::Stopped(item));
        };
        sender.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) => InputError::Full(item),
            TrySendError::Disconnected(item) => InputError::Stopped(item),
        })
    }

    /// Queue `item`, blocking while the queue is full. Fails only once the
    /// writer has stopped.
    pub fn must_input(&self, item: T) -> Result<(), T> {
        let Some(sender) = self.sender() else {
            return Err(item);
        };
        sender.send(item).map_err(|err| err.0)
    }

    /// Stop accepting items, let the worker finish what is queued, and wait
    /// for it unless called from the worker itself.
    pub fn stop(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        if std::thread::current().id() == self.worker_id {
            return;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("writer thread panicked");
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Producers send on a clone so a blocked `must_input` never holds the lock.
    fn sender(&self) -> Option<SyncSender<T>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> Drop for SerializedWriter<T> {
    fn drop(&mut self) {
        let sender = self
            .sender
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
        if std::thread::current().id() == self.worker_id {
            return;
        }
        if let Some(worker) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use super::*;

    #[test]
    fn items_handled_in_fifo_order() {
        let (seen_tx, seen_rx) = channel();
        let writer = SerializedWriter::start("fifo", 4, move |item: u32| {
            seen_tx.send(item).unwrap();
        })
        .unwrap();

        for i in 0..100 {
            writer.must_input(i).unwrap();
        }
        writer.stop();

        let seen: Vec<u32> = seen_rx.iter().collect();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn input_fails_when_full_and_must_input_blocks() {
        let gate = Arc::new(Barrier::new(2));
        let worker_gate = Arc::clone(&gate);
        let (seen_tx, seen_rx) = channel();
        let writer = Arc::new(
            SerializedWriter::start("gated", 1, move |item: u32| {
                if item == 0 {
                    worker_gate.wait();
                }
                seen_tx.send(item).unwrap();
            })
            .unwrap(),
        );

        // Item 0 parks the worker; item 1 fills the single slot.
        writer.must_input(0).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        writer.must_input(1).unwrap();
        assert!(matches!(writer.input(2), Err(InputError::Full(2))));

        let blocked = {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || writer.must_input(3))
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!blocked.is_finished(), "must_input should wait for space");

        gate.wait();
        blocked.join().unwrap().unwrap();
        writer.stop();

        let seen: Vec<u32> = seen_rx.iter().collect();
        assert_eq!(seen, vec![0, 1, 3]);
    }

    #[test]
    fn stop_drains_queue_then_rejects() {
        let (seen_tx, seen_rx) = channel();
        let writer = SerializedWriter::start("drain", 16, move |item: u32| {
            std::thread::sleep(Duration::from_millis(1));
            seen_tx.send(item).unwrap();
        })
        .unwrap();

        for i in 0..10 {
            writer.input(i).unwrap();
        }
        writer.stop();
        assert_eq!(seen_rx.iter().count(), 10);

        assert!(matches!(writer.input(99), Err(InputError::Stopped(99))));
        assert_eq!(writer.must_input(100), Err(100));
        writer.stop();
    }

    #[test]
    fn stop_from_worker_does_not_deadlock() {
        let slot: Arc<Mutex<Option<Arc<SerializedWriter<u32>>>>> = Arc::new(Mutex::new(None));
        let in_worker = Arc::clone(&slot);
        let (done_tx, done_rx) = channel();

        let writer = Arc::new(
            SerializedWriter::start("self-stop", 2, move |_item: u32| {
                if let Some(writer) = in_worker.lock().unwrap().as_ref() {
                    writer.stop();
                }
                let _ = done_tx.send(());
            })
            .unwrap(),
        );
        *slot.lock().unwrap() = Some(Arc::clone(&writer));

        writer.input(1).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(writer.input(2), Err(InputError::Stopped(2))));

        slot.lock().unwrap().take();
    }

    #[test]
    fn capacity_has_floor_of_one() {
        let writer = SerializedWriter::start("cap", 0, |_: ()| {}).unwrap();
        assert_eq!(writer.capacity(), 1);
        let named = SerializedWriter::start("cap", 8, |_: ()| {}).unwrap();
        assert_eq!(named.capacity(), 8);
    }

    #[test]
    fn worker_thread_is_named() {
        let (name_tx, name_rx) = channel();
        let writer = SerializedWriter::start("framelink-writer-test", 1, move |_: ()| {
            let name = std::thread::current().name().map(str::to_string);
            name_tx.send(name).unwrap();
        })
        .unwrap();
        writer.input(()).unwrap();
        assert_eq!(
            name_rx.recv().unwrap().as_deref(),
            Some("framelink-writer-test")
        );
    }
}
