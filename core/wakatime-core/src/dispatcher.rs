//! Buffers heartbeats and hands them to wakatime-cli in batches.
//!
//! ## State Machine
//!
//! ```text
//! Idle    --enqueue-->           Pending  (flush scheduled at now + window)
//! Pending --enqueue-->           Pending  (coalesced into the same batch)
//! Pending --deadline/flush_now-> Idle     (queue drained, batch sent)
//! ```
//!
//! The worker thread owns the flush timer and the blocking process call, so
//! editor callbacks only ever take the queue lock for a push.

use crate::error::{Result, WakaError};
use crate::types::Heartbeat;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_BUFFER_WINDOW: Duration = Duration::from_secs(30);

/// Oldest heartbeat first; `extras` keep enqueue order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub primary: Heartbeat,
    pub extras: Vec<Heartbeat>,
}

impl Batch {
    fn from_queue(mut drained: Vec<Heartbeat>) -> Option<Self> {
        if drained.is_empty() {
            return None;
        }
        let primary = drained.remove(0);
        Some(Self {
            primary,
            extras: drained,
        })
    }

    pub fn len(&self) -> usize {
        1 + self.extras.len()
    }
}

/// Receives each batch on the worker thread.
pub trait BatchSink: Send + Sync {
    fn send_batch(&self, batch: Batch);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Pending,
}

#[derive(Debug)]
enum Signal {
    Scheduled,
    FlushNow,
    Shutdown,
}

type Queue = Arc<Mutex<VecDeque<Heartbeat>>>;

pub struct Dispatcher {
    queue: Queue,
    signals: Sender<Signal>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn spawn(buffer_window: Duration, sink: Arc<dyn BatchSink>) -> Result<Self> {
        let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));
        let (signals, receiver) = unbounded();

        let worker_queue = Arc::clone(&queue);
        let worker = thread::Builder::new()
            .name("wakatime-dispatch".to_string())
            .spawn(move || run_worker(receiver, worker_queue, sink, buffer_window))
            .map_err(|err| WakaError::io("spawning dispatcher thread", err))?;

        Ok(Self {
            queue,
            signals,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn enqueue(&self, heartbeat: Heartbeat) -> Result<()> {
        let schedule = {
            let mut queue = self.queue.lock();
            let was_idle = queue.is_empty();
            queue.push_back(heartbeat);
            was_idle
        };

        if schedule {
            self.signals
                .send(Signal::Scheduled)
                .map_err(|_| WakaError::DispatcherClosed)?;
        }
        Ok(())
    }

    /// Sends whatever is queued without waiting for the window to close.
    pub fn flush_now(&self) -> Result<()> {
        self.signals
            .send(Signal::FlushNow)
            .map_err(|_| WakaError::DispatcherClosed)
    }

    pub fn state(&self) -> DispatchState {
        if self.queue.lock().is_empty() {
            DispatchState::Idle
        } else {
            DispatchState::Pending
        }
    }

    /// Flushes pending heartbeats and joins the worker. Idempotent.
    pub fn shutdown(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = self.signals.send(Signal::Shutdown);
            if handle.join().is_err() {
                tracing::error!("Dispatcher worker panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    receiver: Receiver<Signal>,
    queue: Queue,
    sink: Arc<dyn BatchSink>,
    buffer_window: Duration,
) {
    loop {
        match receiver.recv() {
            Ok(Signal::Scheduled) => {
                let deadline = Instant::now() + buffer_window;
                if !wait_for_deadline(&receiver, deadline) {
                    flush(&queue, sink.as_ref());
                    return;
                }
                flush(&queue, sink.as_ref());
            }
            Ok(Signal::FlushNow) => flush(&queue, sink.as_ref()),
            Ok(Signal::Shutdown) | Err(_) => {
                flush(&queue, sink.as_ref());
                return;
            }
        }
    }
}

/// Returns false when the worker should stop after flushing.
fn wait_for_deadline(receiver: &Receiver<Signal>, deadline: Instant) -> bool {
    loop {
        match receiver.recv_deadline(deadline) {
            Ok(Signal::Scheduled) => continue,
            Ok(Signal::FlushNow) | Err(RecvTimeoutError::Timeout) => return true,
            Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

fn flush(queue: &Queue, sink: &dyn BatchSink) {
    let drained: Vec<Heartbeat> = queue.lock().drain(..).collect();
    if let Some(batch) = Batch::from_queue(drained) {
        tracing::debug!(
            entity = %batch.primary.entity,
            extra = batch.extras.len(),
            "Dispatching heartbeat batch"
        );
        sink.send_batch(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Batch>>,
    }

    impl BatchSink for RecordingSink {
        fn send_batch(&self, batch: Batch) {
            self.batches.lock().push(batch);
        }
    }

    fn heartbeat(entity: &str, timestamp: f64) -> Heartbeat {
        Heartbeat {
            entity: entity.to_string(),
            timestamp,
            is_write: false,
            cursorpos: None,
            lineno: None,
            lines_in_file: None,
            project: None,
            alternate_project: None,
        }
    }

    fn wait_for_batches(sink: &RecordingSink, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if sink.batches.lock().len() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("timed out waiting for {count} batches");
    }

    #[test]
    fn window_coalesces_into_one_batch() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher =
            Dispatcher::spawn(Duration::from_millis(150), sink.clone()).expect("dispatcher");

        dispatcher.enqueue(heartbeat("/a", 1.0)).expect("enqueue");
        dispatcher.enqueue(heartbeat("/b", 2.0)).expect("enqueue");
        dispatcher.enqueue(heartbeat("/c", 3.0)).expect("enqueue");
        assert_eq!(dispatcher.state(), DispatchState::Pending);

        wait_for_batches(&sink, 1);
        let batches = sink.batches.lock().clone();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].primary.entity, "/a");
        let extras: Vec<&str> = batches[0].extras.iter().map(|h| h.entity.as_str()).collect();
        assert_eq!(extras, vec!["/b", "/c"]);
        assert_eq!(dispatcher.state(), DispatchState::Idle);
    }

    #[test]
    fn flush_now_skips_the_window() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher =
            Dispatcher::spawn(Duration::from_secs(3600), sink.clone()).expect("dispatcher");

        dispatcher.enqueue(heartbeat("/a", 1.0)).expect("enqueue");
        dispatcher.flush_now().expect("flush");

        wait_for_batches(&sink, 1);
        assert_eq!(sink.batches.lock()[0].len(), 1);
    }

    #[test]
    fn later_events_start_a_new_batch() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher =
            Dispatcher::spawn(Duration::from_secs(3600), sink.clone()).expect("dispatcher");

        dispatcher.enqueue(heartbeat("/a", 1.0)).expect("enqueue");
        dispatcher.flush_now().expect("flush");
        wait_for_batches(&sink, 1);

        dispatcher.enqueue(heartbeat("/b", 2.0)).expect("enqueue");
        dispatcher.flush_now().expect("flush");
        wait_for_batches(&sink, 2);

        let batches = sink.batches.lock();
        assert_eq!(batches[1].primary.entity, "/b");
        assert!(batches[1].extras.is_empty());
    }

    #[test]
    fn shutdown_flushes_pending() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher =
            Dispatcher::spawn(Duration::from_secs(3600), sink.clone()).expect("dispatcher");

        dispatcher.enqueue(heartbeat("/a", 1.0)).expect("enqueue");
        dispatcher.enqueue(heartbeat("/b", 2.0)).expect("enqueue");
        dispatcher.shutdown();

        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        drop(batches);

        assert!(matches!(
            dispatcher.enqueue(heartbeat("/c", 3.0)),
            Err(WakaError::DispatcherClosed)
        ));
    }
}
