//! Worker pool for one slave process.
//!
//! The slave spawns its workers on dedicated threads, aggregates their
//! terminal frames (`DoneWorker` or `Error`), reports one `DoneSlave` (or the
//! first error) upward, and hands the joined worker reports back to the
//! coordinator.

use std::thread;
use std::time::Duration;

use fnv::FnvHashMap;
use tracing::{debug, info, warn};

use crate::bus::frame::Frame;
use crate::bus::{BusReceiver, BusSender};
use crate::engine::worker::{Worker, WorkerParams, WorkerReport};
use crate::engine::{SlaveId, WorkerId};

pub struct SlaveParams {
    pub id: SlaveId,
    /// Workers this slave owns, with their ready-made wiring.
    pub workers: Vec<WorkerParams>,
    /// Terminal frames from the owned workers arrive here.
    pub rx: BusReceiver,
    /// Upward link to the master.
    pub up: BusSender,
    /// Wall-clock bound on waiting for worker completion.
    pub deadline: Duration,
}

pub struct SlaveOutcome {
    pub reports: Vec<WorkerReport>,
    pub error: Option<String>,
}

/// Run the slave to completion on the current thread.
pub fn run(params: SlaveParams) -> SlaveOutcome {
    let SlaveParams {
        id,
        workers,
        rx,
        up,
        deadline,
    } = params;

    let expected: Vec<WorkerId> = workers.iter().map(|w| w.id).collect();
    info!(slave = id.0, workers = expected.len(), "slave starting");

    let mut handles = Vec::with_capacity(workers.len());
    for params in workers {
        let wid = params.id;
        let handle = thread::Builder::new()
            .name(format!("netsim-worker-{}", wid.0))
            .spawn(move || Worker::new(params).run())
            .expect("spawn worker thread");
        handles.push((wid, handle));
    }

    // Terminal state per worker: Ok(()) for done, Err(msg) for failed.
    let mut terminal: FnvHashMap<WorkerId, Result<(), String>> = FnvHashMap::default();
    let started = std::time::Instant::now();
    let mut first_error: Option<String> = None;

    while terminal.len() < expected.len() {
        if started.elapsed() > deadline {
            warn!(slave = id.0, "deadline waiting for workers");
            first_error
                .get_or_insert_with(|| "slave deadline waiting for workers".to_string());
            break;
        }
        match rx.recv_timeout(Duration::from_millis(10)) {
            Ok(Some(Frame::DoneWorker { worker })) => {
                debug!(slave = id.0, worker = worker.0, "worker done");
                terminal.entry(worker).or_insert(Ok(()));
            }
            Ok(Some(Frame::Error { worker, message })) => {
                warn!(slave = id.0, worker = worker.0, "worker error: {}", message);
                first_error.get_or_insert_with(|| message.clone());
                terminal.entry(worker).or_insert(Err(message));
            }
            Ok(Some(other)) => {
                debug!(slave = id.0, "ignoring frame {:?}", other);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(slave = id.0, error = %e, "dropping undecodable frame");
            }
        }
    }

    let mut reports = Vec::with_capacity(handles.len());
    for (wid, handle) in handles {
        match handle.join() {
            Ok(report) => {
                if let Some(err) = &report.error {
                    first_error.get_or_insert_with(|| err.clone());
                }
                reports.push(report);
            }
            Err(_) => {
                let msg = format!("worker {} panicked", wid.0);
                first_error.get_or_insert_with(|| msg.clone());
                warn!(slave = id.0, worker = wid.0, "worker thread panicked");
            }
        }
    }

    match &first_error {
        None => {
            info!(slave = id.0, "slave complete");
            up.send(&Frame::DoneSlave { slave: id });
        }
        Some(message) => {
            up.send(&Frame::Error {
                worker: WorkerId(u16::MAX),
                message: format!("slave {}: {}", id.0, message),
            });
        }
    }

    SlaveOutcome {
        reports,
        error: first_error,
    }
}
