use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use instant::Instant;

use crate::config::Config;
use crate::sim::{self, SimOutput};

/// Finished runs the UI thread has not picked up yet.
const RESULT_CAPACITY: usize = 2;

/// A simulation request tagged with its generation.
struct Job {
    generation: u64,
    config: Config,
}

/// Commands sent to the simulation thread.
enum WorkerCmd {
    Run(Job),
    Shutdown,
}

/// A finished run, handed back to the UI thread in one piece.
pub struct SimResult {
    pub generation: u64,
    /// The snapshot the run used. Playback styles itself from this, not from
    /// whatever the panel holds by the time the result arrives.
    pub config: Config,
    pub output: SimOutput,
    pub elapsed_ms: f64,
}

/// Runs simulations on a background thread so the event loop never blocks.
///
/// Newer requests supersede older ones: queued jobs are coalesced to the
/// newest, and results from superseded generations are dropped on receipt.
pub struct SimWorker {
    tx: Sender<WorkerCmd>,
    results: Receiver<SimResult>,
    latest: u64,
    connected: bool,
    worker_thread: Option<JoinHandle<()>>,
}

impl SimWorker {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<WorkerCmd>();
        let (result_tx, result_rx) = bounded::<SimResult>(RESULT_CAPACITY);

        let worker_thread = thread::Builder::new()
            .name("gridwalk-sim".into())
            .spawn(move || worker_loop(rx, result_tx))?;

        Ok(Self {
            tx,
            results: result_rx,
            latest: 0,
            connected: true,
            worker_thread: Some(worker_thread),
        })
    }

    /// Queue a run. Returns the generation that will identify its result.
    pub fn request(&mut self, config: Config) -> u64 {
        self.latest += 1;
        let job = Job {
            generation: self.latest,
            config,
        };
        if self.tx.send(WorkerCmd::Run(job)).is_err() {
            log::error!("Simulation thread is gone; request {} dropped", self.latest);
        }
        self.latest
    }

    /// Generation of the most recent request (0 before the first).
    pub fn latest_generation(&self) -> u64 {
        self.latest
    }

    /// Take the result for the latest request if it has arrived.
    pub fn poll(&mut self) -> Option<SimResult> {
        let mut found = None;
        loop {
            match self.results.try_recv() {
                Ok(result) if result.generation == self.latest => found = Some(result),
                Ok(stale) => {
                    log::debug!(
                        "Dropping stale simulation result {} (latest {})",
                        stale.generation,
                        self.latest
                    );
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        log::error!("Simulation thread disconnected");
                        self.connected = false;
                    }
                    break;
                }
            }
        }
        found
    }
}

impl Drop for SimWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerCmd::Shutdown);
        // Release a worker blocked on a full result channel.
        self.results = crossbeam_channel::never();
        if let Some(handle) = self.worker_thread.take() {
            if handle.join().is_err() {
                log::error!("Simulation thread panicked");
            }
        }
    }
}

fn worker_loop(rx: Receiver<WorkerCmd>, results: Sender<SimResult>) {
    while let Ok(WorkerCmd::Run(mut job)) = rx.recv() {
        // Skip straight to the newest request if several piled up.
        loop {
            match rx.try_recv() {
                Ok(WorkerCmd::Run(newer)) => {
                    log::debug!(
                        "Coalescing simulation request {} into {}",
                        job.generation,
                        newer.generation
                    );
                    job = newer;
                }
                Ok(WorkerCmd::Shutdown) | Err(TryRecvError::Disconnected) => {
                    log::debug!("Simulation thread exiting");
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let start = Instant::now();
        let output = sim::simulate(job.config.clone());
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        log::info!(
            "Simulation {}: {}/{} walkers, {} rounds in {:.1}ms",
            job.generation,
            output.paths.len(),
            output.requested,
            output.rounds,
            elapsed_ms,
        );

        let result = SimResult {
            generation: job.generation,
            config: job.config,
            output,
            elapsed_ms,
        };
        if results.send(result).is_err() {
            break;
        }
    }
    log::debug!("Simulation thread exiting");
}
