use crate::geometry::Geometry;
use crate::mesh::{Mesh, MeshExtractor};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};
use ndarray::Array3;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// A mesh extraction request: an owned snapshot of the mask inside the
/// label's bounding box, taken under the same lock as the edit that caused
/// it.
pub struct MeshJob {
    pub label: u8,
    pub revision: u64,
    pub region: Array3<u8>,
    pub offset: [usize; 3],
    pub geometry: Geometry,
}

/// A finished extraction, tagged with the mask revision it was computed from.
#[derive(Debug, Clone)]
pub struct MeshResult {
    pub label: u8,
    pub revision: u64,
    pub mesh: Mesh,
}

type ResultSlots = Arc<Mutex<HashMap<u8, MeshResult>>>;

/// Background surface extraction with latest-wins scheduling.
///
/// Jobs are coalesced per label: whenever the worker picks up work it drains
/// the queue and keeps only the newest job for each label, so a burst of
/// edits costs one extraction. Results older than what the slot already
/// holds are dropped, so a stale mesh can never replace a newer one.
pub struct MeshWorker {
    tx: Option<Sender<MeshJob>>,
    results: ResultSlots,
    handle: Option<JoinHandle<()>>,
}

impl MeshWorker {
    pub fn spawn() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<MeshJob>();
        let results: ResultSlots = Arc::new(Mutex::new(HashMap::new()));
        let slots = results.clone();
        let handle = std::thread::Builder::new()
            .name("mesh-extract".into())
            .spawn(move || Self::run(rx, slots))
            .expect("failed to spawn mesh worker thread");
        Self {
            tx: Some(tx),
            results,
            handle: Some(handle),
        }
    }

    /// Queue an extraction. Never blocks; an unfinished older job for the
    /// same label is superseded.
    pub fn submit(&self, job: MeshJob) {
        if let Some(tx) = &self.tx {
            // Send can only fail after the worker is gone, i.e. during drop.
            let _ = tx.send(job);
        }
    }

    /// Take the newest finished mesh for a label, if any arrived since the
    /// last call.
    pub fn take_result(&self, label: u8) -> Option<MeshResult> {
        self.results.lock().expect("mesh slot poisoned").remove(&label)
    }

    fn run(rx: Receiver<MeshJob>, slots: ResultSlots) {
        while let Ok(first) = rx.recv() {
            // Latest wins: collapse the backlog to one job per label.
            let mut jobs: HashMap<u8, MeshJob> = HashMap::new();
            let mut superseded = 0usize;
            jobs.insert(first.label, first);
            for job in rx.try_iter() {
                if jobs.insert(job.label, job).is_some() {
                    superseded += 1;
                }
            }
            if superseded > 0 {
                trace!("superseded {superseded} stale mesh jobs");
            }

            for (_, job) in jobs {
                let mesh =
                    MeshExtractor::extract_region(&job.region, job.offset, &job.geometry, job.label);
                debug!(
                    "extracted label {} at revision {}: {} triangles",
                    job.label,
                    job.revision,
                    mesh.triangle_count()
                );
                let mut slots = slots.lock().expect("mesh slot poisoned");
                let stale = slots
                    .get(&job.label)
                    .is_some_and(|held| held.revision > job.revision);
                if !stale {
                    slots.insert(
                        job.label,
                        MeshResult {
                            label: job.label,
                            revision: job.revision,
                            mesh,
                        },
                    );
                }
            }
        }
    }
}

impl Drop for MeshWorker {
    fn drop(&mut self) {
        // Hang up the channel so the worker loop exits, then join.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
