use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, QuireError, Result, PAGE_SIZE};

use super::DiskManager;

/// Owned page image moved between the buffer pool and the I/O worker.
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

type Reply<T> = Sender<Result<T>>;

/// A disk I/O request handed to the background worker.
pub enum DiskRequest {
    Read { page_id: PageId, reply: Reply<PageBuf> },
    Write { page_id: PageId, data: PageBuf, reply: Reply<()> },
    Sync { reply: Reply<()> },
}

/// DiskScheduler owns a background worker thread that serves page I/O
/// requests in arrival order.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    /// Dropped on shutdown so the worker sees a disconnected queue
    request_sender: Option<Sender<DiskRequest>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);

        let dm = Arc::clone(&disk_manager);
        let worker_handle = thread::Builder::new()
            .name("quire-disk-io".to_string())
            .spawn(move || Self::run_worker(dm, receiver))
            .ok();
        if worker_handle.is_none() {
            tracing::error!("failed to spawn disk I/O worker");
        }

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle,
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| QuireError::DiskScheduler("scheduler shut down".to_string()))?;
        sender
            .send(request)
            .map_err(|e| QuireError::DiskScheduler(format!("failed to schedule request: {e}")))
    }

    /// Reads a page and waits for the result.
    pub fn read_sync(&self, page_id: PageId) -> Result<PageBuf> {
        let (reply, rx) = bounded(1);
        self.schedule(DiskRequest::Read { page_id, reply })?;
        Self::wait(rx)
    }

    /// Writes a page and waits for completion.
    pub fn write_sync(&self, page_id: PageId, data: PageBuf) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_id,
            data,
            reply,
        })?;
        Self::wait(rx)
    }

    /// Forces all completed writes to stable storage.
    pub fn sync(&self) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.schedule(DiskRequest::Sync { reply })?;
        Self::wait(rx)
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn wait<T>(rx: Receiver<Result<T>>) -> Result<T> {
        rx.recv().map_err(|e| {
            QuireError::DiskScheduler(format!("failed to receive completion: {e}"))
        })?
    }

    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        // Ends once every sender is gone and the queue is drained.
        for request in receiver.iter() {
            Self::process_request(&disk_manager, request);
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        // A dropped reply receiver means the caller gave up; nothing to do.
        match request {
            DiskRequest::Read { page_id, reply } => {
                let mut data: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager.read_page(page_id, &mut data[..]).map(|()| data);
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                reply,
            } => {
                let _ = reply.send(disk_manager.write_page(page_id, &data[..]));
            }
            DiskRequest::Sync { reply } => {
                let _ = reply.send(disk_manager.sync());
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut write_data: PageBuf = Box::new([0u8; PAGE_SIZE]);
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.write_sync(page_id, write_data).unwrap();
        scheduler.sync().unwrap();

        let read_data = scheduler.read_sync(page_id).unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_concurrent_requests() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = Arc::new(DiskScheduler::new(dm));

        let page_ids: Vec<_> = (0..4)
            .map(|_| scheduler.disk_manager().allocate_page().unwrap())
            .collect();

        let handles: Vec<_> = page_ids
            .iter()
            .map(|&page_id| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || {
                    let mut data: PageBuf = Box::new([0u8; PAGE_SIZE]);
                    data[0] = page_id.as_u32() as u8 + 1;
                    scheduler.write_sync(page_id, data).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for page_id in page_ids {
            let data = scheduler.read_sync(page_id).unwrap();
            assert_eq!(data[0], page_id.as_u32() as u8 + 1);
        }
    }
}
