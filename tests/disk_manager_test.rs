//! Integration tests for the disk manager and scheduler

use std::sync::Arc;
use std::thread;

use quire::common::{PageId, PAGE_SIZE};
use quire::storage::disk::{DiskManager, DiskScheduler};
use tempfile::NamedTempFile;

fn page_with(first: u8) -> Box<[u8; PAGE_SIZE]> {
    let mut data = Box::new([0u8; PAGE_SIZE]);
    data[0] = first;
    data
}

#[test]
fn test_disk_manager_create_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    assert_eq!(dm.num_pages(), 0);
    assert_eq!(dm.num_reads(), 0);
    assert_eq!(dm.num_writes(), 0);
    assert_eq!(dm.path(), temp_file.path());
}

#[test]
fn test_disk_manager_allocate_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    for i in 0..10 {
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(i));
    }
    assert_eq!(dm.num_pages(), 10);
}

#[test]
fn test_disk_manager_read_write_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();
    let page_id = dm.allocate_page().unwrap();

    let mut write_data = [0u8; PAGE_SIZE];
    for (i, byte) in write_data.iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }
    dm.write_page(page_id, &write_data).unwrap();

    let mut read_data = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut read_data).unwrap();
    assert_eq!(write_data, read_data);
}

#[test]
fn test_read_past_end_is_zeroed() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let mut data = [7u8; PAGE_SIZE];
    dm.read_page(PageId::new(12), &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0));
}

#[test]
fn test_disk_manager_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let test_data = b"Persistence test";

    {
        let dm = DiskManager::new(&path).unwrap();
        dm.allocate_page().unwrap();
        let page_id = dm.allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[..test_data.len()].copy_from_slice(test_data);
        dm.write_page(page_id, &data).unwrap();
        dm.sync().unwrap();
        assert_eq!(dm.num_syncs(), 1);
    }

    let dm = DiskManager::new(&path).unwrap();
    assert_eq!(dm.num_pages(), 2);
    let mut data = [0u8; PAGE_SIZE];
    dm.read_page(PageId::new(1), &mut data).unwrap();
    assert_eq!(&data[..test_data.len()], test_data);
}

#[test]
fn test_disk_scheduler_round_trip() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = DiskScheduler::new(dm);

    let page_ids: Vec<_> = (0..5)
        .map(|_| scheduler.disk_manager().allocate_page().unwrap())
        .collect();
    for &pid in &page_ids {
        scheduler
            .write_sync(pid, page_with(pid.as_u32() as u8 + 40))
            .unwrap();
    }
    scheduler.sync().unwrap();

    for &pid in &page_ids {
        let data = scheduler.read_sync(pid).unwrap();
        assert_eq!(data[0], pid.as_u32() as u8 + 40);
    }
}

#[test]
fn test_disk_scheduler_concurrent_requests() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = Arc::new(DiskScheduler::new(dm));

    let page_ids: Vec<_> = (0..10)
        .map(|_| scheduler.disk_manager().allocate_page().unwrap())
        .collect();

    let handles: Vec<_> = page_ids
        .iter()
        .map(|&pid| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                scheduler.write_sync(pid, page_with(pid.as_u32() as u8)).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for &pid in &page_ids {
        assert_eq!(scheduler.read_sync(pid).unwrap()[0], pid.as_u32() as u8);
    }
}

#[test]
fn test_disk_manager_io_stats() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page().unwrap();
    assert_eq!(dm.num_writes(), 1);

    dm.write_page(page_id, &[0u8; PAGE_SIZE]).unwrap();
    assert_eq!(dm.num_writes(), 2);

    let mut read_data = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut read_data).unwrap();
    assert_eq!(dm.num_reads(), 1);
}
