//! Integration tests for the page lock table

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quire::common::{LockerId, PageId, QuireError};
use quire::lock::{LockManager, LockMode, LockTable};

fn locker(n: u32) -> LockerId {
    LockerId::new(0x8000_0000 + n)
}

#[test]
fn test_readers_share_writers_exclude() {
    let table = LockTable::new();
    let page = PageId::new(1);

    let a = table.acquire(locker(1), page, LockMode::Read, false).unwrap();
    let b = table.acquire(locker(2), page, LockMode::Read, false).unwrap();
    assert!(matches!(
        table.acquire(locker(3), page, LockMode::Write, true),
        Err(QuireError::LockNotGranted { .. })
    ));

    table.release(a).unwrap();
    table.release(b).unwrap();
    let c = table.acquire(locker(3), page, LockMode::Write, true).unwrap();
    assert_eq!(c.mode(), LockMode::Write);
    assert_eq!(table.num_locks(), 1);
}

#[test]
fn test_deadlock_is_reported_to_the_closing_locker() {
    let table = Arc::new(LockTable::new());
    let (p1, p2) = (PageId::new(1), PageId::new(2));
    let _a1 = table.acquire(locker(1), p1, LockMode::Write, false).unwrap();
    let b2 = table.acquire(locker(2), p2, LockMode::Write, false).unwrap();

    let waiter = {
        let table = Arc::clone(&table);
        thread::spawn(move || table.acquire(locker(1), p2, LockMode::Write, false))
    };
    thread::sleep(Duration::from_millis(100));

    let err = table
        .acquire(locker(2), p1, LockMode::Write, false)
        .unwrap_err();
    assert!(matches!(err, QuireError::Deadlock(l) if l == locker(2)));
    assert!(err.is_retryable());

    table.release(b2).unwrap();
    let granted = waiter.join().unwrap().unwrap();
    assert_eq!(granted.page_id(), p2);
}

#[test]
fn test_children_pass_through_ancestor_locks() {
    let table = LockTable::new();
    let page = PageId::new(7);
    let (parent, child, grandchild) = (locker(1), locker(2), locker(3));
    table.add_family_member(parent, child);
    table.add_family_member(child, grandchild);

    table.acquire(parent, page, LockMode::Write, true).unwrap();
    table.acquire(grandchild, page, LockMode::Write, true).unwrap();
    assert!(table.acquire(locker(9), page, LockMode::Read, true).is_err());

    // Outside the family the parent's grant blocks it again.
    table.remove_family_member(grandchild);
    assert!(table.acquire(grandchild, page, LockMode::Read, true).is_err());
}

#[test]
fn test_inherit_moves_grants_to_parent() {
    let table = LockTable::new();
    let (parent, child) = (locker(1), locker(2));
    table.add_family_member(parent, child);
    for n in 0..3 {
        table
            .acquire(child, PageId::new(n), LockMode::Write, true)
            .unwrap();
    }

    table.inherit(child, parent).unwrap();
    assert_eq!(table.held_by(child), 0);
    assert_eq!(table.held_by(parent), 3);

    table.release_all(parent).unwrap();
    assert_eq!(table.num_locks(), 0);
}
