//! Crash recovery end to end

use std::path::Path;

use quire::common::PageId;
use quire::recovery::RecoveryReport;
use quire::{CheckpointStatus, EnvConfig, Environment, PageType, TreeBuilder, TxnFlags};

fn open(dir: &Path) -> Environment {
    Environment::open(dir, EnvConfig::default().with_pool_size(32)).unwrap()
}

fn recover(dir: &Path) -> (Environment, RecoveryReport) {
    let env = open(dir);
    let report = env.recover().unwrap();
    (env, report)
}

fn contents(env: &Environment, root: PageId) -> Vec<String> {
    let tree = env.open_tree(root).unwrap();
    let total = tree.verify().unwrap();
    (1..=total)
        .map(|n| String::from_utf8(tree.get(None, n).unwrap().data).unwrap())
        .collect()
}

#[test]
fn test_fresh_environment_has_nothing_to_replay() {
    let dir = tempfile::tempdir().unwrap();
    let (_env, report) = recover(dir.path());
    assert!(report.missing_files.is_empty());
    assert!(matches!(report.checkpoint, Some(CheckpointStatus::Completed { .. })));
}

#[test]
fn test_uncommitted_work_written_to_pages_is_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let root = {
        let env = open(dir.path());
        let tree = env.create_tree(PageType::LeafRecno).unwrap();
        let txns = env.txn_manager();

        let committed = txns.begin(None, TxnFlags::NONE).unwrap();
        tree.append(Some(&committed), b"", b"a").unwrap();
        tree.append(Some(&committed), b"", b"b").unwrap();
        txns.commit(&committed, TxnFlags::NONE).unwrap();

        let loser = txns.begin(None, TxnFlags::NONE).unwrap();
        tree.append(Some(&loser), b"", b"c").unwrap();
        tree.delete(Some(&loser), 1).unwrap();
        // Dropping without close writes every page, loser's changes included.
        tree.root()
    };

    let (env, report) = recover(dir.path());
    assert!(report.records > 0);
    assert_eq!(contents(&env, root), vec!["a", "b"]);
}

#[test]
fn test_committed_work_missing_from_pages_is_redone() {
    let dir = tempfile::tempdir().unwrap();
    let (root, last_id) = {
        let env = open(dir.path());
        let mut builder = TreeBuilder::new(PageType::LeafRecno).leaf_capacity(2).fanout(2);
        for name in ["p", "q", "r", "s", "t"] {
            builder = builder.record(b"", name.as_bytes());
        }
        let tree = env.build_tree(builder).unwrap();
        let txns = env.txn_manager();

        let txn = txns.begin(None, TxnFlags::NONE).unwrap();
        tree.put(Some(&txn), 2, b"", b"inserted").unwrap();
        tree.delete(Some(&txn), 5).unwrap();
        tree.append(Some(&txn), b"", b"u").unwrap();
        txns.commit(&txn, TxnFlags::NONE).unwrap();

        let root = tree.root();
        let last_id = txn.id();
        // Crash: no page written since the tree was loaded.
        std::mem::forget(tree);
        std::mem::forget(env);
        (root, last_id)
    };

    let (env, report) = recover(dir.path());
    assert_eq!(report.max_txn_id, Some(last_id));
    assert_eq!(contents(&env, root), vec!["p", "inserted", "q", "r", "t", "u"]);

    let next = env.txn_manager().begin(None, TxnFlags::NONE).unwrap();
    assert!(next.id() > last_id);
}

#[test]
fn test_checkpoint_during_active_transaction_survives_crash() {
    let dir = tempfile::tempdir().unwrap();
    let root = {
        let env = open(dir.path());
        let tree = env.create_tree(PageType::LeafRecno).unwrap();
        let txns = env.txn_manager();

        let first = txns.begin(None, TxnFlags::NONE).unwrap();
        tree.append(Some(&first), b"", b"a").unwrap();
        txns.commit(&first, TxnFlags::NONE).unwrap();

        for (one, two) in [("b", "c"), ("d", "e")] {
            let txn = txns.begin(None, TxnFlags::NONE).unwrap();
            tree.append(Some(&txn), b"", one.as_bytes()).unwrap();
            tree.append(Some(&txn), b"", two.as_bytes()).unwrap();
            // The leaf carries committed records older than this checkpoint.
            assert!(matches!(
                txns.checkpoint(0, 0).unwrap(),
                CheckpointStatus::Completed { .. }
            ));
            txns.commit(&txn, TxnFlags::NONE).unwrap();
        }

        let root = tree.root();
        std::mem::forget(tree);
        std::mem::forget(env);
        root
    };

    let (env, _) = recover(dir.path());
    assert_eq!(contents(&env, root), vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn test_recovery_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let root = {
        let env = open(dir.path());
        let tree = env.create_tree(PageType::LeafBtree).unwrap();
        let txns = env.txn_manager();
        for word in ["x", "y", "z"] {
            let txn = txns.begin(None, TxnFlags::NONE).unwrap();
            tree.append(Some(&txn), word.as_bytes(), b"v").unwrap();
            txns.commit(&txn, TxnFlags::NONE).unwrap();
        }
        let txn = txns.begin(None, TxnFlags::NONE).unwrap();
        tree.delete(Some(&txn), 2).unwrap();
        txns.commit(&txn, TxnFlags::NONE).unwrap();
        let root = tree.root();
        std::mem::forget(tree);
        std::mem::forget(env);
        root
    };

    let first = {
        let (env, _) = recover(dir.path());
        let tree = env.open_tree(root).unwrap();
        let keys: Vec<Vec<u8>> = (1..=tree.verify().unwrap())
            .map(|n| tree.get(None, n).unwrap().key)
            .collect();
        env.close().unwrap();
        keys
    };
    assert_eq!(first, vec![b"x".to_vec(), b"z".to_vec()]);

    let (env, report) = recover(dir.path());
    assert!(matches!(report.checkpoint, Some(CheckpointStatus::Completed { .. })));
    let tree = env.open_tree(root).unwrap();
    assert_eq!(tree.verify().unwrap(), 2);
    assert_eq!(tree.get(None, 2).unwrap().key, b"z");
}

#[test]
fn test_close_aborts_open_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let root = {
        let env = open(dir.path());
        let tree = env.create_tree(PageType::LeafRecno).unwrap();
        let txns = env.txn_manager();
        let keep = txns.begin(None, TxnFlags::NONE).unwrap();
        tree.append(Some(&keep), b"", b"kept").unwrap();
        txns.commit(&keep, TxnFlags::NONE).unwrap();

        let open_txn = txns.begin(None, TxnFlags::NONE).unwrap();
        tree.append(Some(&open_txn), b"", b"dropped").unwrap();
        let root = tree.root();
        drop(tree);
        assert_eq!(env.close().unwrap(), vec![open_txn.id()]);
        root
    };

    let env = open(dir.path());
    assert_eq!(contents(&env, root), vec!["kept"]);
}
