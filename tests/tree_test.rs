//! Record-number trees checked against an in-memory model

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quire::common::QuireError;
use quire::{EnvConfig, Environment, PageType, RecnoTree, TreeBuilder};

fn open_env() -> (tempfile::TempDir, Environment) {
    let dir = tempfile::tempdir().unwrap();
    let config = EnvConfig::default().with_logging(false).with_pool_size(64);
    let env = Environment::open(dir.path(), config).unwrap();
    (dir, env)
}

fn build(env: &Environment, leaf_type: PageType, model: &[String]) -> RecnoTree {
    let mut builder = TreeBuilder::new(leaf_type).leaf_capacity(4).fanout(3);
    for value in model {
        builder = builder.record(value.as_bytes(), value.as_bytes());
    }
    env.build_tree(builder).unwrap()
}

fn assert_matches(tree: &RecnoTree, model: &[String]) {
    assert_eq!(tree.verify().unwrap() as usize, model.len());
    assert_eq!(tree.nrecs(None).unwrap() as usize, model.len());
    for (i, value) in model.iter().enumerate() {
        let record = tree.get(None, i as u32 + 1).unwrap();
        assert_eq!(record.data, value.as_bytes(), "record {}", i + 1);
    }
}

#[test]
fn test_random_puts_and_deletes_track_model() {
    for leaf_type in [PageType::LeafRecno, PageType::LeafBtree] {
        let (_dir, env) = open_env();
        let mut model: Vec<String> = (0..30).map(|n| format!("v{n}")).collect();
        let tree = build(&env, leaf_type, &model);
        assert_matches(&tree, &model);

        let mut rng = StdRng::seed_from_u64(0x5eed);
        for step in 0..200 {
            if model.is_empty() || rng.gen_bool(0.55) {
                let recno = rng.gen_range(1..=model.len() + 1);
                let value = format!("s{step}");
                tree.put(None, recno as u32, value.as_bytes(), value.as_bytes())
                    .unwrap();
                model.insert(recno - 1, value);
            } else {
                let recno = rng.gen_range(1..=model.len());
                tree.delete(None, recno as u32).unwrap();
                model.remove(recno - 1);
            }
        }
        assert_matches(&tree, &model);
    }
}

#[test]
fn test_past_end_window_is_one_record() {
    let (_dir, env) = open_env();
    let model: Vec<String> = (0..9).map(|n| format!("r{n}")).collect();
    let tree = build(&env, PageType::LeafRecno, &model);

    assert!(matches!(tree.get(None, 10), Err(QuireError::NotFound)));
    assert!(matches!(tree.get(None, 0), Err(QuireError::NotFound)));
    assert!(matches!(
        tree.put(None, 11, b"", b"gap"),
        Err(QuireError::NotFound)
    ));
    tree.put(None, 10, b"", b"tail").unwrap();
    assert_eq!(tree.get(None, 10).unwrap().data, b"tail");
    assert!(matches!(tree.delete(None, 11), Err(QuireError::NotFound)));
}

#[test]
fn test_appends_number_records_sequentially() {
    let (_dir, env) = open_env();
    let tree = env.create_tree(PageType::LeafBtree).unwrap();
    for n in 1..=20u32 {
        let key = format!("k{n:02}");
        assert_eq!(tree.append(None, key.as_bytes(), b"").unwrap(), n);
    }
    tree.delete(None, 1).unwrap();
    assert_eq!(tree.append(None, b"k21", b"").unwrap(), 20);
    assert_eq!(tree.get(None, 1).unwrap().key, b"k02");
    assert_eq!(tree.verify().unwrap(), 20);
}

#[test]
fn test_trees_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = EnvConfig::default().with_logging(false);
    let root = {
        let env = Environment::open(dir.path(), config.clone()).unwrap();
        let tree = env.create_tree(PageType::LeafRecno).unwrap();
        for word in ["alpha", "beta", "gamma"] {
            tree.append(None, b"", word.as_bytes()).unwrap();
        }
        let root = tree.root();
        drop(tree);
        env.close().unwrap();
        root
    };

    let env = Environment::open(dir.path(), config).unwrap();
    let tree = env.open_tree(root).unwrap();
    assert_eq!(tree.leaf_type(), PageType::LeafRecno);
    assert_eq!(tree.verify().unwrap(), 3);
    assert_eq!(tree.get(None, 2).unwrap().data, b"beta");
}
