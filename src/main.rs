use std::path::PathBuf;

use quire::{CheckpointStatus, EnvConfig, Environment, PageType, TxnFlags};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quire=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("quire-demo"));

    if let Err(e) = run(dir, config) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(dir: PathBuf, config: EnvConfig) -> quire::Result<()> {
    println!("Quire - record-number trees with nested transactions");
    println!("====================================================\n");

    let env = Environment::open(&dir, config)?;
    let report = env.recover()?;
    println!("Opened environment in {}", dir.display());
    println!(
        "Recovery examined {} records starting at {}",
        report.records, report.start_lsn
    );

    let tree = env.create_tree(PageType::LeafRecno)?;
    let txns = env.txn_manager();

    let parent = txns.begin(None, TxnFlags::NONE)?;
    for line in ["first", "second", "third"] {
        let recno = tree.append(Some(&parent), b"", line.as_bytes())?;
        println!("Appended record {recno}: {line}");
    }

    // A child's work vanishes with it on abort; the parent's survives.
    let child = txns.begin(Some(&parent), TxnFlags::NONE)?;
    tree.append(Some(&child), b"", b"discarded")?;
    println!(
        "Child {} holds {} records in view",
        child.id(),
        tree.nrecs(Some(&child))?
    );
    txns.abort(&child)?;
    txns.commit(&parent, TxnFlags::NONE)?;

    println!("\nTree {} now holds {} records:", tree.root(), tree.nrecs(None)?);
    for recno in 1..=tree.nrecs(None)? {
        let record = tree.get(None, recno)?;
        println!("  {recno}: {}", String::from_utf8_lossy(&record.data));
    }

    match txns.checkpoint(0, 0)? {
        CheckpointStatus::Completed { ckp_lsn, .. } => println!("\nCheckpoint at {ckp_lsn}"),
        other => println!("\nCheckpoint {other:?}"),
    }
    let stat = txns.stat();
    println!(
        "Transactions: {} begun, {} committed, {} aborted",
        stat.nbegins, stat.ncommits, stat.naborts
    );

    env.close()?;
    println!("\nDemo completed successfully!");
    Ok(())
}
