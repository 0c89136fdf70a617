//! An environment ties one data file, its log, the lock table and the
//! transaction manager together under a directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, PageStore};
use crate::common::{EnvConfig, Lsn, PageId, Result, TxnId};
use crate::index::{PageType, RecnoTree, TreeBuilder};
use crate::lock::{LockManager, LockTable};
use crate::log::{LogFile, LogManager, LogRecord, PutFlags, RecordBody};
use crate::recovery::{recover, Dispatcher, RecoveryReport, DATA_FILE_ID};
use crate::storage::disk::DiskManager;
use crate::txn::TxnManager;

/// Name of the page file inside the environment directory.
pub const DATA_FILE: &str = "quire.db";

/// Name of the log file inside the environment directory.
pub const LOG_FILE: &str = "quire.log";

pub struct Environment {
    dir: PathBuf,
    config: EnvConfig,
    store: Arc<BufferPoolManager>,
    locks: Arc<LockTable>,
    log: Option<Arc<LogFile>>,
    dispatcher: Arc<Dispatcher>,
    txns: TxnManager,
}

impl Environment {
    /// Opens or creates the environment in `dir`.
    ///
    /// Opening does not replay the log; call [`Environment::recover`]
    /// before starting transactions if the last run may have crashed.
    pub fn open<P: AsRef<Path>>(dir: P, config: EnvConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let disk = Arc::new(DiskManager::new(dir.join(DATA_FILE))?);
        let log = if config.logging {
            Some(Arc::new(LogFile::open(dir.join(LOG_FILE))?))
        } else {
            None
        };
        let mut pool = BufferPoolManager::new(config.pool_size, config.replacer_k, disk);
        if let Some(log) = &log {
            pool = pool.with_log_manager(log.clone());
        }
        let store = Arc::new(pool);
        let locks = Arc::new(LockTable::new());
        let dispatcher = Arc::new(Dispatcher::with_builtin_handlers(store.clone(), &dir));
        let txns = TxnManager::new(
            &config,
            log.clone().map(|log| log as Arc<dyn LogManager>),
            locks.clone(),
            store.clone(),
            dispatcher.clone(),
        )?;

        if let Some(log) = &log {
            let record = LogRecord::new(
                TxnId::NONE,
                Lsn::ZERO,
                RecordBody::FileRegister {
                    file_id: DATA_FILE_ID,
                    name: DATA_FILE.to_string(),
                },
            );
            log.append(&record.encode(), PutFlags::FLUSH)?;
        }

        tracing::info!(
            dir = %dir.display(),
            logging = config.logging,
            pool_size = config.pool_size,
            max_txns = config.max_txns,
            "environment opened"
        );
        Ok(Self {
            dir,
            config,
            store,
            locks,
            log,
            dispatcher,
            txns,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.store
    }

    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.locks
    }

    pub fn log(&self) -> Option<&Arc<LogFile>> {
        self.log.as_ref()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn txn_manager(&self) -> &TxnManager {
        &self.txns
    }

    /// Allocates a new empty tree in the data file.
    pub fn create_tree(&self, leaf_type: PageType) -> Result<RecnoTree> {
        RecnoTree::create(leaf_type, self.page_store(), self.lock_manager(), self.log_manager())
    }

    /// Bulk-loads `builder`'s records into a new tree.
    pub fn build_tree(&self, builder: TreeBuilder) -> Result<RecnoTree> {
        builder.build(self.page_store(), self.lock_manager(), self.log_manager())
    }

    /// Opens the tree rooted at `root`.
    pub fn open_tree(&self, root: PageId) -> Result<RecnoTree> {
        RecnoTree::open(root, self.page_store(), self.lock_manager(), self.log_manager())
    }

    /// Replays the log. Must run before any transaction begins.
    pub fn recover(&self) -> Result<RecoveryReport> {
        match &self.log {
            Some(log) => recover(
                log.as_ref(),
                &self.dispatcher,
                &self.txns,
                self.config.verbose_checkpoint,
            ),
            None => Ok(RecoveryReport::default()),
        }
    }

    /// Aborts unresolved transactions and writes every page out. Returns
    /// the ids of the transactions that had to be aborted.
    pub fn close(self) -> Result<Vec<TxnId>> {
        let aborted = self.txns.close()?;
        self.store.flush_all_pages()?;
        tracing::info!(dir = %self.dir.display(), aborted = aborted.len(), "environment closed");
        Ok(aborted)
    }

    fn page_store(&self) -> Arc<dyn PageStore> {
        self.store.clone()
    }

    fn lock_manager(&self) -> Arc<dyn LockManager> {
        self.locks.clone()
    }

    fn log_manager(&self) -> Option<Arc<dyn LogManager>> {
        self.log.clone().map(|log| log as Arc<dyn LogManager>)
    }
}
