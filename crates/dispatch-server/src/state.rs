use std::path::PathBuf;
use std::sync::Arc;

use dispatch_core::config::Config;
use dispatch_core::orchestrator::Dispatcher;
use dispatch_core::store::RedbStore;

/// Shared application state. Cheap to clone; the database handle and
/// dispatcher are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub store: Arc<RedbStore>,
    pub dispatcher: Arc<Dispatcher<RedbStore>>,
}

impl AppState {
    /// Load config and open the database of an initialized project root.
    pub fn open(root: PathBuf) -> dispatch_core::Result<Self> {
        let config = Config::load(&root)?;
        let store = Arc::new(RedbStore::open_root(&root)?);
        Ok(Self::with_store(root, config, store))
    }

    pub fn with_store(root: PathBuf, config: Config, store: Arc<RedbStore>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), &config));
        Self {
            root,
            config: Arc::new(config),
            store,
            dispatcher,
        }
    }
}
