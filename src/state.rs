use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::DynAuthProvider;
use crate::blobs::DynBlobStore;
use crate::config::Config;
use crate::search::DynSearchIndex;
use crate::tasks::TaskSet;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub auth: DynAuthProvider,
    pub blobs: DynBlobStore,
    pub search: DynSearchIndex,
}

impl AppState {
    /// A fresh task set honouring the configured detach policy.
    pub fn tasks(&self) -> TaskSet {
        TaskSet::new(self.config.tasks.join_detached)
    }
}
