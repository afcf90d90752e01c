//! # millwork-db
//!
//! PostgreSQL persistence for millwork.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for extraction jobs, reviews, cabinets and
//!   the sync audit log
//! - An in-memory store implementing the same traits, for tests and for
//!   running without a database
//!
//! ## Example
//!
//! ```rust,ignore
//! use millwork_db::{Database, ExtractionJobRepository, NewExtractionJob};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/millwork").await?;
//!     let job = db.jobs.queue(NewExtractionJob::default()).await?;
//!     println!("Queued job: {}", job.id);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::Notify;

pub mod cabinets;
pub mod jobs;
pub mod memory;
pub mod pool;
pub mod reviews;
pub mod sync_events;

// Test fixtures for integration tests
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use millwork_core::*;

// Re-export pool utilities
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

// Re-export repository implementations
pub use cabinets::PgCabinetRepository;
pub use jobs::PgExtractionJobRepository;
pub use memory::MemoryStore;
pub use reviews::PgReviewRepository;
pub use sync_events::PgSyncEventRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Extraction job queue.
    pub jobs: PgExtractionJobRepository,
    /// Review queue storage.
    pub reviews: PgReviewRepository,
    /// System-of-record cabinets.
    pub cabinets: PgCabinetRepository,
    /// Sync audit log.
    pub sync_events: PgSyncEventRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgExtractionJobRepository::new(pool.clone()),
            reviews: PgReviewRepository::new(pool.clone()),
            cabinets: PgCabinetRepository::new(pool.clone()),
            sync_events: PgSyncEventRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to database with default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Trait-object handles over this database, sharing the job notify.
    pub fn stores(&self) -> Stores {
        let pool = self.pool.clone();
        let notify = self.jobs.job_notify();
        Stores {
            jobs: Arc::new(PgExtractionJobRepository::with_notify(
                pool.clone(),
                notify.clone(),
            )),
            reviews: Arc::new(PgReviewRepository::new(pool.clone())),
            cabinets: Arc::new(PgCabinetRepository::new(pool.clone())),
            sync_events: Arc::new(PgSyncEventRepository::new(pool)),
            job_notify: notify,
        }
    }
}

/// The four repositories as shared trait objects, handed to services.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn ExtractionJobRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub cabinets: Arc<dyn CabinetRepository>,
    pub sync_events: Arc<dyn SyncEventRepository>,
    /// Woken whenever a job is queued.
    pub job_notify: Arc<Notify>,
}

impl Stores {
    /// Every repository backed by one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            job_notify: store.job_notify(),
            jobs: store.clone(),
            reviews: store.clone(),
            cabinets: store.clone(),
            sync_events: store,
        }
    }
}
