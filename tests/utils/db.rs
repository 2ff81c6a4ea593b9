/// Database test utilities with singleton pattern
///
/// Tests that need PostgreSQL read `TEST_DATABASE_URL`; when it is unset
/// they return early instead of failing, so `cargo test` works without a
/// database server.
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use mangashelf::shared::database::Database;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

static DB: OnceLock<Option<Arc<Database>>> = OnceLock::new();

/// Shared migrated test database, or `None` when no server is configured
pub fn test_database() -> Option<Arc<Database>> {
    DB.get_or_init(|| {
        dotenvy::dotenv().ok();
        let url = std::env::var("TEST_DATABASE_URL").ok()?;

        let manager = ConnectionManager::<PgConnection>::new(url);
        let pool = r2d2::Pool::builder()
            .max_size(10)
            .build(manager)
            .expect("Failed to create test database pool");

        let db = Database::from_pool(pool);
        db.run_migrations().expect("Failed to migrate test database");
        Some(Arc::new(db))
    })
    .clone()
}

/// Clean all test tables - use at the start of each test
pub fn clean_test_db(db: &Database) {
    let mut conn = db.get_connection().expect("Failed to get DB connection");

    diesel::sql_query("TRUNCATE TABLE background_jobs, library_paths")
        .execute(&mut conn)
        .expect("Failed to clean test tables");
}

/// Run a statement directly, for arranging timestamps the API never exposes
pub fn execute_sql(db: &Database, sql: &str) {
    let mut conn = db.get_connection().expect("Failed to get DB connection");
    diesel::sql_query(sql)
        .execute(&mut conn)
        .unwrap_or_else(|e| panic!("Failed to execute {}: {}", sql, e));
}

/// Global test mutex for serialization
static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Acquire test lock to ensure database tests run serially
pub fn acquire_test_lock() -> MutexGuard<'static, ()> {
    // Handle poisoned mutex by recovering from panic
    match TEST_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Lock, connect and clean; `None` means the test should be skipped
pub fn setup() -> Option<(MutexGuard<'static, ()>, Arc<Database>)> {
    let guard = acquire_test_lock();
    let Some(db) = test_database() else {
        eprintln!("TEST_DATABASE_URL not set, skipping database test");
        return None;
    };
    clean_test_db(&db);
    Some((guard, db))
}
