use concord_db::{create_pool, run_migrations, DbRuntimeSettings};
use tempfile::NamedTempFile;

#[test]
fn db_initialization_works() {
    let db_file = NamedTempFile::new().expect("failed to create temp db file");
    let db_path = db_file.path().to_str().expect("temp path should be utf-8");

    let pool = create_pool(db_path, DbRuntimeSettings::default()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    let applied = run_migrations(&conn).expect("failed to run migrations");
    assert_eq!(applied.len(), 5);

    // A second connection from the pool must see the same schema.
    let conn2 = pool.get().expect("failed to get second connection");
    let count: i64 = conn2
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .expect("failed to count tables");
    // 9 domain tables plus the migration tracking table.
    assert_eq!(count, 10, "expected all domain tables plus tracking table");
}
