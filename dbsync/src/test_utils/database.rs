use std::path::Path;

use sqlx::{AnyConnection, Connection, Executor};

use crate::test_utils::rows::TestUser;

/// Name of the table created by [`create_users_database`].
pub const USERS_TABLE: &str = "acc_users";

/// Returns the DSN of a SQLite database file inside `dir`.
pub fn sqlite_dsn(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("acc.db").display())
}

/// Creates a SQLite database in `dir` with an `acc_users` table holding `users`.
///
/// Returns the DSN of the database.
pub async fn create_users_database(dir: &Path, users: &[TestUser]) -> String {
    sqlx::any::install_default_drivers();
    let dsn = sqlite_dsn(dir);

    let mut connection = AnyConnection::connect(&dsn)
        .await
        .expect("failed to create test database");

    connection
        .execute(
            "CREATE TABLE acc_users (
                id INTEGER PRIMARY KEY,
                pass TEXT,
                role TEXT,
                accountcode TEXT
            )",
        )
        .await
        .expect("failed to create acc_users table");

    connection
        .execute("BEGIN")
        .await
        .expect("failed to begin transaction");
    for user in users {
        insert_user(&mut connection, user).await;
    }
    connection
        .execute("COMMIT")
        .await
        .expect("failed to commit users");

    connection
        .close()
        .await
        .expect("failed to close test database");

    dsn
}

/// Inserts a row with raw column values, for rows that [`TestUser`] cannot express.
///
/// The database must have been created by [`create_users_database`].
pub async fn insert_raw_user(
    dsn: &str,
    id: i64,
    pass: Option<&str>,
    role: Option<&str>,
    accountcode: Option<&str>,
) {
    let mut connection = AnyConnection::connect(dsn)
        .await
        .expect("failed to open test database");

    sqlx::query("INSERT INTO acc_users (id, pass, role, accountcode) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(pass.map(str::to_string))
        .bind(role.map(str::to_string))
        .bind(accountcode.map(str::to_string))
        .execute(&mut connection)
        .await
        .expect("failed to insert user");

    connection
        .close()
        .await
        .expect("failed to close test database");
}

async fn insert_user(connection: &mut AnyConnection, user: &TestUser) {
    sqlx::query("INSERT INTO acc_users (id, pass, role, accountcode) VALUES (?, ?, ?, ?)")
        .bind(user.id)
        .bind(user.pass.clone())
        .bind(user.role.clone())
        .bind(user.accountcode.clone())
        .execute(connection)
        .await
        .expect("failed to insert user");
}
