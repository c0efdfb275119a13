//! MySQL driver (relational backend)

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;
use std::path::Path;
use std::time::Duration;
use vitals_core::{
    BackendKind, Credentials, DateRange, NewRecord, NewUser, Record, RelationalConfig, Result,
    Role, StorageBackend, StoreError, User,
};

/// How long to wait for the server before reporting `ConnectionFailed`
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 5;

pub struct RelationalStore {
    pool: MySqlPool,
    target: String,
}

impl RelationalStore {
    /// Connect and make sure the schema exists
    pub async fn connect(config: &RelationalConfig) -> Result<Self> {
        let target = describe(config);
        tracing::info!("Connecting to MySQL at {}", target);

        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(connect_options(config))
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("{}: {}", target, e)))?;

        tracing::info!("MySQL connection established, running migrations...");
        Self::prepare(pool, target).await
    }

    /// Run migrations on a fresh pool, closing it if they fail
    async fn prepare(pool: MySqlPool, target: String) -> Result<Self> {
        if let Err(e) = Self::run_migrations(&pool).await {
            tracing::error!("Migrations failed on {}: {}", target, e);
            pool.close().await;
            return Err(e);
        }
        tracing::info!("Relational store ready");

        Ok(Self { pool, target })
    }

    /// Open a single connection and ping it, without touching the schema
    pub async fn ping(config: &RelationalConfig) -> Result<()> {
        let target = describe(config);
        let options = connect_options(config);
        let attempt = async {
            let mut conn = MySqlConnection::connect_with(&options).await?;
            conn.ping().await?;
            conn.close().await?;
            Ok::<_, sqlx::Error>(())
        };

        match tokio::time::timeout(CONNECT_TIMEOUT, attempt).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StoreError::ConnectionFailed(format!("{}: {}", target, e))),
            Err(_) => Err(StoreError::ConnectionFailed(format!(
                "{}: timed out after {}s",
                target,
                CONNECT_TIMEOUT.as_secs()
            ))),
        }
    }

    async fn run_migrations(pool: &MySqlPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                username VARCHAR(50) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                created_at DATETIME NOT NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS health_records (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                user_id BIGINT NOT NULL,
                systolic INT NULL,
                diastolic INT NULL,
                heart_rate INT NULL,
                height_cm DOUBLE NULL,
                weight_kg DOUBLE NULL,
                waist_cm DOUBLE NULL,
                recorded_at DATETIME NOT NULL,
                notes TEXT NULL,
                created_at DATETIME NOT NULL,
                INDEX idx_records_user_time (user_id, recorded_at),
                CONSTRAINT fk_records_user FOREIGN KEY (user_id)
                    REFERENCES users (id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                setting_key VARCHAR(50) PRIMARY KEY,
                setting_value TEXT NOT NULL,
                description VARCHAR(255) NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn user_exists(&self, id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl StorageBackend for RelationalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    // User operations
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let created_at = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, role, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match db_err(e) {
            StoreError::Conflict(_) => {
                StoreError::Conflict(format!("username already exists: {}", user.username))
            }
            other => other,
        })?;

        let id = i64::try_from(result.last_insert_id())
            .map_err(|_| StoreError::Backend("user id out of range".to_string()))?;
        self.get_user(id).await
    }

    async fn get_user(&self, id: i64) -> Result<User> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, password_hash, role, created_at
            FROM users WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| Credentials::from(r).user)
            .ok_or_else(|| StoreError::not_found(format!("user {}", id)))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Credentials> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, password_hash, role, created_at
            FROM users WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Credentials::from)
            .ok_or_else(|| StoreError::not_found(format!("user {}", username)))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, password_hash, role, created_at
            FROM users ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| Credentials::from(r).user).collect())
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM users WHERE id = ? FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let role = role.ok_or_else(|| StoreError::not_found(format!("user {}", id)))?;

        if parse_role(&role) == Role::Admin {
            let admins: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ? FOR UPDATE")
                    .bind(Role::Admin.as_str())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err)?;
            if admins <= 1 {
                return Err(StoreError::validation(
                    "cannot delete the last administrator",
                ));
            }
        }

        let records = sqlx::query("DELETE FROM health_records WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        tracing::debug!(
            "Deleted user {} and {} records",
            id,
            records.rows_affected()
        );
        Ok(())
    }

    async fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        // MySQL reports changed rows, so an unchanged hash also reads as 0
        if result.rows_affected() == 0 && !self.user_exists(id).await? {
            return Err(StoreError::not_found(format!("user {}", id)));
        }
        Ok(())
    }

    async fn update_user_role(&self, id: i64, role: Role) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT role FROM users WHERE id = ? FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let current = current.ok_or_else(|| StoreError::not_found(format!("user {}", id)))?;

        if parse_role(&current) == Role::Admin && role != Role::Admin {
            let admins: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ? FOR UPDATE")
                    .bind(Role::Admin.as_str())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err)?;
            if admins <= 1 {
                return Err(StoreError::validation(
                    "cannot demote the last administrator",
                ));
            }
        }

        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn count_admins(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(Role::Admin.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    // Record operations
    async fn create_record(&self, user_id: i64, record: &NewRecord) -> Result<Record> {
        if !self.user_exists(user_id).await? {
            return Err(StoreError::not_found(format!("user {}", user_id)));
        }

        let recorded_at = record.recorded_at_or_now();
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO health_records
                (user_id, systolic, diastolic, heart_rate, height_cm, weight_kg,
                 waist_cm, recorded_at, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(record.systolic)
        .bind(record.diastolic)
        .bind(record.heart_rate)
        .bind(record.height_cm)
        .bind(record.weight_kg)
        .bind(record.waist_cm)
        .bind(recorded_at)
        .bind(&record.notes)
        .bind(created_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| record_insert_err(e, user_id))?;

        let id = i64::try_from(result.last_insert_id())
            .map_err(|_| StoreError::Backend("record id out of range".to_string()))?;
        self.get_record(id, user_id).await
    }

    async fn get_record(&self, id: i64, user_id: i64) -> Result<Record> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, systolic, diastolic, heart_rate, height_cm, weight_kg,
                   waist_cm, recorded_at, notes, created_at
            FROM health_records WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Record::from)
            .ok_or_else(|| StoreError::not_found(format!("record {}", id)))
    }

    async fn list_records(&self, user_id: i64, range: &DateRange) -> Result<Vec<Record>> {
        let mut sql = String::from(
            r#"
            SELECT id, user_id, systolic, diastolic, heart_rate, height_cm, weight_kg,
                   waist_cm, recorded_at, notes, created_at
            FROM health_records WHERE user_id = ?
            "#,
        );
        let lower = range.start.map(start_of_day);
        let upper = range.end.and_then(|end| end.succ_opt()).map(start_of_day);
        if lower.is_some() {
            sql.push_str(" AND recorded_at >= ?");
        }
        if upper.is_some() {
            sql.push_str(" AND recorded_at < ?");
        }
        sql.push_str(" ORDER BY recorded_at DESC, id DESC");

        let mut query = sqlx::query_as::<_, RecordRow>(&sql).bind(user_id);
        if let Some(lower) = lower {
            query = query.bind(lower);
        }
        if let Some(upper) = upper {
            query = query.bind(upper);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn delete_record(&self, id: i64, user_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM health_records WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("record {}", id)));
        }
        Ok(())
    }

    // Settings
    async fn get_setting(&self, key: &str) -> Result<String> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT setting_value FROM settings WHERE setting_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        value.ok_or_else(|| StoreError::not_found(format!("setting {}", key)))
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (setting_key, setting_value)
            VALUES (?, ?)
            ON DUPLICATE KEY UPDATE setting_value = VALUES(setting_value)
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    // Administration
    async fn backup(&self, _dest: &Path) -> Result<()> {
        Err(StoreError::Unsupported(
            "backup is only available for the embedded backend; use mysqldump for MySQL"
                .to_string(),
        ))
    }

    async fn restore(&mut self, _src: &Path) -> Result<()> {
        Err(StoreError::Unsupported(
            "restore is only available for the embedded backend; use the mysql client for MySQL"
                .to_string(),
        ))
    }

    async fn close(&mut self) -> Result<()> {
        tracing::info!("Closing MySQL pool for {}", self.target);
        self.pool.close().await;
        Ok(())
    }
}

fn connect_options(config: &RelationalConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database)
        .charset("utf8mb4")
}

fn describe(config: &RelationalConfig) -> String {
    format!(
        "{}@{}:{}/{}",
        config.user, config.host, config.port, config.database
    )
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn db_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StoreError::ConnectionFailed(e.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

/// The owner can disappear between the existence check and the insert
fn record_insert_err(e: sqlx::Error, user_id: i64) -> StoreError {
    match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            StoreError::not_found(format!("user {}", user_id))
        }
        other => db_err(other),
    }
}

// Helper structs for sqlx query_as
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
    created_at: NaiveDateTime,
}

impl From<UserRow> for Credentials {
    fn from(r: UserRow) -> Self {
        Credentials {
            user: User {
                id: r.id,
                username: r.username,
                role: parse_role(&r.role),
                created_at: r.created_at.and_utc(),
            },
            password_hash: r.password_hash,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: i64,
    user_id: i64,
    systolic: Option<i32>,
    diastolic: Option<i32>,
    heart_rate: Option<i32>,
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    waist_cm: Option<f64>,
    recorded_at: NaiveDateTime,
    notes: Option<String>,
    created_at: NaiveDateTime,
}

impl From<RecordRow> for Record {
    fn from(r: RecordRow) -> Self {
        Record {
            id: r.id,
            user_id: r.user_id,
            systolic: r.systolic,
            diastolic: r.diastolic,
            heart_rate: r.heart_rate,
            height_cm: r.height_cm,
            weight_kg: r.weight_kg,
            waist_cm: r.waist_cm,
            recorded_at: r.recorded_at,
            notes: r.notes.unwrap_or_default(),
            created_at: r.created_at.and_utc(),
        }
    }
}

fn parse_role(s: &str) -> Role {
    s.parse().unwrap_or_else(|_| {
        tracing::warn!("Unknown role {:?} in users table, treating as user", s);
        Role::User
    })
}
