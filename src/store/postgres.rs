use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;
use std::time::Duration;
use uuid::Uuid;

use super::{AdminStore, StudentStore};
use crate::models::{Admin, Student, StudentKey, StudentRecord, StudentRow};
use crate::session::{SessionData, SessionStore};
use crate::Error;

const MIGRATION: &str = include_str!("../../migrations/001_init.sql");

const STUDENT_COLUMNS: &str =
    "id, nama, jk, nisn, nik, nokk, tingkat, rombel, tgl_masuk, terdaftar, ttl";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        log::info!("Connecting to PostgreSQL database...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;
        log::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        log::info!("Running database migrations...");
        (&self.pool).execute(MIGRATION).await?;
        log::info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl StudentStore for PgStore {
    async fn find_all(&self) -> Result<Vec<Student>, Error> {
        let rows = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students ORDER BY created_at, id",
            STUDENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Student::try_from).collect()
    }

    async fn find_one(&self, key: StudentKey, value: &str) -> Result<Option<Student>, Error> {
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE {} = $1 ORDER BY created_at LIMIT 1",
            STUDENT_COLUMNS,
            key.column()
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Student::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Student>, Error> {
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE id = $1",
            STUDENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Student::try_from).transpose()
    }

    async fn create(&self, record: StudentRecord) -> Result<Uuid, Error> {
        let id = Uuid::new_v4();
        let res = sqlx::query(
            "INSERT INTO students (id, nama, jk, nisn, nik, nokk, tingkat, rombel, tgl_masuk, terdaftar, ttl) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(id)
        .bind(record.nama)
        .bind(record.jk.to_string())
        .bind(record.nisn)
        .bind(record.nik)
        .bind(record.nokk)
        .bind(record.tingkat)
        .bind(record.rombel)
        .bind(record.tgl_masuk)
        .bind(record.terdaftar)
        .bind(record.ttl)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() < 1 {
            return Err(Error::internal(
                "DatabaseError",
                "Could not save student to database!",
            ));
        }
        Ok(id)
    }

    async fn update_by_id(&self, id: Uuid, record: StudentRecord) -> Result<(), Error> {
        let res = sqlx::query(
            "UPDATE students SET nama = $2, jk = $3, nisn = $4, nik = $5, nokk = $6, \
             tingkat = $7, rombel = $8, tgl_masuk = $9, terdaftar = $10, ttl = $11 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(record.nama)
        .bind(record.jk.to_string())
        .bind(record.nisn)
        .bind(record.nik)
        .bind(record.nokk)
        .bind(record.tingkat)
        .bind(record.rombel)
        .bind(record.tgl_masuk)
        .bind(record.terdaftar)
        .bind(record.ttl)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() < 1 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn delete_by_nisn(&self, nisn: &str) -> Result<(), Error> {
        let res = sqlx::query(
            "DELETE FROM students WHERE id = \
             (SELECT id FROM students WHERE nisn = $1 ORDER BY created_at LIMIT 1)",
        )
        .bind(nisn)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() < 1 {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl AdminStore for PgStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Admin>, Error> {
        let admin = sqlx::query_as::<_, Admin>(
            "SELECT username, password_hash, created_at FROM admins WHERE username = $1 LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn insert_if_absent(&self, admin: Admin) -> Result<bool, Error> {
        let res = sqlx::query(
            "INSERT INTO admins (username, password_hash, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(admin.username)
        .bind(admin.password_hash)
        .bind(admin.created_at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() >= 1)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn load(&self, ssid: &str) -> Result<Option<SessionData>, Error> {
        let row = sqlx::query_as::<_, (Vec<u8>, DateTime<Utc>)>(
            "SELECT data, expires_at FROM admin_sessions WHERE ssid = $1 LIMIT 1",
        )
        .bind(ssid)
        .fetch_optional(&self.pool)
        .await?;

        let (data, expires_at) = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        if Utc::now() >= expires_at {
            self.destroy(ssid).await?;
            return Ok(None);
        }
        Ok(Some(postcard::from_bytes::<SessionData>(&data)?))
    }

    async fn save(
        &self,
        ssid: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let bytes = postcard::to_allocvec(data)?;
        sqlx::query(
            "INSERT INTO admin_sessions (ssid, data, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (ssid) DO UPDATE SET data = EXCLUDED.data, expires_at = EXCLUDED.expires_at",
        )
        .bind(ssid)
        .bind(bytes)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        ssid: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let bytes = postcard::to_allocvec(data)?;
        let res = sqlx::query(
            "UPDATE admin_sessions SET data = $2, expires_at = $3 \
             WHERE ssid = $1 AND expires_at > NOW()",
        )
        .bind(ssid)
        .bind(bytes)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() >= 1)
    }

    async fn destroy(&self, ssid: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM admin_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let res = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
