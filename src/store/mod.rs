//! Persistent collections: students and admins.
//!
//! Both backends implement the same traits so handlers never know whether
//! they talk to Postgres or to the in-process maps.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Admin, Student, StudentKey, StudentRecord};
use crate::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Every record in insertion order. An empty collection is not an error.
    async fn find_all(&self) -> Result<Vec<Student>, Error>;

    async fn find_one(&self, key: StudentKey, value: &str) -> Result<Option<Student>, Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Student>, Error>;

    async fn create(&self, record: StudentRecord) -> Result<Uuid, Error>;

    /// Overwrites every field of the record with `id`; `Error::NotFound` if absent.
    async fn update_by_id(&self, id: Uuid, record: StudentRecord) -> Result<(), Error>;

    /// Removes one record carrying `nisn`; `Error::NotFound` if there is none.
    async fn delete_by_nisn(&self, nisn: &str) -> Result<(), Error>;

    async fn find_by_nisn(&self, nisn: &str) -> Result<Option<Student>, Error> {
        self.find_one(StudentKey::Nisn, nisn).await
    }
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Admin>, Error>;

    /// Inserts `admin` unless the username is taken. Returns whether a row was written.
    async fn insert_if_absent(&self, admin: Admin) -> Result<bool, Error>;
}
