use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AdminStore, StudentStore};
use crate::models::{Admin, Student, StudentKey, StudentRecord};
use crate::session::{SessionData, SessionStore};
use crate::Error;

struct StoredSession {
    data: SessionData,
    expires_at: DateTime<Utc>,
}

/// In-process backend. Used when no database is configured and by tests.
#[derive(Default)]
pub struct MemoryStore {
    students: RwLock<Vec<Student>>,
    admins: RwLock<HashMap<String, Admin>>,
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live and not yet purged sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn session_expiry(&self, ssid: &str) -> Option<DateTime<Utc>> {
        self.sessions.read().await.get(ssid).map(|s| s.expires_at)
    }
}

#[async_trait]
impl StudentStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<Student>, Error> {
        Ok(self.students.read().await.clone())
    }

    async fn find_one(&self, key: StudentKey, value: &str) -> Result<Option<Student>, Error> {
        Ok(self
            .students
            .read()
            .await
            .iter()
            .find(|s| key.of(&s.record) == value)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Student>, Error> {
        Ok(self
            .students
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn create(&self, record: StudentRecord) -> Result<Uuid, Error> {
        let id = Uuid::new_v4();
        self.students.write().await.push(Student { id, record });
        Ok(id)
    }

    async fn update_by_id(&self, id: Uuid, record: StudentRecord) -> Result<(), Error> {
        let mut students = self.students.write().await;
        match students.iter_mut().find(|s| s.id == id) {
            Some(student) => {
                student.record = record;
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    async fn delete_by_nisn(&self, nisn: &str) -> Result<(), Error> {
        let mut students = self.students.write().await;
        match students.iter().position(|s| s.record.nisn == nisn) {
            Some(idx) => {
                students.remove(idx);
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Admin>, Error> {
        Ok(self.admins.read().await.get(username).cloned())
    }

    async fn insert_if_absent(&self, admin: Admin) -> Result<bool, Error> {
        let mut admins = self.admins.write().await;
        if admins.contains_key(&admin.username) {
            return Ok(false);
        }
        admins.insert(admin.username.clone(), admin);
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, ssid: &str) -> Result<Option<SessionData>, Error> {
        let mut sessions = self.sessions.write().await;
        let expired = match sessions.get(ssid) {
            None => return Ok(None),
            Some(stored) => Utc::now() >= stored.expires_at,
        };
        if expired {
            sessions.remove(ssid);
            return Ok(None);
        }
        Ok(sessions.get(ssid).map(|stored| stored.data.clone()))
    }

    async fn save(
        &self,
        ssid: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.sessions.write().await.insert(
            ssid.to_string(),
            StoredSession {
                data: data.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn update(
        &self,
        ssid: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(ssid) {
            Some(stored) if stored.expires_at > Utc::now() => {
                stored.data = data.clone();
                stored.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn destroy(&self, ssid: &str) -> Result<(), Error> {
        self.sessions.write().await.remove(ssid);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| stored.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}
