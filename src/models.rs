use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Sex code as recorded on the national roster.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Sex {
    /// Laki-laki
    L,
    /// Perempuan
    P,
}

impl FromStr for Sex {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "L" | "l" => Ok(Sex::L),
            "P" | "p" => Ok(Sex::P),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::L => f.write_str("L"),
            Sex::P => f.write_str("P"),
        }
    }
}

/// The ten data fields of a student, without the internal id.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub nama: String,
    pub jk: Sex,
    pub nisn: String,
    pub nik: String,
    pub nokk: String,
    pub tingkat: String,
    pub rombel: String,
    pub tgl_masuk: NaiveDate,
    pub terdaftar: String,
    pub ttl: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Student {
    pub id: Uuid,
    pub record: StudentRecord,
}

/// Fields a record can be looked up by besides its id.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StudentKey {
    Nisn,
    Nik,
}

impl StudentKey {
    pub fn column(self) -> &'static str {
        match self {
            StudentKey::Nisn => "nisn",
            StudentKey::Nik => "nik",
        }
    }

    pub fn of(self, record: &StudentRecord) -> &str {
        match self {
            StudentKey::Nisn => &record.nisn,
            StudentKey::Nik => &record.nik,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentRow {
    pub id: Uuid,
    pub nama: String,
    pub jk: String,
    pub nisn: String,
    pub nik: String,
    pub nokk: String,
    pub tingkat: String,
    pub rombel: String,
    pub tgl_masuk: NaiveDate,
    pub terdaftar: String,
    pub ttl: String,
}

impl TryFrom<StudentRow> for Student {
    type Error = crate::Error;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        let jk = row.jk.parse::<Sex>().map_err(|_| {
            crate::Error::internal(
                "CorruptRow",
                format!("student {} has sex code `{}`", row.id, row.jk),
            )
        })?;
        Ok(Student {
            id: row.id,
            record: StudentRecord {
                nama: row.nama,
                jk,
                nisn: row.nisn,
                nik: row.nik,
                nokk: row.nokk,
                tingkat: row.tingkat,
                rombel: row.rombel,
                tgl_masuk: row.tgl_masuk,
                terdaftar: row.terdaftar,
                ttl: row.ttl,
            },
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Admin {
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Student form exactly as the browser submitted it. Every field is text
/// so a bad value comes back as a validation message, not a rejected body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentForm {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub nama: String,
    pub jk: String,
    pub nisn: String,
    pub nik: String,
    pub nokk: String,
    pub tingkat: String,
    pub rombel: String,
    pub tgl_masuk: String,
    pub terdaftar: String,
    pub ttl: String,
}

impl StudentForm {
    pub fn field(&self, name: &str) -> &str {
        match name {
            "nama" => &self.nama,
            "jk" => &self.jk,
            "nisn" => &self.nisn,
            "nik" => &self.nik,
            "nokk" => &self.nokk,
            "tingkat" => &self.tingkat,
            "rombel" => &self.rombel,
            "tgl_masuk" => &self.tgl_masuk,
            "terdaftar" => &self.terdaftar,
            "ttl" => &self.ttl,
            _ => "",
        }
    }
}

impl From<&Student> for StudentForm {
    fn from(student: &Student) -> Self {
        let r = &student.record;
        StudentForm {
            id: Some(student.id.to_string()),
            nama: r.nama.clone(),
            jk: r.jk.to_string(),
            nisn: r.nisn.clone(),
            nik: r.nik.clone(),
            nokk: r.nokk.clone(),
            tingkat: r.tingkat.clone(),
            rombel: r.rombel.clone(),
            tgl_masuk: r.tgl_masuk.format("%Y-%m-%d").to_string(),
            terdaftar: r.terdaftar.clone(),
            ttl: r.ttl.clone(),
        }
    }
}

/// Update body. A field left out keeps its stored value; a field sent
/// empty is taken as empty and left to validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentPatch {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub nama: Option<String>,
    pub jk: Option<String>,
    pub nisn: Option<String>,
    pub nik: Option<String>,
    pub nokk: Option<String>,
    pub tingkat: Option<String>,
    pub rombel: Option<String>,
    pub tgl_masuk: Option<String>,
    pub terdaftar: Option<String>,
    pub ttl: Option<String>,
}

impl StudentPatch {
    pub fn apply(self, mut base: StudentForm) -> StudentForm {
        fn merge(slot: &mut String, sent: Option<String>) {
            if let Some(value) = sent {
                *slot = value;
            }
        }
        merge(&mut base.nama, self.nama);
        merge(&mut base.jk, self.jk);
        merge(&mut base.nisn, self.nisn);
        merge(&mut base.nik, self.nik);
        merge(&mut base.nokk, self.nokk);
        merge(&mut base.tingkat, self.tingkat);
        merge(&mut base.rombel, self.rombel);
        merge(&mut base.tgl_masuk, self.tgl_masuk);
        merge(&mut base.terdaftar, self.terdaftar);
        merge(&mut base.ttl, self.ttl);
        base
    }
}
