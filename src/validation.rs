//! Declarative checks run against a submitted student form before any write.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::{Sex, StudentForm, StudentKey, StudentRecord};
use crate::store::StudentStore;
use crate::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Operation {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    NotEmpty,
    IsoDate,
    SexCode,
    /// No stored record may already carry this value.
    Unique(StudentKey),
}

#[derive(Debug, Clone, Copy)]
struct Check {
    field: &'static str,
    rule: Rule,
    message: &'static str,
}

const fn check(field: &'static str, rule: Rule, message: &'static str) -> Check {
    Check {
        field,
        rule,
        message,
    }
}

const CREATE_CHECKS: &[Check] = &[
    check(
        "nisn",
        Rule::Unique(StudentKey::Nisn),
        "NISN tidak valid / sudah digunakan",
    ),
    check(
        "nik",
        Rule::Unique(StudentKey::Nik),
        "NIK tidak valid / sudah digunakan",
    ),
    check("nama", Rule::NotEmpty, "Nama tidak boleh kosong"),
    check("jk", Rule::SexCode, "Jenis kelamin harus L atau P"),
    check("nisn", Rule::NotEmpty, "NISN tidak boleh kosong"),
    check("nik", Rule::NotEmpty, "NIK tidak boleh kosong"),
    check("nokk", Rule::NotEmpty, "No. KK tidak boleh kosong"),
    check("tingkat", Rule::NotEmpty, "Tingkat tidak boleh kosong"),
    check("rombel", Rule::NotEmpty, "Rombel tidak boleh kosong"),
    check(
        "tgl_masuk",
        Rule::IsoDate,
        "Tanggal masuk harus format tanggal yang valid",
    ),
    check(
        "terdaftar",
        Rule::NotEmpty,
        "Status terdaftar tidak boleh kosong",
    ),
    check("ttl", Rule::NotEmpty, "Tempat/tanggal lahir tidak boleh kosong"),
];

const UPDATE_CHECKS: &[Check] = &[
    check("tingkat", Rule::NotEmpty, "Tingkat tidak boleh kosong"),
    check("rombel", Rule::NotEmpty, "Rombel tidak boleh kosong"),
    check(
        "tgl_masuk",
        Rule::IsoDate,
        "Tanggal masuk harus format tanggal yang valid",
    ),
    check(
        "terdaftar",
        Rule::NotEmpty,
        "Status terdaftar tidak boleh kosong",
    ),
    check("jk", Rule::SexCode, "Jenis kelamin harus L atau P"),
];

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Verdict {
    Accepted(StudentRecord),
    /// Every failed check, in declaration order.
    Rejected(Vec<FieldError>),
}

/// Accepts `YYYY-MM-DD` or an ISO-8601 date-time, keeping only its date.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local().date());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
}

async fn passes(
    check: &Check,
    value: &str,
    students: &dyn StudentStore,
) -> Result<bool, Error> {
    Ok(match check.rule {
        Rule::NotEmpty => !value.trim().is_empty(),
        Rule::IsoDate => parse_iso_date(value).is_some(),
        Rule::SexCode => value.parse::<Sex>().is_ok(),
        Rule::Unique(key) => students.find_one(key, value).await?.is_none(),
    })
}

/// Runs the checks for `op` and, if all pass, converts the form into a record.
/// Only store failures are errors; bad input always comes back as `Rejected`.
pub async fn validate(
    op: Operation,
    form: &StudentForm,
    students: &dyn StudentStore,
) -> Result<Verdict, Error> {
    let checks = match op {
        Operation::Create => CREATE_CHECKS,
        Operation::Update => UPDATE_CHECKS,
    };

    let mut errors = Vec::new();
    for check in checks {
        if !passes(check, form.field(check.field), students).await? {
            errors.push(FieldError {
                field: check.field,
                message: check.message,
            });
        }
    }
    if !errors.is_empty() {
        return Ok(Verdict::Rejected(errors));
    }

    match (form.jk.parse::<Sex>(), parse_iso_date(&form.tgl_masuk)) {
        (Ok(jk), Some(tgl_masuk)) => Ok(Verdict::Accepted(StudentRecord {
            nama: form.nama.clone(),
            jk,
            nisn: form.nisn.clone(),
            nik: form.nik.clone(),
            nokk: form.nokk.clone(),
            tingkat: form.tingkat.clone(),
            rombel: form.rombel.clone(),
            tgl_masuk,
            terdaftar: form.terdaftar.clone(),
            ttl: form.ttl.clone(),
        })),
        _ => Err(Error::internal(
            "ValidationError",
            "form passed checks but could not be converted",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn form(nisn: &str, nik: &str) -> StudentForm {
        StudentForm {
            id: None,
            nama: "Devi Subianti".into(),
            jk: "P".into(),
            nisn: nisn.into(),
            nik: nik.into(),
            nokk: "5315031911150001".into(),
            tingkat: "X".into(),
            rombel: "PPLG 1".into(),
            tgl_masuk: "2023-06-23".into(),
            terdaftar: "Siswa Baru".into(),
            ttl: "29-06-2007".into(),
        }
    }

    fn fields(verdict: &Verdict) -> Vec<&'static str> {
        match verdict {
            Verdict::Accepted(_) => Vec::new(),
            Verdict::Rejected(errors) => errors.iter().map(|e| e.field).collect(),
        }
    }

    async fn store_with(nisn: &str, nik: &str) -> MemoryStore {
        let store = MemoryStore::new();
        if let Verdict::Accepted(record) = validate(Operation::Create, &form(nisn, nik), &store)
            .await
            .unwrap()
        {
            store.create(record).await.unwrap();
        }
        store
    }

    #[test]
    fn iso_dates() {
        let d = NaiveDate::from_ymd_opt(2023, 6, 23).unwrap();
        assert_eq!(parse_iso_date("2023-06-23"), Some(d));
        assert_eq!(parse_iso_date("2023-06-23T08:30:00Z"), Some(d));
        assert_eq!(parse_iso_date("2023-06-23T08:30:00+07:00"), Some(d));
        assert_eq!(parse_iso_date("2023-06-23T08:30"), Some(d));
        assert_eq!(parse_iso_date("23-06-2023"), None);
        assert_eq!(parse_iso_date("2023-02-30"), None);
        assert_eq!(parse_iso_date(""), None);
    }

    #[tokio::test]
    async fn unique_create_is_accepted_with_exact_fields() {
        let store = MemoryStore::new();
        let verdict = validate(Operation::Create, &form("1", "11"), &store)
            .await
            .unwrap();
        match verdict {
            Verdict::Accepted(record) => {
                assert_eq!(record.nisn, "1");
                assert_eq!(record.nik, "11");
                assert_eq!(record.jk, Sex::P);
                assert_eq!(record.tgl_masuk, NaiveDate::from_ymd_opt(2023, 6, 23).unwrap());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_nisn_and_nik_are_both_reported() {
        let store = store_with("1", "11").await;
        let verdict = validate(Operation::Create, &form("1", "11"), &store)
            .await
            .unwrap();
        assert_eq!(fields(&verdict), vec!["nisn", "nik"]);
        if let Verdict::Rejected(errors) = verdict {
            assert_eq!(errors[0].message, "NISN tidak valid / sudah digunakan");
            assert_eq!(errors[1].message, "NIK tidak valid / sudah digunakan");
        }
    }

    #[tokio::test]
    async fn duplicate_nik_alone_is_reported() {
        let store = store_with("1", "11").await;
        let verdict = validate(Operation::Create, &form("2", "11"), &store)
            .await
            .unwrap();
        assert_eq!(fields(&verdict), vec!["nik"]);
    }

    #[tokio::test]
    async fn create_requires_schema_fields() {
        let store = MemoryStore::new();
        let mut f = form("1", "11");
        f.nama.clear();
        f.jk = "X".into();
        f.tgl_masuk = "kemarin".into();
        let verdict = validate(Operation::Create, &f, &store).await.unwrap();
        assert_eq!(fields(&verdict), vec!["nama", "jk", "tgl_masuk"]);
    }

    #[tokio::test]
    async fn update_skips_uniqueness() {
        let store = store_with("1", "11").await;
        let verdict = validate(Operation::Update, &form("1", "11"), &store)
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::Accepted(_)));
    }

    #[tokio::test]
    async fn update_reports_every_failed_check() {
        let store = MemoryStore::new();
        let mut f = form("1", "11");
        f.tingkat = "  ".into();
        f.rombel.clear();
        f.tgl_masuk = "23/06/2023".into();
        f.terdaftar.clear();
        let verdict = validate(Operation::Update, &f, &store).await.unwrap();
        assert_eq!(
            fields(&verdict),
            vec!["tingkat", "rombel", "tgl_masuk", "terdaftar"]
        );
    }

    #[tokio::test]
    async fn update_does_not_require_name() {
        let store = MemoryStore::new();
        let mut f = form("1", "11");
        f.nama.clear();
        let verdict = validate(Operation::Update, &f, &store).await.unwrap();
        assert!(matches!(verdict, Verdict::Accepted(_)));
    }
}
