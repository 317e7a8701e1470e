//! Server-rendered pages. Every interpolated value goes through `escape`.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::fmt::Write;

use crate::models::{Student, StudentForm};
use crate::validation::FieldError;

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, nav: bool, body: &str) -> String {
    let nav = if nav {
        r#"<nav><a href="/">Home</a> | <a href="/contact">Contact</a> | <a href="/about">About</a> | <a href="/logout">Logout</a></nav>"#
    } else {
        ""
    };
    format!(
        "<!DOCTYPE html>\n<html lang=\"id\">\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}\n<main>\n{}\n</main>\n</body>\n</html>\n",
        escape(title),
        nav,
        body
    )
}

fn notices(msgs: &[String]) -> String {
    msgs.iter()
        .map(|m| format!("<div class=\"alert\">{}</div>", escape(m)))
        .collect()
}

fn error_list(errors: &[FieldError]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let mut out = String::from("<ul class=\"errors\">");
    for e in errors {
        let _ = write!(
            out,
            "<li data-field=\"{}\">{}</li>",
            e.field,
            escape(e.message)
        );
    }
    out.push_str("</ul>");
    out
}

pub fn login(msg: Option<&str>) -> String {
    let alert = msg
        .map(|m| format!("<div class=\"alert\">{}</div>", escape(m)))
        .unwrap_or_default();
    layout(
        "Login Admin",
        false,
        &format!(
            r#"<h1>Login Admin</h1>
{}
<form method="post" action="/login">
<label>Username <input name="username" required></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">Login</button>
</form>"#,
            alert
        ),
    )
}

pub fn home(username: &str) -> String {
    layout(
        "Halaman utama",
        true,
        &format!("<h1>Selamat datang, {}</h1>", escape(username)),
    )
}

pub fn about() -> String {
    layout(
        "Halaman About",
        true,
        "<h1>About</h1><p>Panel administrasi data siswa (Dapodik).</p>",
    )
}

pub fn contact_list(students: &[Student], flash: &[String]) -> String {
    let mut rows = String::new();
    for (i, s) in students.iter().enumerate() {
        let r = &s.record;
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><a href=\"/contact/edit/{nisn_url}\">Ubah</a> <a href=\"/contact/delete/{nisn_url}\" onclick=\"return confirm('Hapus data?')\">Hapus</a></td></tr>",
            i + 1,
            escape(&r.nama),
            r.jk,
            escape(&r.nisn),
            escape(&r.nik),
            escape(&r.nokk),
            escape(&r.tingkat),
            escape(&r.rombel),
            r.tgl_masuk.format("%d-%m-%Y"),
            escape(&r.terdaftar),
            escape(&r.ttl),
            nisn_url = utf8_percent_encode(&r.nisn, NON_ALPHANUMERIC),
        );
    }
    if students.is_empty() {
        rows.push_str("<tr><td colspan=\"12\">Data siswa masih kosong</td></tr>");
    }
    layout(
        "Halaman Contact",
        true,
        &format!(
            r#"<h1>Data Siswa</h1>
{}
<a href="/contact/add">Tambah data</a>
<table>
<thead><tr><th>#</th><th>Nama</th><th>JK</th><th>NISN</th><th>NIK</th><th>No. KK</th><th>Tingkat</th><th>Rombel</th><th>Tgl Masuk</th><th>Terdaftar</th><th>TTL</th><th></th></tr></thead>
<tbody>{}</tbody>
</table>"#,
            notices(flash),
            rows
        ),
    )
}

fn student_fields(form: &StudentForm) -> String {
    const INPUTS: &[(&str, &str, &str)] = &[
        ("nama", "Nama", "text"),
        ("jk", "Jenis kelamin (L/P)", "text"),
        ("nisn", "NISN", "text"),
        ("nik", "NIK", "text"),
        ("nokk", "No. KK", "text"),
        ("tingkat", "Tingkat", "text"),
        ("rombel", "Rombel", "text"),
        ("tgl_masuk", "Tanggal masuk", "date"),
        ("terdaftar", "Terdaftar", "text"),
        ("ttl", "Tempat/tanggal lahir", "text"),
    ];
    let mut out = String::new();
    for (name, label, kind) in INPUTS {
        let _ = writeln!(
            out,
            "<label>{} <input name=\"{}\" type=\"{}\" value=\"{}\"></label>",
            label,
            name,
            kind,
            escape(form.field(name))
        );
    }
    out
}

pub fn add_form(errors: &[FieldError], form: &StudentForm) -> String {
    layout(
        "Form Tambah Data Contact",
        true,
        &format!(
            "<h1>Tambah Data Siswa</h1>\n{}\n<form method=\"post\" action=\"/contact\">\n{}<button type=\"submit\">Simpan</button>\n</form>",
            error_list(errors),
            student_fields(form)
        ),
    )
}

pub fn edit_form(errors: &[FieldError], form: &StudentForm) -> String {
    layout(
        "Form Ubah Data Contact",
        true,
        &format!(
            "<h1>Ubah Data Siswa</h1>\n{}\n<form method=\"post\" action=\"/contact/update?_method=PUT\">\n<input type=\"hidden\" name=\"_id\" value=\"{}\">\n{}<button type=\"submit\">Ubah</button>\n</form>",
            error_list(errors),
            escape(form.id.as_deref().unwrap_or_default()),
            student_fields(form)
        ),
    )
}

pub fn not_found() -> String {
    "<h1>404 Not Found</h1>".to_string()
}

pub fn server_error() -> String {
    "<h1>500</h1><p>Terjadi kesalahan pada server</p>".to_string()
}
