use axum::extract::{Form, Path};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Extension;
use uuid::Uuid;

use crate::models::{StudentForm, StudentPatch};
use crate::session::AdminSession;
use crate::validation::{validate, Operation, Verdict};
use crate::{views, AppState, Error};

pub async fn home(session: AdminSession) -> Html<String> {
    Html(views::home(&session.admin.username))
}

pub async fn about() -> Html<String> {
    Html(views::about())
}

pub async fn list(
    session: AdminSession,
    Extension(state): Extension<AppState>,
) -> Result<Html<String>, Error> {
    let students = state.students.find_all().await?;
    let flash = state.gate.take_flash(&session.token).await?;
    Ok(Html(views::contact_list(&students, &flash)))
}

pub async fn add_form(_session: AdminSession) -> Html<String> {
    Html(views::add_form(&[], &StudentForm::default()))
}

pub async fn create(
    session: AdminSession,
    Extension(state): Extension<AppState>,
    Form(form): Form<StudentForm>,
) -> Result<Response, Error> {
    let record = match validate(Operation::Create, &form, state.students.as_ref()).await? {
        Verdict::Accepted(record) => record,
        Verdict::Rejected(errors) => {
            return Ok(Html(views::add_form(&errors, &form)).into_response());
        }
    };

    let id = state.students.create(record).await?;
    log::info!(
        "Admin `{}` created student {} (nisn {})",
        session.admin.username,
        id,
        form.nisn
    );
    state
        .gate
        .flash(&session.token, "Data berhasil disimpan")
        .await?;
    Ok(Redirect::to("/contact").into_response())
}

pub async fn delete(
    session: AdminSession,
    Extension(state): Extension<AppState>,
    Path(nisn): Path<String>,
) -> Result<Response, Error> {
    if state.students.find_by_nisn(&nisn).await?.is_none() {
        return Err(Error::NotFound);
    }
    state.students.delete_by_nisn(&nisn).await?;
    log::info!(
        "Admin `{}` deleted student with nisn {}",
        session.admin.username,
        nisn
    );
    state
        .gate
        .flash(&session.token, "Data berhasil dihapus")
        .await?;
    Ok(Redirect::to("/contact").into_response())
}

pub async fn edit_form(
    _session: AdminSession,
    Extension(state): Extension<AppState>,
    Path(nisn): Path<String>,
) -> Result<Html<String>, Error> {
    let student = state
        .students
        .find_by_nisn(&nisn)
        .await?
        .ok_or(Error::NotFound)?;
    Ok(Html(views::edit_form(&[], &StudentForm::from(&student))))
}

/// The record is addressed by the `_id` in the body, never by the nisn in a URL.
/// Fields missing from the body keep their stored values.
pub async fn update(
    session: AdminSession,
    Extension(state): Extension<AppState>,
    Form(patch): Form<StudentPatch>,
) -> Result<Response, Error> {
    let id = Uuid::parse_str(patch.id.as_deref().unwrap_or_default())?;
    let stored = state
        .students
        .find_by_id(id)
        .await?
        .ok_or(Error::NotFound)?;
    let current = StudentForm::from(&stored);
    let form = patch.apply(current.clone());

    let record = match validate(Operation::Update, &form, state.students.as_ref()).await? {
        Verdict::Accepted(record) => record,
        Verdict::Rejected(errors) => {
            return Ok(Html(views::edit_form(&errors, &current)).into_response());
        }
    };

    state.students.update_by_id(id, record).await?;
    log::info!("Admin `{}` updated student {}", session.admin.username, id);
    state
        .gate
        .flash(&session.token, "Data berhasil diubah!")
        .await?;
    Ok(Redirect::to("/contact").into_response())
}
