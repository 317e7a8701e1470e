pub mod auth;
pub mod config;
pub mod contact;
pub mod err;
pub mod models;
pub mod session;
pub mod store;
pub mod validation;
pub mod views;

use axum::body::Body;
use axum::handler::Handler;
use axum::http::{Method, Request};
use axum::routing::{get, put};
use axum::{Extension, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower::util::MapRequest;
use tower::ServiceBuilder;

pub use crate::err::Error;
use crate::session::{SessionGate, SessionStore};
use crate::store::{AdminStore, StudentStore};

/// Shared handles injected into every handler through `Extension`.
#[derive(Clone)]
pub struct AppState {
    pub students: Arc<dyn StudentStore>,
    pub gate: Arc<SessionGate>,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, ttl: std::time::Duration, secret: &[u8]) -> Result<Self, Error>
    where
        S: StudentStore + AdminStore + SessionStore + 'static,
    {
        let gate = SessionGate::new(store.clone(), store.clone(), ttl, secret)?;
        Ok(Self {
            students: store,
            gate: Arc::new(gate),
        })
    }
}

pub type App = MapRequest<Router, fn(Request<Body>) -> Request<Body>>;

#[derive(Deserialize)]
struct MethodOverride {
    #[serde(rename = "_method")]
    method: String,
}

fn override_target(query: &str) -> Option<Method> {
    let wanted = serde_urlencoded::from_str::<MethodOverride>(query).ok()?;
    match wanted.method.to_ascii_uppercase().as_str() {
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        _ => None,
    }
}

/// Lets an HTML form `POST` to `?_method=PUT` and be routed as a `PUT`.
pub fn method_override<B>(mut req: Request<B>) -> Request<B> {
    if req.method() != Method::POST {
        return req;
    }
    let overridden = req.uri().query().and_then(override_target);
    if let Some(method) = overridden {
        *req.method_mut() = method;
    }
    req
}

pub fn app(state: AppState) -> App {
    let router = Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/", get(contact::home))
        .route("/about", get(contact::about))
        .route("/contact", get(contact::list).post(contact::create))
        .route("/contact/add", get(contact::add_form))
        .route("/contact/delete/:nisn", get(contact::delete))
        .route("/contact/edit/:nisn", get(contact::edit_form))
        .route("/contact/update", put(contact::update))
        .fallback(err::handler404.into_service())
        .layer(Extension(state));

    ServiceBuilder::new()
        .map_request(method_override as fn(Request<Body>) -> Request<Body>)
        .service(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sex;
    use crate::store::MemoryStore;
    use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
    use axum::http::StatusCode;
    use axum::response::Response;
    use tower::ServiceExt;

    const FORM: &str = "application/x-www-form-urlencoded";
    const STUDENT: &str = "nama=Devi+Subianti&jk=P&nisn=12329233&nik=5206085405880001\
        &nokk=5315031911150001&tingkat=X&rombel=PPLG+1&tgl_masuk=2023-06-23\
        &terdaftar=Siswa+Baru&ttl=29-06-2007";

    struct Harness {
        store: Arc<MemoryStore>,
        app: App,
    }

    impl Harness {
        async fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            auth::seed_admin(store.as_ref(), "admin", "rahasia")
                .await
                .unwrap();
            let state = AppState::new(
                store.clone(),
                std::time::Duration::from_secs(600),
                b"test-secret",
            )
            .unwrap();
            Harness {
                store,
                app: app(state),
            }
        }

        async fn send(&self, req: Request<Body>) -> Response {
            self.app.clone().oneshot(req).await.unwrap()
        }

        async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
            let mut req = Request::get(uri);
            if let Some(cookie) = cookie {
                req = req.header(COOKIE, cookie);
            }
            self.send(req.body(Body::empty()).unwrap()).await
        }

        async fn post(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response {
            let mut req = Request::post(uri).header(CONTENT_TYPE, FORM);
            if let Some(cookie) = cookie {
                req = req.header(COOKIE, cookie);
            }
            self.send(req.body(Body::from(body.to_string())).unwrap())
                .await
        }

        async fn login(&self) -> String {
            let res = self
                .post("/login", None, "username=admin&password=rahasia")
                .await;
            assert_eq!(res.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&res), "/");
            session_cookie(&res).expect("login sets a cookie")
        }
    }

    fn location(res: &Response) -> &str {
        res.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    fn session_cookie(res: &Response) -> Option<String> {
        let raw = res.headers().get(SET_COOKIE)?.to_str().ok()?;
        Some(raw.split(';').next()?.to_string())
    }

    async fn body(res: Response) -> String {
        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn override_only_applies_to_post() {
        let req = Request::post("/contact/update?_method=put")
            .body(())
            .unwrap();
        assert_eq!(method_override(req).method(), Method::PUT);

        let req = Request::get("/contact/update?_method=PUT").body(()).unwrap();
        assert_eq!(method_override(req).method(), Method::GET);

        let req = Request::post("/contact?_method=TRACE").body(()).unwrap();
        assert_eq!(method_override(req).method(), Method::POST);
    }

    #[test]
    fn override_query_is_decoded() {
        let req = Request::post("/contact/update?page=2&_method=%50UT")
            .body(())
            .unwrap();
        assert_eq!(method_override(req).method(), Method::PUT);

        let req = Request::post("/contact/update?_method=DEL%45TE")
            .body(())
            .unwrap();
        assert_eq!(method_override(req).method(), Method::DELETE);

        let req = Request::post("/contact/update?method=PUT").body(()).unwrap();
        assert_eq!(method_override(req).method(), Method::POST);
    }

    #[tokio::test]
    async fn gated_pages_redirect_to_login() {
        let h = Harness::new().await;
        for uri in [
            "/",
            "/contact",
            "/contact/add",
            "/contact/edit/1",
            "/contact/delete/1",
        ] {
            let res = h.get(uri, None).await;
            assert_eq!(res.status(), StatusCode::SEE_OTHER, "{}", uri);
            assert_eq!(location(&res), "/login", "{}", uri);
        }
        let res = h.post("/contact", None, STUDENT).await;
        assert_eq!(location(&res), "/login");
        assert!(h.store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_pages_render() {
        let h = Harness::new().await;
        assert_eq!(h.get("/about", None).await.status(), StatusCode::OK);
        assert_eq!(h.get("/login", None).await.status(), StatusCode::OK);
        assert_eq!(h.get("/nope", None).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_login_flashes_once() {
        let h = Harness::new().await;
        let res = h
            .post("/login", None, "username=admin&password=salah")
            .await;
        assert_eq!(location(&res), "/login");
        let cookie = session_cookie(&res).expect("anonymous session for the notice");

        let page = body(h.get("/login", Some(&cookie)).await).await;
        assert!(page.contains("Password salah"));
        let page = body(h.get("/login", Some(&cookie)).await).await;
        assert!(!page.contains("Password salah"));

        // the anonymous session is not a login
        let res = h.get("/contact", Some(&cookie)).await;
        assert_eq!(location(&res), "/login");
    }

    #[tokio::test]
    async fn unknown_user_is_told_so() {
        let h = Harness::new().await;
        let res = h
            .post("/login", None, "username=root&password=rahasia")
            .await;
        let cookie = session_cookie(&res).unwrap();
        let page = body(h.get("/login", Some(&cookie)).await).await;
        assert!(page.contains("Username tidak ditemukan"));
    }

    #[tokio::test]
    async fn home_greets_admin() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        let page = body(h.get("/", Some(&cookie)).await).await;
        assert!(page.contains("Selamat datang, admin"));
    }

    #[tokio::test]
    async fn forged_cookie_is_ignored() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        let forged = format!("{}ff", cookie);
        let res = h.get("/", Some(&forged)).await;
        assert_eq!(location(&res), "/login");
    }

    #[tokio::test]
    async fn create_lists_and_flashes() {
        let h = Harness::new().await;
        let cookie = h.login().await;

        let res = h.post("/contact", Some(&cookie), STUDENT).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/contact");

        let all = h.store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        let r = &all[0].record;
        assert_eq!(r.nama, "Devi Subianti");
        assert_eq!(r.jk, Sex::P);
        assert_eq!(r.rombel, "PPLG 1");

        let page = body(h.get("/contact", Some(&cookie)).await).await;
        assert!(page.contains("Data berhasil disimpan"));
        assert!(page.contains("23-06-2023"));
        let page = body(h.get("/contact", Some(&cookie)).await).await;
        assert!(!page.contains("Data berhasil disimpan"));
    }

    #[tokio::test]
    async fn duplicate_create_rerenders_with_errors() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        h.post("/contact", Some(&cookie), STUDENT).await;

        let res = h.post("/contact", Some(&cookie), STUDENT).await;
        assert_eq!(res.status(), StatusCode::OK);
        let page = body(res).await;
        assert!(page.contains("NISN tidak valid / sudah digunakan"));
        assert!(page.contains("NIK tidak valid / sudah digunakan"));
        assert!(page.contains("value=\"Devi Subianti\""));
        assert_eq!(h.store.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edit_and_delete_unknown_nisn_are_404() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        let res = h.get("/contact/edit/999", Some(&cookie)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let res = h.get("/contact/delete/999", Some(&cookie)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn edit_form_is_prefilled() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        h.post("/contact", Some(&cookie), STUDENT).await;
        let id = h.store.find_all().await.unwrap()[0].id;

        let page = body(h.get("/contact/edit/12329233", Some(&cookie)).await).await;
        assert!(page.contains(&format!("value=\"{}\"", id)));
        assert!(page.contains("value=\"2023-06-23\""));
    }

    #[tokio::test]
    async fn update_through_method_override() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        h.post("/contact", Some(&cookie), STUDENT).await;
        let id = h.store.find_all().await.unwrap()[0].id;

        let changed = format!("_id={}&{}", id, STUDENT.replace("PPLG+1", "PPLG+2"));
        let res = h
            .post("/contact/update?_method=PUT", Some(&cookie), &changed)
            .await;
        assert_eq!(location(&res), "/contact");
        let stored = h.store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.record.rombel, "PPLG 2");

        let page = body(h.get("/contact", Some(&cookie)).await).await;
        assert!(page.contains("Data berhasil diubah!"));
    }

    #[tokio::test]
    async fn update_with_bad_date_changes_nothing() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        h.post("/contact", Some(&cookie), STUDENT).await;
        let before = h.store.find_all().await.unwrap()[0].clone();

        let changed = format!(
            "_id={}&{}",
            before.id,
            STUDENT
                .replace("2023-06-23", "23%2F06%2F2023")
                .replace("PPLG+1", "PPLG+9")
        );
        let res = h
            .post("/contact/update?_method=PUT", Some(&cookie), &changed)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let page = body(res).await;
        assert!(page.contains("data-field=\"tgl_masuk\""));
        // the form shows the stored record, not the rejected input
        assert!(page.contains("value=\"PPLG 1\""));

        assert_eq!(h.store.find_by_id(before.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn partial_update_keeps_omitted_fields() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        h.post("/contact", Some(&cookie), STUDENT).await;
        let before = h.store.find_all().await.unwrap()[0].clone();

        let partial = format!("_id={}&rombel=PPLG+3", before.id);
        let res = h
            .post("/contact/update?_method=PUT", Some(&cookie), &partial)
            .await;
        assert_eq!(location(&res), "/contact");

        let after = h.store.find_by_id(before.id).await.unwrap().unwrap();
        assert_eq!(after.record.rombel, "PPLG 3");
        assert_eq!(after.record.tingkat, before.record.tingkat);
        assert_eq!(after.record.terdaftar, before.record.terdaftar);
        assert_eq!(after.record.tgl_masuk, before.record.tgl_masuk);
        assert_eq!(after.record.nama, before.record.nama);
    }

    #[tokio::test]
    async fn update_with_blanked_field_is_rejected() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        h.post("/contact", Some(&cookie), STUDENT).await;
        let before = h.store.find_all().await.unwrap()[0].clone();

        let blanked = format!("_id={}&tingkat=", before.id);
        let res = h
            .post("/contact/update?_method=PUT", Some(&cookie), &blanked)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body(res).await.contains("data-field=\"tingkat\""));
        assert_eq!(h.store.find_by_id(before.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn list_links_reach_nisn_with_slash() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        h.post("/contact", Some(&cookie), &STUDENT.replace("12329233", "12%2F34"))
            .await;
        assert_eq!(h.store.find_all().await.unwrap()[0].record.nisn, "12/34");

        let page = body(h.get("/contact", Some(&cookie)).await).await;
        let link = |prefix: &str| {
            let start = page.find(prefix).expect("link in listing") + "href=\"".len();
            let end = start + page[start..].find('"').unwrap();
            page[start..end].to_string()
        };
        let edit = link("href=\"/contact/edit/");
        let delete = link("href=\"/contact/delete/");

        let res = h.get(&edit, Some(&cookie)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body(res).await.contains("value=\"12/34\""));

        let res = h.get(&delete, Some(&cookie)).await;
        assert_eq!(location(&res), "/contact");
        assert!(h.store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_unknown_id_is_404() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        let body = format!("_id={}&{}", uuid::Uuid::new_v4(), STUDENT);
        let res = h
            .post("/contact/update?_method=PUT", Some(&cookie), &body)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = h
            .post("/contact/update?_method=PUT", Some(&cookie), STUDENT)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        h.post("/contact", Some(&cookie), STUDENT).await;
        let other = STUDENT
            .replace("12329233", "55555555")
            .replace("5206085405880001", "5206085405880002");
        h.post("/contact", Some(&cookie), &other).await;

        let res = h.get("/contact/delete/12329233", Some(&cookie)).await;
        assert_eq!(location(&res), "/contact");
        let left = h.store.find_all().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record.nisn, "55555555");
    }

    #[tokio::test]
    async fn logout_ends_session() {
        let h = Harness::new().await;
        let cookie = h.login().await;
        let res = h.get("/logout", Some(&cookie)).await;
        assert_eq!(location(&res), "/login");
        assert!(res
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .contains("Max-Age=0"));

        let res = h.get("/contact", Some(&cookie)).await;
        assert_eq!(location(&res), "/login");
    }

    #[tokio::test]
    async fn relogin_replaces_previous_session() {
        let h = Harness::new().await;
        let first = h.login().await;
        let res = h
            .post("/login", Some(&first), "username=admin&password=rahasia")
            .await;
        let second = session_cookie(&res).unwrap();
        assert_ne!(first, second);
        assert_eq!(h.store.session_count().await, 1);
        assert_eq!(location(&h.get("/", Some(&first)).await), "/login");
    }
}
