use pipeops_api::settings::Settings;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

const ADMIN_EMAIL: &str = "admin@pipeops.test";
const PASSWORD: &str = "correct horse battery";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let mut settings = Settings::default();
        settings.auth.jwt_secret = "test-secret".to_string();
        settings.auth.bcrypt_cost = 4;
        settings.bootstrap.admin_email = Some(ADMIN_EMAIL.to_string());
        settings.bootstrap.admin_password = Some(PASSWORD.to_string());

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = pipeops_api::app::build_app(settings).await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Redirects are asserted on, never followed.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn sign_in(client: &reqwest::Client, srv: &TestServer, email: &str) -> String {
    let res = client
        .post(srv.url("/auth/signin"))
        .json(&json!({ "email": email, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

async fn role_id(client: &reqwest::Client, srv: &TestServer, admin: &str, name: &str) -> String {
    let roles: Value = client
        .get(srv.url("/admin/roles"))
        .bearer_auth(admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    roles
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"].as_str().unwrap().eq_ignore_ascii_case(name))
        .map(|r| r["id"].as_str().unwrap().to_string())
        .expect("seeded role")
}

async fn create_user(client: &reqwest::Client, srv: &TestServer, admin: &str, email: &str, role: &str) -> String {
    let role_id = role_id(client, srv, admin, role).await;
    let res = client
        .post(srv.url("/admin/users"))
        .bearer_auth(admin)
        .json(&json!({
            "name": "Field User",
            "email": email,
            "password": PASSWORD,
            "role_id": role_id,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

fn location(res: &reqwest::Response) -> &str {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = client().get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_redirect_to_sign_in_without_a_session() {
    let srv = TestServer::spawn().await;
    let client = client();

    for path in ["/me", "/dashboard/access", "/admin/roles"] {
        let res = client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&res), "/auth/signin");
    }
}

#[tokio::test]
async fn wrong_password_is_rejected_without_a_cookie() {
    let srv = TestServer::spawn().await;

    let res = client()
        .post(srv.url("/auth/signin"))
        .json(&json!({ "email": ADMIN_EMAIL, "password": "wrong password" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credentials");
}

#[tokio::test]
async fn sign_in_sets_an_http_only_cookie_that_authenticates() {
    let srv = TestServer::spawn().await;
    let client = client();

    let res = client
        .post(srv.url("/auth/signin"))
        .json(&json!({ "email": ADMIN_EMAIL, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.contains("HttpOnly"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["session"]["role"], "admin");
    assert_eq!(body["session"]["capabilities"]["can_manage_users"], true);

    let pair = cookie.split(';').next().unwrap();
    let res = client
        .get(srv.url("/me"))
        .header(header::COOKIE, pair)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["email"], ADMIN_EMAIL);
}

#[tokio::test]
async fn doe_user_is_denied_admin_with_role_context() {
    let srv = TestServer::spawn().await;
    let client = client();
    let admin = sign_in(&client, &srv, ADMIN_EMAIL).await;
    create_user(&client, &srv, &admin, "doe@pipeops.test", "DOE").await;
    let doe = sign_in(&client, &srv, "doe@pipeops.test").await;

    let res = client.get(srv.url("/reports/access")).bearer_auth(&doe).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/admin/roles")).bearer_auth(&doe).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let target = location(&res).to_string();
    assert_eq!(target, "/auth/error?error=AccessDenied&requiredRole=admin&userRole=DOE");

    let page: Value = client.get(srv.url(&target)).send().await.unwrap().json().await.unwrap();
    assert_eq!(page["error"], "AccessDenied");
    let message = page["message"].as_str().unwrap();
    assert!(message.contains("admin") && message.contains("DOE"));
}

#[tokio::test]
async fn sibling_roles_do_not_cross_grant() {
    let srv = TestServer::spawn().await;
    let client = client();
    let admin = sign_in(&client, &srv, ADMIN_EMAIL).await;
    create_user(&client, &srv, &admin, "disp@pipeops.test", "dispatcher").await;
    let dispatcher = sign_in(&client, &srv, "disp@pipeops.test").await;

    let res = client.get(srv.url("/dashboard/access")).bearer_auth(&dispatcher).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/reports/access")).bearer_auth(&dispatcher).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert!(location(&res).contains("requiredRole=DOE&userRole=dispatcher"));
}

#[tokio::test]
async fn deleted_user_is_signed_out_on_next_request() {
    let srv = TestServer::spawn().await;
    let client = client();
    let admin = sign_in(&client, &srv, ADMIN_EMAIL).await;
    let user_id = create_user(&client, &srv, &admin, "leaving@pipeops.test", "dispatcher").await;
    let token = sign_in(&client, &srv, "leaving@pipeops.test").await;

    let res = client.get(srv.url("/me")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url(&format!("/admin/users/{user_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client.get(srv.url("/me")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/auth/signin");

    let session: Value = client
        .get(srv.url("/auth/session"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(session.is_null());
}

#[tokio::test]
async fn role_type_with_dependent_roles_is_not_deleted() {
    let srv = TestServer::spawn().await;
    let client = client();
    let admin = sign_in(&client, &srv, ADMIN_EMAIL).await;

    let res = client
        .post(srv.url("/admin/role-types"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "contractor" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let role_type: Value = res.json().await.unwrap();
    let type_id = role_type["id"].as_str().unwrap().to_string();

    for name in ["contractor-day", "contractor-night"] {
        let res = client
            .post(srv.url("/admin/roles"))
            .bearer_auth(&admin)
            .json(&json!({ "name": name, "role_type_id": type_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = client
        .delete(srv.url(&format!("/admin/role-types/{type_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "referential_conflict");

    let res = client
        .get(srv.url(&format!("/admin/role-types/{type_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["role_count"], 2);
}

#[tokio::test]
async fn duplicate_role_name_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = client();
    let admin = sign_in(&client, &srv, ADMIN_EMAIL).await;

    let types: Value = client
        .get(srv.url("/admin/role-types"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let type_id = types[0]["id"].as_str().unwrap();

    let res = client
        .post(srv.url("/admin/roles"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "ADMIN", "role_type_id": type_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "conflict");
}
