use actix_web::{dev::ServiceResponse, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use log::debug;
use pns_common::Secret;

pub const ADMIN_TOKEN: &str = "0123456789abcdef-test-admin-token";

pub fn admin_token() -> Secret<String> {
    Secret::new(ADMIN_TOKEN.to_string())
}

pub fn bearer() -> (&'static str, String) {
    ("Authorization", format!("Bearer {ADMIN_TOKEN}"))
}

/// Runs a single request against an app built by `configure`. Errors raised by middleware are turned into responses
/// the same way the server does it.
pub async fn send<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = test::init_service(App::new().configure(configure)).await;
    debug!("Making request");
    match test::try_call_service(&app, req.to_request()).await {
        Ok(res) => read_response(res).await,
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = actix_web::body::to_bytes(res.into_body()).await.unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}

async fn read_response(res: ServiceResponse) -> (StatusCode, String) {
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}
