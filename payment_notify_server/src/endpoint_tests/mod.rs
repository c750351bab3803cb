mod helpers;
mod mocks;
mod notify;
mod payments;

#[actix_web::test]
async fn health_check_needs_no_token() {
    use actix_web::{http::StatusCode, test::TestRequest, web::ServiceConfig};

    let req = TestRequest::get().uri("/health");
    let (status, body) = helpers::send(req, |cfg: &mut ServiceConfig| {
        cfg.service(crate::routes::health);
    })
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}
