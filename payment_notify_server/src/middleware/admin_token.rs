//! Admin token middleware for Actix Web.
//!
//! The merchant-facing `/api` routes are protected by a shared bearer token, configured in `PNS_ADMIN_TOKEN`.
//! Requests must carry it in the `Authorization` header:
//!
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! If no token is configured, every request to the wrapped scope is refused.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
};
use futures::future::LocalBoxFuture;
use hmac::{Hmac, Mac};
use log::{trace, warn};
use pns_common::Secret;
use sha2::Sha256;

use crate::errors::ServerError;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_TAG_CONTEXT: &[u8] = b"pns-admin-token";

pub struct AdminTokenMiddlewareFactory {
    token: Secret<String>,
}

impl AdminTokenMiddlewareFactory {
    pub fn new(token: Secret<String>) -> Self {
        if token.is_empty() {
            warn!("🔐️ PNS_ADMIN_TOKEN is not set. All admin API requests will be refused.");
        }
        AdminTokenMiddlewareFactory { token }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminTokenMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AdminTokenMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdminTokenMiddlewareService { token: self.token.clone(), service: Rc::new(service) }))
    }
}

pub struct AdminTokenMiddlewareService<S> {
    token: Secret<String>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AdminTokenMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let authorized = {
            let presented = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim);
            match presented {
                Some(candidate) => token_matches(self.token.reveal(), candidate),
                None => false,
            }
        };
        Box::pin(async move {
            if authorized {
                trace!("🔐️ Admin token check for {} ✅️", req.path());
                service.call(req).await
            } else {
                warn!("🔐️ Missing or invalid admin token for {}. Denying access.", req.path());
                Err(ServerError::Unauthorized.into())
            }
        })
    }
}

/// Compares the tokens in constant time by comparing MAC tags keyed on each of them.
fn token_matches(expected: &str, candidate: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let tag = |key: &str| {
        HmacSha256::new_from_slice(key.as_bytes()).map(|mut mac| {
            mac.update(TOKEN_TAG_CONTEXT);
            mac
        })
    };
    match (tag(expected), tag(candidate)) {
        (Ok(expected), Ok(candidate)) => candidate.verify_slice(&expected.finalize().into_bytes()).is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::token_matches;

    #[test]
    fn tokens() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cret", "s3cre"));
        assert!(!token_matches("s3cret", ""));
        assert!(!token_matches("", ""));
    }
}
