//! # Payment notification server
//! This crate hosts the HTTP front end for the payment notification engine. It is responsible for:
//! Receiving asynchronous notifications from Alipay and Stripe and answering each with the acknowledgement the gateway
//! expects.
//! Starting payments at the gateways on the merchant's behalf.
//! Optionally sweeping long-pending orders, in case a notification never arrived.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/notify/{gateway}`: Gateway callbacks. Optionally restricted to an IP allow-list.
//! * `/api/...`: Merchant routes, protected by the admin bearer token. See [routes](routes/index.html).

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sweeper;

#[cfg(test)]
mod endpoint_tests;
