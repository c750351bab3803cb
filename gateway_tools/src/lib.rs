mod alipay;
mod config;
mod error;
mod stripe;

mod data_objects;
pub mod helpers;

pub use alipay::AlipayApi;
pub use config::{AlipayConfig, StripeConfig};
pub use data_objects::{
    AgreementSignRequest,
    AlipayTrade,
    CheckoutSession,
    CheckoutSessionRequest,
    PagePayRequest,
    StripePaymentIntent,
    StripeSearchResult,
};
pub use error::GatewayApiError;
pub use stripe::StripeApi;
