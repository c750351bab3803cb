use mockall::mock;
use payment_notify_engine::{
    db_types::{GatewayId, OrderId},
    normalizer::PaymentEvent,
    AgreementRedirect,
    AgreementRequest,
    GatewayClient,
    GatewayClientError,
    PaymentRedirect,
    PaymentRequest,
};

mock! {
    pub Gateway {}
    impl GatewayClient for Gateway {
        async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentRedirect, GatewayClientError>;
        async fn query_status(&self, gateway: GatewayId, order_id: &OrderId) -> Result<PaymentEvent, GatewayClientError>;
        async fn create_agreement(&self, request: &AgreementRequest) -> Result<AgreementRedirect, GatewayClientError>;
    }
}
