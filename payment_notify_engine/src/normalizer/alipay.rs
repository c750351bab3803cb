use chrono::{DateTime, Utc};
use log::*;
use pns_common::MinorUnits;

use crate::{
    db_types::{GatewayId, OrderId, PayloadDigest},
    helpers::{parse_china_standard_time, FormParams},
    normalizer::{NormalizationError, PaymentEvent, PaymentStatus},
};

/// Parameters that are not part of the authenticated payment data, or that Alipay regenerates on every redelivery of
/// the same notification.
const DIGEST_EXCLUDED: [&str; 4] = ["sign", "sign_type", "notify_time", "notify_id"];

pub fn normalize(body: &[u8], received_at: DateTime<Utc>) -> Result<PaymentEvent, NormalizationError> {
    let params = FormParams::parse(body).map_err(|e| NormalizationError::MalformedPayload(e.to_string()))?;
    let order_id = params.get("out_trade_no").ok_or(NormalizationError::MissingField("out_trade_no"))?;
    let trade_no = params.get("trade_no").ok_or(NormalizationError::MissingField("trade_no"))?;
    let trade_status = params.get("trade_status").ok_or(NormalizationError::MissingField("trade_status"))?;
    let total_amount = params.get("total_amount").ok_or(NormalizationError::MissingField("total_amount"))?;
    let amount = MinorUnits::from_major_str(total_amount)
        .map_err(|e| NormalizationError::InvalidAmount(format!("total_amount: {e}")))?;

    let refund_id = refund_marker(&params)?;
    let (status, transaction_id) = match refund_id {
        Some(refund_id) => (PaymentStatus::Refunded, format!("{trade_no}:refund:{refund_id}")),
        None => (map_trade_status(trade_status), format!("{trade_no}:{trade_status}")),
    };

    let time_field = match status {
        PaymentStatus::Succeeded => "gmt_payment",
        PaymentStatus::Refunded => "gmt_refund",
        PaymentStatus::Closed => "gmt_close",
        _ => "notify_time",
    };
    let occurred_at = [time_field, "notify_time"]
        .iter()
        .filter_map(|f| params.get(f))
        .find_map(parse_china_standard_time)
        .unwrap_or(received_at);

    let digest = PayloadDigest::of(params.canonical_string(&DIGEST_EXCLUDED).as_bytes());
    let event = PaymentEvent::new(
        GatewayId::Alipay,
        OrderId::from(order_id),
        transaction_id,
        status,
        amount,
        occurred_at,
        digest,
    );
    trace!("🧾️ Normalized Alipay notification: {event}");
    Ok(event)
}

/// Returns the refund identifier if this notification reports a refund. Alipay sends refunds as a trade status
/// notification carrying `out_biz_no`, `gmt_refund` and `refund_fee`.
fn refund_marker(params: &FormParams) -> Result<Option<String>, NormalizationError> {
    let refund_fee = match params.get("refund_fee") {
        Some(fee) => MinorUnits::from_major_str(fee)
            .map_err(|e| NormalizationError::InvalidAmount(format!("refund_fee: {e}")))?,
        None => MinorUnits::default(),
    };
    let has_refund = params.get("out_biz_no").is_some() ||
        params.get("gmt_refund").is_some() ||
        refund_fee > MinorUnits::default();
    if !has_refund {
        return Ok(None);
    }
    let id = params.get("out_biz_no").or_else(|| params.get("gmt_refund")).unwrap_or("full");
    Ok(Some(id.to_string()))
}

pub fn map_trade_status(status: &str) -> PaymentStatus {
    match status {
        "TRADE_SUCCESS" | "TRADE_FINISHED" => PaymentStatus::Succeeded,
        "TRADE_CLOSED" => PaymentStatus::Closed,
        other => PaymentStatus::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    const PAID: &str = "gmt_create=2024-05-02+04%3A29%3A10&charset=utf-8&gmt_payment=2024-05-02+04%3A30%3A00\
                        &notify_time=2024-05-02+04%3A30%3A01&subject=Test&sign=abc&buyer_id=2088102&\
                        invoice_amount=99.00&version=1.0&notify_id=2024050200222&fund_bill_list=&\
                        notify_type=trade_status_sync&out_trade_no=ORDER-1&total_amount=99.00&\
                        trade_status=TRADE_SUCCESS&trade_no=2024050222001&auth_app_id=2021&\
                        receipt_amount=99.00&app_id=2021&sign_type=RSA2&seller_id=2088101";

    #[test]
    fn paid_notification() {
        let event = normalize(PAID.as_bytes(), Utc::now()).unwrap();
        assert_eq!(event.gateway(), GatewayId::Alipay);
        assert_eq!(event.merchant_order_id().as_str(), "ORDER-1");
        assert_eq!(event.gateway_transaction_id(), "2024050222001:TRADE_SUCCESS");
        assert_eq!(event.status(), &PaymentStatus::Succeeded);
        assert_eq!(event.amount(), MinorUnits::from(9900));
        assert_eq!(event.occurred_at(), Utc.with_ymd_and_hms(2024, 5, 1, 20, 30, 0).unwrap());
    }

    #[test]
    fn retries_share_a_digest() {
        let first = normalize(PAID.as_bytes(), Utc::now()).unwrap();
        let retry = PAID.replace("notify_id=2024050200222", "notify_id=2024050200999").replace(
            "notify_time=2024-05-02+04%3A30%3A01",
            "notify_time=2024-05-02+04%3A34%3A01",
        );
        let retry = normalize(retry.as_bytes(), Utc::now()).unwrap();
        assert_eq!(first.payload_digest(), retry.payload_digest());
        let tampered = PAID.replace("buyer_id=2088102", "buyer_id=2088999");
        let tampered = normalize(tampered.as_bytes(), Utc::now()).unwrap();
        assert_ne!(first.payload_digest(), tampered.payload_digest());
    }

    #[test]
    fn refunds_get_their_own_transaction_id() {
        let body = format!("{PAID}&out_biz_no=REFUND-1&refund_fee=99.00&gmt_refund=2024-05-03+10%3A00%3A00.320");
        let event = normalize(body.as_bytes(), Utc::now()).unwrap();
        assert_eq!(event.status(), &PaymentStatus::Refunded);
        assert_eq!(event.gateway_transaction_id(), "2024050222001:refund:REFUND-1");
        let refunded_at = Utc.with_ymd_and_hms(2024, 5, 3, 2, 0, 0).unwrap() + chrono::Duration::milliseconds(320);
        assert_eq!(event.occurred_at(), refunded_at);
    }

    #[test]
    fn statuses() {
        let closed = PAID.replace("TRADE_SUCCESS", "TRADE_CLOSED");
        assert_eq!(normalize(closed.as_bytes(), Utc::now()).unwrap().status(), &PaymentStatus::Closed);
        let waiting = PAID.replace("TRADE_SUCCESS", "WAIT_BUYER_PAY");
        let event = normalize(waiting.as_bytes(), Utc::now()).unwrap();
        assert_eq!(event.status(), &PaymentStatus::Unknown("WAIT_BUYER_PAY".into()));
        let finished = PAID.replace("TRADE_SUCCESS", "TRADE_FINISHED");
        assert_eq!(normalize(finished.as_bytes(), Utc::now()).unwrap().status(), &PaymentStatus::Succeeded);
    }

    #[test]
    fn missing_fields() {
        let body = PAID.replace("out_trade_no=ORDER-1&", "");
        let err = normalize(body.as_bytes(), Utc::now()).unwrap_err();
        assert_eq!(err, NormalizationError::MissingField("out_trade_no"));
        let body = PAID.replace("trade_no=2024050222001&", "");
        let err = normalize(body.as_bytes(), Utc::now()).unwrap_err();
        assert_eq!(err, NormalizationError::MissingField("trade_no"));
        let body = PAID.replace("total_amount=99.00", "total_amount=99.001");
        assert!(matches!(normalize(body.as_bytes(), Utc::now()), Err(NormalizationError::InvalidAmount(_))));
    }
}
