//! Integration tests for payment initiation, gateway webhooks and refunds.

mod support;

use chrono::Utc;
use common::{OrderId, PaymentId, Requester, UserId};
use domain::{Money, OrderStatus, PaymentMethod, PaymentStatus};
use fulfillment::{ErrorKind, FulfillmentError, WebhookHeaders, WebhookOutcome};
use store::Store;
use support::TestHarness;

#[tokio::test]
async fn test_initiate_payment_creates_gateway_intent() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;

    let initiation = harness
        .payments
        .initiate_payment(order_id, PaymentMethod::Stripe, harness.customer)
        .await
        .unwrap();

    assert_eq!(initiation.payment_id, payment_id);
    assert_eq!(initiation.amount, Money::from_cents(4550));
    assert_eq!(initiation.currency, "usd");
    assert!(initiation.gateway_transaction_id.starts_with("pi_"));
    assert!(initiation.client_credential.contains("_secret_"));

    let (amount, currency, metadata) = harness
        .stripe
        .backend()
        .intent(&initiation.gateway_transaction_id)
        .unwrap();
    assert_eq!(amount, Money::from_cents(4550));
    assert_eq!(currency, "usd");
    assert_eq!(metadata.payment_id, payment_id);
    assert_eq!(metadata.order_id, order_id);

    let payment = harness.details(order_id).await.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.method, Some(PaymentMethod::Stripe));
    assert_eq!(
        payment.gateway_transaction_id.as_deref(),
        Some(initiation.gateway_transaction_id.as_str())
    );
}

#[tokio::test]
async fn test_initiate_payment_checks_owner_and_state() {
    let harness = TestHarness::new().await;
    let order_id = harness.place_example_order().await.order.id;

    let err = harness
        .payments
        .initiate_payment(order_id, PaymentMethod::Stripe, Requester::customer(UserId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::UnauthorizedAccess(_)));

    let err = harness
        .payments
        .initiate_payment(OrderId::new(), PaymentMethod::Stripe, harness.customer)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::OrderNotFound(_)));

    harness.engine.cancel_order(order_id, harness.customer).await.unwrap();
    let err = harness
        .payments
        .initiate_payment(order_id, PaymentMethod::Stripe, harness.customer)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Payment(_)));
    assert_eq!(harness.stripe.backend().intent_count(), 0);
}

#[tokio::test]
async fn test_initiate_payment_rejects_settled_payment() {
    let harness = TestHarness::new().await;
    let order_id = harness.paid_order().await.order.id;

    let err = harness
        .payments
        .initiate_payment(order_id, PaymentMethod::PayPal, harness.customer)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FulfillmentError::PaymentNotPending {
            status: PaymentStatus::Success
        }
    ));
    assert_eq!(harness.paypal.backend().intent_count(), 0);
}

#[tokio::test]
async fn test_gateway_failure_leaves_payment_untouched() {
    let harness = TestHarness::new().await;
    let order_id = harness.place_example_order().await.order.id;
    harness.stripe.backend().set_fail_on_intent(true);

    let err = harness
        .payments
        .initiate_payment(order_id, PaymentMethod::Stripe, harness.customer)
        .await
        .unwrap_err();

    assert!(matches!(err, FulfillmentError::Payment(_)));
    assert_eq!(err.kind(), ErrorKind::ExternalGateway);
    let payment = harness.details(order_id).await.payment.unwrap();
    assert_eq!(payment.method, None);
    assert_eq!(payment.gateway_transaction_id, None);
}

#[tokio::test]
async fn test_success_webhook_moves_order_to_processing() {
    let harness = TestHarness::new().await;

    let details = harness.paid_order().await;

    assert_eq!(details.order.status, OrderStatus::Processing);
    let payment = details.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert!(payment.gateway_transaction_id.unwrap().starts_with("pi_"));
    assert_eq!(harness.stock("P").await, 8);

    let history = harness.store.order_history(details.order.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to, OrderStatus::Processing);
}

#[tokio::test]
async fn test_duplicate_webhook_is_idempotent() {
    let harness = TestHarness::new().await;
    let details = harness.paid_order().await;
    let order_id = details.order.id;
    let payment = details.payment.unwrap();
    let gateway_id = payment.gateway_transaction_id.clone().unwrap();

    let outcome = harness
        .deliver_stripe("payment_intent.succeeded", &gateway_id, payment.id, order_id)
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Duplicate);
    let after = harness.details(order_id).await;
    assert_eq!(after.order, details.order);
    assert_eq!(after.payment.unwrap(), payment);
    assert_eq!(harness.store.order_history(order_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failure_webhook_cancels_order_and_restores_stock() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;
    let gateway_id = harness.pay_with_stripe(order_id).await;

    let outcome = harness
        .deliver_stripe("payment_intent.payment_failed", &gateway_id, payment_id, order_id)
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Applied);
    let after = harness.details(order_id).await;
    assert_eq!(after.order.status, OrderStatus::Cancelled);
    assert_eq!(after.payment.unwrap().status, PaymentStatus::Failed);
    assert_eq!(harness.stock("P").await, 10);
    assert_eq!(harness.stock("Q").await, 5);

    // Redelivery must not release stock a second time.
    let outcome = harness
        .deliver_stripe("payment_intent.payment_failed", &gateway_id, payment_id, order_id)
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Duplicate);
    assert_eq!(harness.stock("P").await, 10);
}

#[tokio::test]
async fn test_success_after_cancellation_keeps_order_cancelled() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;
    let gateway_id = harness.pay_with_stripe(order_id).await;
    harness.engine.cancel_order(order_id, harness.customer).await.unwrap();

    let outcome = harness
        .deliver_stripe("payment_intent.succeeded", &gateway_id, payment_id, order_id)
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Applied);
    let after = harness.details(order_id).await;
    assert_eq!(after.order.status, OrderStatus::Cancelled);
    assert_eq!(after.payment.unwrap().status, PaymentStatus::Success);
    assert_eq!(harness.stock("P").await, 10);
}

#[tokio::test]
async fn test_invalid_signature_is_rejected_without_changes() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;
    let gateway_id = harness.pay_with_stripe(order_id).await;

    let (payload, _) =
        harness.stripe_event("payment_intent.succeeded", &gateway_id, payment_id, order_id);
    let forged = WebhookHeaders::new().with(
        "stripe-signature",
        format!("t={},v1={}", Utc::now().timestamp(), "00".repeat(32)),
    );

    let err = harness
        .payments
        .handle_webhook(PaymentMethod::Stripe, &payload, &forged)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::WebhookVerification(_)));
    assert_eq!(err.kind(), ErrorKind::WebhookVerification);

    let err = harness
        .payments
        .handle_webhook(PaymentMethod::Stripe, &payload, &WebhookHeaders::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::WebhookVerification(_)));

    let after = harness.details(order_id).await;
    assert_eq!(after.order.status, OrderStatus::Pending);
    assert_eq!(after.payment.unwrap().status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_tampered_payload_is_rejected() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;

    let (payload, headers) =
        harness.stripe_event("payment_intent.payment_failed", "pi_x", payment_id, order_id);
    let tampered = payload.replace("payment_failed", "succeeded");

    let err = harness
        .payments
        .handle_webhook(PaymentMethod::Stripe, &tampered, &headers)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::WebhookVerification(_)));
}

#[tokio::test]
async fn test_unusable_events_are_acknowledged_and_ignored() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;

    let outcome = harness
        .deliver_stripe("charge.refunded", "pi_x", payment_id, order_id)
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);

    let outcome = harness
        .deliver_stripe("payment_intent.succeeded", "pi_x", PaymentId::new(), order_id)
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);

    let outcome = harness
        .deliver_stripe("payment_intent.succeeded", "pi_x", payment_id, OrderId::new())
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);

    let payload = r#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_x","metadata":{}}}}"#;
    let header = harness
        .stripe
        .signature_header(payload, Utc::now().timestamp())
        .unwrap();
    let outcome = harness
        .payments
        .handle_webhook(
            PaymentMethod::Stripe,
            payload,
            &WebhookHeaders::new().with("Stripe-Signature", header),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);

    assert_eq!(harness.details(order_id).await.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_signed_but_unparseable_payload_is_ignored() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;

    let payload = "{\"type\": truncated";
    let header = harness
        .stripe
        .signature_header(payload, Utc::now().timestamp())
        .unwrap();
    let outcome = harness
        .payments
        .handle_webhook(
            PaymentMethod::Stripe,
            payload,
            &WebhookHeaders::new().with("Stripe-Signature", header),
        )
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Ignored);
    let after = harness.details(details.order.id).await;
    assert_eq!(after.order.status, OrderStatus::Pending);
    assert_eq!(after.payment.unwrap().status, PaymentStatus::Pending);

    let err = harness
        .payments
        .handle_webhook(
            PaymentMethod::Stripe,
            payload,
            &WebhookHeaders::new().with("Stripe-Signature", "t=1,v1=00"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WebhookVerification);
}

#[tokio::test]
async fn test_paypal_capture_completes_order_payment() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;

    let initiation = harness
        .payments
        .initiate_payment(order_id, PaymentMethod::PayPal, harness.customer)
        .await
        .unwrap();
    assert!(initiation.gateway_transaction_id.starts_with("PAYPAL-"));
    assert_eq!(initiation.client_credential, initiation.gateway_transaction_id);

    let payload = serde_json::json!({
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {
            "id": initiation.gateway_transaction_id,
            "custom_id": format!("{payment_id}:{order_id}"),
        }
    })
    .to_string();
    let headers = harness
        .paypal
        .signed_headers("WH-1", Utc::now(), &payload)
        .unwrap();

    let outcome = harness
        .payments
        .handle_webhook(PaymentMethod::PayPal, &payload, &headers)
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Applied);
    let after = harness.details(order_id).await;
    assert_eq!(after.order.status, OrderStatus::Processing);
    let payment = after.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.method, Some(PaymentMethod::PayPal));
}

#[tokio::test]
async fn test_initiate_refund_requires_admin_and_captured_payment() {
    let harness = TestHarness::new().await;
    let details = harness.place_example_order().await;
    let payment_id = details.payment.unwrap().id;

    let err = harness
        .payments
        .initiate_refund(payment_id, harness.customer)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::AdminRequired));

    let err = harness
        .payments
        .initiate_refund(payment_id, harness.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::RefundNotAllowed(_)));

    let err = harness
        .payments
        .initiate_refund(PaymentId::new(), harness.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::PaymentNotFound(_)));
}

#[tokio::test]
async fn test_initiate_refund_returns_funds() {
    let harness = TestHarness::new().await;
    let details = harness.paid_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;

    let payment = harness
        .payments
        .initiate_refund(payment_id, harness.admin)
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert!(payment.refund_transaction_id.is_some());
    assert_eq!(harness.details(order_id).await.payment.unwrap(), payment);

    // A refunded payment cannot be refunded again.
    let err = harness
        .payments
        .initiate_refund(payment_id, harness.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::RefundNotAllowed(_)));
    assert_eq!(harness.stripe.backend().refund_count(), 1);

    // Late success signals never resurrect a refunded payment.
    let outcome = harness
        .deliver_stripe(
            "payment_intent.succeeded",
            payment.gateway_transaction_id.as_deref().unwrap(),
            payment_id,
            order_id,
        )
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);
}

#[tokio::test]
async fn test_refund_commit_failure_surfaces_error() {
    let harness = TestHarness::new().await;
    let details = harness.paid_order().await;
    let payment_id = details.payment.unwrap().id;

    harness.store.set_fail_on_commit(true);
    let err = harness
        .payments
        .initiate_refund(payment_id, harness.admin)
        .await
        .unwrap_err();
    harness.store.set_fail_on_commit(false);

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(harness.stripe.backend().refund_count(), 1);
    let payment = harness.store.payment(payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
}

#[tokio::test]
async fn test_refund_gateway_failure_keeps_payment_captured() {
    let harness = TestHarness::new().await;
    let details = harness.paid_order().await;
    let order_id = details.order.id;
    let payment_id = details.payment.unwrap().id;
    harness.stripe.backend().set_fail_on_refund(true);

    let err = harness
        .payments
        .initiate_refund(payment_id, harness.admin)
        .await
        .unwrap_err();

    assert!(matches!(err, FulfillmentError::Refund(_)));
    assert_eq!(
        harness.details(order_id).await.payment.unwrap().status,
        PaymentStatus::Success
    );
}
