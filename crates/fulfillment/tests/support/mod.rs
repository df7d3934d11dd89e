//! Shared harness for fulfillment integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use common::{AddressId, OrderId, PaymentId, Requester, SellerId, UserId};
use domain::{Address, Customer, Dimensions, Money, OrderDetails, Product, Seller};
use fulfillment::{
    GatewayCredentials, GatewayRegistry, NewOrder, OrderEngine, OrderLine, PayPalGateway,
    PaymentReconciler, Result, SandboxCarrier, Settings, ShipmentReconciler, StripeGateway,
    WebhookHeaders, WebhookOutcome,
};
use store::{InMemoryStore, Store};

pub struct TestHarness {
    pub store: InMemoryStore,
    pub engine: OrderEngine<InMemoryStore>,
    pub payments: PaymentReconciler<InMemoryStore>,
    pub shipments: ShipmentReconciler<InMemoryStore, SandboxCarrier>,
    pub stripe: StripeGateway,
    pub paypal: PayPalGateway,
    pub carrier: SandboxCarrier,
    pub customer: Requester,
    pub admin: Requester,
    pub seller: SellerId,
    pub shipping_address: AddressId,
    pub billing_address: AddressId,
}

pub fn address(owner_id: Option<UserId>, postal_code: &str) -> Address {
    Address {
        id: AddressId::new(),
        owner_id,
        name: "Jane Doe".to_string(),
        line1: "1 Main St".to_string(),
        line2: None,
        city: "Springfield".to_string(),
        region: "IL".to_string(),
        postal_code: postal_code.to_string(),
        country: "US".to_string(),
        phone: None,
    }
}

pub fn product(id: &str, price_cents: i64, stock: u32, seller_id: Option<SellerId>) -> Product {
    Product {
        id: id.into(),
        name: format!("Product {id}"),
        price: Money::from_cents(price_cents),
        stock,
        seller_id,
        weight_grams: 500,
        dimensions: Dimensions {
            length_cm: 30,
            width_cm: 20,
            height_cm: 5,
        },
    }
}

impl TestHarness {
    /// Seeds one customer, a seller with products P (10 @ 10.00) and
    /// Q (5 @ 25.50), a second seller with R, and a seller-less product S.
    pub async fn new() -> Self {
        Self::with_settings(Settings::default()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        let store = InMemoryStore::new();

        let customer = Customer {
            id: UserId::new(),
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
        };
        store.add_customer(customer.clone()).await;

        let shipping = address(Some(customer.id), "62701");
        let billing = address(Some(customer.id), "62702");
        store.add_address(shipping.clone()).await;
        store.add_address(billing.clone()).await;

        let seller = Seller {
            id: SellerId::new(),
            name: "Acme".to_string(),
            warehouse_address: Some(address(None, "94607")),
        };
        let other_seller = Seller {
            id: SellerId::new(),
            name: "Globex".to_string(),
            warehouse_address: None,
        };
        store.add_seller(seller.clone()).await;
        store.add_seller(other_seller.clone()).await;

        store.add_product(product("P", 1000, 10, Some(seller.id))).await;
        store.add_product(product("Q", 2550, 5, Some(seller.id))).await;
        store
            .add_product(product("R", 500, 3, Some(other_seller.id)))
            .await;
        store.add_product(product("S", 700, 3, None)).await;

        let stripe = StripeGateway::new(GatewayCredentials::new("sk_test", "whsec_test"));
        let paypal = PayPalGateway::new(GatewayCredentials::new("client-id", "paypal-secret"));
        let gateways = Arc::new(
            GatewayRegistry::new()
                .with(Arc::new(stripe.clone()))
                .with(Arc::new(paypal.clone())),
        );
        let carrier = SandboxCarrier::new();

        Self {
            engine: OrderEngine::new(store.clone(), gateways.clone(), settings.clone()),
            payments: PaymentReconciler::new(store.clone(), gateways, settings.clone()),
            shipments: ShipmentReconciler::new(store.clone(), carrier.clone(), settings),
            store,
            stripe,
            paypal,
            carrier,
            customer: Requester::customer(customer.id),
            admin: Requester::admin(UserId::new()),
            seller: seller.id,
            shipping_address: shipping.id,
            billing_address: billing.id,
        }
    }

    pub fn new_order(&self, lines: &[(&str, u32)]) -> NewOrder {
        NewOrder {
            shipping_address_id: self.shipping_address,
            billing_address_id: self.billing_address,
            items: lines
                .iter()
                .map(|(product_id, quantity)| OrderLine {
                    product_id: (*product_id).into(),
                    quantity: *quantity,
                })
                .collect(),
        }
    }

    /// Places 2 x P and 1 x Q.
    pub async fn place_example_order(&self) -> OrderDetails {
        self.engine
            .create_order(self.customer.user_id, self.new_order(&[("P", 2), ("Q", 1)]))
            .await
            .unwrap()
    }

    pub async fn stock(&self, product_id: &str) -> u32 {
        self.store
            .product(&product_id.into())
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    pub async fn details(&self, order_id: OrderId) -> OrderDetails {
        self.store.order_details(order_id).await.unwrap().unwrap()
    }

    /// Initiates a Stripe payment and returns the gateway transaction id.
    pub async fn pay_with_stripe(&self, order_id: OrderId) -> String {
        self.payments
            .initiate_payment(order_id, domain::PaymentMethod::Stripe, self.customer)
            .await
            .unwrap()
            .gateway_transaction_id
    }

    pub fn stripe_event(
        &self,
        event_type: &str,
        gateway_id: &str,
        payment_id: PaymentId,
        order_id: OrderId,
    ) -> (String, WebhookHeaders) {
        let payload = serde_json::json!({
            "id": "evt_test",
            "type": event_type,
            "data": {
                "object": {
                    "id": gateway_id,
                    "metadata": {
                        "paymentId": payment_id.to_string(),
                        "orderId": order_id.to_string(),
                    }
                }
            }
        })
        .to_string();
        let header = self
            .stripe
            .signature_header(&payload, Utc::now().timestamp())
            .unwrap();
        (payload, WebhookHeaders::new().with("Stripe-Signature", header))
    }

    pub async fn deliver_stripe(
        &self,
        event_type: &str,
        gateway_id: &str,
        payment_id: PaymentId,
        order_id: OrderId,
    ) -> Result<WebhookOutcome> {
        let (payload, headers) = self.stripe_event(event_type, gateway_id, payment_id, order_id);
        self.payments
            .handle_webhook(domain::PaymentMethod::Stripe, &payload, &headers)
            .await
    }

    /// Places the example order and captures its payment through Stripe.
    pub async fn paid_order(&self) -> OrderDetails {
        let details = self.place_example_order().await;
        let order_id = details.order.id;
        let payment_id = details.payment.as_ref().unwrap().id;
        let gateway_id = self.pay_with_stripe(order_id).await;
        let outcome = self
            .deliver_stripe("payment_intent.succeeded", &gateway_id, payment_id, order_id)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied);
        self.details(order_id).await
    }
}
