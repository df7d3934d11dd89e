use std::sync::Arc;

use chrono::Utc;
use common::{AddressId, Requester, SellerId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Address, Customer, Dimensions, Money, PaymentMethod, Product, Seller};
use fulfillment::{
    GatewayCredentials, GatewayRegistry, NewOrder, OrderEngine, OrderLine, PaymentReconciler,
    Settings, StripeGateway, WebhookHeaders,
};
use store::InMemoryStore;

struct Fixture {
    store: InMemoryStore,
    engine: OrderEngine<InMemoryStore>,
    payments: PaymentReconciler<InMemoryStore>,
    stripe: StripeGateway,
    customer: UserId,
    request: NewOrder,
}

fn address(owner_id: Option<UserId>) -> Address {
    Address {
        id: AddressId::new(),
        owner_id,
        name: "Bench".to_string(),
        line1: "1 Main St".to_string(),
        line2: None,
        city: "Springfield".to_string(),
        region: "IL".to_string(),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
        phone: None,
    }
}

async fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    let customer = UserId::new();
    store
        .add_customer(Customer {
            id: customer,
            name: "Bench".to_string(),
            email: "bench@example.com".to_string(),
        })
        .await;
    let home = address(Some(customer));
    store.add_address(home.clone()).await;

    let seller = Seller {
        id: SellerId::new(),
        name: "Bench Seller".to_string(),
        warehouse_address: Some(address(None)),
    };
    store.add_seller(seller.clone()).await;
    for (id, price) in [("SKU-1", 1000), ("SKU-2", 2550)] {
        store
            .add_product(Product {
                id: id.into(),
                name: id.to_string(),
                price: Money::from_cents(price),
                stock: u32::MAX,
                seller_id: Some(seller.id),
                weight_grams: 250,
                dimensions: Dimensions::default(),
            })
            .await;
    }

    let stripe = StripeGateway::new(GatewayCredentials::new("sk_bench", "whsec_bench"));
    let gateways = Arc::new(GatewayRegistry::new().with(Arc::new(stripe.clone())));

    Fixture {
        engine: OrderEngine::new(store.clone(), gateways.clone(), Settings::default()),
        payments: PaymentReconciler::new(store.clone(), gateways, Settings::default()),
        store,
        stripe,
        customer,
        request: NewOrder {
            shipping_address_id: home.id,
            billing_address_id: home.id,
            items: vec![
                OrderLine {
                    product_id: "SKU-1".into(),
                    quantity: 2,
                },
                OrderLine {
                    product_id: "SKU-2".into(),
                    quantity: 1,
                },
            ],
        },
    }
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let fx = rt.block_on(fixture());

    c.bench_function("fulfillment/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                fx.engine
                    .create_order(fx.customer, fx.request.clone())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_create_and_cancel(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let fx = rt.block_on(fixture());
    let requester = Requester::customer(fx.customer);

    c.bench_function("fulfillment/create_and_cancel", |b| {
        b.iter(|| {
            rt.block_on(async {
                let details = fx
                    .engine
                    .create_order(fx.customer, fx.request.clone())
                    .await
                    .unwrap();
                fx.engine
                    .cancel_order(details.order.id, requester)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_payment_webhook(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let fx = rt.block_on(fixture());
    let requester = Requester::customer(fx.customer);

    c.bench_function("fulfillment/pay_and_reconcile", |b| {
        b.iter(|| {
            rt.block_on(async {
                let details = fx
                    .engine
                    .create_order(fx.customer, fx.request.clone())
                    .await
                    .unwrap();
                let order_id = details.order.id;
                let initiation = fx
                    .payments
                    .initiate_payment(order_id, PaymentMethod::Stripe, requester)
                    .await
                    .unwrap();

                let payload = serde_json::json!({
                    "type": "payment_intent.succeeded",
                    "data": {"object": {
                        "id": initiation.gateway_transaction_id,
                        "metadata": {
                            "paymentId": initiation.payment_id.to_string(),
                            "orderId": order_id.to_string(),
                        }
                    }}
                })
                .to_string();
                let header = fx
                    .stripe
                    .signature_header(&payload, Utc::now().timestamp())
                    .unwrap();
                fx.payments
                    .handle_webhook(
                        PaymentMethod::Stripe,
                        &payload,
                        &WebhookHeaders::new().with("Stripe-Signature", header),
                    )
                    .await
                    .unwrap();
            });
        });
    });

    rt.block_on(async {
        assert!(fx.store.order_count().await > 0);
    });
}

criterion_group!(
    benches,
    bench_create_order,
    bench_create_and_cancel,
    bench_payment_webhook,
);
criterion_main!(benches);
