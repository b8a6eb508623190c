#![allow(dead_code)]

use localretail_commerce::domain::aggregates::{CartLine, Customer, Product, Shop, Subscription, TokenPosting, TransactionType};
use localretail_commerce::domain::value_objects::{Money, Sku};
use localretail_commerce::notify::Notifier;
use localretail_commerce::service::{Actor, PlaceOrder};
use localretail_commerce::store::{MemoryStore, OrderStore};
use localretail_commerce::{Config, OrderService};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub struct World {
    pub svc: OrderService<MemoryStore>,
    pub shop: Shop,
    pub merchant: Actor,
    pub customer: Actor,
}

pub async fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let merchant_id = Uuid::now_v7();
    let shop = Shop { id: Uuid::now_v7(), merchant_id, name: "Eckladen Müller".into(), is_active: true, subscription: Subscription { merchant_id, ..Default::default() } };
    let mut customer = Customer::new("anna");
    customer.street_address = "Hauptstraße 5".into();
    customer.city = "Leipzig".into();
    customer.postal_code = "04109".into();
    store.insert_shop(shop.clone()).await;
    store.insert_customer(customer.clone()).await;
    World {
        svc: OrderService::new(store, Config::default(), Notifier::disabled()),
        merchant: Actor::merchant(merchant_id, "mueller"),
        customer: Actor::customer(customer.id, "anna"),
        shop,
    }
}

impl World {
    pub async fn product(&self, sku: &str, price: Decimal, stock: u32) -> Product {
        self.product_in(self.shop.id, sku, price, stock).await
    }

    pub async fn product_in(&self, shop_id: Uuid, sku: &str, price: Decimal, stock: u32) -> Product {
        let mut p = Product::create(shop_id, Sku::new(sku).unwrap(), sku, Money::new(price));
        p.stock_quantity = stock;
        self.svc.store().upsert_product(p.clone()).await;
        p
    }

    pub async fn second_customer(&self, username: &str) -> Actor {
        let mut c = Customer::new(username);
        c.street_address = "Nebenweg 2".into();
        c.city = "Halle".into();
        c.postal_code = "06108".into();
        self.svc.store().insert_customer(c.clone()).await;
        Actor::customer(c.id, username)
    }

    pub async fn grant_tokens(&self, customer: &Actor, tokens: i64) {
        let posting = TokenPosting {
            customer_id: customer.id, transaction_type: TransactionType::AdminAdjustment, amount: tokens,
            order_id: None, description: "Welcome bonus".into(),
        };
        self.svc.store().post_tokens(posting).await.unwrap();
    }

    pub async fn stock(&self, product: &Product) -> u32 {
        self.svc.store().product(product.id).await.unwrap().stock_quantity
    }
}

pub fn cart(lines: &[(&Product, u32)]) -> PlaceOrder {
    PlaceOrder {
        items: lines.iter().map(|(p, q)| CartLine { product_id: p.id, quantity: *q }).collect(),
        ..Default::default()
    }
}
