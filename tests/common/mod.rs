#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::Value;
use tiketloka_api::{
    auth::AuthUser,
    build_router,
    clock::{Clock, FixedClock},
    config::{AppConfig, BookingSettings, CheckoutFlow},
    db::{self, DbConfig},
    entities::{
        cart_line, destination, order,
        user::{self, UserRole},
    },
    events::{Event, EventSender},
    handlers::AppServices,
    services::{
        checkout::CheckoutService,
        reference_code::{RandomSource, ReferenceCodeGenerator, ThreadRngSource},
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret-with-enough-entropy-42";

/// Instant every test starts at: 2026-03-01 10:00 UTC
pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A visit date comfortably in the future relative to [`start_instant`]
pub fn visit_date() -> NaiveDate {
    date(2026, 3, 10)
}

pub struct Destinations {
    /// 500,000
    pub borobudur: destination::Model,
    /// 150,000
    pub prambanan: destination::Model,
    /// 200,000
    pub ijen: destination::Model,
    /// Inactive, 100,000
    pub closed: destination::Model,
}

pub struct Users {
    /// Has phone 081298765432
    pub alice: user::Model,
    /// No phone on file
    pub bob: user::Model,
    pub admin: user::Model,
}

#[derive(Clone)]
pub struct TestOptions {
    pub checkout_flow: CheckoutFlow,
    pub random: Arc<dyn RandomSource>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            checkout_flow: CheckoutFlow::RequireConfirmation,
            random: Arc::new(ThreadRngSource),
        }
    }
}

/// Application over a private in-memory SQLite database with a fixed clock
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub clock: FixedClock,
    pub users: Users,
    pub destinations: Destinations,
    events: Mutex<mpsc::Receiver<Event>>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_options(TestOptions::default()).await
    }

    pub async fn auto_confirm() -> Self {
        Self::with_options(TestOptions {
            checkout_flow: CheckoutFlow::AutoConfirm,
            ..Default::default()
        })
        .await
    }

    pub async fn with_options(options: TestOptions) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("in-memory sqlite");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let mut config = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_SECRET.to_string(),
            "test".to_string(),
        );
        config.booking = BookingSettings {
            checkout_flow: options.checkout_flow,
            ..BookingSettings::default()
        };

        let (tx, rx) = mpsc::channel(1024);
        let event_sender = Arc::new(EventSender::new(tx));
        let clock = FixedClock::new(start_instant());

        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.booking.clone(),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
            options.random,
        );
        let state = AppState::with_services(db, config, event_sender, services);
        let router = build_router(state.clone());

        let users = Users {
            alice: seed_user(&state, "Alice", "alice@example.com", Some("081298765432"), UserRole::Customer).await,
            bob: seed_user(&state, "Bob", "bob@example.com", None, UserRole::Customer).await,
            admin: seed_user(&state, "Admin", "admin@tiketloka.test", None, UserRole::Admin).await,
        };
        let destinations = Destinations {
            borobudur: seed_destination(&state, "Candi Borobudur", "Magelang", dec!(500000), true).await,
            prambanan: seed_destination(&state, "Candi Prambanan", "Sleman", dec!(150000), true).await,
            ijen: seed_destination(&state, "Kawah Ijen", "Banyuwangi", dec!(200000), true).await,
            closed: seed_destination(&state, "Taman Tutup", "Bogor", dec!(100000), false).await,
        };

        Self {
            router,
            state,
            clock,
            users,
            destinations,
            events: Mutex::new(rx),
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    pub fn caller(&self, user: &user::Model) -> AuthUser {
        AuthUser::new(user.id, user.role)
    }

    pub fn token_for(&self, user: &user::Model) -> String {
        self.state
            .auth
            .issue_token(user.id, user.role)
            .expect("issue token")
    }

    /// Checkout service sharing this app's database and clock, with custom codes
    pub fn checkout_with(&self, codes: ReferenceCodeGenerator) -> CheckoutService {
        CheckoutService::new(
            self.state.db.clone(),
            self.state.event_sender.clone(),
            Arc::new(self.state.config.booking.clone()),
            codes,
            Arc::new(self.clock.clone()),
        )
    }

    /// Inserts a cart line directly. The clock moves one second so lines keep
    /// a stable creation order.
    pub async fn seed_cart_line(
        &self,
        owner: &user::Model,
        destination: &destination::Model,
        quantity: i32,
    ) -> cart_line::Model {
        let line = cart_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner.id),
            destination_id: Set(destination.id),
            quantity: Set(quantity),
            visit_date: Set(visit_date()),
            created_at: Set(self.clock.now()),
        }
        .insert(self.db())
        .await
        .expect("seed cart line");
        self.clock.advance(Duration::seconds(1));
        line
    }

    pub async fn cart_line_ids(&self, owner: &user::Model) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = cart_line::Entity::find()
            .filter(cart_line::Column::UserId.eq(owner.id))
            .all(self.db())
            .await
            .expect("cart lines")
            .into_iter()
            .map(|l| l.id)
            .collect();
        ids.sort();
        ids
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(self.db())
            .await
            .expect("order count")
    }

    pub async fn find_order(&self, reference_code: &str) -> order::Model {
        order::Entity::find()
            .filter(order::Column::ReferenceCode.eq(reference_code))
            .one(self.db())
            .await
            .expect("order lookup")
            .expect("order exists")
    }

    /// Events published so far, oldest first
    pub fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.events.lock().unwrap();
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder.body(Body::empty()).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_as(
        &self,
        user: &user::Model,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = self.token_for(user);
        self.request(method, uri, body, Some(&token)).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Parses a JSON decimal (string or number) for numeric comparison
pub fn json_decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {:?}", other),
    }
}

async fn seed_user(
    state: &AppState,
    name: &str,
    email: &str,
    phone: Option<&str>,
    role: UserRole,
) -> user::Model {
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        phone_number: Set(phone.map(str::to_string)),
        role: Set(role),
        created_at: Set(start_instant()),
    }
    .insert(&*state.db)
    .await
    .expect("seed user")
}

async fn seed_destination(
    state: &AppState,
    name: &str,
    location: &str,
    price: Decimal,
    is_active: bool,
) -> destination::Model {
    destination::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(name.to_lowercase().replace(' ', "-")),
        location: Set(location.to_string()),
        price: Set(price),
        is_active: Set(is_active),
        created_at: Set(start_instant()),
    }
    .insert(&*state.db)
    .await
    .expect("seed destination")
}
