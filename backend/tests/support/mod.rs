#![allow(dead_code)]
//! In-memory stores and helpers for driving the router without a database.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response},
    Router,
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use std::{
    collections::{BTreeSet, HashMap},
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use sqlx::PgPool;
use streamdesk_backend::{
    app,
    config::Config,
    db::{
        connection::{PoolLease, PoolManager},
        executor::{Executor, RetryPolicy},
    },
    error::StoreError,
    models::{
        ledger::LedgerEntry,
        login_attempt::{LoginAttemptRecord, LoginEvent},
        reseller::{Reseller, SuspendState},
        server::StreamingServer,
        subscriber::{ActiveConnectionSample, SubscriberRecord},
    },
    repositories::{
        listing_query::{BindValue, ListingQuery, Predicate},
        LedgerStore, LoginAttemptStore, LoginEventStore, ResellerStore, SubscriberStore,
    },
    state::{AppState, Stores},
    utils::{password::LegacyHasher, time::SystemClock},
};
use tokio::time::Instant;
use tower::ServiceExt;

pub const SALT_PRIMARY: &str = "pepper";
pub const SALT_SECONDARY: &str = "spice";

pub fn config() -> Config {
    let env: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://streamdesk@127.0.0.1:1/streamdesk"),
        ("JWT_SECRET", "a_secure_token_that_is_long_enough_123"),
        ("PASSWORD_SALT_PRIMARY", SALT_PRIMARY),
        ("PASSWORD_SALT_SECONDARY", SALT_SECONDARY),
    ]);
    Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).expect("test config")
}

pub fn digest(password: &str) -> String {
    LegacyHasher::new(SALT_PRIMARY, SALT_SECONDARY)
        .expect("salts")
        .hash(password)
}

pub fn reseller(id: i64, username: &str, password: &str, role_level: i32, parent: Option<i64>) -> Reseller {
    Reseller {
        id,
        username: username.to_string(),
        password_digest: digest(password),
        display_name: Some(format!("{} display", username)),
        role_level,
        parent_id: parent,
        suspend_state: SuspendState::None,
        member_group_id: 2,
        reseller_dns: None,
        last_login_at: None,
        last_login_ip: None,
    }
}

/// A pool manager whose pool is always closed.
pub struct ClosedPool;

#[async_trait]
impl PoolManager for ClosedPool {
    async fn lease(&self) -> Result<PoolLease, sqlx::Error> {
        Err(sqlx::Error::PoolClosed)
    }

    async fn recreate(&self, _stale_generation: u64) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

/// Serves one externally owned pool. `recreate` only advances the generation
/// and records which generation was retired.
pub struct FixedPool {
    pool: PgPool,
    generation: AtomicU64,
    pub recreated: Mutex<Vec<u64>>,
}

impl FixedPool {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            generation: AtomicU64::new(0),
            recreated: Mutex::new(Vec::new()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolManager for FixedPool {
    async fn lease(&self) -> Result<PoolLease, sqlx::Error> {
        Ok(PoolLease {
            generation: self.generation(),
            pool: self.pool.clone(),
        })
    }

    async fn recreate(&self, stale_generation: u64) -> Result<(), sqlx::Error> {
        let advanced = self
            .generation
            .compare_exchange(
                stale_generation,
                stale_generation + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if advanced {
            self.recreated.lock().expect("lock").push(stale_generation);
        }
        Ok(())
    }
}

pub fn pg_executor(pool: PgPool) -> (Arc<FixedPool>, Executor) {
    let pools = Arc::new(FixedPool::new(pool));
    let executor = Executor::new(
        pools.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        Duration::from_secs(10),
    );
    (pools, executor)
}

pub fn closed_executor() -> Executor {
    Executor::new(
        Arc::new(ClosedPool),
        RetryPolicy::default(),
        Duration::from_secs(5),
    )
}

#[derive(Default)]
pub struct MemoryResellers {
    pub accounts: Mutex<Vec<Reseller>>,
    pub ledger: Mutex<Vec<LedgerEntry>>,
}

impl MemoryResellers {
    pub fn with(accounts: Vec<Reseller>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            ledger: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResellerStore for MemoryResellers {
    async fn find_by_username(&self, username: &str) -> Result<Option<Reseller>, StoreError> {
        let accounts = self.accounts.lock().expect("lock");
        Ok(accounts.iter().find(|r| r.username == username).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Reseller>, StoreError> {
        let accounts = self.accounts.lock().expect("lock");
        Ok(accounts.iter().find(|r| r.id == id).cloned())
    }

    async fn direct_subordinate_ids(&self, parent_id: i64) -> Result<BTreeSet<i64>, StoreError> {
        let accounts = self.accounts.lock().expect("lock");
        Ok(accounts
            .iter()
            .filter(|r| r.parent_id == Some(parent_id))
            .map(|r| r.id)
            .collect())
    }

    async fn balance(&self, reseller_id: i64) -> Result<i64, StoreError> {
        let ledger = self.ledger.lock().expect("lock");
        Ok(ledger
            .iter()
            .filter(|e| e.reseller_id == reseller_id)
            .map(|e| e.credit - e.debit)
            .sum())
    }

    async fn touch_last_login(
        &self,
        reseller_id: i64,
        at: DateTime<Utc>,
        source_address: &str,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().expect("lock");
        if let Some(account) = accounts.iter_mut().find(|r| r.id == reseller_id) {
            account.last_login_at = Some(at);
            account.last_login_ip = Some(source_address.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAttempts {
    pub records: Mutex<HashMap<String, LoginAttemptRecord>>,
}

#[async_trait]
impl LoginAttemptStore for MemoryAttempts {
    async fn find(&self, source_address: &str) -> Result<Option<LoginAttemptRecord>, StoreError> {
        Ok(self.records.lock().expect("lock").get(source_address).cloned())
    }

    async fn record_failure(
        &self,
        username: &str,
        source_address: &str,
        locked_until: DateTime<Utc>,
    ) -> Result<LoginAttemptRecord, StoreError> {
        let mut records = self.records.lock().expect("lock");
        let record = records
            .entry(source_address.to_string())
            .or_insert_with(|| LoginAttemptRecord {
                source_address: source_address.to_string(),
                username: username.to_string(),
                attempt_count: 0,
                locked_until,
            });
        record.attempt_count += 1;
        record.username = username.to_string();
        record.locked_until = locked_until;
        Ok(record.clone())
    }

    async fn clear(&self, source_address: &str) -> Result<(), StoreError> {
        self.records.lock().expect("lock").remove(source_address);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEvents {
    pub events: Mutex<Vec<LoginEvent>>,
}

#[async_trait]
impl LoginEventStore for MemoryEvents {
    async fn record(&self, event: LoginEvent) -> Result<(), StoreError> {
        self.events.lock().expect("lock").push(event);
        Ok(())
    }
}

/// Applies the owner and trial predicates of a listing query in memory.
fn matches(query: &ListingQuery, owner: i64, is_trial: Option<bool>) -> bool {
    query.predicates().iter().all(|predicate| match predicate {
        Predicate::OwnerIn { owner_ids, .. } => owner_ids.contains(&owner),
        Predicate::Equals {
            value: BindValue::Bool(expected),
            ..
        } => is_trial.map_or(true, |actual| actual == *expected),
        _ => true,
    })
}

fn paginate<T: Clone>(rows: Vec<T>, query: &ListingQuery) -> Vec<T> {
    let pagination = query.pagination();
    rows.into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.page_size as usize)
        .collect()
}

#[derive(Default)]
pub struct MemorySubscribers {
    pub records: Vec<SubscriberRecord>,
    pub samples: Vec<ActiveConnectionSample>,
    pub primary: Option<StreamingServer>,
}

impl MemorySubscribers {
    fn filtered(&self, query: &ListingQuery) -> Vec<SubscriberRecord> {
        let mut rows: Vec<_> = self
            .records
            .iter()
            .filter(|r| matches(query, r.owner_admin_id, Some(r.is_trial)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscribers {
    async fn fetch_rows(
        &self,
        query: &ListingQuery,
        _deadline: Instant,
    ) -> Result<Vec<SubscriberRecord>, StoreError> {
        Ok(paginate(self.filtered(query), query))
    }

    async fn count(&self, query: &ListingQuery, _deadline: Instant) -> Result<i64, StoreError> {
        Ok(self.filtered(query).len() as i64)
    }

    async fn connection_samples(
        &self,
        line_ids: Vec<i64>,
        _deadline: Instant,
    ) -> Result<Vec<ActiveConnectionSample>, StoreError> {
        Ok(self
            .samples
            .iter()
            .filter(|s| line_ids.contains(&s.subscriber_id))
            .cloned()
            .collect())
    }

    async fn primary_server(
        &self,
        _deadline: Instant,
    ) -> Result<Option<StreamingServer>, StoreError> {
        Ok(self.primary.clone())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    pub entries: Vec<LedgerEntry>,
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn fetch_entries(
        &self,
        query: &ListingQuery,
        _deadline: Instant,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .filter(|e| matches(query, e.reseller_id, None))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(paginate(rows, query))
    }

    async fn count(&self, query: &ListingQuery, _deadline: Instant) -> Result<i64, StoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| matches(query, e.reseller_id, None))
            .count() as i64)
    }
}

pub struct TestApp {
    pub router: Router,
    pub resellers: Arc<MemoryResellers>,
    pub attempts: Arc<MemoryAttempts>,
    pub events: Arc<MemoryEvents>,
}

pub fn test_app(
    resellers: MemoryResellers,
    subscribers: MemorySubscribers,
    ledger: MemoryLedger,
) -> TestApp {
    let resellers = Arc::new(resellers);
    let attempts = Arc::new(MemoryAttempts::default());
    let events = Arc::new(MemoryEvents::default());
    let stores = Stores {
        resellers: resellers.clone(),
        login_attempts: attempts.clone(),
        login_events: events.clone(),
        subscribers: Arc::new(subscribers),
        ledger: Arc::new(ledger),
    };
    let state = AppState::with_stores(config(), closed_executor(), stores, Arc::new(SystemClock))
        .expect("state");
    TestApp {
        router: app(state),
        resellers,
        attempts,
        events,
    }
}

pub fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{}:40000", peer).parse().expect("peer address");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub fn login_request(username: &str, password: &str, peer: &str) -> Request<Body> {
    let body = serde_json::json!({ "username": username, "password": password }).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("request");
    from_peer(request, peer)
}

pub fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .expect("request")
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("response")
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn login_token(router: &Router, username: &str, password: &str) -> String {
    let response = send(router, login_request(username, password, "192.0.2.50")).await;
    assert_eq!(response.status(), 200, "login should succeed");
    json_body(response).await["access_token"]
        .as_str()
        .expect("token")
        .to_string()
}
