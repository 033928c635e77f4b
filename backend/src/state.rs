use std::sync::Arc;

use crate::{
    config::Config,
    db::{
        connection::PoolManager,
        executor::{Executor, RetryPolicy},
    },
    error::ConfigError,
    repositories::{
        LedgerStore, LoginAttemptStore, LoginEventStore, PgLedgerStore, PgLoginAttemptStore,
        PgLoginEventStore, PgResellerStore, PgSubscriberStore, ResellerStore, SubscriberStore,
    },
    services::{Authenticator, BruteForceGuard, ListingService},
    utils::{
        jwt::TokenIssuer,
        password::LegacyHasher,
        time::{Clock, SystemClock},
    },
};

/// Store implementations the services are wired against.
#[derive(Clone)]
pub struct Stores {
    pub resellers: Arc<dyn ResellerStore>,
    pub login_attempts: Arc<dyn LoginAttemptStore>,
    pub login_events: Arc<dyn LoginEventStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub ledger: Arc<dyn LedgerStore>,
}

impl Stores {
    pub fn postgres(executor: &Executor) -> Self {
        Self {
            resellers: Arc::new(PgResellerStore::new(executor.clone())),
            login_attempts: Arc::new(PgLoginAttemptStore::new(executor.clone())),
            login_events: Arc::new(PgLoginEventStore::new(executor.clone())),
            subscribers: Arc::new(PgSubscriberStore::new(executor.clone())),
            ledger: Arc::new(PgLedgerStore::new(executor.clone())),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub executor: Executor,
    pub authenticator: Authenticator,
    pub listings: ListingService,
    pub resellers: Arc<dyn ResellerStore>,
}

impl AppState {
    /// Production wiring: Postgres stores behind the shared executor.
    pub fn new(config: Config, pools: Arc<dyn PoolManager>) -> Result<Self, ConfigError> {
        let executor = Executor::new(
            pools,
            RetryPolicy::from_config(&config),
            config.db_call_deadline(),
        );
        let stores = Stores::postgres(&executor);
        Self::with_stores(config, executor, stores, Arc::new(SystemClock))
    }

    /// Wires the services against arbitrary stores. Salt and secret problems
    /// surface here, before anything is served.
    pub fn with_stores(
        config: Config,
        executor: Executor,
        stores: Stores,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let hasher = LegacyHasher::new(
            config.password_salt_primary.clone(),
            config.password_salt_secondary.clone(),
        )?;
        let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_expiration_hours)?;

        let guard = BruteForceGuard::new(
            stores.login_attempts,
            Arc::clone(&clock),
            config.login_guard_bypass.clone(),
        );
        let authenticator = Authenticator::new(
            guard,
            Arc::clone(&stores.resellers),
            stores.login_events,
            hasher,
            tokens,
            Arc::clone(&clock),
        );
        let listings = ListingService::new(
            stores.subscribers,
            stores.ledger,
            config.output_formats.clone(),
            config.db_call_deadline(),
            clock,
        );

        Ok(Self {
            executor,
            authenticator,
            listings,
            resellers: stores.resellers,
        })
    }
}
