//! Reseller sign-in: throttling, credential checks and token issuance.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AuthError, ConfigError};
use crate::models::{
    login_attempt::{LoginEvent, LoginEventOutcome},
    principal::Principal,
    reseller::{Reseller, RESET_REQUIRED_LEVEL},
};
use crate::repositories::{login_event::LoginEventStore, reseller::ResellerStore};
use crate::services::brute_force::{BruteForceGuard, GuardDecision};
use crate::utils::{
    background::spawn_best_effort,
    jwt::{Claims, TokenIssuer},
    password::LegacyHasher,
    time::Clock,
};

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub source_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub principal: Principal,
    pub token: String,
    pub expires_at: i64,
    pub balance_credits: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    Idle,
    CheckingRateLimit,
    VerifyingCredentials,
    Authenticated,
    Rejected,
    ResetRequired,
}

impl AuthState {
    fn as_str(self) -> &'static str {
        match self {
            AuthState::Idle => "idle",
            AuthState::CheckingRateLimit => "checking_rate_limit",
            AuthState::VerifyingCredentials => "verifying_credentials",
            AuthState::Authenticated => "authenticated",
            AuthState::Rejected => "rejected",
            AuthState::ResetRequired => "reset_required",
        }
    }
}

struct Attempt<'a> {
    state: AuthState,
    source_address: &'a str,
}

impl Attempt<'_> {
    fn advance(&mut self, next: AuthState) {
        tracing::debug!(
            source_address = self.source_address,
            from = self.state.as_str(),
            to = next.as_str(),
            "login state transition"
        );
        self.state = next;
    }
}

/// Keeps `[A-Za-z0-9-]` and drops everything else.
pub fn sanitize_username(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
        .collect()
}

#[derive(Clone)]
pub struct Authenticator {
    guard: BruteForceGuard,
    resellers: Arc<dyn ResellerStore>,
    events: Arc<dyn LoginEventStore>,
    hasher: LegacyHasher,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(
        guard: BruteForceGuard,
        resellers: Arc<dyn ResellerStore>,
        events: Arc<dyn LoginEventStore>,
        hasher: LegacyHasher,
        tokens: TokenIssuer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            guard,
            resellers,
            events,
            hasher,
            tokens,
            clock,
        }
    }

    pub async fn authenticate(&self, request: LoginRequest) -> Result<LoginOutcome, AuthError> {
        let source_address = request.source_address.as_str();
        let mut attempt = Attempt {
            state: AuthState::Idle,
            source_address,
        };

        attempt.advance(AuthState::CheckingRateLimit);
        if let GuardDecision::Blocked { retry_after_secs } = self.guard.check(source_address).await? {
            attempt.advance(AuthState::Rejected);
            self.record_event(None, &request.username, source_address, LoginEventOutcome::RateLimited);
            return Err(AuthError::RateLimited {
                source_address: source_address.to_string(),
                retry_after_secs,
            });
        }

        attempt.advance(AuthState::VerifyingCredentials);
        let username = sanitize_username(&request.username);
        let reseller = if username.is_empty() {
            None
        } else {
            self.resellers.find_by_username(&username).await?
        };

        let Some(reseller) = reseller else {
            attempt.advance(AuthState::Rejected);
            self.guard.record_failure(&username, source_address).await?;
            self.record_event(None, &username, source_address, LoginEventOutcome::InvalidCredentials);
            return Err(AuthError::InvalidCredentials);
        };

        if reseller.suspend_state.is_suspended() {
            attempt.advance(AuthState::Rejected);
            self.record_event(
                Some(reseller.id),
                &username,
                source_address,
                LoginEventOutcome::Suspended,
            );
            return Err(AuthError::AccountSuspended);
        }

        if reseller.role_level == RESET_REQUIRED_LEVEL {
            attempt.advance(AuthState::ResetRequired);
            self.record_event(
                Some(reseller.id),
                &username,
                source_address,
                LoginEventOutcome::ResetRequired,
            );
            return Err(AuthError::ResetRequired);
        }

        if !self.hasher.verify(&request.password, &reseller.password_digest) {
            attempt.advance(AuthState::Rejected);
            self.guard.record_failure(&username, source_address).await?;
            self.record_event(
                Some(reseller.id),
                &username,
                source_address,
                LoginEventOutcome::InvalidCredentials,
            );
            return Err(AuthError::InvalidCredentials);
        }

        self.guard.clear(source_address).await?;
        self.touch_last_login(&reseller, source_address);

        let balance_credits = self.resellers.balance(reseller.id).await?;
        let subordinates = self.resellers.direct_subordinate_ids(reseller.id).await?;
        let principal = Principal::from_reseller(&reseller, subordinates);

        let (token, claims) = self
            .tokens
            .issue(&principal, &reseller.username)
            .map_err(|err| {
                AuthError::Configuration(ConfigError::Invalid {
                    key: "JWT_SECRET",
                    reason: err.to_string(),
                })
            })?;

        attempt.advance(AuthState::Authenticated);
        self.record_event(
            Some(reseller.id),
            &reseller.username,
            source_address,
            LoginEventOutcome::Success,
        );
        tracing::info!(reseller_id = reseller.id, source_address, "reseller signed in");

        Ok(LoginOutcome {
            principal,
            token,
            expires_at: claims.exp,
            balance_credits,
        })
    }

    /// Verifies a bearer token and returns its claims.
    pub fn verify_token(&self, token: &str) -> anyhow::Result<Claims> {
        self.tokens.verify(token)
    }

    fn touch_last_login(&self, reseller: &Reseller, source_address: &str) {
        let resellers = Arc::clone(&self.resellers);
        let reseller_id = reseller.id;
        let at = self.clock.now();
        let source_address = source_address.to_string();
        spawn_best_effort("last_login_update", async move {
            resellers
                .touch_last_login(reseller_id, at, &source_address)
                .await
        });
    }

    fn record_event(
        &self,
        reseller_id: Option<i64>,
        username: &str,
        source_address: &str,
        outcome: LoginEventOutcome,
    ) {
        let events = Arc::clone(&self.events);
        let event = LoginEvent {
            reseller_id,
            username: username.to_string(),
            source_address: source_address.to_string(),
            outcome,
            occurred_at: self.clock.now(),
        };
        spawn_best_effort("login_event", async move { events.record(event).await });
    }
}
