use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamdesk_backend::{
    app,
    config::Config,
    db::connection::{LazyPool, PoolManager, PoolSettings},
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable>".into(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamdesk_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        database_url = %mask_database_url(&config.database_url),
        jwt_secret = %mask_secret(&config.jwt_secret),
        password_salt_primary = %mask_secret(&config.password_salt_primary),
        password_salt_secondary = %mask_secret(&config.password_salt_secondary),
        jwt_expiration_hours = config.jwt_expiration_hours,
        db_max_connections = config.db_max_connections,
        db_max_attempts = config.db_max_attempts,
        db_call_deadline_ms = config.db_call_deadline_ms,
        production_mode = config.production_mode,
        login_guard_bypass = ?config.login_guard_bypass,
        output_formats = config.output_formats.len(),
        "Loaded configuration from environment/.env"
    );

    let pools = Arc::new(LazyPool::new(PoolSettings::from(&config)));
    let lease = pools.lease().await?;
    sqlx::migrate!("./migrations").run(&lease.pool).await?;

    let bind_address = config.bind_address;
    let state = AppState::new(config, pools)?;
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!("Server listening on {}", bind_address);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
