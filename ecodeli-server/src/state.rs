//! Application state for ecodeli-server

use shared::models::EscrowPolicy;
use sqlx::PgPool;

use crate::auth::rate_limit::RateLimiter;
use crate::config::Config;
use crate::live::LivePositions;
use crate::stripe::StripeClient;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Business settings read by handlers and jobs
#[derive(Debug, Clone)]
pub struct Settings {
    pub currency: String,
    pub platform_fee_percent: f64,
    pub service_commission_percent: f64,
    pub min_withdrawal_amount: f64,
    pub escrow: EscrowPolicy,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub pool: PgPool,
    /// JWT secret for user authentication
    pub jwt_secret: String,
    /// Stripe REST client
    pub stripe: StripeClient,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    pub settings: Settings,
    /// Rate limiter for login/registration routes and code checks
    pub rate_limiter: RateLimiter,
    /// Last known position of active deliveries
    pub live: LivePositions,
}

impl AppState {
    /// Connect, run migrations and build the state
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        Ok(Self::with_pool(pool, config))
    }

    /// Build the state around an existing pool
    pub fn with_pool(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            jwt_secret: config.jwt_secret.clone(),
            stripe: StripeClient::new(&config.stripe_secret_key),
            stripe_webhook_secret: config.stripe_webhook_secret.clone(),
            settings: Settings {
                currency: config.currency.clone(),
                platform_fee_percent: config.platform_fee_percent,
                service_commission_percent: config.service_commission_percent,
                min_withdrawal_amount: config.min_withdrawal_amount,
                escrow: config.escrow_policy(),
            },
            rate_limiter: RateLimiter::new(),
            live: LivePositions::new(),
        }
    }
}
