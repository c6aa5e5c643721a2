//! Server configuration

use shared::models::EscrowPolicy;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// EcoDeli server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// JWT secret for user authentication
    pub jwt_secret: String,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// ISO currency for every payment (lower case, Stripe style)
    pub currency: String,
    /// Platform fee taken on delivery payouts (percent)
    pub platform_fee_percent: f64,
    /// Commission taken on service bookings (percent)
    pub service_commission_percent: f64,
    pub escrow_auto_release_hours: i64,
    pub escrow_max_hold_hours: i64,
    pub refund_window_days: i64,
    /// Smallest amount a wallet owner may withdraw
    pub min_withdrawal_amount: f64,
    /// Period of the background jobs loop
    pub job_interval_secs: u64,
    /// Allowed browser origin, any origin when unset
    pub cors_allowed_origin: Option<String>,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: env_or("HTTP_PORT", 8080),
            environment: environment.clone(),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "eur".into()),
            platform_fee_percent: env_or("PLATFORM_FEE_PERCENT", 15.0),
            service_commission_percent: env_or("SERVICE_COMMISSION_PERCENT", 20.0),
            escrow_auto_release_hours: env_or("ESCROW_AUTO_RELEASE_HOURS", 48),
            escrow_max_hold_hours: env_or("ESCROW_MAX_HOLD_HOURS", 168),
            refund_window_days: env_or("REFUND_WINDOW_DAYS", 30),
            min_withdrawal_amount: env_or("MIN_WITHDRAWAL_AMOUNT", 10.0),
            job_interval_secs: env_or("JOB_INTERVAL_SECS", 300),
            cors_allowed_origin: std::env::var("CORS_ALLOWED_ORIGIN")
                .ok()
                .filter(|s| !s.is_empty()),
        })
    }

    pub fn escrow_policy(&self) -> EscrowPolicy {
        EscrowPolicy {
            auto_release_hours: self.escrow_auto_release_hours,
            max_hold_hours: self.escrow_max_hold_hours,
            refund_window_days: self.refund_window_days,
            ..EscrowPolicy::default()
        }
    }
}
