use std::{env, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Holds everything needed to run the service: bind address, Redis
/// connection, Stripe credentials, the identity provider endpoint and the
/// outbound mail settings. Built once at startup and passed explicitly to
/// the components that need it.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The URL of the Redis server backing the subscription store and the
    /// reload channel.
    pub redis_url: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Timeout in seconds applied to every outbound HTTP call.
    pub outbound_timeout_secs: u64,
    /// Stripe secret key.
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret.
    pub stripe_webhook_secret: String,
    /// The Stripe price the paid plan subscribes users to.
    pub stripe_plan_id: String,
    /// The identity provider's userinfo endpoint.
    pub google_userinfo_url: String,
    /// Contact address surfaced to users when a provider call fails.
    pub support_email: String,
    /// Display name of the application, used in notification emails.
    pub app_name: String,
    /// Public URL of the application, used in notification emails.
    pub app_url: String,
    /// Configuration for the outbound mail API.
    pub mail: MailConfig,
}

#[derive(Clone, Debug)]
/// Settings for the HTTP mail API used to send renewal notices.
pub struct MailConfig {
    /// Endpoint messages are posted to.
    pub api_url: String,
    /// Bearer key for the mail API.
    pub api_key: String,
    /// The "From" header value, e.g. `App <noreply@example.com>`.
    pub from: String,
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// Required: `ENVIRONMENT`, `REDIS_URL`, `STRIPE_SECRET_KEY`,
    /// `STRIPE_WEBHOOK_SECRET`, `STRIPE_PLAN_ID`, `MAIL_API_KEY`,
    /// `MAIL_FROM`. Everything else has a sensible default.
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing or a numeric value cannot
    /// be parsed.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            redis_url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            outbound_timeout_secs: env::var("OUTBOUND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("OUTBOUND_TIMEOUT_SECS must be a valid number"),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .expect("STRIPE_SECRET_KEY must be set"),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            stripe_plan_id: env::var("STRIPE_PLAN_ID").expect("STRIPE_PLAN_ID must be set"),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL").unwrap_or_else(|_| {
                "https://content.googleapis.com/oauth2/v2/userinfo".to_string()
            }),
            support_email: env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@localhost".to_string()),
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "subgate".to_string()),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            mail: MailConfig {
                api_url: env::var("MAIL_API_URL")
                    .unwrap_or_else(|_| "https://api.resend.com/emails".to_string()),
                api_key: env::var("MAIL_API_KEY").expect("MAIL_API_KEY must be set"),
                from: env::var("MAIL_FROM").expect("MAIL_FROM must be set"),
            },
        })
    }
}
