use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub credits: CreditsConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub mercadopago: Option<MercadoPagoConfig>,
    #[serde(default)]
    pub inter: Option<InterConfig>,
    pub production: ProductionConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// Apply pending migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Payment intents an account may open per window
    #[serde(default = "default_intents_per_window")]
    pub intents_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the marketplace's auth service
    pub jwt_secret: String,
    /// Expected `iss` claim; tokens from any issuer are accepted when unset
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default = "default_token_expiration_minutes")]
    pub access_token_expiration_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub api_key: String,
}

/// A purchasable credit package
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CreditPackage {
    pub id: String,
    pub credits: i64,
    /// Price in BRL cents
    pub price_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditsConfig {
    /// Lifetime of purchased credits; `None` means purchased credits never expire
    #[serde(default = "default_purchase_validity_days")]
    pub purchase_validity_days: Option<u32>,
    #[serde(default = "default_packages")]
    pub packages: Vec<CreditPackage>,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            purchase_validity_days: default_purchase_validity_days(),
            packages: default_packages(),
        }
    }
}

impl CreditsConfig {
    pub fn package(&self, id: &str) -> Option<&CreditPackage> {
        self.packages.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Credits charged per started minute of human-voiced script
    pub human_credits_per_minute: i64,
    /// Narration speed used to turn a script's word count into minutes
    pub words_per_minute: u32,
    /// Credits charged per started 1,000 characters of AI synthesis
    pub ai_credits_per_thousand_chars: i64,
    pub minimum_order_credits: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            human_credits_per_minute: 100,
            words_per_minute: 150,
            ai_credits_per_thousand_chars: 10,
            minimum_order_credits: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    /// Secret used to verify the `x-signature` header on notifications
    pub webhook_secret: String,
    #[serde(default = "default_mercadopago_api_base")]
    pub api_base: String,
    /// Public URL Mercado Pago should notify for created payments
    #[serde(default)]
    pub notification_url: Option<String>,
    #[serde(default = "default_pix_expiration_minutes")]
    pub pix_expiration_minutes: u32,
    #[serde(default = "default_provider_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterConfig {
    pub client_id: String,
    pub client_secret: String,
    /// PIX key (chave) that receives the charges
    pub pix_key: String,
    /// Shared token expected on the callback URL (`?token=`)
    pub webhook_token: String,
    #[serde(default = "default_inter_api_base")]
    pub api_base: String,
    /// PEM certificate + key for the mTLS identity Inter requires in production
    #[serde(default)]
    pub certificate_path: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default = "default_pix_expiration_minutes")]
    pub pix_expiration_minutes: u32,
    #[serde(default = "default_provider_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Re-read the charge from the API before settling a callback
    #[serde(default = "default_true")]
    pub confirm_callbacks: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductionConfig {
    /// Queue endpoint that hands human productions to producers
    pub dispatch_url: String,
    /// Text-to-speech synthesis endpoint
    pub tts_url: String,
    #[serde(default)]
    pub tts_api_key: Option<String>,
    /// Upper bound on the external action; exceeding it reverses the debit.
    /// Must stay below `server.request_timeout_secs`.
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 24 * 60 * 60,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_intents_per_window() -> u32 {
    10
}

fn default_window_seconds() -> u32 {
    60
}

fn default_token_expiration_minutes() -> u64 {
    15
}

fn default_purchase_validity_days() -> Option<u32> {
    Some(365)
}

fn default_packages() -> Vec<CreditPackage> {
    vec![
        CreditPackage {
            id: "credits-100".to_string(),
            credits: 100,
            price_cents: 1_000,
        },
        CreditPackage {
            id: "credits-500".to_string(),
            credits: 500,
            price_cents: 4_500,
        },
        CreditPackage {
            id: "credits-2000".to_string(),
            credits: 2_000,
            price_cents: 16_000,
        },
    ]
}

fn default_mercadopago_api_base() -> String {
    "https://api.mercadopago.com".to_string()
}

fn default_inter_api_base() -> String {
    "https://cdpj.partners.bancointer.com.br".to_string()
}

fn default_pix_expiration_minutes() -> u32 {
    30
}

fn default_provider_timeout_ms() -> u64 {
    15_000
}

fn default_action_timeout_ms() -> u64 {
    25_000
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        // Build config from config.yml (required) with environment variable overrides
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("VOXLEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that contradict each other
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let request_timeout_ms = self.server.request_timeout_secs.saturating_mul(1000);
        if self.production.action_timeout_ms >= request_timeout_ms {
            // An order would still be running when the HTTP layer gives up on it
            return Err(config::ConfigError::Message(format!(
                "production.action_timeout_ms ({}) must be below server.request_timeout_secs ({}s)",
                self.production.action_timeout_ms, self.server.request_timeout_secs
            )));
        }
        Ok(())
    }
}
