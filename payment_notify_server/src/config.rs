use std::{env, net::IpAddr, time::Duration};

use gateway_tools::{AlipayConfig, StripeConfig};
use log::*;
use payment_notify_engine::{
    ledger::DEFAULT_STALE_AFTER_SECS,
    verifier::{AlipayKeys, GatewayKeys, StripeKeys, DEFAULT_STRIPE_TOLERANCE_SECS},
    ProcessingSettings,
    DEFAULT_STORE_TIMEOUT_SECS,
};
use pns_common::{
    helpers::{env_flag, env_or_file, split_list},
    Secret,
};

use crate::errors::ServerError;

const DEFAULT_PNS_HOST: &str = "127.0.0.1";
const DEFAULT_PNS_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/payment_notify.db";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_SWEEP_MIN_AGE_SECS: u64 = 900;
const DEFAULT_SWEEP_BATCH_SIZE: i64 = 50;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Keep all state in memory instead of SQLite. For local testing only: nothing survives a restart.
    pub use_memory_store: bool,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// If supplied, requests against the /notify endpoints are only accepted from these addresses.
    pub notify_allowlist: Option<Vec<IpAddr>>,
    /// Bearer token for the /api endpoints. If empty, the admin API refuses every request.
    pub admin_token: Secret<String>,
    pub processing: ProcessingSettings,
    pub keys: GatewayKeyConfig,
    pub alipay: AlipayConfig,
    pub stripe: StripeConfig,
    pub sweeper: SweeperConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PNS_HOST.to_string(),
            port: DEFAULT_PNS_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            use_memory_store: false,
            use_x_forwarded_for: false,
            use_forwarded: false,
            notify_allowlist: None,
            admin_token: Secret::default(),
            processing: ProcessingSettings::default(),
            keys: GatewayKeyConfig::default(),
            alipay: AlipayConfig::default(),
            stripe: StripeConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PNS_HOST").ok().unwrap_or_else(|| DEFAULT_PNS_HOST.into());
        let port = env::var("PNS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for PNS_PORT. {e} Using the default, {DEFAULT_PNS_PORT}, instead."
                    );
                    DEFAULT_PNS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PNS_PORT);
        let database_url = env::var("PNS_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ PNS_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let use_memory_store = env_flag("PNS_MEMORY_STORE", false);
        if use_memory_store {
            warn!("🚨️ PNS_MEMORY_STORE is set. Orders and the ledger live in memory and are lost on restart. 🚨️");
        }
        let use_x_forwarded_for = env_flag("PNS_USE_X_FORWARDED_FOR", false);
        let use_forwarded = env_flag("PNS_USE_FORWARDED", false);
        let notify_allowlist = configure_allowlist();
        let admin_token = match env_or_file("PNS_ADMIN_TOKEN") {
            Ok(Some(token)) => Secret::new(token.trim().to_string()),
            Ok(None) => {
                warn!("🪛️ PNS_ADMIN_TOKEN is not set. The /api endpoints will refuse all requests.");
                Secret::default()
            },
            Err(e) => {
                error!("🪛️ Could not read PNS_ADMIN_TOKEN_FILE. {e}. The /api endpoints will refuse all requests.");
                Secret::default()
            },
        };
        let processing = configure_processing();
        let keys = GatewayKeyConfig::from_env_or_defaults();
        let alipay = AlipayConfig::new_from_env_or_default();
        let stripe = StripeConfig::new_from_env_or_default();
        let sweeper = SweeperConfig::from_env_or_defaults();
        Self {
            host,
            port,
            database_url,
            use_memory_store,
            use_x_forwarded_for,
            use_forwarded,
            notify_allowlist,
            admin_token,
            processing,
            keys,
            alipay,
            stripe,
            sweeper,
        }
    }
}

fn configure_allowlist() -> Option<Vec<IpAddr>> {
    let allowlist = env::var("PNS_NOTIFY_IP_ALLOWLIST").ok().and_then(|s| {
        if ["none", "false", "0", ""].contains(&s.trim().to_lowercase().as_str()) {
            return None;
        }
        let ip_addrs = split_list(&s)
            .into_iter()
            .filter_map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in PNS_NOTIFY_IP_ALLOWLIST: {e}"))
                    .ok()
            })
            .collect::<Vec<IpAddr>>();
        Some(ip_addrs)
    });
    match &allowlist {
        Some(list) if list.is_empty() => {
            warn!(
                "🚨️ The notification IP allow-list was configured, but is empty. The server will run, but won't \
                 accept any gateway notifications."
            );
        },
        None => info!("🪛️ No notification IP allow-list is set. Only signature verification will be used."),
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Notification IP allow-list: {addrs}");
        },
    }
    allowlist
}

fn configure_processing() -> ProcessingSettings {
    let store_timeout = env_seconds("PNS_STORE_TIMEOUT_SECS", DEFAULT_STORE_TIMEOUT_SECS);
    let stale_after = env_seconds("PNS_LEDGER_STALE_AFTER_SECS", DEFAULT_STALE_AFTER_SECS as u64);
    let stale_after = chrono::Duration::from_std(stale_after).unwrap_or_else(|e| {
        warn!("🪛️ PNS_LEDGER_STALE_AFTER_SECS is out of range. {e}. Using the default.");
        chrono::Duration::seconds(DEFAULT_STALE_AFTER_SECS)
    });
    ProcessingSettings { store_timeout, stale_after }
}

fn env_seconds(name: &str, default: u64) -> Duration {
    let secs = env::var(name)
        .map_err(|_| trace!("🪛️ {name} is not set. Using the default value of {default}s."))
        .and_then(|s| s.trim().parse::<u64>().map_err(|e| warn!("🪛️ Invalid configuration value for {name}. {e}")))
        .unwrap_or(default);
    Duration::from_secs(secs)
}

//-------------------------------------------------  GatewayKeyConfig  -------------------------------------------------
/// Key material used to verify inbound notifications. Read once at start-up, either inline or from `*_FILE` paths.
#[derive(Clone, Debug)]
pub struct GatewayKeyConfig {
    /// Alipay's public key(s), PEM or bare base64. More than one is accepted during a key rotation.
    pub alipay_public_keys: Vec<String>,
    /// Stripe webhook endpoint secrets. More than one is accepted during a secret rotation.
    pub stripe_webhook_secrets: Vec<Secret<String>>,
    pub stripe_tolerance: Duration,
}

impl Default for GatewayKeyConfig {
    fn default() -> Self {
        Self {
            alipay_public_keys: Vec::new(),
            stripe_webhook_secrets: Vec::new(),
            stripe_tolerance: Duration::from_secs(DEFAULT_STRIPE_TOLERANCE_SECS),
        }
    }
}

impl GatewayKeyConfig {
    pub fn from_env_or_defaults() -> Self {
        let alipay_public_keys = ["PNS_ALIPAY_PUBLIC_KEY", "PNS_ALIPAY_PUBLIC_KEY_PREVIOUS"]
            .iter()
            .filter_map(|name| match env_or_file(name) {
                Ok(value) => value.filter(|v| !v.trim().is_empty()),
                Err(e) => {
                    error!("🪛️ Could not read {name}_FILE. {e}");
                    None
                },
            })
            .collect::<Vec<String>>();
        if alipay_public_keys.is_empty() {
            warn!("🪛️ PNS_ALIPAY_PUBLIC_KEY is not set. Alipay notifications will be rejected.");
        }
        let stripe_webhook_secrets = match env_or_file("PNS_STRIPE_WEBHOOK_SECRET") {
            Ok(Some(s)) => split_list(&s).into_iter().map(Secret::new).collect(),
            Ok(None) => {
                warn!("🪛️ PNS_STRIPE_WEBHOOK_SECRET is not set. Stripe notifications will be rejected.");
                Vec::new()
            },
            Err(e) => {
                error!("🪛️ Could not read PNS_STRIPE_WEBHOOK_SECRET_FILE. {e}");
                Vec::new()
            },
        };
        let stripe_tolerance = env_seconds("PNS_STRIPE_TOLERANCE_SECS", DEFAULT_STRIPE_TOLERANCE_SECS);
        Self { alipay_public_keys, stripe_webhook_secrets, stripe_tolerance }
    }

    /// Parses the configured material. A gateway without key material is left unconfigured, and every notification
    /// claiming to come from it fails verification.
    pub fn gateway_keys(&self) -> Result<GatewayKeys, ServerError> {
        let alipay = if self.alipay_public_keys.is_empty() {
            None
        } else {
            let keys = AlipayKeys::from_encoded(&self.alipay_public_keys)
                .map_err(|e| ServerError::ConfigurationError(format!("Invalid Alipay public key. {e}")))?;
            info!("🔑️ {} Alipay public key(s) loaded", keys.len());
            Some(keys)
        };
        let stripe = if self.stripe_webhook_secrets.is_empty() {
            None
        } else {
            let keys = StripeKeys::new(self.stripe_webhook_secrets.clone(), self.stripe_tolerance)
                .map_err(|e| ServerError::ConfigurationError(format!("Invalid Stripe webhook secret. {e}")))?;
            Some(keys)
        };
        Ok(GatewayKeys { alipay, stripe })
    }
}

//-------------------------------------------------  SweeperConfig  ----------------------------------------------------
/// The sweeper polls the gateways for orders that have been `Pending` for a while, in case a notification was lost.
#[derive(Clone, Debug)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Orders are only swept once they have been pending for at least this long.
    pub min_age: Duration,
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            min_age: Duration::from_secs(DEFAULT_SWEEP_MIN_AGE_SECS),
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl SweeperConfig {
    pub fn from_env_or_defaults() -> Self {
        let enabled = env_flag("PNS_SWEEPER_ENABLED", false);
        let interval = env_seconds("PNS_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
        let min_age = env_seconds("PNS_SWEEP_MIN_AGE_SECS", DEFAULT_SWEEP_MIN_AGE_SECS);
        Self { enabled, interval, min_age, batch_size: DEFAULT_SWEEP_BATCH_SIZE }
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_key_config_leaves_gateways_unconfigured() {
        let keys = GatewayKeyConfig::default().gateway_keys().unwrap();
        assert!(keys.alipay.is_none());
        assert!(keys.stripe.is_none());
    }

    #[test]
    fn invalid_alipay_key_is_a_configuration_error() {
        let config = GatewayKeyConfig { alipay_public_keys: vec!["not a key".into()], ..Default::default() };
        assert!(matches!(config.gateway_keys(), Err(ServerError::ConfigurationError(_))));
    }

    #[test]
    fn stripe_secrets() {
        let config = GatewayKeyConfig {
            stripe_webhook_secrets: vec![Secret::new("whsec_a".to_string()), Secret::new("whsec_b".to_string())],
            ..Default::default()
        };
        let keys = config.gateway_keys().unwrap();
        assert!(keys.stripe.is_some());
    }
}
