use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "NNB";
pub const DEFAULT_BASE_URL: &str = "https://payport.novalnet.de/v2/";

#[derive(Clone, Deserialize, Debug)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub webhook: WebhookSettings,
    pub server: Server,
    pub log: Log,
    #[serde(default)]
    pub storage: Storage,
}

#[derive(Clone, Deserialize, Debug)]
pub struct GatewaySettings {
    pub base_url: String,
    #[serde(default)]
    pub payment_access_key: Option<String>,
    #[serde(default)]
    pub product_activation_key: Option<String>,
    #[serde(default)]
    pub tariff: Option<String>,
    /// Upper bound of one provider call.
    pub timeout_secs: u64,
    /// Where the hosted payment page sends the customer back to.
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct WebhookSettings {
    #[serde(default)]
    pub send_mail_to: Option<String>,
    pub mail_from: String,
    pub verify_checksum: bool,
    #[serde(default)]
    pub url: Option<String>,
    /// Accept deliveries from any address.
    pub allow_manual_testing: bool,
    /// Host whose addresses may deliver webhooks.
    pub source_host: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Default,
    Json,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Log {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Clone, Deserialize, Debug, Default)]
pub struct Storage {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Settings {
    /// Defaults, then the optional file, then `NNB__SECTION__KEY` environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = Self::builder()?;
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn builder()
    -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("gateway.base_url", DEFAULT_BASE_URL)?
            .set_default("gateway.timeout_secs", 60)?
            .set_default("webhook.mail_from", "no-reply@localhost")?
            .set_default("webhook.verify_checksum", true)?
            .set_default("webhook.allow_manual_testing", false)?
            .set_default("webhook.source_host", crate::application::engine::NOVALNET_HOST)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("log.level", "info")?
            .set_default("log.format", "default")
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if let Some(mail) = &self.webhook.send_mail_to
            && !is_valid_email(mail)
        {
            return Err(config::ConfigError::Message(format!(
                "Email address is not valid: '{mail}'"
            )));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "gateway.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.gateway.base_url.starts_with("http") {
            return Err(config::ConfigError::Message(format!(
                "Invalid gateway.base_url '{}'",
                self.gateway.base_url
            )));
        }
        Ok(())
    }
}

/// `local@domain.tld`, with the characters the webhook mail field accepts.
pub fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.+-".contains(c));
    let Some((host, tld)) = domain.split_once('.') else {
        return false;
    };
    let host_ok = !host.is_empty() && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    let tld_ok = !tld.is_empty()
        && tld
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    local_ok && host_ok && tld_ok
}
