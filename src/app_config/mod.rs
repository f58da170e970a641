use config::{Config, ConfigError, Environment, File, FileFormat};
use log::warn;

use crate::data::model::Channel;
use crate::generator::funnel::SESSION_SPAN_MINUTES;

const ENV_PREFIX: &str = "SEED";

/// About a century; keeps signup arithmetic far inside chrono's date range.
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;
pub const MAX_SESSIONS_PER_USER: usize = 1_000;

/// Conditional stage probabilities: view, add given view, purchase given add.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct Funnel {
    pub view: f64,
    pub add: f64,
    pub purchase: f64,
}

impl Funnel {
    pub const fn new(view: f64, add: f64, purchase: f64) -> Self {
        Self {
            view,
            add,
            purchase,
        }
    }
}

/// One value per acquisition channel. Lookups are total.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ChannelTable<T> {
    pub tiktok: T,
    pub instagram: T,
    pub google: T,
    pub referral: T,
}

impl<T> ChannelTable<T> {
    pub fn get(&self, channel: Channel) -> &T {
        match channel {
            Channel::Tiktok => &self.tiktok,
            Channel::Instagram => &self.instagram,
            Channel::Google => &self.google,
            Channel::Referral => &self.referral,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &T)> {
        Channel::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub n_new_users: usize,
    pub max_days_ago_signup: u32,
    pub p_return_next_day: f64,
    pub p_return_week: f64,
    /// Gap used by downstream SQL sessionization. Only checked, never used to schedule.
    pub session_gap_minutes: u32,
    pub max_sessions_per_user: usize,
    pub seed: u64,
    pub batch_size: usize,
    pub schema_file: Option<String>,
    /// Write NDJSON files here instead of connecting to PostgreSQL.
    pub output_dir: Option<String>,
    pub channel_weights: ChannelTable<f64>,
    pub funnel: ChannelTable<Funnel>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            n_new_users: 2000,
            max_days_ago_signup: 45,
            p_return_next_day: 0.25,
            p_return_week: 0.12,
            session_gap_minutes: 30,
            max_sessions_per_user: 6,
            seed: 42,
            batch_size: 5000,
            schema_file: None,
            output_dir: None,
            channel_weights: ChannelTable {
                tiktok: 0.35,
                instagram: 0.25,
                google: 0.25,
                referral: 0.15,
            },
            funnel: ChannelTable {
                tiktok: Funnel::new(0.85, 0.28, 0.18),
                instagram: Funnel::new(0.80, 0.32, 0.20),
                google: Funnel::new(0.75, 0.35, 0.25),
                referral: Funnel::new(0.70, 0.40, 0.30),
            },
        }
    }
}

fn check_probability(name: &str, p: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(ConfigError::Message(format!(
            "{} must be within [0, 1], got {}",
            name, p
        )))
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("p_return_next_day", self.p_return_next_day)?;
        check_probability("p_return_week", self.p_return_week)?;
        for (channel, funnel) in self.funnel.iter() {
            let c = channel.as_str();
            check_probability(&format!("funnel.{}.view", c), funnel.view)?;
            check_probability(&format!("funnel.{}.add", c), funnel.add)?;
            check_probability(&format!("funnel.{}.purchase", c), funnel.purchase)?;
        }
        if !(1..=MAX_SESSIONS_PER_USER).contains(&self.max_sessions_per_user) {
            return Err(ConfigError::Message(format!(
                "max_sessions_per_user must be within [1, {}], got {}",
                MAX_SESSIONS_PER_USER, self.max_sessions_per_user
            )));
        }
        if self.max_days_ago_signup > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::Message(format!(
                "max_days_ago_signup must be at most {}, got {}",
                MAX_LOOKBACK_DAYS, self.max_days_ago_signup
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Message(
                "batch_size must be at least 1".to_string(),
            ));
        }
        let mut total = 0.0;
        for (channel, weight) in self.channel_weights.iter() {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::Message(format!(
                    "channel_weights.{} must be a non-negative number, got {}",
                    channel.as_str(),
                    weight
                )));
            }
            total += weight;
        }
        if total <= 0.0 {
            return Err(ConfigError::Message(
                "channel_weights must not all be zero".to_string(),
            ));
        }
        if self.session_gap_minutes <= SESSION_SPAN_MINUTES {
            warn!(
                "session_gap_minutes={} does not exceed the {} minute in-session event span; \
                 gap-based sessionization may split generated sessions",
                self.session_gap_minutes, SESSION_SPAN_MINUTES
            );
        }
        Ok(())
    }
}

pub struct AppConfig {
    conf: Config,
}

impl AppConfig {
    pub fn init() -> Self {
        Self {
            conf: Config::new(),
        }
    }

    /// Merges `SEED_*` variables, after loading `.env` when present.
    pub fn from_env(mut self) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        self.conf.merge(Environment::with_prefix(ENV_PREFIX))?;
        Ok(self)
    }

    pub fn from_file(mut self, filename: &str, file_format: FileFormat) -> Result<Self, ConfigError> {
        self.conf.merge(File::new(filename, file_format))?;
        Ok(self)
    }

    /// Like `from_file`, but the extension is detected and a missing file is fine.
    pub fn from_optional_file(mut self, basename: &str) -> Result<Self, ConfigError> {
        self.conf.merge(File::with_name(basename).required(false))?;
        Ok(self)
    }

    /// Registers every channel entry as its own default, so a source that
    /// sets only some channels or stages keeps the rest.
    fn set_channel_defaults(&mut self) -> Result<(), ConfigError> {
        let defaults = Settings::default();
        for (channel, weight) in defaults.channel_weights.iter() {
            self.conf
                .set_default(&format!("channel_weights.{}", channel.as_str()), *weight)?;
        }
        for (channel, funnel) in defaults.funnel.iter() {
            let c = channel.as_str();
            self.conf.set_default(&format!("funnel.{}.view", c), funnel.view)?;
            self.conf.set_default(&format!("funnel.{}.add", c), funnel.add)?;
            self.conf
                .set_default(&format!("funnel.{}.purchase", c), funnel.purchase)?;
        }
        Ok(())
    }

    pub fn parse(mut self) -> Result<Settings, ConfigError> {
        self.set_channel_defaults()?;
        let settings: Settings = self.conf.try_into()?;
        settings.validate()?;
        Ok(settings)
    }
}
