use sqlx::postgres::PgConnectOptions;

/// Connection settings for the target database, read from the libpq-style `PG*` variables.
#[derive(Debug, serde::Deserialize, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

const VARS: [(&str, &str); 5] = [
    ("host", "PGHOST"),
    ("port", "PGPORT"),
    ("database", "PGDATABASE"),
    ("user", "PGUSER"),
    ("password", "PGPASSWORD"),
];

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut c = config::Config::new();
        c.set_default("host", "localhost")?;
        c.set_default("port", 5432_i64)?;
        c.set_default("database", "analytics")?;
        c.set_default("user", "postgres")?;
        for (key, var) in VARS {
            if let Some(value) = lookup(var) {
                c.set(key, value)?;
            }
        }
        c.try_into()
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let conf = Config::from_lookup(|_| None).unwrap();
        assert_eq!(conf.host, "localhost");
        assert_eq!(conf.port, 5432);
        assert_eq!(conf.database, "analytics");
        assert_eq!(conf.user, "postgres");
        assert_eq!(conf.password, None);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PGHOST", "db.internal"),
            ("PGPORT", "6543"),
            ("PGPASSWORD", "secret"),
        ]
        .into_iter()
        .collect();

        let conf = Config::from_lookup(|var| vars.get(var).map(|v| v.to_string())).unwrap();

        assert_eq!(conf.host, "db.internal");
        assert_eq!(conf.port, 6543);
        assert_eq!(conf.database, "analytics");
        assert_eq!(conf.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(|var| (var == "PGPORT").then(|| "not-a-port".to_string()));
        assert!(result.is_err());
    }
}
