use serde::Deserialize;

/// Origins that are always allowed alongside `CLIENT_URL` for local frontends.
const DEV_ORIGINS: [&str; 2] = ["http://localhost:4200", "http://localhost:3000"];

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    /// Separate signing secret for refresh tokens; falls back to `secret`.
    pub refresh_secret: Option<String>,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

impl JwtConfig {
    pub fn refresh_secret(&self) -> &str {
        self.refresh_secret.as_deref().unwrap_or(&self.secret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub client_origins: Vec<String>,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            refresh_secret: std::env::var("JWT_REFRESH_SECRET").ok(),
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "garage-auth".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "garage-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
        };

        let client_origins = client_origins(std::env::var("CLIENT_URL").ok());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(5000);

        Ok(Self {
            database_url,
            jwt,
            client_origins,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            environment: Environment::parse(&std::env::var("APP_ENV").unwrap_or_default()),
        })
    }

    /// Refresh cookies only carry `Secure` in production.
    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn client_origins(client_url: Option<String>) -> Vec<String> {
    let mut origins: Vec<String> = client_url
        .into_iter()
        .flat_map(|v| {
            v.split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .collect::<Vec<_>>()
        })
        .filter(|s| !s.is_empty())
        .collect();
    for dev in DEV_ORIGINS {
        if !origins.iter().any(|o| o == dev) {
            origins.push(dev.to_string());
        }
    }
    origins
}
