use std::time::Duration;

use anyhow::{Context, bail};
use envconfig::Envconfig;
use url::Url;

#[derive(Debug, Clone, Envconfig)]
pub struct StalkConfig {
    #[envconfig(from = "STALK_HOST", default = "127.0.0.1")]
    pub host: String,
    #[envconfig(from = "STALK_PORT", default = "8001")]
    pub port: u16,
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: log::Level,
    #[envconfig(from = "STALK_REDIS_HOST", default = "localhost")]
    pub redis_host: String,
    #[envconfig(from = "STALK_REDIS_PORT", default = "6379")]
    pub redis_port: u16,
    #[envconfig(from = "STALK_REDIS_DB", default = "0")]
    pub redis_db: u32,
    #[envconfig(from = "STALK_WINDOW_MINUTES", default = "30")]
    pub window_minutes: u64,
    #[envconfig(from = "STALK_BUILD_INTERVAL_SEC", default = "5")]
    pub build_interval_sec: u64,
    #[envconfig(from = "STALK_BUILD_TIMEOUT_MS", default = "3000")]
    pub build_timeout_ms: u64,
}

impl StalkConfig {
    pub fn fetch() -> anyhow::Result<Self> {
        let cfg = Self::init_from_env().context("Failed to load stalk config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_host("STALK_HOST", &self.host)?;
        validate_host("STALK_REDIS_HOST", &self.redis_host)?;
        if self.port == 0 {
            bail!("STALK_PORT must be greater than 0");
        }
        if self.redis_port == 0 {
            bail!("STALK_REDIS_PORT must be greater than 0");
        }
        if self.window_minutes == 0 {
            bail!("STALK_WINDOW_MINUTES must be greater than 0");
        }
        validate_build_schedule(self.build_interval_sec, self.build_timeout_ms)?;
        validate_redis_url(&self.redis_url())?;
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn redis_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.redis_host.trim(),
            self.redis_port,
            self.redis_db
        )
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes * 60)
    }

    pub fn build_interval(&self) -> Duration {
        Duration::from_secs(self.build_interval_sec)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }
}

fn validate_host(name: &str, host: &str) -> anyhow::Result<()> {
    if host.trim().is_empty() {
        bail!("{name} must be set");
    }
    Ok(())
}

fn validate_build_schedule(build_interval_sec: u64, build_timeout_ms: u64) -> anyhow::Result<()> {
    if build_interval_sec == 0 {
        bail!("STALK_BUILD_INTERVAL_SEC must be greater than 0");
    }
    if build_timeout_ms == 0 {
        bail!("STALK_BUILD_TIMEOUT_MS must be greater than 0");
    }
    if build_timeout_ms >= build_interval_sec.saturating_mul(1_000) {
        bail!(
            "STALK_BUILD_TIMEOUT_MS ({build_timeout_ms}) must be shorter than STALK_BUILD_INTERVAL_SEC ({build_interval_sec}s)"
        );
    }
    Ok(())
}

fn validate_redis_url(redis_url: &str) -> anyhow::Result<()> {
    let parsed = Url::parse(redis_url).context("Redis connection URL is not a valid URL")?;
    if parsed.host_str().is_none() {
        bail!("Redis connection URL must include a host");
    }
    Ok(())
}
