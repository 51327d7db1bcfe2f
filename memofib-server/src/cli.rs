use crate::config::{LogFormat, ServerConfig};
use crate::core::CancelPolicy;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Default)]
#[command(name = "memofib-server")]
#[command(about = "Fibonacci service with a pluggable result cache", long_about = None)]
#[command(version)]
pub struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Duration that a cache entry will be valid for, e.g. "15s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub cache_expiration: Option<Duration>,

    /// Cache backend module path; empty disables caching
    #[arg(long, value_name = "PATH")]
    pub cache_backend: Option<String>,

    /// Name of the factory symbol in the cache backend module
    #[arg(long, value_name = "NAME")]
    pub cache_backend_factory: Option<String>,

    /// What to do with a computation whose request was cancelled
    #[arg(long, value_enum)]
    pub cancellation: Option<CancelPolicy>,

    /// Abandon requests that take longer than this, e.g. "30s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub request_timeout: Option<Duration>,
}

impl Args {
    /// Build the effective configuration: defaults, then the file, then flags
    pub fn load_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("failed loading config {}", path.display()))?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(timeout) = self.request_timeout {
            config.server.request_timeout = Some(timeout);
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(expiration) = self.cache_expiration {
            config.cache.expiration = expiration;
        }
        if let Some(module) = &self.cache_backend {
            config.cache.backend.module = module.clone();
        }
        if let Some(factory) = &self.cache_backend_factory {
            config.cache.backend.factory = factory.clone();
        }
        if let Some(policy) = self.cancellation {
            config.cache.cancellation = policy;
        }
    }
}
