pub mod commands;
pub mod config;
pub mod content;
pub mod db;
pub mod dedup;
pub mod destinations;
pub mod features;
pub mod interactions;
pub mod lifecycle;
pub mod scheduler;
pub mod services;
pub mod transport;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub features: features::FeatureRegistry,
    pub sources: content::Sources,
    /// Opened once the gateway session is ready
    pub ready: lifecycle::ReadyGate,
    pub shutdown: lifecycle::Shutdown,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
