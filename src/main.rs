/* src/main.rs */

use dotenvy::dotenv;
use fancy_log::{LogLevel, log, set_log_level};
use lazy_motd::lazy_motd;
use mini_dns::{
    AnswerCache, AppConfig, DnsResolver, Forwarder, UdpExchange, ZoneStore, dns_server,
};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- Initialization ---
    dotenv().ok();
    let level = env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();
    let log_level = match level.as_str() {
        "debug" => LogLevel::Debug,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    };
    set_log_level(log_level);
    lazy_motd!();

    // --- Load Config ---
    let config = match AppConfig::load_or_create_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            log(LogLevel::Error, &format!("Failed to load config: {}", e));
            return Err(e.into());
        }
    };

    // --- Initialize Services ---
    let store = match ZoneStore::from_config(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log(LogLevel::Error, &format!("Failed to create zones: {}", e));
            return Err(e.into());
        }
    };
    let forwarder = Forwarder::new(
        Arc::new(UdpExchange),
        config.dns.retries,
        config.dns.timeout_ms,
    );
    let resolver = Arc::new(DnsResolver::new(
        store,
        AnswerCache::default(),
        forwarder,
        config.effective_max_depth(),
        config.silent,
    ));

    // --- Start DNS Server ---
    let bind_addr = if config.dns.host.contains(':') {
        format!("[{}]:{}", config.dns.host, config.dns.port)
    } else {
        format!("{}:{}", config.dns.host, config.dns.port)
    };
    log(
        LogLevel::Info,
        &format!("mini-dns server starting on {}", bind_addr),
    );

    dns_server::run_server(&bind_addr, resolver).await?;

    Ok(())
}
