//! `compass status` - Show configuration and store counts.

use compass_config::AppConfig;

use super::load_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    println!("🧭 Compass Status");
    println!("=================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Provider:     {}", config.provider);
    println!("  API URL:      {}", config.api_url);
    println!("  Model:        {}", config.model);
    println!("  Temperature:  {}", config.temperature);
    println!("  API key:      {}", if config.has_api_key() { "configured" } else { "missing" });
    println!("  Timeout:      {}s", config.invocation.timeout_secs);
    println!("  Store:        {}", config.store.backend);
    if config.store.backend == "file" {
        println!("  Data dir:     {}", config.data_dir().display());
    }
    println!(
        "  Analytics:    {}",
        if config.analytics.enabled { "enabled" } else { "disabled" }
    );

    match compass_store::open(&config) {
        Ok(store) => match store.stats().await {
            Ok(stats) => {
                println!();
                println!("  Conversations:         {}", stats.conversations);
                println!("  Pending escalations:   {}", stats.pending_escalations);
                println!("  Resolved escalations:  {}", stats.resolved_escalations);
                println!("  Analytics rows:        {}", stats.analytics_rows);
            }
            Err(e) => println!("\n  ⚠️  Store unavailable: {e}"),
        },
        Err(e) => println!("\n  ⚠️  Store unavailable: {e}"),
    }

    // Check config file existence
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file - run `compass onboard` first");
    }

    Ok(())
}
