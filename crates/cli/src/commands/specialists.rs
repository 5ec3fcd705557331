//! `compass specialists` - List the registry.

use compass_routing::SpecialistRegistry;

use super::load_config;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let registry = SpecialistRegistry::from_config(&config.specialists)?;

    println!("🧑‍💼 Specialists");
    println!("─────────────────────────────────────────────────────────────────");
    println!("{:<24} {:<36} {}", "Id", "Capabilities", "Fallback");
    println!("{:<24} {:<36} {}", "──", "────────────", "────────");

    for profile in registry.list() {
        let tags: Vec<&str> = profile.capability_tags.iter().map(String::as_str).collect();
        println!(
            "{:<24} {:<36} {}",
            profile.id.as_str(),
            tags.join(", "),
            profile.fallback_id.as_ref().map(|f| f.as_str()).unwrap_or("-")
        );
    }

    Ok(())
}
