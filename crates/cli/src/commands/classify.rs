//! `compass classify` - Route a message without calling any service.

use compass_routing::Router;

use super::load_config;

pub fn run(text: &str, turn: u32, specialist_workflow: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let router = Router::from_config(&config)?;
    let routed = router.route(text, turn, specialist_workflow);

    if json {
        println!("{}", serde_json::to_string_pretty(&routed.decision)?);
        return Ok(());
    }

    let decision = &routed.decision;
    let join = |items: Vec<&str>| if items.is_empty() { "-".to_string() } else { items.join(", ") };

    println!("🧭 Routing Decision");
    println!("─────────────────────────────────────");
    println!("  Tier:        {}", decision.tier);
    println!("  Rule:        {:?}", routed.classification.rule);
    println!(
        "  Triggers:    {}",
        join(decision.matched_triggers.iter().map(String::as_str).collect())
    );
    println!("  Topics:      {}", join(decision.topics.iter().map(|t| t.as_str()).collect()));
    println!("  Stage:       {}", decision.resulting_stage);
    println!(
        "  Specialist:  {}",
        decision.target_specialist.as_ref().map(|s| s.as_str()).unwrap_or("-")
    );
    if !decision.diagnostics.is_empty() {
        let kinds: Vec<String> = decision.diagnostics.iter().map(|k| k.to_string()).collect();
        println!("  Diagnostics: {}", kinds.join(", "));
    }

    Ok(())
}
