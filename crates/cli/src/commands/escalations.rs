//! `compass escalations` / `compass resolve` - The human-in-the-loop side.

use std::sync::Arc;

use compass_core::{EscalationStatus, Priority};
use compass_workflow::HumanResolution;

use super::{OfflineService, build_tracker, load_config};

/// List pending escalations, or all of them.
pub async fn list(all: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let tracker = build_tracker(&config, Arc::new(OfflineService))?;
    let records = if all {
        tracker.escalations(None).await?
    } else {
        tracker.pending_escalations().await?
    };

    if records.is_empty() {
        println!("  No {}escalations.", if all { "" } else { "pending " });
        return Ok(());
    }

    println!("🚨 Escalations");
    println!("─────────────────────────────────────────────────────────────────");
    for record in &records {
        let priority = match record.priority {
            Priority::Immediate => "IMMEDIATE",
            Priority::High => "high",
            Priority::Normal => "normal",
        };
        let status = match record.status() {
            EscalationStatus::Pending => "⏳ pending".to_string(),
            EscalationStatus::Resolved => format!(
                "✅ resolved by {}",
                record.resolved_by().unwrap_or("unknown")
            ),
        };
        println!("  {}", record.id);
        println!("    Conversation: {}", record.conversation_id);
        println!("    User:         {}", record.user_id);
        println!("    Priority:     {priority}");
        println!("    Reason:       {}", record.trigger_reason);
        println!("    Created:      {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("    Status:       {status}");
        println!();
    }

    tracker.shutdown().await;
    Ok(())
}

/// Resolve an escalation and hand the conversation back to automated routing.
pub async fn resolve(id: String, message: String, by: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let tracker = build_tracker(&config, Arc::new(OfflineService))?;

    let record = tracker
        .resolve_escalation(HumanResolution {
            escalation_id: id,
            expert_message: message,
            resolved_by: by,
        })
        .await?;

    println!("✅ Escalation {} resolved", record.id);
    println!("   Conversation {} is back on automated routing.", record.conversation_id);

    tracker.shutdown().await;
    Ok(())
}
