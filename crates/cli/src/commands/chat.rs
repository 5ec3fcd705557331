//! `compass chat` - Interactive or single-message conversation.

use std::io::Write;
use std::sync::Arc;

use compass_config::AppConfig;
use compass_core::{ConversationId, UserId};
use compass_specialists::OpenAiCompatService;
use compass_workflow::{TurnChunk, TurnRequest, TurnResponse};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{build_tracker, load_config};

pub async fn run(
    message: Option<String>,
    conversation: Option<String>,
    user: String,
    specialist_workflow: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    // Check for API key early - give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    COMPASS_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let service = Arc::new(OpenAiCompatService::from_config(&config)?);
    let tracker = build_tracker(&config, service)?;
    let user_id = UserId(user);
    let mut conversation_id = conversation.map(ConversationId).unwrap_or_default();

    if let Some(msg) = message {
        // Single message mode
        let request = TurnRequest::new(msg, user_id)
            .in_conversation(conversation_id)
            .with_specialist_workflow(specialist_workflow);

        eprint!("  Thinking...");
        let response = tracker.process_turn(request).await;
        eprint!("\r              \r");
        println!("{}", response.content);
        print_footer(&response);
    } else {
        // Interactive mode
        println!();
        println!("  ╔══════════════════════════════════════════════╗");
        println!("  ║        Compass - Interactive Mode            ║");
        println!("  ╚══════════════════════════════════════════════╝");
        println!();
        println!("  Provider:      {}", config.provider);
        println!("  Model:         {}", config.model);
        println!("  Store:         {}", tracker.store().name());
        println!("  Conversation:  {conversation_id}");
        println!();
        println!("  Type your message and press Enter.");
        println!("  Type 'exit' or Ctrl+C to quit.");
        println!();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        print!("  You > ");
        std::io::stdout().flush()?;

        while let Some(line) = lines.next_line().await? {
            let text = line.trim();
            if text == "exit" || text == "quit" {
                break;
            }
            if text.is_empty() {
                print!("  You > ");
                std::io::stdout().flush()?;
                continue;
            }

            let request = TurnRequest::new(text, user_id.clone())
                .in_conversation(conversation_id.clone())
                .with_specialist_workflow(specialist_workflow);

            println!();
            print!("  Compass > ");
            std::io::stdout().flush()?;

            let mut rx = tracker.process_turn_streaming(request);
            while let Some(chunk) = rx.recv().await {
                match chunk {
                    TurnChunk::Chunk { content } => {
                        print!("{content}");
                        std::io::stdout().flush()?;
                    }
                    TurnChunk::Complete { response } => {
                        println!();
                        print_footer(&response);
                        conversation_id = response.conversation_id;
                    }
                    TurnChunk::Error { message } => {
                        println!();
                        eprintln!("  [Error] {message}");
                    }
                }
            }
            println!();

            print!("  You > ");
            std::io::stdout().flush()?;
        }

        println!();
        println!("  Goodbye!");
        println!();
    }

    tracker.shutdown().await;
    Ok(())
}

fn print_footer(response: &TurnResponse) {
    let specialist = response
        .specialist_attribution
        .as_ref()
        .map(|s| s.as_str())
        .unwrap_or("-");
    eprintln!(
        "  [{} | {} | turn {} | {}]",
        response.stage, specialist, response.turn, response.conversation_id
    );
    for source in &response.sources {
        eprintln!("  source: {source}");
    }
}
