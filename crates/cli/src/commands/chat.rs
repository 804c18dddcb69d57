//! `mindkeep chat`: single-message or interactive chat.

use mindkeep_assistant::{ChatRequest, DegradationController, ResponseEnvelope};
use mindkeep_config::AppConfig;
use mindkeep_core::message::{ConversationId, OwnerId};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct ChatArgs {
    pub owner: Option<String>,
    pub conversation: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let owner = args
        .owner
        .clone()
        .or_else(|| config.assistant.default_owner.clone())
        .unwrap_or_else(|| {
            eprintln!("  ⚠️  No owner given; replies will not be saved. Pass --owner or set assistant.default_owner.");
            String::new()
        });

    if !config.has_api_key() {
        eprintln!("  ⚠️  No API key configured; replies will come from local templates.");
    }

    let state = mindkeep_gateway::build_state(&config).await?;
    let controller = state.controller.clone();

    let mut session = Session {
        owner: OwnerId::from(owner.as_str()),
        conversation: args.conversation.as_deref().map(ConversationId::from),
        title: args.title.clone(),
    };

    if let Some(msg) = args.message {
        let envelope = session.send(&controller, &msg).await?;
        println!("{}", envelope.content);
        print_footer(&envelope);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Mindkeep · Interactive Mode");
    println!();
    println!("  Owner:     {owner}");
    println!("  Model:     {}", config.generation.model);
    println!("  Store:     {}", config.store.backend);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match session.send(&controller, line).await {
            Ok(envelope) => {
                println!();
                println!("  Mindkeep > {}", envelope.content);
                print_footer(&envelope);
                println!();
            }
            Err(e) => {
                eprintln!("  ❌ {e}");
                eprintln!("     Your message was not saved. Please try again.");
            }
        }
    }

    println!("  Goodbye!");
    Ok(())
}

/// Tracks the conversation across turns of one CLI session.
struct Session {
    owner: OwnerId,
    conversation: Option<ConversationId>,
    title: Option<String>,
}

impl Session {
    async fn send(
        &mut self,
        controller: &DegradationController,
        message: &str,
    ) -> Result<ResponseEnvelope, Box<dyn std::error::Error>> {
        let mut request = ChatRequest::new(self.owner.clone(), message);
        if let Some(id) = &self.conversation {
            request = request.in_conversation(id.clone());
        }
        if let Some(title) = self.title.take() {
            request = request.with_title(title);
        }

        let envelope = controller.handle(request).await?;

        if envelope.conversation_id.is_some() {
            self.conversation = envelope.conversation_id.clone();
        }
        Ok(envelope)
    }
}

fn print_footer(envelope: &ResponseEnvelope) {
    let saved = if envelope.persisted { "saved" } else { "not saved" };
    eprintln!(
        "  [{} · confidence {:.2} · {} · {}ms]",
        envelope.level, envelope.confidence, saved, envelope.processing_time_ms
    );
    if let Some(id) = &envelope.conversation_id {
        tracing::debug!(conversation_id = %id, "Chat turn complete");
    }
}
