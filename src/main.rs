//! Minimal terminal shell over the collaboration engine. All real logic
//! lives in the library; this binary only wires stdin/stdout to the engine's
//! event interface.

use collabchat::{
    ChatEngine, CollabSettings, ModelRef, Provider, ProviderCredentials, UiEvent,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

fn parse_provider(name: &str) -> Option<Provider> {
    match name.to_lowercase().as_str() {
        "openai" => Some(Provider::OpenAi),
        "anthropic" => Some(Provider::Anthropic),
        "groq" => Some(Provider::Groq),
        "ollama" => Some(Provider::Ollama),
        _ => None,
    }
}

fn print_event(event: UiEvent) {
    match event {
        UiEvent::TextDelta { speaker, text, first } => {
            if first {
                if let Some(name) = speaker {
                    print!("\n{}: ", name);
                }
            }
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        UiEvent::TurnCompleted { model, elapsed_secs } => {
            println!("\n[{} answered in {:.2}s]", model, elapsed_secs);
        }
        UiEvent::RoundCompleted { round } => println!("[round {} finished]", round),
        UiEvent::CollaborationStopped => println!("Chat stopped by user."),
        UiEvent::Error(message) => eprintln!("Error: {}", message),
        UiEvent::ResponseTimes(_) => {} // chart data; nothing to render here
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let credentials = ProviderCredentials::from_env();
    let (engine, mut events) = ChatEngine::new(credentials);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(event);
        }
    });

    let available = engine.refresh_models().await;
    for (provider, models) in &available {
        println!("{}: {} models available", provider, models.len());
    }
    println!(
        "Commands: /model <provider> <id>, /role <name>, /cot on|off, \
         /collab <provider> <id> <provider> <id>, /rounds <n>, /stop, /clear, /quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut settings = CollabSettings::default();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("/quit") => break,
            Some("/stop") => engine.stop().await,
            Some("/clear") => engine.clear_conversation().await,
            Some("/model") => match (parts.next().and_then(parse_provider), parts.next()) {
                (Some(provider), Some(id)) => {
                    engine.select_model(ModelRef::new(provider, id)).await;
                    println!("Selected {} model {}", provider, id);
                }
                _ => eprintln!("Usage: /model <provider> <id>"),
            },
            Some("/role") => {
                let role = parts.collect::<Vec<_>>().join(" ");
                engine.set_role(role).await;
            }
            Some("/cot") => {
                engine
                    .set_chain_of_thought(parts.next() == Some("on"))
                    .await;
            }
            Some("/rounds") => {
                if let Some(n) = parts.next().and_then(|n| n.parse().ok()) {
                    settings.rounds = n;
                    engine.update_settings(settings.clone()).await;
                }
            }
            Some("/collab") => {
                let picks = (
                    parts.next().and_then(parse_provider),
                    parts.next(),
                    parts.next().and_then(parse_provider),
                    parts.next(),
                );
                if let (Some(p1), Some(m1), Some(p2), Some(m2)) = picks {
                    let _ = engine
                        .start_collaboration(
                            ModelRef::new(p1, m1),
                            ModelRef::new(p2, m2),
                            settings.clone(),
                        )
                        .await;
                } else {
                    eprintln!("Usage: /collab <provider> <id> <provider> <id>");
                }
            }
            Some(_) | None => {
                if !line.is_empty() {
                    let _ = engine.submit_user_message(&line).await;
                }
            }
        }
    }

    Ok(())
}
