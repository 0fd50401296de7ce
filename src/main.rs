//! Terminal chat client
//!
//! Reads prompts from stdin and renders replies as they stream in. Lines
//! starting with `/` are commands.

use molly::llm::MessageRole;
use molly::{ChatConfig, ChatError, ChatHandle, ChatView, GraphqlTransport, LoggingTransport};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Prompt(String),
    Retry,
    Clear,
    Cancel,
    Dismiss,
    Status,
    Reconnect,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "/retry" => Input::Retry,
        "/clear" => Input::Clear,
        "/cancel" => Input::Cancel,
        "/dismiss" => Input::Dismiss,
        "/status" => Input::Status,
        "/reconnect" => Input::Reconnect,
        "/quit" | "/exit" => Input::Quit,
        other if other.starts_with('/') => Input::Unknown(other.to_string()),
        _ => Input::Prompt(line.to_string()),
    }
}

/// Prints the open reply incrementally
#[derive(Default)]
struct ReplyPrinter {
    shown: String,
    streaming: bool,
    last_error: Option<String>,
}

impl ReplyPrinter {
    fn render(&mut self, view: &ChatView) {
        let reply = view
            .last_message()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str());

        if view.status.sending {
            let text = reply.unwrap_or_default();
            if !self.streaming {
                self.streaming = true;
                self.shown.clear();
                print!("< ");
            }
            match text.strip_prefix(self.shown.as_str()) {
                Some(delta) => print!("{delta}"),
                // Fragments replace the whole reply; start the line over
                None => print!("\n< {text}"),
            }
            self.shown = text.to_string();
            let _ = std::io::stdout().flush();
        } else if self.streaming {
            self.streaming = false;
            if let Some(text) = reply {
                if let Some(delta) = text.strip_prefix(self.shown.as_str()) {
                    print!("{delta}");
                }
            }
            println!();
        }

        if view.status.last_error != self.last_error {
            if let Some(error) = &view.status.last_error {
                eprintln!("! {error}");
            }
            self.last_error.clone_from(&view.status.last_error);
        }
    }
}

async fn run_input(handle: &ChatHandle, input: Input) -> Result<(), ChatError> {
    match input {
        Input::Prompt(text) => handle.submit(text).await,
        Input::Retry => handle.retry_last().await,
        Input::Clear => {
            handle.clear().await?;
            println!("(transcript cleared)");
            Ok(())
        }
        Input::Cancel => handle.cancel().await,
        Input::Dismiss => handle.dismiss_error().await,
        Input::Reconnect => handle.recheck_connectivity().await,
        Input::Status => {
            let view = handle.snapshot();
            println!(
                "messages: {}  sending: {}  connectivity: {:?}",
                view.messages.len(),
                view.status.sending,
                view.connectivity
            );
            Ok(())
        }
        Input::Unknown(command) => {
            eprintln!("unknown command: {command}");
            Ok(())
        }
        Input::Quit => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout belongs to the conversation
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "molly=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("MOLLY_LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry.with(fmt_layer.json()).init();
    } else {
        registry.with(fmt_layer).init();
    }

    let config = ChatConfig::from_env()?;
    tracing::info!(
        endpoint = %config.transport.endpoint,
        model = %config.transport.model,
        history = ?config.history,
        "Configuration loaded"
    );

    let transport = GraphqlTransport::new(&config.transport)?;
    let handle = ChatHandle::spawn(LoggingTransport::new(Arc::new(transport)), config.history);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut views = handle.subscribe();
    let mut printer = ReplyPrinter::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = parse_input(&line);
                if input == Input::Quit {
                    break;
                }
                if let Err(e) = run_input(&handle, input).await {
                    eprintln!("! {e}");
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                printer.render(&view);
            }
        }
    }

    if handle.snapshot().status.sending {
        let _ = handle.cancel().await;
    }
    Ok(())
}
