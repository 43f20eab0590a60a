//! Interactive chat loop.
//!
//! Reads user turns from stdin, streams the two response channels to
//! the terminal, and maps Ctrl+C onto cancelling the in-flight
//! exchange rather than quitting.

use std::io::Write as _;

use anyhow::{Context, Result};
use mathchat_core::config::Config;
use mathchat_core::error::ChatError;
use mathchat_core::format;
use mathchat_core::session::ChatSession;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::typeset::{self, Typesetter};

pub async fn run(config: Config, model_override: Option<String>, probe_typeset: bool) -> Result<()> {
    let mut session = ChatSession::new(config);
    if let Some(model) = &model_override {
        session.set_model(model);
    }

    // Ctrl+C cancels the in-flight exchange; it does not quit.
    let canceller = session.canceller();
    ctrlc::set_handler(move || canceller.cancel()).expect("Error setting Ctrl+C handler");

    let typesetter: Box<dyn Typesetter> = if probe_typeset {
        typeset::probe().await
    } else {
        Box::new(typeset::PlainText)
    };

    match session.current_model() {
        Some(model) => println!("mathchat — model: {} ({})", model.name, model.id),
        None => println!("mathchat — no model selected, use /model <id>"),
    }
    println!("Type a question, or /help for commands.");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt()?;
            continue;
        }
        if let Some(command) = input.strip_prefix('/') {
            if !handle_command(&mut session, command)? {
                break;
            }
            prompt()?;
            continue;
        }

        run_exchange(&mut session, input, typesetter.as_ref()).await;
        prompt()?;
    }
    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Runs one exchange, printing each channel as it grows. Callbacks
/// receive the cumulative text, so only the suffix past the previous
/// length is written.
async fn run_exchange(session: &mut ChatSession, input: &str, typesetter: &dyn Typesetter) {
    let mut reasoning_len = 0usize;
    let mut answer_len = 0usize;

    let result = session
        .submit(
            input,
            |reasoning: &str| {
                if reasoning_len == 0 {
                    eprintln!("-- thinking --");
                }
                eprint!("{}", &reasoning[reasoning_len..]);
                reasoning_len = reasoning.len();
            },
            |answer: &str| {
                if answer_len == 0 {
                    println!("-- answer --");
                }
                print!("{}", &answer[answer_len..]);
                answer_len = answer.len();
                let _ = std::io::stdout().flush();
            },
        )
        .await;

    match result {
        Ok(answer) => {
            println!();
            let markup = format::render(&answer);
            let rendered = typesetter.render(&markup).unwrap_or(markup);
            println!("{rendered}");
        }
        // The three failure notices are deliberately distinct: a user
        // stop is expected, an unflagged cancellation is a fault.
        Err(ChatError::Cancelled {
            user_initiated: true,
        }) => println!("\n[stopped]"),
        Err(ChatError::Cancelled {
            user_initiated: false,
        }) => eprintln!("\nThe request was cancelled unexpectedly; this may be an internal fault."),
        Err(err) => eprintln!("\nError: {err}. Please try again."),
    }
}

/// Handles a `/command`. Returns false when the loop should exit.
fn handle_command(session: &mut ChatSession, command: &str) -> Result<bool> {
    let (name, arg) = command
        .split_once(' ')
        .map_or((command, ""), |(name, arg)| (name, arg.trim()));

    match name {
        "quit" | "exit" => return Ok(false),
        "model" if !arg.is_empty() => {
            session.set_model(arg);
            match session.current_model() {
                Some(model) if model.id == arg => println!("model: {}", model.id),
                _ => println!("unknown model: {arg}"),
            }
        }
        "models" => {
            let current = session.current_model().map(|model| model.id.clone());
            for model in session.models() {
                let marker = if Some(&model.id) == current.as_ref() {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {:<28} {}", model.id, model.description);
            }
        }
        "history" => {
            for (index, message) in session.history().iter().enumerate() {
                let flag = if message.include_in_context { "ctx" } else { "   " };
                println!("[{index:>3}] {flag} {:?}: {}", message.role, message.content);
            }
        }
        "context" => match arg.parse::<usize>() {
            Ok(index) => session.toggle_context(index),
            Err(_) => println!("usage: /context <index>"),
        },
        "clear" => session.clear(),
        "export" if !arg.is_empty() => {
            std::fs::write(arg, session.export_transcript())
                .with_context(|| format!("Failed to write transcript: {arg}"))?;
            println!("exported to {arg}");
        }
        "import" if !arg.is_empty() => {
            let json = std::fs::read_to_string(arg)
                .with_context(|| format!("Failed to read transcript: {arg}"))?;
            match session.import_transcript(&json) {
                Ok(()) => println!("imported {} messages", session.history().len()),
                Err(err) => println!("{err}; keeping current history"),
            }
        }
        _ => {
            println!(
                "commands: /model <id>, /models, /history, /context <index>, \
                 /clear, /export <file>, /import <file>, /quit"
            );
        }
    }
    Ok(true)
}
