//! Interactive command front-end.
//!
//! A thin collaborator over the transport: it turns typed lines into
//! `tools/list` / `tools/call` operations and renders outcomes. Tool results
//! arrive through the callback variant, so the prompt stays responsive while
//! a long call (a trace, a profile) is still outstanding.

use std::io::Write;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::{
    console::{self, TimeoutClass},
    error::ConsoleError,
    session::{SessionRegistry, ToolOutcome},
};

#[derive(Debug, PartialEq)]
enum Command {
    ListTools,
    CallTool { name: String, args: Value },
    Sessions,
    Help,
    Quit,
    Unknown(String),
    Nothing,
}

/// A bare word is only treated as a tool name when it is identifier-shaped,
/// so typos don't turn into spurious peer calls.
fn is_tool_name(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic())
        && word.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_args(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.is_empty() {
        Ok(Value::Object(Default::default()))
    } else {
        serde_json::from_str(raw)
    }
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Nothing;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word.to_ascii_lowercase().as_str() {
        "list" => Command::ListTools,
        "sessions" => Command::Sessions,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "call" => match rest.split_once(char::is_whitespace) {
            Some((name, args)) => Command::CallTool {
                name: name.to_string(),
                args: match parse_args(args.trim()) {
                    Ok(args) => args,
                    Err(_) => return Command::Unknown(format!("invalid JSON arguments: {args}")),
                },
            },
            None if !rest.is_empty() => Command::CallTool {
                name: rest.to_string(),
                args: Value::Object(Default::default()),
            },
            None => Command::Unknown("usage: call <tool> [json-args]".to_string()),
        },
        _ if is_tool_name(word) => match parse_args(rest) {
            Ok(args) => Command::CallTool {
                name: word.to_string(),
                args,
            },
            Err(_) => Command::Unknown(format!("invalid JSON arguments: {rest}")),
        },
        other => Command::Unknown(format!("unknown command: {other} (try 'help')")),
    }
}

fn print_help() {
    println!("commands:");
    println!("  list                    list the peer's tools");
    println!("  call <tool> [json]      invoke a tool, arguments as a JSON object");
    println!("  <tool> [json]           shorthand for call");
    println!("  sessions                show known sessions");
    println!("  help, quit");
}

fn print_outcome(name: &str, outcome: ToolOutcome) {
    match outcome {
        Ok(result) => {
            println!("\n[{name}] result:");
            // tools/call results carry content items; print text items,
            // pretty-print anything that parses as JSON.
            match result.get("content").and_then(Value::as_array) {
                Some(items) => {
                    for item in items {
                        if let Some(text) = item.get("text").and_then(Value::as_str) {
                            match serde_json::from_str::<Value>(text) {
                                Ok(parsed) => println!(
                                    "{}",
                                    serde_json::to_string_pretty(&parsed)
                                        .unwrap_or_else(|_| text.to_string())
                                ),
                                Err(_) => println!("{text}"),
                            }
                        }
                    }
                }
                None => println!(
                    "{}",
                    serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string())
                ),
            }
        }
        Err(ConsoleError::Timeout(window)) => {
            println!("\n[{name}] no response within {window:?}");
        }
        Err(e) => println!("\n[{name}] failed: {e}"),
    }
    prompt();
}

fn prompt() {
    print!(">>> ");
    let _ = std::io::stdout().flush();
}

/// Read commands from stdin until `quit` or EOF. Cancels `ct` on exit so the
/// server shuts down with the prompt.
pub async fn run(registry: Arc<SessionRegistry>, ct: CancellationToken) {
    println!("mcp-console — waiting for a peer to connect");
    print_help();
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_command(&line) {
            Command::Nothing => {}
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Unknown(message) => println!("{message}"),
            Command::Sessions => {
                let sessions = registry.sessions();
                if sessions.is_empty() {
                    println!("no sessions");
                }
                for session in sessions {
                    let client = session
                        .client_info()
                        .map(|info| format!("{} v{}", info.name, info.version))
                        .unwrap_or_else(|| "unknown".to_string());
                    println!(
                        "  {}  {}  active={} initialized={} pending={}",
                        session.id,
                        client,
                        session.is_active(),
                        session.is_initialized(),
                        session.pending.len(),
                    );
                }
            }
            Command::ListTools => match console::list_tools(&registry).await {
                Ok(tools) => {
                    println!("{} tools:", tools.len());
                    for tool in tools {
                        println!(
                            "  {}  {}",
                            tool.name,
                            tool.description.as_deref().unwrap_or("")
                        );
                    }
                }
                Err(e) => println!("list failed: {e}"),
            },
            Command::CallTool { name, args } => {
                let window = TimeoutClass::for_tool(&name).duration();
                println!("calling {name} (timeout {window:?})...");
                let printed_name = name.clone();
                let result = console::call_tool(&registry, &name, args, move |outcome| {
                    print_outcome(&printed_name, outcome);
                });
                if let Err(e) = result {
                    println!("call failed: {e}");
                }
            }
        }
        prompt();
    }

    println!("goodbye");
    ct.cancel();
}
