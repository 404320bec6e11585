//! illum-ctl: command-line interface for the Illuminate daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::http::Credentials;

const DEFAULT_PORT: u16 = 8000;

fn print_usage() {
    println!("Usage: illum-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                              Show sessions and calculation slots");
    println!("  session create                      Create a session and print its token");
    println!("  session status    <id> <token>      Show a session's model summary");
    println!("  session estimate  <id> <token>      Show cost and time estimate");
    println!("  session calculate <id> <token>      Run the calculation");
    println!("  session drop      <id> <token>      Delete the session");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["session", "create"] => cmd::session::cmd_session_create(port).await,
        ["session", action, session_id, token] => {
            let creds = Credentials {
                session_id: *session_id,
                token: *token,
            };
            match *action {
                "status" => cmd::session::cmd_session_status(port, &creds).await,
                "estimate" => cmd::session::cmd_session_estimate(port, &creds).await,
                "calculate" => cmd::session::cmd_session_calculate(port, &creds).await,
                "drop" => cmd::session::cmd_session_drop(port, &creds).await,
                other => unknown(other),
            }
        }
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => unknown(&other.join(" ")),
    }
}

fn unknown(command: &str) -> Result<()> {
    eprintln!("Unknown command: {}", command);
    eprintln!();
    print_usage();
    std::process::exit(1);
}
