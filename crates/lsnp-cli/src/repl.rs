use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use lsnp_dispatcher::Coordinator;

use crate::commands::command_table;

const HELP: &[(&str, &str)] = &[
    ("peers", "List known peers"),
    ("post <msg>", "Broadcast a post"),
    ("dm <user_id> <msg>", "Send a direct message"),
    ("follow <user_id>", "Follow a user"),
    ("unfollow <user_id>", "Unfollow a user"),
    ("like <user_id> <ts> [UNLIKE]", "Like/unlike a post"),
    ("group_create <id> \"<name>\" a,b", "Create a group"),
    ("group_update <id> add=a,b remove=c", "Modify group members"),
    ("group_msg <id> <text>", "Send a group message"),
    ("file_send <user_id> <path>", "Send a file"),
    ("accept <fileid>", "Accept incoming file"),
    ("ignore <fileid>", "Ignore incoming file"),
    ("revoke <token>", "Revoke a token"),
    ("ttt_invite <user> [X|O] [gameid]", "Invite to Tic-Tac-Toe"),
    ("ttt_move <user> <gid> <pos> <turn> <symbol>", "Make a move"),
    ("verbose <on/off>", "Toggle verbose logs"),
    ("help", "Show this help"),
    ("exit / quit", "Quit"),
];

fn print_help() {
    let width = HELP.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    println!("\nCommands:");
    for (k, desc) in HELP {
        println!("  {k:<width$}  {desc}");
    }
    println!();
}

/// Reads commands from stdin on a blocking thread and forwards each line to
/// the async REPL loop, mirroring the original's blocking `input("> ")`
/// call inside `App.run`.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        loop {
            print!("> ");
            if io::stdout().flush().is_err() {
                break;
            }
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

/// A toggle the `verbose` command flips at runtime via a
/// `tracing_subscriber::reload::Handle`.
pub trait VerbosityToggle: Send + Sync {
    fn set_verbose(&self, on: bool);
}

pub async fn run(coord: Arc<Coordinator>, verbosity: Option<Arc<dyn VerbosityToggle>>) {
    println!(
        "{} running as {} on {}:{}",
        coord.display_name,
        coord.user_id.as_str(),
        coord.local_ip,
        coord.transport.listen_port()
    );
    println!("Type 'help' for commands. Ctrl+C to quit.");

    let table = command_table();
    let mut lines = spawn_stdin_reader();

    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(l) => l,
                None => {
                    println!("\nShutting down...");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        println!("\n> CMD: {line}");

        let lower = line.to_ascii_lowercase();
        if lower == "quit" || lower == "exit" {
            break;
        }
        if lower == "help" {
            print_help();
            continue;
        }

        let (cmd, args) = line.split_once(' ').unwrap_or((line, ""));
        let cmd_lower = cmd.to_ascii_lowercase();

        if cmd_lower == "verbose" {
            let on = matches!(args.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
            if let Some(toggle) = &verbosity {
                toggle.set_verbose(on);
            }
            println!("Verbose set to {on}");
            continue;
        }

        match table.get(cmd_lower.as_str()) {
            Some(handler) => handler(&coord, args).await,
            None => {
                error!(command = %cmd, "unknown command");
                println!("Unknown command: {cmd}");
            }
        }
    }
}
