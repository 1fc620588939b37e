use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

/// LSNP peer: a decentralized, UDP-based local social networking node.
#[derive(Parser, Debug)]
#[command(name = "lsnp", about = "A decentralized, UDP-based local social networking peer")]
pub struct Cli {
    /// Print shell completions for the given shell and exit.
    #[arg(long, value_enum)]
    pub completions: Option<Shell>,

    /// UDP port to listen on. 0 picks an ephemeral port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Display name advertised in PROFILE frames.
    #[arg(long)]
    pub name: Option<String>,

    /// Default token TTL, in seconds.
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Induced packet loss probability (0..1) for game/file traffic.
    #[arg(long)]
    pub loss: Option<f64>,

    /// Emit SEND/RECV/DROP traces for every frame.
    #[arg(long)]
    pub verbose: bool,

    /// Force single-machine loopback testing (user id binds to 127.0.0.1).
    #[arg(long)]
    pub loopback: bool,

    /// Path to an explicit YAML config file, merged over the discovered layers.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

/// Write a shell completion script for `Cli` to stdout.
pub fn print_completions(shell: Shell) {
    use clap::CommandFactory;
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
