use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vidgrab")]
#[command(author, version, about = "Web front-end for yt-dlp with live download progress", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the web server (default)
    Run {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides BIND_ADDR)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Check that the configured yt-dlp binary runs
    Check,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
