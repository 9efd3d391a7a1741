use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aio", version, about = "All-in-One Toolkit CLI")]
pub struct Cli {
    /// API base URL.
    #[arg(
        long,
        global = true,
        env = "AIO_API_URL",
        default_value = "http://127.0.0.1:3100"
    )]
    pub base_url: String,

    /// Where the access token is kept between runs.
    #[arg(long, global = true, env = "AIO_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print version
    Version,

    /// Log in and store the access token
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "AIO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "AIO_PASSWORD", hide_env_values = true)]
        password: String,

        /// Defaults to `--password`.
        #[arg(long)]
        repeat_password: Option<String>,

        /// Device fingerprint sent with the registration.
        #[arg(long)]
        fingerprint: Option<String>,
    },

    /// Show the logged-in user
    Whoami,

    /// Log out and forget the stored token
    Logout,

    /// Send an authenticated request and print the response body
    Fetch {
        /// API path, e.g. /api/auth/me
        path: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// JSON request body.
        #[arg(short, long)]
        data: Option<String>,
    },
}
