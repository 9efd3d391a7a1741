// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::sync::Arc;

use aio_client::{AuthState, ClientConfig, ClientError, FileTokenStore, RegisterForm, SessionManager};
use clap::Parser;
use cli::{Cli, Commands};
use reqwest::Method;

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    let args = Cli::parse();
    logging::init(args.verbose)?;

    if let Commands::Version = args.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(execute(args))
}

fn session(args: &Cli) -> Result<SessionManager> {
    let store = match &args.token_file {
        Some(path) => FileTokenStore::new(path),
        None => FileTokenStore::default_location(),
    };
    log::debug!("token file: {}", store.path().display());
    Ok(SessionManager::new(
        ClientConfig::new(&args.base_url)?,
        Arc::new(store),
    )?)
}

async fn execute(args: Cli) -> Result<()> {
    let session = session(&args)?;

    match args.command {
        Commands::Version => {}
        Commands::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            println!("Logged in as {} <{}>", user.name, user.email);
        }
        Commands::Register {
            name,
            email,
            repeat_password,
            password,
            fingerprint,
        } => {
            let form = RegisterForm {
                name,
                email,
                repeat_password: repeat_password.unwrap_or_else(|| password.clone()),
                password,
                fingerprint,
            };
            let user = session.register(&form).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::Whoami => {
            if session.initialize().await != AuthState::Authenticated {
                return Err(Error::Custom("Not logged in. Run `aio login`.".into()));
            }
            let user = session.current_user().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::Logout => {
            session.logout().await;
            println!("Logged out");
        }
        Commands::Fetch { path, method, data } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| Error::Custom(format!("Invalid HTTP method: {method}")))?;
            let body = data
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?;

            let resp = session.fetch_with_auth(method, &path, body.as_ref()).await?;
            let status = resp.status();
            let text = resp.text().await.map_err(ClientError::from)?;
            println!("{text}");
            if !status.is_success() {
                return Err(Error::Custom(format!("{path}: {status}")));
            }
        }
    }

    Ok(())
}
