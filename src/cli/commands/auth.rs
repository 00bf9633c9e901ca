use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::cli::config::{assistant_client, host_client, open_session};
use crate::cli::utils::{output_details, output_error, output_success};
use crate::cli::OutputFormat;
use crate::client::{AssistantApi, HostApi};
use crate::config::config;
use crate::login::{LoginController, LoginState, PageContext};
use crate::window::ConsoleWindow;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login to the host and store the session")]
    Login {
        #[arg(help = "Username")]
        username: Option<String>,
        #[arg(long, help = "Password (read from stdin if not provided)")]
        password: Option<String>,
        #[arg(long, help = "Login page URL; username/password query parameters log in automatically")]
        url: Option<String>,
    },

    #[command(about = "Clear the stored session and log out of the assistant")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Show current user information from the host")]
    Whoami,
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { username, password, url } => login(username, password, url, output_format).await,
        AuthCommands::Logout => logout(output_format).await,
        AuthCommands::Status => status(output_format).await,
        AuthCommands::Whoami => whoami(output_format).await,
    }
}

async fn login(
    username: Option<String>,
    password: Option<String>,
    url: Option<String>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let cfg = config();
    let session = open_session()?;
    let host = Arc::new(host_client()?);
    let mut controller = LoginController::new(
        host,
        session.clone(),
        Arc::new(ConsoleWindow),
        cfg.home_url(),
        cfg.login.probe_timeout(),
    );

    let page = match url {
        Some(url) => PageContext::from_url(&url, false).with_context(|| format!("invalid login URL '{}'", url))?,
        None => PageContext::default(),
    };

    let mut state = controller.start(&page).await;
    if state.renders_form() {
        let Some(username) = username else {
            anyhow::bail!("username required (or pass --url with username and password parameters)");
        };
        let password = match password {
            Some(password) => password,
            None => read_password()?,
        };
        state = controller.submit(&username, &password).await;
    }

    match state {
        LoginState::Success => {
            let user = session.user();
            let name = user.as_ref().map(|u| u.display_name());
            let message = match &name {
                Some(name) => format!("Logged in as {}", name),
                None => "Logged in".to_string(),
            };
            output_success(&output_format, &message, Some(json!({ "user": user })))
        }
        other => {
            let message = other.error().unwrap_or("Login did not complete").to_string();
            output_error(&output_format, &message, Some("LOGIN_FAILED"))?;
            anyhow::bail!(message)
        }
    }
}

fn read_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
}

async fn logout(output_format: OutputFormat) -> anyhow::Result<()> {
    let session = open_session()?;
    let token = session.token();
    session.clear().context("failed to clear stored session")?;

    // Both calls are best effort; the local session is already gone.
    if let Some(token) = token {
        if let Err(e) = host_client()?.with_token(token).logout().await {
            tracing::warn!("Host logout failed: {}", e);
        }
    }
    let assistant = assistant_client()?;
    let assistant_logged_out = match assistant.logout().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Assistant logout failed: {}", e);
            false
        }
    };

    output_success(
        &output_format,
        "Logged out",
        Some(json!({ "assistant_logged_out": assistant_logged_out })),
    )
}

async fn status(output_format: OutputFormat) -> anyhow::Result<()> {
    let session = open_session()?;
    let Some(credential) = session.get() else {
        return output_details(&output_format, &json!({ "authenticated": false }));
    };

    let host_accepts = match host_client()?.with_token(credential.token.clone()).probe_session().await {
        Ok(ok) => Some(ok),
        Err(e) => {
            tracing::warn!("Host probe failed: {}", e);
            None
        }
    };

    output_details(
        &output_format,
        &json!({
            "authenticated": true,
            "user": credential.user.display_name(),
            "host": config().host.base_url,
            "host_accepts_token": host_accepts,
        }),
    )
}

async fn whoami(output_format: OutputFormat) -> anyhow::Result<()> {
    let session = open_session()?;
    let token = session.token().context("not logged in; run `iso-hub auth login`")?;
    let profile = host_client()?
        .with_token(token)
        .current_user()
        .await
        .context("failed to fetch current user")?;
    output_details(&output_format, &serde_json::to_value(profile)?)
}
