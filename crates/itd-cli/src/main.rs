//! Command-line front end for the ITD API
//!
//! Credentials live in the client's config directory. Output is JSON on
//! stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use itd_client::auth::{FileTokenStore, StoredCredentials, TokenStorage};
use itd_client::http::ReqwestClient;
use itd_client::{
    ConfigManager, ItdClient, NewPost, Session, SessionOptions, SessionState, StreamEvent,
};

/// ITD social network client
#[derive(Parser)]
#[command(name = "itd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stores a refresh token and checks it against the server
    Login {
        /// Value of the `refresh_token` cookie
        refresh_token: String,
    },
    /// Revokes the stored refresh token and forgets it
    Logout,
    /// Shows the current user's profile
    Me,
    /// Shows another user's profile
    User { username: String },
    /// Lists notifications
    Notifications {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Prints the number of unread notifications
    Count,
    /// Publishes a text post
    Post { content: String },
    /// Follows the live notification feed until the server closes it
    Stream,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = FileTokenStore::new()?;
    let options = SessionOptions::from(&ConfigManager::new()?.get());

    if let Commands::Login { refresh_token } = &cli.command {
        return login(&store, &options, refresh_token).await;
    }

    let credentials = store
        .load()
        .await
        .context("Not logged in, run `itd login <refresh-token>` first")?;
    let client = connect(&credentials, &options)?;

    let keep_credentials = !matches!(cli.command, Commands::Logout);
    let result = run(&client, &store, cli.command).await;
    if result.is_ok() && keep_credentials {
        remember_access_token(&client, &store, credentials).await;
    }
    client.close().await;
    result
}

async fn run(client: &ItdClient, store: &FileTokenStore, command: Commands) -> Result<()> {
    match command {
        Commands::Login { .. } => anyhow::bail!("login runs without a stored session"),
        Commands::Logout => {
            client.logout().await?;
            store.delete().await?;
            tracing::info!("Logged out");
        }
        Commands::Me => print(&client.get_me().await?)?,
        Commands::User { username } => print(&client.get_user(&username).await?)?,
        Commands::Notifications { limit, offset } => {
            print(&client.notifications(offset, limit).await?)?;
        }
        Commands::Count => print(&client.notifications_count().await?)?,
        Commands::Post { content } => print(&client.create_post(&NewPost::text(content)).await?)?,
        Commands::Stream => follow(client).await?,
    }
    Ok(())
}

async fn login(store: &FileTokenStore, options: &SessionOptions, refresh_token: &str) -> Result<()> {
    let client = ItdClient::with_options(refresh_token, options.clone())?;
    let access_token = client.refresh().await.context("Refresh token was rejected")?;
    client.close().await;

    let mut credentials = StoredCredentials::new(refresh_token);
    credentials.access_token = Some(access_token);
    store.save(&credentials).await?;

    tracing::info!("Credentials saved");
    Ok(())
}

fn connect(credentials: &StoredCredentials, options: &SessionOptions) -> Result<ItdClient> {
    let mut session = Session::new(
        credentials.refresh_token.clone(),
        ReqwestClient::new(),
        options,
    )?;
    if let Some(access_token) = &credentials.access_token {
        session = session.with_access_token(access_token.clone());
    }
    Ok(ItdClient::from_session(session, options))
}

/// Saves the latest access token so the next run can skip a refresh
async fn remember_access_token(
    client: &ItdClient,
    store: &FileTokenStore,
    mut credentials: StoredCredentials,
) {
    if client.session().state().await != SessionState::Authenticated {
        return;
    }

    let access_token = client.session().access_token().await;
    if credentials.access_token.as_deref() == Some(access_token.as_str()) {
        return;
    }

    credentials.access_token = Some(access_token);
    if let Err(e) = store.save(&credentials).await {
        tracing::warn!("Failed to save access token: {}", e);
    }
}

async fn follow(client: &ItdClient) -> Result<()> {
    let mut stream = client.notification_stream().await?;

    while let Some(event) = stream.next_event().await {
        match event {
            Ok(StreamEvent::Connected(event)) => {
                tracing::info!("Connected as {}", event.user_id.unwrap_or_default());
            }
            Ok(StreamEvent::Notification(notification)) => print(&notification)?,
            Ok(StreamEvent::Other { event, .. }) => tracing::debug!("Ignoring {} event", event),
            Err(itd_client::Error::Decode(e)) => tracing::warn!("Skipping bad event: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!("Stream closed by server");
    Ok(())
}

fn print(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
