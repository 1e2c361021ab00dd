//! Callroom - Video Call Client
//!
//! Tritt einem Video-Raum eines Kanals bei:
//! - Backend-API für Login und Raum-Credentials
//! - Call Session Controller als Zustandsmaschine für den Beitritt
//! - WebSocket Transport zum Media-Server
//! - cpal für Audio-Probes (Feature `host-audio`)

pub mod api;
pub mod config;
pub mod devices;
pub mod room;
pub mod session;

use anyhow::Context;
use api::{ApiClient, ApiCredentialService, ApiError};
use clap::{Args, Parser, Subcommand};
use config::{AppConfig, StoredTokens, TokenStore};
use once_cell::sync::OnceCell;
use room::RoomTransport;
use session::{
    CallSession, CallSessionState, SessionErrorReason, SessionEvent, SessionPorts, SessionUser,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "callroom", version, about = "Join a channel's video call")]
pub struct Cli {
    /// Pfad zur Konfigurationsdatei
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Überschreibt die Backend-URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Überschreibt die Media-Server-Adresse
    #[arg(long, global = true)]
    pub media_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Tritt dem Video-Call eines Kanals bei (Ctrl-C verlässt den Raum)
    Join {
        #[command(flatten)]
        auth: AuthArgs,

        /// Kanal-ID
        #[arg(long)]
        channel: String,

        /// Ohne Kamera/Mikrofon beitreten, falls die Probes scheitern
        #[arg(long)]
        no_media: bool,
    },
    /// Zeigt die Teilnehmer eines Raums
    Participants {
        #[command(flatten)]
        auth: AuthArgs,

        #[arg(long)]
        channel: String,
    },
    /// Legt ein Konto an und speichert die Anmeldung
    Register {
        #[arg(long)]
        email: String,

        #[arg(long)]
        username: String,

        #[arg(long, env = "CALLROOM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Entfernt die gespeicherte Anmeldung
    Logout,
}

#[derive(Debug, Args)]
pub struct AuthArgs {
    #[arg(long, env = "CALLROOM_EMAIL")]
    pub email: Option<String>,

    #[arg(long, env = "CALLROOM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Vorhandenes Access-Token statt Login
    #[arg(long, env = "CALLROOM_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Refresh-Token zum Access-Token
    #[arg(long, env = "CALLROOM_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

/// Geteilter Zustand für einen CLI-Lauf
pub struct AppState {
    config: AppConfig,
    api: Arc<ApiClient>,
    tokens: Option<TokenStore>,
}

static LOGGING: OnceCell<()> = OnceCell::new();

/// Initialisiert tracing genau einmal
///
/// RUST_LOG hat Vorrang vor dem Filter aus der Konfiguration.
pub fn init_logging(default_filter: &str) {
    LOGGING.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}

impl AppState {
    /// Lädt die Konfiguration und erstellt den API-Client
    pub fn init(cli: &Cli) -> anyhow::Result<Self> {
        let (mut config, warnings) = AppConfig::load(cli.config.as_deref())?;
        if let Some(api_url) = &cli.api_url {
            config.api_url = api_url.clone();
        }
        if let Some(media_url) = &cli.media_url {
            config.media_server_url = media_url.clone();
        }
        config.validate()?;

        init_logging(&config.log_filter);
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        tracing::info!("Initializing callroom against {}", config.api_url);

        let api = ApiClient::new(
            &config.api_url,
            Duration::from_secs(config.credential_timeout_secs),
        )?;

        let tokens = TokenStore::open_default();
        if tokens.is_none() {
            tracing::warn!("No data directory found, login will not be remembered");
        }

        Ok(Self {
            config,
            api: Arc::new(api),
            tokens,
        })
    }

    pub async fn authenticate(&self, auth: &AuthArgs) -> anyhow::Result<SessionUser> {
        authenticate(&self.api, self.tokens.as_ref(), auth).await
    }

    /// Baut die Ports der Session aus den Host-Adaptern
    pub fn build_ports(&self, transport: Arc<RoomTransport>) -> SessionPorts {
        let credentials = Arc::new(ApiCredentialService::new(
            Arc::clone(&self.api),
            self.config.media_server_url.clone(),
        ));

        #[cfg(feature = "host-audio")]
        {
            SessionPorts {
                capabilities: Arc::new(devices::HostCapabilityProbe),
                permissions: Arc::new(devices::HostPermissionProbe),
                audio: Arc::new(devices::HostAudioContextFactory),
                credentials,
                transport,
            }
        }

        #[cfg(not(feature = "host-audio"))]
        {
            let headless = Arc::new(devices::HeadlessDevices);
            SessionPorts {
                capabilities: headless.clone(),
                permissions: headless.clone(),
                audio: headless,
                credentials,
                transport,
            }
        }
    }
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Ermittelt den angemeldeten Benutzer
///
/// Reihenfolge: `--access-token`, dann Login mit E-Mail/Passwort, dann die
/// gespeicherte Anmeldung. Ist das Access-Token abgelaufen, wird es einmal
/// mit dem Refresh-Token erneuert.
pub async fn authenticate(
    api: &ApiClient,
    store: Option<&TokenStore>,
    auth: &AuthArgs,
) -> anyhow::Result<SessionUser> {
    let (refresh_token, persist) = if let Some(token) = &auth.access_token {
        api.set_access_token(Some(token.clone()));
        (auth.refresh_token.clone(), false)
    } else if let Some(email) = auth.email.as_deref() {
        let password = auth
            .password
            .as_deref()
            .context("--password is required with --email")?;
        let session = api.login(email, password).await?;
        save_tokens(
            store,
            &StoredTokens {
                access_token: session.access_token.clone(),
                refresh_token: session.refresh_token.clone(),
            },
        );
        (session.refresh_token, true)
    } else {
        let stored = store
            .map(TokenStore::load)
            .transpose()?
            .flatten()
            .context("not logged in: pass --email and --password or --access-token")?;
        api.set_access_token(Some(stored.access_token));
        (stored.refresh_token, true)
    };

    match api.me().await {
        Ok(user) => Ok(user.into()),
        Err(ApiError::NotAuthenticated) => {
            let refresh_token =
                refresh_token.context("access token expired and no refresh token is available")?;
            tracing::info!("Access token expired, refreshing");
            let access_token = api
                .refresh(&refresh_token)
                .await
                .context("failed to refresh access token")?;
            if persist {
                save_tokens(
                    store,
                    &StoredTokens {
                        access_token,
                        refresh_token: Some(refresh_token),
                    },
                );
            }
            let user = api.me().await.context("failed to load current user")?;
            Ok(user.into())
        }
        Err(e) => Err(anyhow::Error::new(e).context("failed to load current user")),
    }
}

fn save_tokens(store: Option<&TokenStore>, tokens: &StoredTokens) {
    if let Some(store) = store {
        if let Err(e) = store.save(tokens) {
            tracing::warn!("Failed to remember login: {}", e);
        }
    }
}

// ============================================================================
// SESSION EVENTS
// ============================================================================

/// Loggt Session-Events und zeigt Fehler dem Benutzer an
fn handle_session_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => {
            tracing::info!("Call state: {}", state);
            println!("[{}]", state.name());
        }
        SessionEvent::Error(reason) => {
            tracing::warn!("Call error: {:?}", reason);
            eprintln!("{}", reason.user_message());
        }
    }
}

fn print_blocking_state(state: &CallSessionState) {
    match state {
        CallSessionState::Incompatible { issues } => {
            eprintln!("This environment cannot join with media:");
            for issue in issues {
                eprintln!("  - {}", issue.description());
            }
            eprintln!("Run again with --no-media to join without camera and microphone.");
        }
        CallSessionState::Errored { reason } => {
            eprintln!("{}", recovery_hint(*reason));
        }
        _ => {}
    }
}

/// Was der Benutzer nach einem Fehler tun kann
fn recovery_hint(reason: SessionErrorReason) -> &'static str {
    if reason.is_transport_failure() {
        "The media room could not be joined. Run the command again to retry."
    } else {
        "Run again with --no-media to join without camera and microphone."
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

async fn join(
    app: &AppState,
    auth: &AuthArgs,
    channel: String,
    no_media: bool,
) -> anyhow::Result<()> {
    let user = app.authenticate(auth).await?;
    let transport = Arc::new(RoomTransport::new());
    let ports = app.build_ports(Arc::clone(&transport));

    let session = CallSession::new(channel, user, ports, app.config.session_config());
    let mut events = session.subscribe();

    let mut state = session.start().await?;
    if matches!(
        state,
        CallSessionState::Incompatible { .. } | CallSessionState::Errored { .. }
    ) {
        if !no_media {
            print_blocking_state(&state);
            return Ok(());
        }
        state = session.join_without_media().await?;
    }
    tracing::debug!("Session settled in {}", state);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, leaving call");
                if let Err(e) = session.leave() {
                    tracing::debug!("Leave skipped: {}", e);
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    handle_session_event(&event);
                    match session.state() {
                        CallSessionState::Disconnected => break,
                        CallSessionState::Errored { .. } => {
                            print_blocking_state(&session.state());
                            break;
                        }
                        _ => {}
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Dropped {} session events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    // leave() trennt im Hintergrund; vor Prozess-Ende kurz darauf warten
    let deadline = Duration::from_secs(app.config.leave_timeout_secs);
    let _ = tokio::time::timeout(deadline, async {
        while transport.is_connected() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    Ok(())
}

async fn participants(app: &AppState, auth: &AuthArgs, channel: &str) -> anyhow::Result<()> {
    app.authenticate(auth).await?;
    let room = app.api.room_participants(channel).await?;

    println!("{} participant(s) in {}", room.participants.len(), room.room_name);
    for participant in &room.participants {
        let name = participant.name.as_deref().unwrap_or(&participant.identity);
        println!("  {} ({})", name, participant.identity);
    }
    Ok(())
}

async fn register(
    app: &AppState,
    email: &str,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let session = app.api.register(email, username, password).await?;
    save_tokens(
        app.tokens.as_ref(),
        &StoredTokens {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
        },
    );
    println!("Registered {} ({})", session.user.username, session.user.id);
    Ok(())
}

fn logout(app: &AppState) -> anyhow::Result<()> {
    app.api.logout();
    if let Some(store) = &app.tokens {
        store.clear()?;
        tracing::info!("Removed saved login at {:?}", store.path());
    }
    println!("Logged out");
    Ok(())
}

/// Einstiegspunkt des Binaries
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app = AppState::init(&cli)?;

    match cli.command {
        Command::Join {
            auth,
            channel,
            no_media,
        } => join(&app, &auth, channel, no_media).await,
        Command::Participants { auth, channel } => participants(&app, &auth, &channel).await,
        Command::Register {
            email,
            username,
            password,
        } => register(&app, &email, &username, &password).await,
        Command::Logout => logout(&app),
    }
}
