//! Pocket Catalog CLI - drive the catalog data layer from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Create an account
//! pc-cli signup -e me@example.com -p hunter22
//!
//! # Browse the shared feed
//! pc-cli feed
//!
//! # List a product (credentials may also come from CATALOG_EMAIL / CATALOG_PASSWORD)
//! pc-cli add -e me@example.com -p hunter22 --name Mug --price 9.99 --image ./mug.jpg
//!
//! # Remove one of your products
//! pc-cli remove -e me@example.com -p hunter22 --id 42
//! ```
//!
//! Sessions live in memory only, so commands that act as a user sign in first.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};
use pocket_catalog_client::ClientConfig;
use pocket_catalog_client::config::SentryConfig;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "pc-cli")]
#[command(author, version, about = "Pocket Catalog terminal client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Email and password for commands that act as a user.
#[derive(Args)]
pub struct AuthArgs {
    /// Account email
    #[arg(short, long, env = "CATALOG_EMAIL")]
    pub email: String,

    /// Account password
    #[arg(short, long, env = "CATALOG_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Check credentials: sign in, show who you are, sign out
    Login {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Show the session restored at startup, if any
    Whoami,
    /// List every product in the shared feed
    Feed,
    /// List your own products and remaining quota
    Mine {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Show a single product
    Show {
        /// Product ID
        #[arg(long)]
        id: String,
    },
    /// List a new product
    Add {
        #[command(flatten)]
        auth: AuthArgs,

        /// Product name
        #[arg(long)]
        name: String,

        /// Price, e.g. 9.99
        #[arg(long)]
        price: String,

        /// Photo as a file path, file:// URI or data: URI
        #[arg(long)]
        image: String,
    },
    /// Remove one of your products
    Remove {
        #[command(flatten)]
        auth: AuthArgs,

        /// Product ID
        #[arg(long)]
        id: String,
    },
    /// Check where the route guard would send you from a screen
    Route {
        /// Route path, e.g. "/(auth)/login"
        #[arg(long)]
        path: String,

        /// Sign in first
        #[arg(short, long, env = "CATALOG_EMAIL", requires = "password")]
        email: Option<String>,

        #[arg(short, long, env = "CATALOG_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

/// Initialize Sentry error tracking.
///
/// Returns a guard that must be kept alive for the duration of the program.
fn init_sentry(config: &SentryConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config.environment.clone().map(std::borrow::Cow::Owned),
            sample_rate: config.sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
///
/// - ERROR and WARN become Sentry events
/// - INFO and DEBUG become breadcrumbs
/// - TRACE is ignored
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pocket_catalog_client=info,pocket_catalog_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    let _sentry_guard = init_sentry(&config.sentry);

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), commands::CommandError> {
    let state = commands::connect(config).await;

    match cli.command {
        Commands::Signup { auth } => commands::auth::signup(&state, &auth).await,
        Commands::Login { auth } => commands::auth::login(&state, &auth).await,
        Commands::Whoami => {
            commands::auth::whoami(&state);
            Ok(())
        }
        Commands::Feed => commands::catalog::feed(&state).await,
        Commands::Mine { auth } => commands::catalog::mine(&state, &auth).await,
        Commands::Show { id } => commands::catalog::show(&state, &id).await,
        Commands::Add {
            auth,
            name,
            price,
            image,
        } => commands::catalog::add(&state, &auth, name, price, image).await,
        Commands::Remove { auth, id } => commands::catalog::remove(&state, &auth, &id).await,
        Commands::Route {
            path,
            email,
            password,
        } => {
            let auth = email.zip(password).map(|(email, password)| AuthArgs { email, password });
            commands::auth::route(&state, auth.as_ref(), &path).await
        }
    }
}
