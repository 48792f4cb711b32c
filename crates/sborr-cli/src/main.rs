//! sborr: browse council documents and sessions from the terminal.
//!
//! Connects with `SBORR_URL`/`SBORR_ANON_KEY`, signs in, loads the stores and
//! prints what the app's screens would show. `--offline` runs against an
//! in-memory backend seeded with demo records.

mod demo;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sborr_core::validation::DocumentForm;
use sborr_core::{
    can_upload_document, Document, DocumentFilter, DocumentStatus, DocumentType, LocalFile,
};
use sborr_store::Stores;

#[derive(Parser)]
#[command(name = "sborr")]
#[command(author, version, about = "SBORR legislative document client")]
#[command(propagate_version = true)]
struct Cli {
    /// Use an in-memory backend with demo data instead of the hosted project
    #[arg(long, global = true)]
    offline: bool,

    /// Account email
    #[arg(long, global = true, env = "SBORR_EMAIL")]
    email: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "SBORR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List documents, newest first
    Documents {
        /// Match against title or author
        #[arg(short, long)]
        search: Option<String>,

        /// ordinance, resolution or memorandum
        #[arg(short = 't', long = "type")]
        doc_type: Option<DocumentType>,

        /// draft, for_review, in_session, approved, rejected or archived
        #[arg(long)]
        status: Option<DocumentStatus>,
    },

    /// Upload a file as a new document (councilors only)
    Upload {
        /// File to upload
        file: PathBuf,

        #[arg(long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// ordinance, resolution or memorandum
        #[arg(short = 't', long = "type")]
        doc_type: DocumentType,

        /// draft or for_review
        #[arg(long, default_value = "draft")]
        status: DocumentStatus,

        /// Series year, e.g. 2025
        #[arg(long)]
        series: String,
    },

    /// List sessions with their agendas
    Sessions {
        /// Match against session type, venue or agenda titles
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show dashboard totals and upcoming meetings
    Dashboard,

    /// Show the logged-in user
    Whoami,

    /// Follow live changes until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// Environment variables:
//   LOG_FORMAT  - "json" or "text" (default: "text")
//   LOG_ANSI    - "true"/"false" override ANSI colors
//   RUST_LOG    - standard env filter
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sborr=info,sborr_store=info,sborr_client=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let backend = if cli.offline {
        info!("using offline demo backend");
        demo::backend().backend()
    } else {
        sborr_client::connect_from_env().context("failed to connect")?
    };

    let stores = Stores::new(backend);
    sign_in(&stores, &cli).await?;

    let result = match cli.command {
        Commands::Documents {
            search,
            doc_type,
            status,
        } => {
            stores.documents.fetch_all().await.map_err(user_facing)?;
            let filter = DocumentFilter {
                search,
                doc_type,
                status,
            };
            let logon = stores.users.fetch_logon_user().await.ok().flatten();
            print!(
                "{}",
                render::documents(&stores.documents.filtered(&filter), logon.as_ref())
            );
            Ok(())
        }
        Commands::Upload {
            file,
            title,
            description,
            doc_type,
            status,
            series,
        } => {
            let form = DocumentForm {
                title,
                description,
                doc_type: Some(doc_type),
                status: Some(status),
                series,
            };
            let file = LocalFile::read(&file).await.map_err(user_facing)?;
            let document = upload(&stores, &form, &file).await?;
            print!("{}", render::uploaded(&document));
            Ok(())
        }
        Commands::Sessions { search } => {
            stores.sessions.fetch_all().await.map_err(user_facing)?;
            let sessions = stores.sessions.filtered(search.as_deref().unwrap_or_default());
            print!("{}", render::sessions(&sessions));
            Ok(())
        }
        Commands::Dashboard => {
            stores.load_all().await.map_err(user_facing)?;
            let today = chrono::Utc::now().date_naive();
            print!(
                "{}",
                render::dashboard(&stores.dashboard(today), stores.users.logon_user().as_ref())
            );
            Ok(())
        }
        Commands::Whoami => {
            let user = stores
                .users
                .fetch_logon_user()
                .await
                .map_err(user_facing)?
                .ok_or_else(|| anyhow!("no profile for the signed-in account"))?;
            print!("{}", render::user(&user));
            Ok(())
        }
        Commands::Watch => watch(&stores).await,
    };

    stores.auth.shutdown();
    result
}

/// Resume a stored session or sign in with the given credentials.
async fn sign_in(stores: &Stores, cli: &Cli) -> anyhow::Result<()> {
    stores.auth.initialize().await.map_err(user_facing)?;
    if stores.auth.session().is_some() {
        debug!("resumed stored session");
        return Ok(());
    }

    let (email, password) = match (&cli.email, &cli.password) {
        (Some(email), Some(password)) => (email.clone(), password.clone()),
        _ if cli.offline => (demo::EMAIL.to_string(), demo::PASSWORD.to_string()),
        _ => bail!("credentials required: pass --email and --password or set SBORR_EMAIL and SBORR_PASSWORD"),
    };
    stores
        .auth
        .sign_in(&email, &password)
        .await
        .map_err(user_facing)?;
    Ok(())
}

/// Upload a document authored by the logon user, who must be a councilor.
async fn upload(
    stores: &Stores,
    form: &DocumentForm,
    file: &LocalFile,
) -> anyhow::Result<Document> {
    let author = stores
        .users
        .fetch_logon_user()
        .await
        .map_err(user_facing)?
        .ok_or_else(|| anyhow!("no profile for the signed-in account"))?;
    if !can_upload_document(&author) {
        bail!("Only councilors can upload documents.");
    }
    let meta = form.new_document(&author).map_err(user_facing)?;
    stores.documents.upload(file, meta).await.map_err(user_facing)
}

async fn watch(stores: &Stores) -> anyhow::Result<()> {
    let _subscriptions = stores.start().await;
    let mut documents = stores.documents.watch();
    let mut sessions = stores.sessions.watch();
    let mut users = stores.users.watch();
    println!("{}", render::watch_line("loaded", stores));

    loop {
        let what = tokio::select! {
            changed = documents.changed() => changed.map(|_| "documents"),
            changed = sessions.changed() => changed.map(|_| "sessions"),
            changed = users.changed() => changed.map(|_| "users"),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        };
        match what {
            Ok(what) => println!("{}", render::watch_line(what, stores)),
            Err(_) => return Ok(()),
        }
    }
}

/// Store errors carry a category prefix; the terminal shows the bare message
/// the app's screens would.
fn user_facing(e: sborr_core::Error) -> anyhow::Error {
    anyhow!(e.message())
}
