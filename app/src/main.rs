mod commands;
mod render;
mod session;

use std::env;
use std::io::{self, Write};

use tabula_adapters::http::{GatewayBuildError, HttpEngineGateway};
use tabula_core::coordinator::ConsoleCoordinator;
use tabula_core::profiles::{EngineProfile, FileProfilesStore, ProfilesError};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::session::{Flow, Session};

const ENGINE_URL_ENV: &str = "TABULA_ENGINE_URL";
const DEFAULT_LOG_FILTER: &str = "tabula_core=info,tabula_adapters=info,warn";

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    Args(String),
    #[error(transparent)]
    Profiles(#[from] ProfilesError),
    #[error(transparent)]
    Gateway(#[from] GatewayBuildError),
    #[error("console i/o failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    profile: Option<String>,
    engine_url: Option<String>,
    show_help: bool,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, AppError> {
    let mut args = Args::default();
    let mut raw = raw.into_iter();

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--profile" | "-p" => {
                args.profile = Some(
                    raw.next()
                        .ok_or_else(|| AppError::Args("--profile requires a name".to_string()))?,
                );
            }
            "--engine-url" => {
                args.engine_url = Some(
                    raw.next()
                        .ok_or_else(|| AppError::Args("--engine-url requires a URL".to_string()))?,
                );
            }
            "--help" | "-h" => args.show_help = true,
            other => return Err(AppError::Args(format!("unknown argument: {other}"))),
        }
    }
    Ok(args)
}

fn print_usage() {
    println!("tabula: console for contacts, ad-hoc SQL and indexes on a remote engine");
    println!();
    println!("USAGE:");
    println!("  tabula-app [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -p, --profile <NAME>    Engine profile from profiles.toml");
    println!("      --engine-url <URL>  Engine API base URL (also ${ENGINE_URL_ENV})");
    println!("  -h, --help              Show this help message");
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn resolve_profile(args: &Args) -> Result<EngineProfile, AppError> {
    let url_override = args
        .engine_url
        .clone()
        .or_else(|| env::var(ENGINE_URL_ENV).ok());

    match FileProfilesStore::load_default() {
        Ok(store) => {
            info!(
                path = %store.path().display(),
                profiles = store.profiles().len(),
                "loaded engine profiles"
            );
            Ok(store.resolve(args.profile.as_deref(), url_override.as_deref())?)
        }
        Err(ProfilesError::ConfigDirUnavailable) if args.profile.is_none() => {
            warn!("no config directory, using the built-in engine profile");
            let profile = EngineProfile::default_local();
            Ok(match url_override {
                Some(url) => profile.with_base_url(&url)?,
                None => profile,
            })
        }
        Err(error) => Err(error.into()),
    }
}

async fn run_console(profile: &EngineProfile) -> Result<(), AppError> {
    let gateway = HttpEngineGateway::from_profile(profile)?;
    let coordinator = ConsoleCoordinator::new(gateway, profile.response_ordering);
    let mut session = Session::new(coordinator);

    println!("tabula: {} ({})", profile.name, profile.base_url);
    println!("{}", session.mount().await);
    println!("type :help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", session.prompt());
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        match session.handle_line(&line).await {
            Flow::Continue(output) if output.is_empty() => {}
            Flow::Continue(output) => println!("{output}"),
            Flow::Quit => break,
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(env::args().skip(1))?;
    if args.show_help {
        print_usage();
        return Ok(());
    }

    init_tracing();
    let profile = resolve_profile(&args)?;
    info!(
        profile = %profile.name,
        base_url = %profile.base_url,
        ordering = ?profile.response_ordering,
        "starting console"
    );
    run_console(&profile).await?;
    Ok(())
}
