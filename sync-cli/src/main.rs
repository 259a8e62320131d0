//! `scrobble-sync`: turn Last.fm listening history into Spotify playlists.
//!
//! Credentials are read from `LASTFM_API_KEY`, `SPOTIFY_CLIENT_ID`,
//! `SPOTIFY_CLIENT_SECRET` and `SPOTIFY_REDIRECT_URI`. Run `login` once to
//! authorize Spotify access; the tokens are kept in the data directory.

mod output;

use anyhow::{bail, Context, Result};
use bridge_traits::catalog::{ListeningMode, SourceQuery, TimePeriod};
use clap::{Args, Parser, Subcommand};
use core_runtime::config::{ApiCredentials, AppConfig};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::SyncService;
use core_sync::{ConversionRequest, JobId, JobStatus, DEFAULT_LIST_LIMIT};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "scrobble-sync", version)]
#[command(about = "Convert Last.fm listening data into Spotify playlists")]
struct Cli {
    /// Directory for the job and token files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log line format: compact, pretty or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert Last.fm top tracks to a Spotify playlist
    Top {
        /// Time period for top tracks
        #[arg(short, long, default_value = "overall")]
        period: TimePeriod,

        #[command(flatten)]
        convert: ConvertArgs,
    },
    /// Convert Last.fm recent tracks to a Spotify playlist
    Recent {
        #[command(flatten)]
        convert: ConvertArgs,
    },
    /// Convert Last.fm loved tracks to a Spotify playlist
    Loved {
        #[command(flatten)]
        convert: ConvertArgs,
    },
    /// Show Last.fm user information
    Info { username: String },
    /// List the time periods accepted by `top`
    Periods,
    /// Authorize Spotify access and store the tokens
    Login,
    /// Forget the stored Spotify tokens
    Logout,
    /// Inspect conversion jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Last.fm username
    username: String,

    /// Number of tracks to import
    #[arg(short, long, default_value_t = 50)]
    limit: usize,

    /// Custom playlist name
    #[arg(short, long)]
    name: Option<String>,

    /// Custom playlist description
    #[arg(short, long)]
    description: Option<String>,

    /// Make the playlist private
    #[arg(long)]
    private: bool,

    /// Show the tracks and ask before creating the playlist
    #[arg(long)]
    preview: bool,

    /// Add to the existing playlist with this name instead of creating one
    #[arg(long, value_name = "PLAYLIST", conflicts_with_all = ["name", "description", "private"])]
    append_to: Option<String>,
}

#[derive(Subcommand, Debug)]
enum JobsAction {
    /// Recent jobs of a Last.fm user
    List {
        username: String,
        #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Current state of one job
    Show { job_id: JobId },
    /// Remove jobs older than the retention period
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(
        LoggingConfig::for_verbosity(cli.verbose)
            .with_format(cli.log_format)
            .with_target(false),
    )
    .context("Failed to initialize logging")?;

    let mut builder = AppConfig::builder().credentials(ApiCredentials::from_env());
    if let Some(dir) = cli.data_dir {
        builder = builder.data_dir(dir);
    }
    let config = builder.build().context("Invalid configuration")?;
    let service = SyncService::new(config)
        .await
        .context("Failed to start the sync service")?;

    match cli.command {
        Command::Top { period, convert } => {
            let query = SourceQuery::new(&convert.username, ListeningMode::Top).with_period(period);
            run_conversion(&service, query, convert).await
        }
        Command::Recent { convert } => {
            let query = SourceQuery::new(&convert.username, ListeningMode::Recent);
            run_conversion(&service, query, convert).await
        }
        Command::Loved { convert } => {
            let query = SourceQuery::new(&convert.username, ListeningMode::Loved);
            run_conversion(&service, query, convert).await
        }
        Command::Info { username } => {
            let user = service
                .user_info(&username)
                .await
                .with_context(|| format!("Could not look up Last.fm user '{}'", username))?;
            print!("{}", output::user_info(&user));
            Ok(())
        }
        Command::Periods => {
            print!("{}", output::periods());
            Ok(())
        }
        Command::Login => login(&service).await,
        Command::Logout => {
            service.logout().await.context("Failed to remove tokens")?;
            println!("Spotify tokens removed");
            Ok(())
        }
        Command::Jobs { action } => jobs(&service, action).await,
    }
}

async fn run_conversion(service: &SyncService, query: SourceQuery, args: ConvertArgs) -> Result<()> {
    debug!(
        data_dir = %service.config().data_dir.display(),
        username = %query.username,
        mode = %query.mode,
        limit = args.limit,
        "Preparing conversion"
    );
    if args.preview {
        println!(
            "Previewing {} {} tracks for {}...",
            args.limit, query.mode, query.username
        );
        let records = service
            .preview(&query, args.limit)
            .await
            .context("Failed to fetch tracks from Last.fm")?;
        if records.is_empty() {
            println!("No tracks found");
            return Ok(());
        }
        print!("{}", output::preview(&records));

        let question = format!("Create playlist with these {} tracks?", records.len());
        if !confirm(&question).await? {
            return Ok(());
        }
    }

    let mut request = ConversionRequest::new(query, args.limit).with_public(!args.private);
    if let Some(name) = args.name {
        request = request.with_name(name);
    }
    if let Some(description) = args.description {
        request = request.with_description(description);
    }
    if let Some(playlist) = args.append_to {
        request = request.append_to(playlist);
    }

    let job_id = service
        .start_conversion(request)
        .await
        .context("Failed to start conversion")?;
    info!(%job_id, "Conversion started");

    let mut snapshots = Box::pin(service.watch_job(job_id));
    let mut last_message = String::new();
    while let Some(snapshot) = snapshots.next().await {
        let job = snapshot.context("Lost track of the conversion job")?;
        if job.message != last_message {
            println!("[{:>3}%] {}", job.progress, job.message);
            last_message = job.message.clone();
        }

        match job.status {
            JobStatus::Completed => {
                if let Some(result) = &job.result {
                    println!();
                    print!("{}", output::conversion_result(result));
                }
                return Ok(());
            }
            JobStatus::Failed => {
                bail!(
                    "Conversion failed: {}",
                    job.error.as_deref().unwrap_or("unknown error")
                );
            }
            JobStatus::Pending | JobStatus::Running => {}
        }
    }
    bail!("Job {} stopped reporting before it finished", job_id)
}

async fn login(service: &SyncService) -> Result<()> {
    let (url, verifier) = service
        .begin_login()
        .context("Spotify login is not configured")?;

    println!("Open this URL in your browser and approve access:\n\n{}\n", url);
    let callback = prompt("Paste the URL you were redirected to: ").await?;

    service
        .finish_login(callback.trim(), &verifier)
        .await
        .context("Spotify login failed")?;
    println!("Spotify access authorized");
    Ok(())
}

async fn jobs(service: &SyncService, action: JobsAction) -> Result<()> {
    match action {
        JobsAction::List { username, limit } => {
            let jobs = service.recent_jobs(&username, limit).await?;
            if jobs.is_empty() {
                println!("No jobs for {}", username);
            }
            for job in &jobs {
                println!("{}", output::job_line(job));
            }
        }
        JobsAction::Show { job_id } => {
            let job = service.job_status(&job_id).await?;
            println!("{}", output::job_line(&job));
            if let Some(result) = &job.result {
                println!();
                print!("{}", output::conversion_result(result));
            }
        }
        JobsAction::Cleanup => {
            let removed = service.cleanup_jobs().await?;
            println!("Removed {} old jobs", removed);
        }
    }
    Ok(())
}

async fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    std::io::stdout().flush().context("Failed to write prompt")?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    Ok(line)
}

async fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{} [y/N] ", question)).await?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
