//! snoo: command-line access to listings and live streams.
//! Reads config, fetches or streams links/comments, prints one item per line
//! to stdout. Logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use snoo::{config, Client, Comment, Config, Link, PollStream, Source, StreamExit};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "snoo", version, about = "Read and stream Reddit listings")]
struct Cli {
    /// Config file (default: ~/.snoo/config.yaml)
    #[arg(long, env = "SNOO_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the newest links in a subreddit
    Links { subreddit: String },
    /// Print the top-level comments on a link
    Comments { link_id: String },
    /// Print account details
    User { username: String },
    /// Print links as they are submitted, until interrupted
    StreamLinks {
        subreddit: String,
        /// Skip links that already exist when the stream starts
        /// (overrides `stream.only_new`; `--only-new=false` turns it off)
        #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        only_new: Option<bool>,
    },
    /// Print comments as they are posted, until interrupted
    StreamComments {
        link_id: String,
        /// Skip comments that already exist when the stream starts
        /// (overrides `stream.only_new`; `--only-new=false` turns it off)
        #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        only_new: Option<bool>,
    },
}

/// One output line per item.
trait Line {
    fn line(&self) -> String;
}

impl Line for Link {
    fn line(&self) -> String {
        format!("{}\t{}\t{}", self.id, self.author, self.title)
    }
}

impl Line for Comment {
    fn line(&self) -> String {
        format!("{}\t{}\t{}", self.id, self.author, self.body.replace('\n', " "))
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("snoo={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// An explicit path must load; a missing default file means defaults.
fn load_config(path: Option<PathBuf>) -> Config {
    if let Some(path) = path {
        return config::load(&path).unwrap_or_else(|e| {
            fail(format!("failed to load config from {}: {}", path.display(), e))
        });
    }
    match config::default_config_path() {
        Some(path) if path.exists() => config::load(&path).unwrap_or_else(|e| {
            fail(format!("failed to load config from {}: {}", path.display(), e))
        }),
        _ => Config::default(),
    }
}

fn print_all<T: Line>(items: &[T]) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for item in items {
        let _ = writeln!(out, "{}", item.line());
    }
}

/// Prints items until the stream ends or Ctrl-C, then stops it.
async fn follow<S>(stream: PollStream<S>) -> Result<(), String>
where
    S: Source,
    S::Item: Line,
{
    let mut stream = stream.start();
    tracing::info!(listing = %stream.target(), "streaming");
    loop {
        tokio::select! {
            item = stream.recv() => match item {
                Some(item) => {
                    let mut out = io::stdout().lock();
                    let _ = writeln!(out, "{}", item.line());
                    let _ = out.flush();
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }
    match stream.stop().await {
        StreamExit::Cancelled => Ok(()),
        StreamExit::Failed(e) => Err(format!("stream ended: {}", e)),
        StreamExit::Aborted(e) => Err(format!("stream task aborted: {}", e)),
    }
}

async fn run(
    command: Command,
    client: Client,
    interval: Duration,
    default_only_new: bool,
) -> Result<(), String> {
    match command {
        Command::Links { subreddit } => {
            let links = client
                .get_new_links(&subreddit)
                .await
                .map_err(|e| e.to_string())?;
            print_all(&links);
        }
        Command::Comments { link_id } => {
            let comments = client
                .get_link_comments(&link_id)
                .await
                .map_err(|e| e.to_string())?;
            print_all(&comments);
        }
        Command::User { username } => {
            let user = client
                .get_user_info(&username)
                .await
                .map_err(|e| e.to_string())?;
            println!(
                "{}\tlink_karma={}\tcomment_karma={}",
                user.name, user.link_karma, user.comment_karma
            );
        }
        Command::StreamLinks { subreddit, only_new } => {
            let stream = client
                .stream_links(subreddit, only_new.unwrap_or(default_only_new))
                .with_interval(interval);
            follow(stream).await?;
        }
        Command::StreamComments { link_id, only_new } => {
            let stream = client
                .stream_link_comments(link_id, only_new.unwrap_or(default_only_new))
                .with_interval(interval);
            follow(stream).await?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = load_config(cli.config);
    let client = cfg
        .client_builder()
        .build()
        .unwrap_or_else(|e| fail(format!("failed to build client: {}", e)));
    let interval = cfg.poll_interval();
    let default_only_new = cfg.stream.only_new.unwrap_or(false);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(format!("failed to create runtime: {}", e)));

    if let Err(e) = rt.block_on(run(cli.command, client, interval, default_only_new)) {
        fail(e);
    }
}
