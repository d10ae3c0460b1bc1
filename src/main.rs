use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use git_shallow_fetch::{
    config::FetchConfig,
    refs::find_commit_of_ref,
    transport::HttpTransport,
    upload_pack::{shallow_clone_commit, ShallowCloneOptions},
    worktree::write_files,
};

/// Fetch one commit's files from a smart-HTTP Git remote, without history.
#[derive(Parser, Debug)]
#[command(name = "git-shallow-fetch", version)]
struct Args {
    /// Repository URL, e.g. https://github.com/owner/repo.git
    url: String,

    /// Ref to check out
    #[arg(long = "ref", default_value = "HEAD", conflicts_with = "commit")]
    ref_name: String,

    /// Commit id to check out instead of resolving a ref
    #[arg(long)]
    commit: Option<String>,

    /// Only fetch files below this path prefix (repeatable)
    #[arg(long = "path")]
    paths: Vec<String>,

    /// Directory to write files to
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Config file to use instead of ~/.config/git-shallow-fetch/config.yaml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print `<path>\t<size>` for each file instead of writing them
    #[arg(long)]
    list: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FetchConfig::load_from_file(path)?.with_env_overrides()?,
        None => FetchConfig::load()?,
    };
    let transport = HttpTransport::new(&args.url, &config)?;

    let commit = match args.commit {
        Some(commit) => commit,
        None => find_commit_of_ref(&args.ref_name, &transport)
            .await
            .with_context(|| format!("Failed to resolve {} at {}", args.ref_name, args.url))?,
    };

    let mut options = ShallowCloneOptions::new().with_algorithm(config.object_format);
    if !args.paths.is_empty() {
        let prefixes: Vec<String> = args
            .paths
            .iter()
            .map(|prefix| prefix.trim_matches('/').to_string())
            .collect();
        options = options.with_filter(move |path, _, _, _| {
            prefixes.iter().any(|prefix| {
                prefix.is_empty()
                    || path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
        });
    }

    let files = shallow_clone_commit(&commit, &transport, &options)
        .await
        .with_context(|| format!("Failed to clone {} from {}", commit, args.url))?;

    if args.list {
        for file in &files {
            println!("{}\t{}", file.path, file.content.len());
        }
        return Ok(());
    }

    let Some(output) = args.output.or(config.output_dir) else {
        bail!("No output directory: pass --output or set output_dir in the config file");
    };
    let written = write_files(&output, &files)?;
    tracing::info!("wrote {} file(s) to {:?}", written.len(), output);

    Ok(())
}
