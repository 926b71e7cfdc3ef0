use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::common::Version;
use crate::config::SyncConfig;
use crate::workers::JobFilter;

#[derive(Parser, Debug)]
#[command(name = "hotsync", author, version, about, long_about = None)]
pub struct Args {
    /// JSON config file. Falls back to HOTSYNC_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root for snapshots, the bundle cache and outputs.
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    /// Log at debug level regardless of the configured level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Mirror one catalog version and run every applicable job.
    Sync {
        /// Client version of the target catalog.
        client_version: String,

        /// Resource version of the target catalog.
        res_version: String,

        /// Client version of the previously mirrored catalog.
        #[arg(long, requires = "prev_res")]
        prev_client: Option<String>,

        /// Resource version of the previously mirrored catalog. Without it every bundle counts as new.
        #[arg(long)]
        prev_res: Option<String>,

        /// Only run these jobs (comma separated).
        #[arg(long, value_delimiter = ',')]
        include: Option<Vec<String>>,

        /// Never run these jobs (comma separated). Wins over --include.
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
    },

    /// Print the change list between two catalog versions.
    Diff {
        /// Resource version of the target catalog.
        res_version: String,

        /// Resource version to compare against.
        #[arg(long)]
        prev_res: Option<String>,
    },

    /// List registered jobs by priority tier.
    Jobs,
}

impl Commands {
    /// Target and previous versions of a `sync` invocation.
    pub fn versions(&self) -> Option<(Version, Option<Version>)> {
        match self {
            Commands::Sync { client_version, res_version, prev_client, prev_res, .. } => {
                let target = Version::new(client_version.clone(), res_version.clone());
                let previous = prev_res.as_ref().map(|res| {
                    Version::new(prev_client.clone().unwrap_or_else(|| client_version.clone()), res.clone())
                });
                Some((target, previous))
            }
            _ => None,
        }
    }

    pub fn job_filter(&self) -> JobFilter {
        match self {
            Commands::Sync { include, exclude, .. } => JobFilter::new(include.clone(), exclude.clone()),
            _ => JobFilter::default(),
        }
    }
}

impl Args {
    /// Applies flags over a loaded config: the last layer.
    pub fn apply_to(&self, config: &mut SyncConfig) {
        if let Some(storage) = &self.storage {
            config.storage_dir = storage.clone();
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
    }
}

/// Parses command-line arguments using `clap`.
pub fn run() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_arguments() {
        let args = Args::parse_from([
            "hotsync", "--storage", "/data", "sync", "2.4.01", "24-06-02", "--prev-res", "24-06-01", "--include", "game_data,item_demand", "--exclude", "item_demand",
        ]);
        let (target, previous) = args.command.versions().unwrap();
        assert_eq!(target, Version::new("2.4.01", "24-06-02"));
        assert_eq!(previous, Some(Version::new("2.4.01", "24-06-01")));

        let filter = args.command.job_filter();
        assert!(filter.allows("game_data"));
        assert!(!filter.allows("item_demand"));
        assert!(!filter.allows("audio"));

        let mut config = SyncConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.storage_dir, PathBuf::from("/data"));
    }

    #[test]
    fn prev_client_requires_prev_res() {
        assert!(Args::try_parse_from(["hotsync", "sync", "1", "a", "--prev-client", "0"]).is_err());
    }
}
