//! Command-line and environment configuration for the viewer.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use regex::Regex;
use thiserror::Error;

use crate::gridengine::QstatOptions;
use crate::utils::get_username;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid name filter {0:?}: {1}")]
    InvalidNameFilter(String, regex::Error),

    #[error("Refresh interval must be at least one second")]
    ZeroRefresh,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "gridview")]
#[command(about = "Terminal viewer for GridEngine jobs and queues", long_about = None)]
pub struct Cli {
    /// Only show jobs of this user (defaults to $USER)
    #[arg(short, long, env = "GRIDVIEW_USER", conflicts_with = "all_users")]
    pub user: Option<String>,

    /// Show jobs of all users
    #[arg(short = 'a', long)]
    pub all_users: bool,

    /// List jobs under their queue instances (qstat -f)
    #[arg(short, long)]
    pub full: bool,

    /// Auto-refresh interval in seconds
    #[arg(short, long, env = "GRIDVIEW_REFRESH", default_value_t = 10)]
    pub refresh: u64,

    /// Only show jobs whose name matches this regex
    #[arg(short, long)]
    pub name: Option<String>,

    /// Postgres URL of the ARCo accounting database
    #[arg(long, env = "GRIDVIEW_ARCO_URL", hide_env_values = true)]
    pub arco_url: Option<String>,

    /// Write logs to this file (filtered with RUST_LOG)
    #[arg(long, env = "GRIDVIEW_LOG")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Check values clap cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh == 0 {
            return Err(ConfigError::ZeroRefresh);
        }
        self.name_filter()?;
        Ok(())
    }

    pub fn name_filter(&self) -> Result<Option<Regex>, ConfigError> {
        match self.name.as_deref() {
            None | Some("") => Ok(None),
            Some(pattern) => Regex::new(pattern)
                .map(Some)
                .map_err(|e| ConfigError::InvalidNameFilter(pattern.to_string(), e)),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh)
    }

    pub fn qstat_options(&self) -> QstatOptions {
        let user = if self.all_users {
            None
        } else {
            Some(self.user.clone().unwrap_or_else(get_username))
        };
        QstatOptions {
            user,
            full: self.full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gridview").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_all_users() {
        let cli = parse(&["--all-users", "--full"]);
        let options = cli.qstat_options();
        assert_eq!(options.user, None);
        assert!(options.full);
        assert_eq!(options.user_pattern(), "*");
    }

    #[test]
    fn test_explicit_user() {
        let cli = parse(&["-u", "alice"]);
        assert_eq!(cli.qstat_options().user.as_deref(), Some("alice"));
    }

    #[test]
    fn test_user_conflicts_with_all_users() {
        let result = Cli::try_parse_from(["gridview", "-u", "alice", "--all-users"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            parse(&["--refresh", "0"]).validate(),
            Err(ConfigError::ZeroRefresh)
        ));
        assert!(matches!(
            parse(&["--name", "(unclosed"]).validate(),
            Err(ConfigError::InvalidNameFilter(..))
        ));
    }

    #[test]
    fn test_name_filter() {
        let cli = parse(&["--name", "^render"]);
        let re = cli.name_filter().unwrap().unwrap();
        assert!(re.is_match("render_frames"));
        assert!(!re.is_match("prerender"));
        assert!(parse(&[]).name_filter().unwrap().is_none());
    }
}
