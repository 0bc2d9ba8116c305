use clap::Parser;
use std::path::PathBuf;

/// Polls the metrics command of every ZooKeeper node and serves the result.
#[derive(Parser, Debug)]
#[command(name = "zk-metrics-poller", version, about, long_about = None)]
pub struct CmdArgs {
    /// YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Ensemble to poll, e.g. `zk1:2181,zk2:2181`
    #[arg(short, long, env = "KAZOO_LOCUST_HOSTS")]
    pub ensemble: Option<String>,
    /// Delay between rounds in milliseconds, 0 disables periodic refresh
    #[arg(long)]
    pub refresh_ms: Option<u64>,
    /// YAML schema catalog replacing the built-in one
    #[arg(long)]
    pub schema_file: Option<PathBuf>,
    /// Print the default config and exit
    #[arg(long)]
    pub dump_default_config: bool,
}
