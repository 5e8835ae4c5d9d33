use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use nycbus::config::DEFAULT_ENDPOINT;
use nycbus::{run_query, ClientConfig, MemoryTable, QueryArgs, RestTable};

#[derive(Parser, Debug)]
#[command(name = "nycbus", version, about = "Canned queries over the NYC bus-location table")]
struct Args {
    /// The Google Cloud Platform project ID. Required.
    #[arg(long)]
    project: Option<String>,

    /// The Google Cloud Bigtable instance ID. Required.
    #[arg(long)]
    instance: Option<String>,

    /// The Google Cloud Bigtable table name. Required.
    #[arg(long)]
    table: Option<String>,

    /// The query to perform. Valid queries: lookupVehicleInGivenHour
    /// scanBusLineInGivenHour scanEntireBusLine filterBusesGoingEast
    /// filterBusesGoingWest scanManhattanBusesInGivenHour. Required.
    #[arg(long)]
    query: Option<String>,

    /// Data API endpoint
    #[arg(long, env = "BIGTABLE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// OAuth2 bearer token sent with every request
    #[arg(long, env = "BIGTABLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Serve reads from a JSON fixture instead of the service
    #[arg(long)]
    fixture: Option<PathBuf>,
}

impl Args {
    fn query_args(&self) -> QueryArgs {
        QueryArgs {
            project: self.project.clone().unwrap_or_default(),
            instance: self.instance.clone().unwrap_or_default(),
            table: self.table.clone().unwrap_or_default(),
            query: self.query.clone().unwrap_or_default(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let query_args = args.query_args();
    query_args.validate()?;

    let mut out = io::BufWriter::new(io::stdout().lock());
    if let Some(path) = &args.fixture {
        info!("Reading fixture {}", path.display());
        let table = MemoryTable::load_fixture(query_args.table_name(), path)?;
        run_query(&table, &query_args.query, &mut out).await?;
    } else {
        let mut config = ClientConfig::new(query_args.table_name());
        config.endpoint = args.endpoint;
        config.access_token = args.access_token;
        config.timeout = Duration::from_secs(args.timeout_secs);

        let table = RestTable::new(config).context("Failed to create table client")?;
        run_query(&table, &query_args.query, &mut out).await?;
    }
    out.flush()?;
    Ok(())
}
