use clap::Parser;
use secret_sidecar::{cli::FetcherArgs, observability::init_logging, Fetcher, APP_NAME, VERSION};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Optional .env for local runs
    dotenvy::dotenv().ok();

    let args = FetcherArgs::parse();

    if let Err(e) = run(args).await {
        error!(error = %e, "Secret fetch failed");
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: FetcherArgs) -> anyhow::Result<()> {
    let format = args.log_format()?;
    init_logging(format, args.verbose);

    info!(app_name = APP_NAME, version = VERSION, "Starting secret fetcher");

    let fetcher = Fetcher::new(args.into_config()?)?;
    fetcher.run().await?;

    Ok(())
}
