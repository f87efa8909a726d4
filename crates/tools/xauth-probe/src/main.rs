use clap::Parser;

mod cli;

use crate::cli::{Args, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = args.load_config()?;
    init_tracing(&config);

    let outcome = args.run(&config).await?;
    if outcome.is_failure() {
        std::process::exit(1);
    }
    Ok(())
}
