use chorepoints_client::{Cli, run};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), chorepoints_client::ClientError> {
    run(Cli::parse()).await
}
