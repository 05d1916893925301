mod cli;
mod infra;
mod jobs;
mod routes;
mod server;

use pass_culture::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
