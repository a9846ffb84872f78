mod cli;
mod demo;
mod evaluate;
mod infra;

use tiered_rewards::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
