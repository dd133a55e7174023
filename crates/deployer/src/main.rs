use {clap::Parser, std::process::ExitCode};

#[tokio::main]
async fn main() -> ExitCode {
    // Secrets may live in a `.env` file next to the project.
    let dotenv = dotenvy::dotenv();
    let args = deployer::arguments::Arguments::parse();
    observe::tracing::initialize(&args.logging.config());
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(err) if err.not_found() => (),
        Err(err) => tracing::warn!(?err, "failed to load environment file"),
    }
    tracing::info!("running deployer with validated arguments:\n{}", args);

    match deployer::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(?err, "deployment failed");
            ExitCode::FAILURE
        }
    }
}
