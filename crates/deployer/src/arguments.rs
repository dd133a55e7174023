use {
    crate::profile::Credentials,
    std::{
        fmt::{self, Display, Formatter},
        path::PathBuf,
    },
    tracing::level_filters::LevelFilter,
};

#[derive(clap::Parser)]
#[clap(version, about = "Deploys the oracle contracts")]
pub struct Arguments {
    #[clap(flatten)]
    pub logging: LoggingArguments,

    /// Name of the network to deploy to.
    #[clap(long, env, default_value = "development")]
    pub network: String,

    /// Build directory of the compiled contract artifacts.
    #[clap(long, env, default_value = "deployment/build")]
    pub artifacts_dir: PathBuf,

    /// Private key or mnemonic of the deploying account on remote networks.
    #[clap(long, env, hide_env_values = true)]
    pub private_key: Option<String>,

    /// Infura project id used to reach remote networks.
    #[clap(long, env, hide_env_values = true)]
    pub infura_project_id: Option<String>,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Command {
    /// Runs all migrations against the selected network.
    #[default]
    Migrate,
    /// Lists the recorded deployments of every artifact.
    Networks,
}

#[derive(clap::Args)]
pub struct LoggingArguments {
    #[clap(
        long,
        env,
        default_value = "warn,deployer=debug,contracts=debug,ethrpc=info"
    )]
    pub log_filter: String,

    /// Events at or above this level are written to stderr, the rest to
    /// stdout. `off` writes everything to stdout.
    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: LevelFilter,

    /// Emit log events as JSON.
    #[clap(long, env)]
    pub use_json_logs: bool,
}

impl LoggingArguments {
    pub fn config(&self) -> observe::Config {
        observe::Config::new(
            &self.log_filter,
            self.log_stderr_threshold.into_level(),
            self.use_json_logs,
        )
    }
}

impl Arguments {
    pub fn command(&self) -> Command {
        self.command.unwrap_or_default()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            private_key: self.private_key.clone(),
            infura_project_id: self.infura_project_id.clone(),
        }
    }
}

fn display_secret_option(f: &mut Formatter<'_>, name: &str, value: &Option<String>) -> fmt::Result {
    match value {
        Some(_) => writeln!(f, "{name}: SECRET"),
        None => writeln!(f, "{name}: None"),
    }
}

impl Display for LoggingArguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            log_filter,
            log_stderr_threshold,
            use_json_logs,
        } = self;

        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "log_stderr_threshold: {log_stderr_threshold}")?;
        writeln!(f, "use_json_logs: {use_json_logs}")?;
        Ok(())
    }
}

impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            logging,
            network,
            artifacts_dir,
            private_key,
            infura_project_id,
            command: _,
        } = self;

        write!(f, "{logging}")?;
        writeln!(f, "command: {:?}", self.command())?;
        writeln!(f, "network: {network}")?;
        writeln!(f, "artifacts_dir: {}", artifacts_dir.display())?;
        display_secret_option(f, "private_key", private_key)?;
        display_secret_option(f, "infura_project_id", infura_project_id)?;
        Ok(())
    }
}
