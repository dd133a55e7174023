use tracing::Level;

#[derive(Debug, Clone)]
pub struct Config {
    /// Filters spans and events based on a set of filter directives
    /// https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html
    pub(crate) env_filter: String,
    /// Minimum level threshold for stderr output, `None` sends everything to
    /// stdout
    pub(crate) stderr_threshold: Option<Level>,
    /// Output log events as JSON
    pub(crate) use_json_format: bool,
}

impl Config {
    pub fn new(env_filter: &str, stderr_threshold: Option<Level>, use_json_format: bool) -> Self {
        Self {
            env_filter: env_filter.into(),
            stderr_threshold,
            use_json_format,
        }
    }

    pub fn with_env_filter(mut self, env_filter: &str) -> Self {
        self.env_filter = env_filter.to_string();
        self
    }

    pub fn stderr_threshold(&self) -> Option<Level> {
        self.stderr_threshold
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_filter: "info".to_string(),
            stderr_threshold: Some(Level::ERROR),
            use_json_format: false,
        }
    }
}
