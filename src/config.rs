use clap::Parser;
use std::path::PathBuf;

/// Terminal editor for diary entries stored on a remote diary server.
#[derive(Debug, Parser)]
#[command(name = "diary-editor", version)]
pub struct Cli {
    /// Base URL of the diary API
    #[arg(long, env = "DIARY_API_URL", default_value = "http://localhost:3000/api")]
    pub api_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "DIARY_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Diary that new entries are created in
    #[arg(long = "diary", env = "DIARY_ID")]
    pub diary_id: Option<String>,

    /// Log file, or a directory to put the log file in
    #[arg(long, env = "DIARY_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "diary-editor",
            "--api-url",
            "https://diary.example/api",
            "--diary",
            "d1",
            "--token",
            "secret",
        ])
        .unwrap();

        assert_eq!(cli.api_url, "https://diary.example/api");
        assert_eq!(cli.diary_id.as_deref(), Some("d1"));
        assert_eq!(cli.token.as_deref(), Some("secret"));
    }
}
