use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use track_analyzer_core::{
    fail_job, AnalyzerConfig, Invocation, KeyValueStore, Outcome, Pipeline, RedisStore,
    SymphoniaDecoder, PROGRESS_TARGET,
};

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let invocation = Invocation::new(cli.audio_path, cli.track_id, cli.job_id, cli.store_url);

    let mut store = match RedisStore::open(&invocation.store_url) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = execute(&invocation, cli.config.as_deref(), &mut store);
    ExitCode::from(outcome.exit_code())
}

/// Loads the analysis parameters and runs the job. A configuration that
/// cannot be loaded fails the job like any other analysis error.
fn execute(
    invocation: &Invocation,
    config_path: Option<&Path>,
    store: &mut dyn KeyValueStore,
) -> Outcome {
    let config = match config_path {
        Some(path) => match AnalyzerConfig::from_toml_file(path) {
            Ok(config) => config,
            Err(err) => return fail_job(store, &invocation.job_id, err),
        },
        None => AnalyzerConfig::default(),
    };

    Pipeline::new(config, SymphoniaDecoder::new()).run(invocation, store)
}

fn init_tracing() {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(base))
        .try_init();
}

/// Progress lines are part of the process output, so their target stays at
/// `info` regardless of `RUST_LOG`.
fn build_filter(base: EnvFilter) -> EnvFilter {
    match format!("{PROGRESS_TARGET}=info").parse() {
        Ok(directive) => base.add_directive(directive),
        Err(_) => base,
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Analyse one audio track and store its features", long_about = None)]
struct Cli {
    /// Audio file to analyse.
    audio_path: PathBuf,
    /// Track identifier; the result is stored under `track:{TRACK_ID}:analysis`.
    track_id: String,
    /// Job identifier whose status record is updated on failure.
    job_id: String,
    /// Store connection string, e.g. `redis://localhost:6379`.
    store_url: String,
    /// Optional TOML file overriding analysis parameters.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use track_analyzer_core::{
        store::{analysis_key, job_key, JOB_ERROR_CHANNEL},
        ErrorKind, MemoryStore,
    };

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_four_positionals_and_optional_config() {
        let cli = Cli::try_parse_from([
            "track-analyzer",
            "song.mp3",
            "t1",
            "j1",
            "redis://localhost:6379",
            "--config",
            "analyzer.toml",
        ])
        .unwrap();
        assert_eq!(cli.audio_path, PathBuf::from("song.mp3"));
        assert_eq!(cli.track_id, "t1");
        assert_eq!(cli.job_id, "j1");
        assert_eq!(cli.store_url, "redis://localhost:6379");
        assert_eq!(cli.config, Some(PathBuf::from("analyzer.toml")));
    }

    #[test]
    fn rejects_missing_arguments() {
        assert!(Cli::try_parse_from(["track-analyzer", "song.mp3", "t1"]).is_err());
    }

    #[test]
    fn progress_target_survives_a_quiet_filter() {
        let filter = build_filter(EnvFilter::new("warn")).to_string();
        assert!(filter.contains("track_analyzer::progress=info"), "{filter}");
        assert!(filter.contains("warn"), "{filter}");
    }

    #[test]
    fn unreadable_config_fails_the_job() {
        let invocation = Invocation::new("song.mp3", "t1", "j1", "redis://localhost:6379");
        let mut store = MemoryStore::new();
        store.insert(job_key("j1"), r#"{"status":"processing","trackId":"t1"}"#);

        let outcome = execute(
            &invocation,
            Some(Path::new("/nonexistent/analyzer.toml")),
            &mut store,
        );

        assert_eq!(outcome.exit_code(), 1);
        assert!(matches!(
            outcome,
            Outcome::Failed {
                kind: ErrorKind::Analysis,
                ..
            }
        ));
        assert!(!store.contains_key(&analysis_key("t1")));

        let record = store.value(&job_key("j1")).unwrap();
        assert!(record.contains(r#""status":"error""#), "{record}");
        assert!(record.contains("analyzer.toml"), "{record}");
        assert!(record.contains(r#""trackId":"t1""#), "{record}");

        let published = store.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, JOB_ERROR_CHANNEL);
        assert_eq!(published[0].1, record);
    }
}
