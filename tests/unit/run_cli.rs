//! Unit tests for command line parsing

use clap::Parser;
use random_mod_collector::cli::{Cli, Commands};
use random_mod_collector::sampling::{FailedBeatmapPolicy, SamplingMode};

#[test]
fn test_run_defaults() {
    let cli = Cli::parse_from(["random-mod-collector", "run"]);

    assert!(!cli.quiet);
    assert!(cli.metrics_addr.is_none());
    match cli.command {
        Commands::Run(run) => {
            assert_eq!(run.config.to_str(), Some("appconfig.json"));
            assert!(run.beatmaps.is_none());
            assert!(run.sampling_mode.is_none());
            assert!(run.rng_seed.is_none());
        }
        other => panic!("expected run command, got {other:?}"),
    }
}

#[test]
fn test_run_overrides() {
    let cli = Cli::parse_from([
        "random-mod-collector",
        "run",
        "--config",
        "custom.json",
        "--beatmaps",
        "5",
        "--samples",
        "7",
        "--sampling-mode",
        "sweep",
        "--failed-policy",
        "retain",
        "--rng-seed",
        "99",
        "--quiet",
        "--metrics-addr",
        "127.0.0.1:9100",
    ]);

    assert!(cli.quiet);
    assert_eq!(cli.metrics_addr.map(|addr| addr.port()), Some(9100));
    let Commands::Run(run) = cli.command else {
        panic!("expected run command");
    };
    assert_eq!(run.config.to_str(), Some("custom.json"));
    assert_eq!(run.beatmaps, Some(5));
    assert_eq!(run.samples, Some(7));
    assert_eq!(run.sampling_mode, Some(SamplingMode::Sweep));
    assert_eq!(run.failed_policy, Some(FailedBeatmapPolicy::Retain));
    assert_eq!(run.rng_seed, Some(99));
}

#[test]
fn test_validate_command() {
    let cli = Cli::parse_from(["random-mod-collector", "validate", "-c", "x.json"]);
    let Commands::Validate(validate) = cli.command else {
        panic!("expected validate command");
    };
    assert_eq!(validate.config.to_str(), Some("x.json"));
}

#[test]
fn test_overrides_applied_to_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("appconfig.json");
    std::fs::write(
        &path,
        r#"{
            "BeatmapIdsPath": "ids.json",
            "OutputPath": "out.csv",
            "ApiId": "1",
            "ApiSecret": "s",
            "ApiTokenUrl": "https://osu.ppy.sh/oauth/token",
            "ApiVersion": "20240101"
        }"#,
    )
    .unwrap();

    let cli = Cli::parse_from([
        "random-mod-collector",
        "run",
        "--config",
        path.to_str().unwrap(),
        "--beatmaps",
        "3",
        "--output",
        "elsewhere.csv",
    ]);
    let Commands::Run(run) = cli.command else {
        panic!("expected run command");
    };

    let config = run.resolve_config().unwrap();
    assert_eq!(config.beatmaps_per_run, 3);
    assert_eq!(config.seeds_per_beatmap, 100);
    assert_eq!(config.output_path.to_str(), Some("elsewhere.csv"));
}
