use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    Cli::command().debug_assert();
}

#[test]
fn test_build_flags() {
    let cli = Cli::try_parse_from([
        "kiln",
        "-p",
        "project",
        "build",
        "--threads",
        "4",
        "--full-refresh",
        "--drift-policy",
        "error",
        "--no-seeds",
        "--output",
        "json",
    ])
    .unwrap();

    assert_eq!(cli.global.project_dir, "project");
    let Commands::Build(args) = cli.command else {
        panic!("expected build");
    };
    assert_eq!(args.threads, Some(4));
    assert!(args.full_refresh);
    assert!(args.no_seeds);
    assert_eq!(args.output, OutputFormat::Json);
    assert_eq!(
        args.drift_policy.map(DriftPolicy::from),
        Some(DriftPolicy::Error)
    );
}

#[test]
fn test_execute_defaults() {
    let cli = Cli::try_parse_from(["kiln", "execute"]).unwrap();
    let Commands::Execute(args) = cli.command else {
        panic!("expected execute");
    };
    assert_eq!(args.threads, None);
    assert!(args.drift_policy.is_none());
    assert_eq!(args.output, OutputFormat::Text);
}

#[test]
fn test_unknown_drift_policy_rejected() {
    assert!(Cli::try_parse_from(["kiln", "execute", "--drift-policy", "panic"]).is_err());
}
