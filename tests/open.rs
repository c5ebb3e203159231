use clap::Parser;
use color_eyre::Result;
use rs232_probe::{
    cli::Cli,
    commands,
    config::Config,
    error::{Error, PortOpenProblem},
};
use tokio_util::sync::CancellationToken;

mod common;

#[cfg(unix)]
#[tokio::test]
async fn missing_device_fails_before_any_file_is_created() -> Result<()> {
    common::init().await;

    let dir = tempfile::tempdir()?;
    let directory = dir.path().join("captures");

    let cli = Cli::parse_from([
        "rs232-probe",
        "capture",
        "/dev/ttyRS232PROBE-missing",
        "--log",
        "--directory",
        directory.to_str().expect("Temp paths are UTF-8"),
    ]);

    let err = commands::run(cli.command, Config::default(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_device_not_found());
    assert!(matches!(
        err,
        Error::PortOpen {
            problem: PortOpenProblem::NotFound,
            ..
        }
    ));
    assert!(!directory.exists());

    Ok(())
}

#[tokio::test]
async fn bad_configuration_fails_before_opening() -> Result<()> {
    common::init().await;

    let config = Config::deserialize(
        r#"(
    port: (path: "/dev/ttyRS232PROBE-missing"),
    capture: (pulse_ms: 100),
)"#,
    )?;

    let cli = Cli::parse_from(["rs232-probe", "capture"]);

    let err = commands::run(cli.command, config, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.try_into_bad_config().is_some());

    Ok(())
}
