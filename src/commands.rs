use std::{path::Path, time::Duration};

use chrono::Local;
use tokio::{fs, io::AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    capture::{CaptureEngine, CaptureOutcome, CapturePaths, CaptureReport, CompletionReason},
    cli::{CableTestArgs, Commands, DiagnoseArgs, LineMode, WatchArgs},
    config::{Config, PortConfig},
    diagnose::{self, DiagnosticReport},
    echo,
    error::Error,
    interface::LineInterface,
    line::{LineName, LineSnapshot},
    loopback::{self, LoopbackResult},
    monitor::{self, ControlLineMonitor},
    output,
    serial::serial_port::{SerialPortBuilder, SerialPortHandle},
};

/// Slow toggles before a verbose cable test, so a meter or LED can follow along.
pub const VERBOSE_TOGGLE_INTERVAL: Duration = Duration::from_millis(250);

/// Where a capture went and how it ended.
#[derive(Debug, Clone)]
pub struct CaptureSummary {
    /// The files written.
    pub paths: CapturePaths,

    /// Whether the log file was written.
    pub logged: bool,

    /// The remote driven lines when the capture started.
    pub initial_lines: LineSnapshot,

    /// What the engine reported.
    pub report: CaptureReport,
}

/// Open the configured serial port.
pub fn open(port: &PortConfig) -> Result<SerialPortHandle, Error> {
    let settings = port.settings();
    info!(path = %settings.path, framing = %settings.framing(), "Opening port");

    SerialPortBuilder::from_settings(settings).build()
}

/// Run a command line command until it finishes or `cancel` fires.
pub async fn run(command: Commands, mut config: Config, cancel: CancellationToken) -> Result<(), Error> {
    match command {
        Commands::Capture(args) => {
            args.apply(&mut config);
            config.validate()?;

            let mut port = open(&config.port)?;
            let result = capture(&mut port, &config, args.line_mode, cancel).await;
            port.close();

            println!("{}", render_capture(&result?));
        }
        Commands::Watch(args) => {
            args.port.apply(&mut config.port);
            config.validate()?;

            let mut port = open(&config.port)?;
            let result = watch(&mut port, &args, cancel).await;
            port.close();

            info!(changes = result?, "Watch stopped");
        }
        Commands::CableTest(args) => {
            args.port.apply(&mut config.port);
            config.validate()?;

            let mut port = open(&config.port)?;
            let result = cable_test(&mut port, &args).await;
            port.close();

            let result = result?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", render_cable_test(&result, args.drive, args.sense));
            }
        }
        Commands::Diagnose(DiagnoseArgs { port: port_args, listen, json }) => {
            port_args.apply(&mut config.port);
            config.validate()?;

            let mut port = open(&config.port)?;
            let result = diagnose::run(&mut port, Duration::from_secs(listen), cancel).await;
            port.close();

            let report = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", render_diagnostics(&report));
            }
        }
        Commands::Echo(port_args) => {
            port_args.apply(&mut config.port);
            config.validate()?;

            let mut port = open(&config.port)?;
            let result = echo::run(&mut port, cancel).await;
            port.close();

            println!("Echoed {} byte(s)", result?);
        }
        Commands::Examples(example) => crate::cli::handle_examples(example)?,
    }

    Ok(())
}

/// Set the assert line according to `mode`.
///
/// Failing to drive it is not fatal, the capture goes ahead without it.
pub fn prime_assert_line(port: &mut dyn LineInterface, line: LineName, mode: LineMode) {
    let result = match mode {
        LineMode::On => output::assert_line(port, line, true).map(|_| true),
        LineMode::Off => output::assert_line(port, line, false).map(|_| false),
        LineMode::Toggle => output::toggle_line(port, line),
    };

    match result {
        Ok(level) => info!(%line, level, "Assert line primed"),
        Err(e) => warn!(%e, "Continuing without the assert line"),
    }
}

/// Capture from an already open port into timestamped files.
pub async fn capture(
    port: &mut dyn LineInterface,
    config: &Config,
    line_mode: LineMode,
    cancel: CancellationToken,
) -> Result<CaptureSummary, Error> {
    let options = config.capture.options()?;

    let initial_lines = ControlLineMonitor::default().sample(port, &LineName::HOST_INPUTS);
    info!(lines = %initial_lines, "Modem lines");

    if let Some(line) = config.capture.assert_line {
        prime_assert_line(port, line, line_mode);
    }

    let capture = &config.capture;
    fs::create_dir_all(&capture.directory)
        .await
        .map_err(Error::SinkWrite)?;
    let paths = CapturePaths::new(&capture.directory, &capture.prefix, Local::now());

    let binary = fs::File::create(&paths.binary)
        .await
        .map_err(Error::SinkWrite)?;
    let log = if capture.log {
        Some(fs::File::create(&paths.log).await.map_err(Error::SinkWrite)?)
    } else {
        None
    };
    debug!(?paths, "Sinks created");

    let report = CaptureEngine::new(options)
        .run(port, binary, log, cancel)
        .await?;

    Ok(CaptureSummary {
        paths,
        logged: capture.log,
        initial_lines,
        report,
    })
}

/// Human readable capture result.
pub fn render_capture(summary: &CaptureSummary) -> String {
    let report = &summary.report;
    let ended = match report.outcome {
        CaptureOutcome::Completed(CompletionReason::Duration) => "duration reached",
        CaptureOutcome::Completed(CompletionReason::ByteLimit) => "byte limit reached",
        CaptureOutcome::Interrupted => "interrupted",
    };

    let mut text = format!(
        "Modem lines at start: {}\nCaptured {} byte(s) to {} in {:.1}s ({ended})",
        summary.initial_lines,
        report.bytes_captured,
        summary.paths.binary.display(),
        report.elapsed.as_secs_f64(),
    );
    if summary.logged {
        text += &format!("\nLog: {}", summary.paths.log.display());
    }
    if let Some(gate) = report.gate {
        if !gate.asserted {
            text += &format!(
                "\nMonitored line was not asserted within {:.1}s, captured anyway",
                gate.elapsed.as_secs_f64()
            );
        }
    }

    text
}

async fn watch_into<W>(
    port: &mut dyn LineInterface,
    args: &WatchArgs,
    sink: &mut W,
    write_header: bool,
    cancel: CancellationToken,
) -> Result<u64, Error>
where
    W: AsyncWrite + Unpin + Send,
{
    let interval = Duration::from_millis(args.interval_ms.max(1));
    monitor::watch_lines(port, interval, sink, write_header, cancel).await
}

/// Watch the remote driven lines, printing CSV or appending it to a file.
///
/// An existing file gets no second header.
pub async fn watch(
    port: &mut dyn LineInterface,
    args: &WatchArgs,
    cancel: CancellationToken,
) -> Result<u64, Error> {
    match &args.out {
        Some(path) => {
            let write_header = is_empty(path).await;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(Error::SinkWrite)?;

            watch_into(port, args, &mut file, write_header, cancel).await
        }
        None => {
            let mut stdout = tokio::io::stdout();
            watch_into(port, args, &mut stdout, true, cancel).await
        }
    }
}

async fn is_empty(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(metadata) => metadata.len() == 0,
        Err(_) => true,
    }
}

/// Loopback and continuity test. With `verbose`, toggle the drive line slowly first.
pub async fn cable_test(
    port: &mut dyn LineInterface,
    args: &CableTestArgs,
) -> Result<LoopbackResult, Error> {
    if args.verbose {
        for _ in 0..2 {
            let level = output::toggle_line(port, args.drive)?;
            tokio::time::sleep(VERBOSE_TOGGLE_INTERVAL).await;
            println!(
                "{}={} {}={}",
                args.drive,
                u8::from(level),
                args.sense,
                u8::from(port.get_line(args.sense))
            );
        }
    }

    loopback::run_cable_test(
        port,
        loopback::DEFAULT_PATTERN,
        args.drive,
        args.sense,
        &loopback::DEFAULT_SEQUENCE,
    )
    .await
}

/// Human readable cable test result.
pub fn render_cable_test(result: &LoopbackResult, drive: LineName, sense: LineName) -> String {
    let mut text = format!(
        "Loopback: wrote {} byte(s), read {} byte(s), {}",
        result.bytes_written,
        result.bytes_read,
        if result.matches { "match" } else { "MISMATCH" }
    );
    if !result.matches {
        text += &format!(
            "\n  received: \"{}\"",
            String::from_utf8_lossy(&result.received).escape_debug()
        );
    }

    for step in &result.continuity {
        text += &format!(
            "\n{drive}={} -> {sense}={}",
            u8::from(step.driven),
            u8::from(step.sensed)
        );
    }

    text
}

/// Human readable diagnostics, with a wiring checklist if nothing arrived.
pub fn render_diagnostics(report: &DiagnosticReport) -> String {
    let mut text = format!(
        "Port: {}\nFraming: {}\nHardware flow control: {}\nInputs: {}\nOutputs: {}",
        report.port,
        report.framing,
        if report.hardware_flow_control { "on" } else { "off" },
        report.input_lines,
        report.output_lines,
    );

    for failure in &report.drive_failures {
        text += &format!("\n{failure}");
    }
    for line in report.dumps.iter().flatten() {
        text += &format!("\n{line}");
    }

    text += &format!("\nReceived {} byte(s)", report.bytes_received);

    if report.bytes_received == 0 {
        text += "\nNothing arrived. Check that:\
                 \n  - TX and RX are crossed (null modem) if both ends are terminals\
                 \n  - baud rate and framing match the remote\
                 \n  - the remote is not waiting for DTR or RTS\
                 \n  - signal ground is connected";
    }

    text
}
