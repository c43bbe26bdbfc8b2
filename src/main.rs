use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use lednode::config::{NodeConfig, Role};
use lednode::diagnostics::{DiagnosticEvent, Diagnostics};
use lednode::hal::{InputLine, OutputLine};
use lednode::mqtt::session::BrokerSession;
use lednode::mqtt::transport::RumqttTransport;
use lednode::node::{ActuatorNode, ButtonNode, NodeRuntime};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;

    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => NodeConfig::default_path()?,
    };
    let config = NodeConfig::load_or_create(&path).await?;
    info!(
        "Starting {:?} node {} (peer {}) against {}:{}",
        config.role, config.identity, config.peer, config.broker.host, config.broker.port
    );

    let (diagnostics, events) = Diagnostics::with_listener();
    tokio::spawn(print_diagnostics(events));

    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received"),
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
        stop.cancel();
    });

    let session = BrokerSession::new(
        RumqttTransport::new(config.broker.clone()),
        config.session_settings(),
    );

    match config.role {
        Role::Button => {
            let (on, off) = open_buttons(&config)?;
            let role = ButtonNode::new(
                config.identity()?,
                config.peer()?,
                config.codec(),
                on,
                off,
                config.debounce(),
                diagnostics.clone(),
            );
            NodeRuntime::new(
                session,
                role,
                config.reconnect_policy(),
                diagnostics,
                config.runtime_settings(),
            )
            .run(shutdown)
            .await;
        }
        Role::Actuator => {
            let role = ActuatorNode::new(
                config.identity()?,
                config.codec(),
                open_led(&config)?,
                config.messages.clone(),
                diagnostics.clone(),
            )
            .map_err(|e| eyre!("Failed to initialize LED: {}", e))?;
            NodeRuntime::new(
                session,
                role,
                config.reconnect_policy(),
                diagnostics,
                config.runtime_settings(),
            )
            .run(shutdown)
            .await;
        }
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Console sink: every diagnostic, one line each.
async fn print_diagnostics(mut events: mpsc::UnboundedReceiver<DiagnosticEvent>) {
    while let Some(event) = events.recv().await {
        println!("{}", event);
    }
}

#[cfg(feature = "gpio")]
fn open_buttons(config: &NodeConfig) -> Result<(Box<dyn InputLine>, Box<dyn InputLine>)> {
    use lednode::hal::gpio::GpioButton;

    let on = GpioButton::open("on", config.input.on_pin)?;
    let off = GpioButton::open("off", config.input.off_pin)?;
    Ok((Box::new(on), Box::new(off)))
}

/// Without GPIO the buttons are pressed by typing `on` or `off` on stdin.
#[cfg(not(feature = "gpio"))]
fn open_buttons(config: &NodeConfig) -> Result<(Box<dyn InputLine>, Box<dyn InputLine>)> {
    use lednode::hal::sim::SimInput;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tracing::warn;

    let (on, on_handle) = SimInput::new("on");
    let (off, off_handle) = SimInput::new("off");
    // Long enough for the debouncer to see a stable level on a few samples.
    let hold = config.debounce() * 3 + Duration::from_millis(config.input.sample_interval_ms * 3);

    tokio::spawn(async move {
        info!("Simulated buttons: type 'on' or 'off' and press enter");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let handle = match line.trim() {
                "on" => &on_handle,
                "off" => &off_handle,
                "" => continue,
                other => {
                    warn!("Unknown input '{}', expected 'on' or 'off'", other);
                    continue;
                }
            };
            handle.set(true);
            tokio::time::sleep(hold).await;
            handle.set(false);
        }
    });

    Ok((Box::new(on), Box::new(off)))
}

#[cfg(feature = "gpio")]
fn open_led(config: &NodeConfig) -> Result<Box<dyn OutputLine>> {
    use lednode::hal::gpio::GpioLed;

    Ok(Box::new(GpioLed::open(
        "led",
        config.output.pin,
        config.output.active_high,
    )?))
}

#[cfg(not(feature = "gpio"))]
fn open_led(_config: &NodeConfig) -> Result<Box<dyn OutputLine>> {
    use lednode::hal::sim::SimOutput;

    let (led, _) = SimOutput::new("led");
    Ok(Box::new(led))
}
