mod board;

use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use chrono::Local;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wallboard_clickup::{LoadStatus, PollState, TaskPoller, WallboardConfig};

const USAGE: &str = "Usage: wallboard [--once] [--json]

  --once   render after the first load and exit: 1 on a network or
           ClickUp error, 3 on an error retrying cannot fix
  --json   print the task list as JSON instead of the board

Configuration is read from CLICKUP_API_TOKEN, CLICKUP_LIST_ID and the
optional CLICKUP_* / WALLBOARD_REFRESH_SECS variables.";

#[derive(Debug, Default)]
struct Args {
    once: bool,
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so stdout stays clean for the board / JSON
    // Default to INFO level, can be overridden with RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    // Simple argument parsing: flags only
    let mut args = Args::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => args.once = true,
            "--json" => args.json = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(ExitCode::SUCCESS);
            }
            other => {
                eprintln!("Unknown argument: {}\n\n{}", other, USAGE);
                return Ok(ExitCode::from(2));
            }
        }
    }

    let config = WallboardConfig::from_env();
    let poller = TaskPoller::start(&config);
    let mut rx = poller.subscribe();

    loop {
        let state = rx.borrow_and_update().clone();
        let settled = matches!(state.status, LoadStatus::Success | LoadStatus::Error);

        if !args.once || settled {
            print_state(&state, &args)?;
        }
        if args.once && settled {
            poller.stop();
            return Ok(ExitCode::from(exit_status(&state)));
        }
        if !poller.is_running() {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    poller.stop();
    let last = poller.snapshot();
    if last.status == LoadStatus::Error && !last.has_loaded() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Exit status for a settled `--once` run
fn exit_status(state: &PollState) -> u8 {
    match (&state.status, &state.error) {
        (LoadStatus::Error, Some(error)) if !error.is_retryable() => 3,
        (LoadStatus::Error, _) => 1,
        _ => 0,
    }
}

fn print_state(state: &PollState, args: &Args) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();

    if args.json {
        // JSON mode only prints actual task lists
        if state.status == LoadStatus::Success {
            writeln!(stdout, "{}", serde_json::to_string_pretty(state.tasks.as_slice())?)?;
        } else if let Some(error) = &state.error {
            eprintln!("{}", error);
        }
    } else {
        if stdout.is_terminal() && !args.once {
            // clear screen, cursor home
            write!(stdout, "\x1B[2J\x1B[H")?;
        }
        write!(stdout, "{}", board::render(state, Local::now()))?;
    }

    stdout.flush()?;
    Ok(())
}
