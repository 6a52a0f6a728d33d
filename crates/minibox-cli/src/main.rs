//! minibox CLI - run one command inside a minimal container
//!
//! The same binary plays two roles. Invoked normally it is the launcher;
//! invoked with [`INIT_SENTINEL`] as its first argument it is the
//! container's initializer, started by the launcher inside new namespaces.

use clap::Parser;
use minibox_core::config::{DEFAULT_HOSTNAME, default_cgroup_root};
use minibox_core::isolation::{LinuxProvider, MemoryCgroup};
use minibox_core::{INIT_SENTINEL, LaunchConfig, Launcher, SETUP_FAILURE_EXIT_CODE, init};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "minibox")]
#[command(author, version, about = "Run a command in isolated Linux namespaces")]
struct Cli {
    /// Directory to use as the container's root filesystem
    #[arg(long)]
    rootfs: PathBuf,

    /// Memory limit (e.g. 100m, 1g); no limit when omitted
    #[arg(long)]
    mem: Option<String>,

    /// Hostname to set inside the container
    #[arg(long, default_value = DEFAULT_HOSTNAME)]
    hostname: String,

    /// Program to run inside the container, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<OsString>,
}

fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("minibox: failed to initialize logging: {e:#}");
        return ExitCode::from(SETUP_FAILURE_EXIT_CODE);
    }

    // Arguments are raw bytes until clap sees them
    let mut args = std::env::args_os();
    if args.nth(1).as_deref() == Some(OsStr::new(INIT_SENTINEL)) {
        let command: Vec<OsString> = args.collect();
        return run_init(&command);
    }

    run(Cli::parse())
}

fn init_tracing() -> anyhow::Result<()> {
    // stdout belongs to the contained program
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("minibox=info".parse()?)
                .add_directive("minibox_core=info".parse()?),
        )
        .init();
    Ok(())
}

fn run(cli: Cli) -> ExitCode {
    let mut builder = LaunchConfig::builder()
        .rootfs(cli.rootfs)
        .hostname(cli.hostname)
        .command(cli.command);
    if let Some(mem) = cli.mem {
        builder = builder.memory_limit(mem);
    }
    let config = builder.build();

    let limiter = MemoryCgroup::new(default_cgroup_root());
    match Launcher::new(&LinuxProvider, &limiter).launch(&config) {
        Ok(code) => exit_status(code),
        Err(e) => {
            tracing::error!(error = %e, "container launch failed");
            ExitCode::from(SETUP_FAILURE_EXIT_CODE)
        }
    }
}

fn run_init(command: &[OsString]) -> ExitCode {
    match init::run_from_handoff(command) {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!(error = %e, "container init failed");
            ExitCode::from(SETUP_FAILURE_EXIT_CODE)
        }
    }
}

/// Mirror the container's exit code
fn exit_status(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
