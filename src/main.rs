//! Main entry point for the hotsync CLI app

fn main() -> std::process::ExitCode {
    if let Err(e) = hotsync::cli_runner::run_cli_app() {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}
