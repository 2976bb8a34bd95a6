use kernel_matrix_runner::{cli, HarnessError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("KMR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    kernel_matrix_runner::init();

    match cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            // Cell failures never get here: only grid or harness errors are non-zero.
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<HarnessError>())
                .map(HarnessError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
