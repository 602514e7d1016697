use devpipe::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    // RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devpipe=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = Cli::run() {
        eprintln!("✗ Error: {:#}", e);
        std::process::exit(1);
    }
}
