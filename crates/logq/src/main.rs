use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use logq::conf::{Args, ShipperConfig};
use logq::report::TracingReporter;
use logq::runtime::{boot, serve};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = e.print();
            return code;
        }
    };

    if args.version {
        println!("{}", boot::version_line());
        return ExitCode::from(boot::VERSION_EXIT_CODE);
    }

    boot::init_logging(args.verbose);

    let mut config = match ShipperConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut config);

    let reporter = TracingReporter::shared();
    let booted = match boot::boot(config, reporter.clone()).await {
        Ok(booted) => booted,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match serve::serve(booted, reporter).await {
        Ok(_) => {
            tracing::info!("Server finished. Exiting.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
