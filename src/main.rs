mod args;
mod cvr;

use chrono::Local;
use clap::Parser;
use log::{error, info};
use snafu::{ErrorCompat, ResultExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::args::Args;
use crate::cvr::config_reader::RunConfig;
use crate::cvr::run_log::RunLog;
use crate::cvr::*;

fn run(args: &Args) -> CvrResult<()> {
    let config = RunConfig::from_args(args)?;
    let started = Local::now().naive_local();
    let mut log = RunLog::create(&config.log_path(&started))?;
    log.init_logger()?;
    info!("Logging to {:?}", log.path());
    log.line(format!(
        "Processing {:?} ({})",
        config.cvrs_paths,
        config.structure_type
    ));

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context(CancelHookSnafu {})?;

    let mut scan = CvrScan::new(config, cancel);
    let outcome = scan.run(&mut log)?;
    info!(
        "{} contest columns ({})",
        outcome.columns,
        if outcome.schema_from_cache {
            "cached"
        } else {
            "discovered"
        }
    );
    if outcome.canceled {
        log.line(
            "Full Process Was Canceled. The CSV file may have written out the data up to the point of cancelation.",
        );
    } else {
        log.line("Program completed successfully");
    }
    log.flush();
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        for cause in ErrorCompat::iter_chain(&e).skip(1) {
            error!("  caused by: {}", cause);
        }
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
