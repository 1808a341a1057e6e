//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `helpdesk_core` linkage with a deterministic health line.
//! - Given a database path, open (and migrate) it and print lane occupancy.
//!
//! Usage: `helpdesk_cli [DB_PATH]`. Set `HELPDESK_LOG_DIR` to an absolute
//! directory to enable file logging.

use helpdesk_core::{BoardService, CoreConfig, Lane};
use log::info;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("helpdesk_core ping={}", helpdesk_core::ping());
    println!("helpdesk_core version={}", helpdesk_core::core_version());

    let config = CoreConfig {
        log_dir: std::env::var("HELPDESK_LOG_DIR").ok(),
        ..CoreConfig::default()
    };
    if let Err(err) = config
        .validate()
        .map_err(|err| err.to_string())
        .and_then(|()| helpdesk_core::init_logging_from_config(&config))
    {
        eprintln!("logging disabled: {err}");
    }

    let Some(path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match print_board(&path, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_board(path: &str, config: &CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let conn = helpdesk_core::db::open_db_with_config(path, config)?;
    let board = BoardService::with_policy(&conn, config.retry_policy())?.board()?;
    for lane in Lane::ALL {
        println!("lane={lane} tasks={}", board.lane(lane).len());
    }
    info!("event=cli_board module=cli status=ok");
    Ok(())
}
