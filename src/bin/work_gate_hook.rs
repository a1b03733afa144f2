//! Work-gating hook (C9). Invoked before mutating operations (write/edit/
//! exec/spawn). Fast path: no flags present -> exit 0 in O(1). See [4.9].

use clap::Parser;

use govcore::cli::HookCli;
use govcore::config::Config;
use govcore::hooks::flag::{self, FlagStatus};

fn main() {
    govcore::init_logging();

    let cli = HookCli::parse_from(["work_gate_hook"]);
    let config = match Config::load(&cli.global) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    match evaluate(&config) {
        Ok(None) => {}
        Ok(Some(body)) => {
            println!("{body}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    }
}

/// Returns `Ok(None)` to permit, `Ok(Some(json_body))` to defer with
/// feedback for the caller.
fn evaluate(config: &Config) -> govcore::error::Result<Option<String>> {
    let flags = flag::list_flags(&config.task_dir)?;
    if flags.is_empty() {
        return Ok(None);
    }

    let mut worst: Option<(FlagStatus, String)> = None;
    for path in flags {
        if flag::is_stale(&path, config.review_flag_staleness_ms)? {
            flag::clear_flag(&path)?;
            continue;
        }
        let Some(content) = flag::read_flag(&path)? else {
            continue;
        };
        let replace = match &worst {
            None => true,
            Some((current, _)) => content.status > *current,
        };
        if replace {
            worst = Some((content.status, content.message));
        }
    }

    match worst {
        None => Ok(None),
        Some((FlagStatus::Pending, message)) => Ok(Some(format!(
            "{{\"status\":\"pending\",\"message\":\"{message}\"}}"
        ))),
        Some((FlagStatus::Error, message)) => Ok(Some(format!(
            "{{\"status\":\"pending\",\"message\":\"{message}\"}}"
        ))),
        Some((FlagStatus::Revise, message)) => Ok(Some(format!(
            "{{\"status\":\"revise\",\"message\":\"{message}\"}}"
        ))),
    }
}
