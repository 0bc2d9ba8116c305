#![allow(clippy::all)]
#![deny(
    unused_variables,
    unused_mut,
    unused_attributes,
    clippy::unnecessary_mut_passed,
    clippy::let_underscore_future,
    unused_must_use,
    unconditional_recursion
)]

use std::process::ExitCode;

use clap::Parser;
use cmd_arg::CmdArgs;

use result::ZmResultExt;
use sys::Sys;
use tracing::Level;
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer,
};

pub mod general;
pub mod monitor;

pub mod cmd_arg;
pub mod config;
pub mod result;
pub mod sys;
pub mod util;

#[tokio::main]
async fn main() -> ExitCode {
    start_tracing();
    let args = CmdArgs::parse();

    if args.dump_default_config {
        return match config::dump_default_config() {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!("dump default config failed: {:?}", err);
                ExitCode::FAILURE
            }
        };
    }

    let config = match config::read_config(&args) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("read config failed: {}", err);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("config: {:?}", config);

    let mut sys = match Sys::new(config) {
        Ok(sys) => sys,
        Err(err) => {
            tracing::error!("init failed: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let res = sys.wait_for_end().await;
    res.todo_handle();
    if res.is_err() {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

pub fn start_tracing() {
    let my_filter = tracing_subscriber::filter::filter_fn(|v| {
        if let Some(mp) = v.module_path() {
            if mp.contains("hyper") || mp.contains("reqwest") {
                return false;
            }
            if *v.level() == Level::DEBUG && mp.contains("tower_http") {
                return false;
            }
        }
        v.level() != &tracing::Level::TRACE
    });
    let my_layer = tracing_subscriber::fmt::layer();
    let _ = tracing_subscriber::registry()
        .with(my_layer.with_filter(my_filter))
        .try_init();
}
