use std::process::ExitCode;

use clap::Parser;
use log::error;

use crate::command::Cli;

mod bencoding;
mod client;
mod codec;
mod command;
mod core;
mod crypto;
mod message;
mod peer;
mod torrent;
mod tracker;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match command::execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
