use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod items;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use items::ItemCreate;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    init_logging();

    let config = Config::load()?;
    let app_mgr = app::App::new(config)?;

    match args.command {
        cli::Command::Daemon {} => web::start_daemon(app_mgr),

        cli::Command::Add {
            title,
            description,
            kind,
            location,
        } => {
            let item = app_mgr.create_item(ItemCreate {
                title,
                description,
                kind,
                location,
            })?;
            println!("{}", serde_json::to_string_pretty(&item)?);
            Ok(())
        }

        cli::Command::Get { id } => {
            let item = app_mgr.get_item(id)?;
            println!("{}", serde_json::to_string_pretty(&item)?);
            Ok(())
        }

        cli::Command::Matches { id, top_k } => {
            app_mgr.ensure_embedding(id)?;
            let matches = app_mgr.find_matches(id, top_k)?;
            println!("{}", serde_json::to_string_pretty(&matches)?);
            Ok(())
        }

        cli::Command::Embed { id } => {
            app_mgr.ensure_embedding(id)?;
            println!("item {id} has an embedding");
            Ok(())
        }

        cli::Command::Backfill {} => {
            let pending = app_mgr.pending_embeddings()?;
            if pending == 0 {
                println!("all items have embeddings");
                return Ok(());
            }

            let progress = ProgressBar::new(pending as u64);
            progress.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} embedded ({eta})")?,
            );

            let report = app_mgr.backfill(|| progress.inc(1))?;
            progress.finish_and_clear();

            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
