mod api;
mod config;
mod diary_entry;
mod diary_state;
mod editor;
mod logging;
mod markdown;
mod ui;

use api::HttpClient;
use clap::Parser;
use color_eyre::Result;
use config::Cli;
use diary_entry::Id;
use diary_state::{DiaryState, Store};
use std::sync::Arc;
use tracing::info;
use ui::UI;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let log = logging::init(cli.log_file)?;
    info!(api = %cli.api_url, diary = ?cli.diary_id, log_file = %log.log_file.display(), "starting");

    let store = Store::new(DiaryState::new(cli.diary_id.map(Id::new)));
    let api = Arc::new(HttpClient::new(cli.api_url, cli.token, store.clone())?);

    let mut ui = UI::new()?;
    let result = ui.run(store, api).await;
    drop(ui);

    info!("shutting down");
    result
}
