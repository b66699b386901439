//! Edit a shop's announcement bars stored as JSON files on disk.
//!
//! Usage: bars --shop demo.myshopify.com [--dir ./data/bars] <COMMAND>
//!   list                        : Show bars in display order with their status
//!   add --text TEXT [...]       : Append a new bar
//!   edit ID [--text TEXT] [...] : Change fields of an existing bar
//!   remove ID                   : Delete a bar
//!   move INDEX up|down          : Swap a bar with its neighbour
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use scheduled_bar_api::{
    models::bar::{format_instant, BarRecord},
    services::{
        editor::{create_draft, Direction, EditError, EditSession},
        ids::UuidGenerator,
        metafields::FileStore,
        status::{evaluate_status, evaluate_status_message},
    },
};

#[derive(Parser)]
#[command(name = "bars", about = "Edit announcement bars stored on disk")]
struct Args {
    /// Shop domain the settings belong to
    #[arg(long)]
    shop: String,

    /// Directory holding one settings file per shop
    #[arg(long, default_value = "./data/bars")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct BarFields {
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    background_color: Option<String>,
    #[arg(long)]
    text_color: Option<String>,
    /// RFC 3339 instant, e.g. 2024-01-01T00:00:00Z
    #[arg(long)]
    start: Option<DateTime<Utc>>,
    #[arg(long)]
    end: Option<DateTime<Utc>>,
    #[arg(long)]
    enabled: Option<bool>,
    #[arg(long)]
    dismissible: Option<bool>,
    /// Remove both dates
    #[arg(long, conflicts_with_all = ["start", "end"])]
    clear_dates: bool,
}

impl BarFields {
    fn apply(self, bar: &mut BarRecord) {
        if let Some(text) = self.text {
            bar.text = text;
        }
        if let Some(color) = self.background_color {
            bar.background_color = color;
        }
        if let Some(color) = self.text_color {
            bar.text_color = color;
        }
        if self.clear_dates {
            bar.start_date = None;
            bar.end_date = None;
        }
        if let Some(start) = self.start {
            bar.start_date = Some(format_instant(start));
        }
        if let Some(end) = self.end {
            bar.end_date = Some(format_instant(end));
        }
        if let Some(enabled) = self.enabled {
            bar.enabled = enabled;
        }
        if let Some(dismissible) = self.dismissible {
            bar.dismissible = dismissible;
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show bars in display order with their status
    List {
        /// Evaluate statuses at this instant instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Append a new bar
    Add {
        #[command(flatten)]
        fields: BarFields,
    },
    /// Change fields of an existing bar
    Edit {
        id: String,
        #[command(flatten)]
        fields: BarFields,
    },
    /// Delete a bar
    Remove { id: String },
    /// Swap a bar with its neighbour
    Move { index: usize, direction: Direction },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let args = Args::parse();
    let store = FileStore::new(&args.dir);
    let mut session = EditSession::open(&store, &args.shop, &UuidGenerator).await?;
    let now = Utc::now();

    match args.command {
        Command::List { at } => {
            print_bars(&session, at.unwrap_or(now));
            return Ok(());
        }
        Command::Add { fields } => {
            let mut draft = create_draft(&UuidGenerator, now);
            fields.apply(&mut draft);
            let index = session.upsert_draft(draft, now)?;
            println!("Added bar at position {index}");
        }
        Command::Edit { id, fields } => {
            let mut bar = session
                .find(&id)
                .ok_or_else(|| EditError::NotFound(id.clone()))?;
            fields.apply(&mut bar);
            session.upsert_draft(bar, now)?;
            println!("Updated bar {id}");
        }
        Command::Remove { id } => {
            if session.remove(&id) {
                println!("Removed bar {id}");
            } else {
                println!("No bar with id {id}, nothing removed");
            }
        }
        Command::Move { index, direction } => {
            if !session.move_bar(index, direction) {
                println!("Bar {index} cannot move {direction}, order unchanged");
            }
        }
    }

    if session.is_dirty() {
        session.save_to(&store, &args.shop).await?;
        tracing::info!("Saved bar settings for {}", args.shop);
    }
    print_bars(&session, now);

    Ok(())
}

fn print_bars(session: &EditSession, now: DateTime<Utc>) {
    if session.bars().is_empty() {
        println!("No announcements yet. Use `bars add --text ...` to create one.");
        return;
    }

    for (index, bar) in session.bars().iter().enumerate() {
        let window = match (bar.start_date.as_deref(), bar.end_date.as_deref()) {
            (Some(start), Some(end)) => format!("{start} -> {end}"),
            (Some(start), None) => format!("{start} -> no end date"),
            (None, Some(end)) => format!("no start date -> {end}"),
            (None, None) => "no dates".to_owned(),
        };
        println!(
            "{index:>2}  {:<9}  {}  {}  [{}]",
            evaluate_status(bar, now).label(),
            bar.id,
            bar.text,
            window
        );
        if let Some(message) = evaluate_status_message(bar) {
            println!("              {message}");
        }
    }
}
