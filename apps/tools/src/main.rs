use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::domain::NewItem;
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://shopping.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Add { title: String, quantity: String },
    List,
    Remove { id: i64 },
    Clear,
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Add { title, quantity } => {
            let input = NewItem::parse(&title, &quantity)?;
            let stored = storage
                .insert_item(input.title(), input.quantity())
                .await?;
            println!("added id={} {} ({})", stored.id, stored.title, stored.quantity);
        }
        Command::List => {
            let items = storage.list_items().await?;
            if items.is_empty() {
                println!("(no items)");
            }
            for item in items {
                println!("{}\t{}\t{}", item.id, item.title, item.quantity);
            }
        }
        Command::Remove { id } => {
            if storage.delete_item(id).await? {
                println!("removed id={id}");
            } else {
                println!("no item with id={id}");
            }
        }
        Command::Clear => {
            let removed = storage.clear_items().await?;
            println!("removed {removed} items");
        }
        Command::Stats => {
            println!("{} items stored", storage.count_items().await?);
        }
    }

    Ok(())
}
