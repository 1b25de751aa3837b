use std::{
    io::{self, Write},
    sync::Arc,
};

use anyhow::Result;
use clap::Parser;
use client_core::{
    BackendKind, BackendSet, ListController, ListEvent, LocalBackend, RemoteBackend, SyncStatus,
};
use shared::{
    domain::{Item, ItemId},
    protocol::DEFAULT_LIST_PATH,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
struct Args {
    /// Backend to start on.
    #[arg(long, default_value_t = BackendKind::Local)]
    backend: BackendKind,
    /// SQLite database url backing the local list.
    #[arg(long, default_value = "sqlite://shopping.db")]
    database_url: String,
    /// Base url of the sync server backing the shared list.
    #[arg(long, default_value = "http://127.0.0.1:8820")]
    server_url: String,
    /// List path on the sync server.
    #[arg(long, default_value = DEFAULT_LIST_PATH)]
    list_path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();
    let args = Args::parse();

    let backends = BackendSet::new(
        Arc::new(LocalBackend::open(&args.database_url).await?),
        Arc::new(RemoteBackend::new(&args.server_url, &args.list_path)?),
    );

    let controller = ListController::new();
    let mut events = controller.subscribe_events();
    let mut active = args.backend;
    controller.activate(backends.select(active)).await?;

    println!("shopping list on the {active} backend, 'help' for commands");
    print_items(&controller.items().await);
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_command(&controller, &backends, &mut active, &line).await {
                            break;
                        }
                        prompt();
                    }
                    None => break,
                }
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    println!();
                    match event {
                        ListEvent::ItemsChanged(items) => print_items(&items),
                        ListEvent::SyncLost { reason } => {
                            println!("live sync lost ({reason}); showing the last known items, run 'sync' to reconnect");
                        }
                    }
                    prompt();
                }
            }
        }
    }
    Ok(())
}

/// Runs one REPL command. Returns false when the user asked to quit.
async fn handle_command(
    controller: &Arc<ListController>,
    backends: &BackendSet,
    active: &mut BackendKind,
    line: &str,
) -> bool {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "" => {}
        "add" => match rest.split_once('|') {
            Some((title, quantity)) => match controller.add_item(title, quantity).await {
                Ok(item) => println!("added {} ({})", item.title, item.id),
                Err(err) => println!("error: {err}"),
            },
            None => println!("usage: add <title> | <quantity>"),
        },
        "rm" => {
            if rest.is_empty() {
                println!("usage: rm <id>");
            } else {
                match controller.remove_item(&ItemId::from(rest)).await {
                    Ok(()) => println!("removed {rest}"),
                    Err(err) => println!("error: {err}"),
                }
            }
        }
        "list" | "ls" => print_items(&controller.items().await),
        "use" => match rest.parse::<BackendKind>() {
            Ok(kind) => switch_backend(controller, backends, active, kind).await,
            Err(err) => println!("error: {err}"),
        },
        "sync" => {
            let result = if controller.status().await == SyncStatus::Stale {
                controller.reactivate().await
            } else {
                controller.refresh().await
            };
            match result {
                Ok(()) => println!("synced"),
                Err(err) => println!("error: {err}"),
            }
        }
        "status" => {
            let label = match controller.status().await {
                SyncStatus::Idle => "idle",
                SyncStatus::Live => "live",
                SyncStatus::Stale => "stale, run 'sync' to reconnect",
            };
            println!("backend: {active}, sync: {label}");
        }
        "help" => print_help(),
        "quit" | "exit" => return false,
        other => println!("unknown command '{other}', try 'help'"),
    }
    true
}

async fn switch_backend(
    controller: &Arc<ListController>,
    backends: &BackendSet,
    active: &mut BackendKind,
    kind: BackendKind,
) {
    if *active == kind {
        println!("already on the {kind} backend");
        return;
    }
    match controller.activate(backends.select(kind)).await {
        Ok(()) => {
            *active = kind;
            println!("switched to the {kind} backend");
        }
        Err(err) => {
            println!("error: {err}");
            // The failed switch tore the old backend down; put it back.
            match controller.activate(backends.select(*active)).await {
                Ok(()) => println!("staying on the {active} backend"),
                Err(err) => println!("error: could not reattach the {active} backend: {err}"),
            }
        }
    }
}

fn print_items(items: &[Item]) {
    if items.is_empty() {
        println!("(list is empty)");
        return;
    }
    for item in items {
        println!("  [{}] {} ({})", item.id, item.title, item.quantity);
    }
}

fn print_help() {
    println!("commands:");
    println!("  add <title> | <quantity>   add an item");
    println!("  rm <id>                    remove an item");
    println!("  list                       show the current items");
    println!("  use local|remote           switch the active backend");
    println!("  sync                       refresh, reconnecting live sync if it was lost");
    println!("  status                     show the active backend and sync state");
    println!("  quit                       exit");
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
