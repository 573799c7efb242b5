//! Command-line task watcher.
//!
//! ```text
//! taskwatch watch <task-id>
//! taskwatch instruct <task-id> <instruction...>
//! ```
//!
//! Configuration comes from the environment (see `taskwatch::config`).
//! Log output is controlled with `RUST_LOG` (default `taskwatch=info`).

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use taskwatch::{Config, HttpTaskApi, SessionContext, SessionView, TaskApi, TaskWatcher};

const USAGE: &str = "usage: taskwatch watch <task-id>\n       taskwatch instruct <task-id> <instruction...>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskwatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, task_id) = match args.as_slice() {
        [command, task_id, ..] => (command.as_str(), task_id.clone()),
        _ => anyhow::bail!(USAGE),
    };

    let config = Config::from_env().context("Failed to load configuration")?;
    let api: Arc<dyn TaskApi> = Arc::new(
        HttpTaskApi::new(&config.api_url, config.api_token.clone(), config.request_timeout)
            .context("Failed to build HTTP client")?,
    );
    tracing::info!("Using task service at {}", config.api_url);

    match command {
        "watch" => watch(api, task_id, &config).await,
        "instruct" => {
            let instruction = args[2..].join(" ");
            if instruction.trim().is_empty() {
                anyhow::bail!(USAGE);
            }
            instruct(api, task_id, &instruction, &config).await
        }
        other => anyhow::bail!("unknown command {:?}\n{}", other, USAGE),
    }
}

async fn watch(api: Arc<dyn TaskApi>, task_id: String, config: &Config) -> anyhow::Result<()> {
    let handle = TaskWatcher::new(api, task_id, config.watch_settings()).spawn();
    let mut views = handle.views();
    let mut printed = 0;

    loop {
        tokio::select! {
            changed = views.changed() => {
                let view = views.borrow_and_update().clone();
                printed = print_new_events(&view, printed);
                if changed.is_err() || view.phase.is_finished() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                handle.stop();
                break;
            }
        }
    }

    let view = handle.finished().await;
    print_new_events(&view, printed);
    if !view.widgets.is_empty() {
        println!("{}", serde_json::to_string_pretty(&view.widgets)?);
    }
    Ok(())
}

async fn instruct(
    api: Arc<dyn TaskApi>,
    task_id: String,
    instruction: &str,
    config: &Config,
) -> anyhow::Result<()> {
    let ctx = SessionContext {
        user_id: config.user_id.clone(),
        navigation_blocked: false,
    };
    let mut watcher = TaskWatcher::new(api, task_id, config.watch_settings());
    if let Some(event) = watcher.send_instruction(instruction, &ctx).await {
        println!("[{}] {}", event.kind, event.content);
    }
    Ok(())
}

/// Print events past `already_printed`; returns the new count.
fn print_new_events(view: &SessionView, already_printed: usize) -> usize {
    for event in view.events.iter().skip(already_printed) {
        println!(
            "{} [{}] {}",
            event.timestamp.format("%H:%M:%S"),
            event.kind,
            event.content
        );
    }
    view.events.len().max(already_printed)
}
