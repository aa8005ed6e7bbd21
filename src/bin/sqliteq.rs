//! sqliteq CLI: operator interface to queues in a SQLite database.

use clap::{Parser, Subcommand, ValueEnum};
use sqliteq::config::{Config, QueueOptions};
use sqliteq::telemetry::{TelemetryConfig, init_telemetry};
use sqliteq::{Queue, Registry, Selection};

#[derive(Parser)]
#[command(name = "sqliteq", about = "Durable work queues on SQLite")]
struct Cli {
    /// Queue kind; determines dequeue order
    #[arg(long, value_enum, global = true, default_value_t = Kind::Fifo)]
    kind: Kind,
    /// Keep acknowledged items as `completed` instead of deleting them
    #[arg(long, global = true)]
    retain: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Fifo,
    Priority,
}

#[derive(Subcommand)]
enum Command {
    /// Add an item
    Enqueue {
        queue: String,
        /// Payload, stored as UTF-8 bytes
        payload: String,
        /// Priority (lower = served first); implies --kind priority
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Remove and print the next item, without acknowledgment
    Dequeue { queue: String },
    /// Claim items with acknowledgment, print them, then acknowledge
    Consume {
        queue: String,
        /// Maximum items to claim
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Leave claims unacknowledged (they are requeued on next start)
        #[arg(long)]
        no_ack: bool,
    },
    /// Number of pending items
    Len { queue: String },
    /// Pending payloads in dequeue order
    Values {
        queue: String,
        #[arg(long)]
        json: bool,
    },
    /// Row counts per status
    Stats { queue: String },
    /// Delete every item in the queue
    Purge { queue: String },
    /// Walk through FIFO and priority queues on an in-memory database
    Demo,
}

impl Command {
    fn queue_name(&self) -> Option<&str> {
        match self {
            Command::Enqueue { queue, .. }
            | Command::Dequeue { queue }
            | Command::Consume { queue, .. }
            | Command::Len { queue }
            | Command::Values { queue, .. }
            | Command::Stats { queue }
            | Command::Purge { queue } => Some(queue),
            Command::Demo => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Command::Demo = cli.command {
        let _guard = init_telemetry(TelemetryConfig {
            endpoint: None,
            service_name: "sqliteq".to_string(),
            log_level: "warn".to_string(),
        })?;
        return cmd_demo().await;
    }

    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig::from_config(&config, "sqliteq"))?;

    let mut options = config.queue_options;
    if cli.retain {
        options = options.remove_on_complete(false);
    }

    let registry = Registry::open_location(&config.database).await?;
    let name = cli.command.queue_name().unwrap_or_default().to_string();

    let prioritized = cli.kind == Kind::Priority
        || matches!(cli.command, Command::Enqueue { priority: Some(_), .. });
    let result = if prioritized {
        let queue = registry.new_priority_queue(&name, options).await?;
        match cli.command {
            Command::Enqueue {
                payload, priority, ..
            } => {
                queue
                    .enqueue_with_priority(payload.as_bytes(), priority.unwrap_or(0))
                    .await?;
                println!("Enqueued to {name} (priority {})", priority.unwrap_or(0));
                Ok(())
            }
            command => run(&queue, command).await,
        }
    } else {
        let queue = registry.new_queue(&name, options).await?;
        run(&queue, cli.command).await
    };

    registry.close().await;
    result
}

async fn run<S: Selection>(queue: &Queue<S>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Enqueue { payload, .. } => {
            queue.enqueue(payload.as_bytes()).await?;
            println!("Enqueued to {}", queue.name());
        }
        Command::Dequeue { .. } => match queue.dequeue().await? {
            Some(payload) => println!("{}", String::from_utf8_lossy(&payload)),
            None => println!("Queue {} is empty.", queue.name()),
        },
        Command::Consume { count, no_ack, .. } => cmd_consume(queue, count, no_ack).await?,
        Command::Len { .. } => println!("{}", queue.len().await?),
        Command::Values { json, .. } => {
            let values: Vec<String> = queue
                .values()
                .await?
                .iter()
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else if values.is_empty() {
                println!("No pending items.");
            } else {
                for (i, value) in values.iter().enumerate() {
                    println!("{:>4}  {value}", i + 1);
                }
            }
        }
        Command::Stats { .. } => {
            let stats = queue.stats().await?;
            println!("Pending:     {}", stats.pending);
            println!("Processing:  {}", stats.processing);
            println!("Completed:   {}", stats.completed);
        }
        Command::Purge { .. } => {
            let removed = queue.purge().await?;
            println!("Purged {removed} item(s) from {}", queue.name());
        }
        Command::Demo => cmd_demo().await?,
    }
    Ok(())
}

async fn cmd_consume<S: Selection>(
    queue: &Queue<S>,
    count: usize,
    no_ack: bool,
) -> anyhow::Result<()> {
    let mut consumed = 0;
    while consumed < count {
        let Some(claimed) = queue.dequeue_with_ack().await? else {
            break;
        };
        consumed += 1;
        println!(
            "{}  {}",
            claimed.ack_token,
            String::from_utf8_lossy(&claimed.payload)
        );
        if !no_ack && !queue.acknowledge(&claimed.ack_token).await? {
            anyhow::bail!("acknowledgment for {} was not accepted", claimed.ack_token);
        }
    }

    if consumed == 0 {
        println!("Queue {} is empty.", queue.name());
    }
    Ok(())
}

async fn cmd_demo() -> anyhow::Result<()> {
    let registry = Registry::open_in_memory().await?;

    println!("FIFO queue");
    println!("{}", "-".repeat(40));
    let tasks = registry.new_queue("tasks", QueueOptions::default()).await?;
    for payload in ["Task 1", "Task 2", r#"{"task":"Complex Task","priority":"high"}"#] {
        tasks.enqueue(payload).await?;
    }
    println!("Queue length: {}", tasks.len().await?);
    for (i, value) in tasks.values().await?.iter().enumerate() {
        println!("  {}: {}", i + 1, String::from_utf8_lossy(value));
    }

    if let Some(claimed) = tasks.dequeue_with_ack().await? {
        println!(
            "Claimed {} (ack token {})",
            String::from_utf8_lossy(&claimed.payload),
            claimed.ack_token
        );
        let acked = tasks.acknowledge(&claimed.ack_token).await?;
        println!("Acknowledged: {acked}");
    }
    if let Some(payload) = tasks.dequeue().await? {
        println!("Dequeued {}", String::from_utf8_lossy(&payload));
    }
    println!("Queue length after dequeuing: {}", tasks.len().await?);
    tasks.purge().await?;
    println!("Queue length after purge: {}", tasks.len().await?);

    println!();
    println!("Priority queue");
    println!("{}", "-".repeat(40));
    let jobs = registry
        .new_priority_queue("jobs", QueueOptions::default().remove_on_complete(false))
        .await?;
    for (payload, priority) in [
        ("low priority", 10),
        ("medium priority", 5),
        ("high priority", 1),
        ("critical", 0),
    ] {
        jobs.enqueue_with_priority(payload, priority).await?;
        println!("Enqueued {payload:?} at priority {priority}");
    }
    while let Some(claimed) = jobs.dequeue_with_ack().await? {
        println!("Processing {}", String::from_utf8_lossy(&claimed.payload));
        jobs.acknowledge(&claimed.ack_token).await?;
    }
    let stats = jobs.stats().await?;
    println!(
        "Pending {}, processing {}, completed {}",
        stats.pending, stats.processing, stats.completed
    );

    registry.close().await;
    Ok(())
}
