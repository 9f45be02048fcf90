use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use logpipe::broker::{Broker, LogBroker};
use logpipe::client::ProducerClient;
use logpipe::config::{Settings, load_config};
use logpipe::consumer::{DelayProcessor, Listener};
use logpipe::persistence::Persistence;
use logpipe::publisher::Publisher;
use logpipe::transport::websocket;
use logpipe::utils::error::Result;
use logpipe::utils::logging;

#[derive(Debug, Parser)]
#[command(name = "logpipe", version, about = "Producer, broker and consumer groups in one binary")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the broker, the producer endpoint and the configured consumers
    Serve,
    /// Submit one message to a running producer
    Publish {
        /// Producer endpoint; defaults to the configured server address
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        content: String,
        #[arg(long)]
        sender: String,
        #[arg(long)]
        priority: Option<String>,
    },
    /// Ask a running producer whether it is up
    Health {
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log.level);

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Publish {
            url,
            content,
            sender,
            priority,
        } => {
            let url = url.unwrap_or_else(|| default_url(&settings));
            publish(&url, &content, &sender, priority.as_deref()).await
        }
        Command::Health { url } => health(&url.unwrap_or_else(|| default_url(&settings))).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn default_url(settings: &Settings) -> String {
    format!("ws://{}:{}", settings.server.host, settings.server.port)
}

async fn serve(settings: Settings) -> Result<()> {
    let retention = settings.broker.retention();
    let store = match &settings.broker.data_dir {
        Some(dir) => Persistence::open(dir, retention)?,
        None => Persistence::temporary(retention)?,
    };
    let broker = LogBroker::new(store, settings.broker.partitions, settings.broker.offset_reset);
    let topic = settings.pipeline.topic.as_str();
    let stored = broker.partitions(topic)?;
    let partitions = broker.create_topic(topic, settings.broker.partitions)?;
    if let Some(stored) = stored.filter(|p| *p != settings.broker.partitions) {
        warn!(
            topic,
            stored,
            configured = settings.broker.partitions,
            "topic already exists, keeping its partition count"
        );
    }
    info!(topic, partitions, "broker ready");

    let shared: Arc<dyn Broker> = Arc::new(broker.clone());

    let mut listeners = Vec::with_capacity(settings.consumers.len());
    for consumer in &settings.consumers {
        let processor = Arc::new(DelayProcessor::new(&consumer.label, consumer.delay()));
        let handle = Listener::new(topic, &consumer.group_id, processor)
            .start(shared.clone())
            .await?;
        info!(
            consumer = %consumer.label,
            group = %consumer.group_id,
            delay_ms = consumer.delay_ms,
            "consumer started"
        );
        listeners.push(handle);
    }

    let publisher =
        Publisher::new(shared, topic).with_date_format(settings.pipeline.date_format);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    let in_flight = publisher.clone();

    let outcome = tokio::select! {
        served = websocket::serve(listener, publisher) => served,
        signal = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            signal
        }
    };

    let pending = in_flight.pending();
    if pending > 0 {
        info!(pending, "waiting for in-flight publishes");
    }
    in_flight.drain().await;

    for handle in listeners {
        handle.stop().await;
    }
    broker.flush().await?;
    info!("broker flushed, bye");

    Ok(outcome?)
}

async fn publish(url: &str, content: &str, sender: &str, priority: Option<&str>) -> Result<()> {
    let mut client = ProducerClient::connect(url).await?;
    let id = client.publish(content, sender, priority).await?;
    println!("ENVIADA {id}");
    client.close().await?;
    Ok(())
}

async fn health(url: &str) -> Result<()> {
    let mut client = ProducerClient::connect(url).await?;
    let service = client.health().await?;
    println!("UP {service}");
    client.close().await?;
    Ok(())
}
