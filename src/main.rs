use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmdflow::background::{BackgroundTaskManager, InMemoryArchiverRepository, TokioTaskExecutor};
use cmdflow::protocol::{Authentication, Intent, NO_KEY, Record, RecordValue, RequestMetadata};
use cmdflow::stream::CommandResponse;
use cmdflow::{ActorCluster, EngineConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cmdflow")]
#[command(about = "Partitioned command-processing engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reads one JSON command per line from stdin and prints every response.
    Run {
        #[arg(long, default_value_t = 3)]
        partitions: u32,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seconds to wait for outstanding responses once stdin is closed.
        #[arg(long, default_value_t = 5)]
        response_timeout: u64,
    },
    /// Prints the effective configuration.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// A client command as read from stdin.
#[derive(Debug, Deserialize)]
struct ClientCommand {
    #[serde(default = "default_partition")]
    partition: u32,
    #[serde(default = "no_key")]
    key: i64,
    intent: Intent,
    value: RecordValue,
    username: Option<String>,
    tenant_id: Option<String>,
}

fn default_partition() -> u32 {
    1
}

fn no_key() -> i64 {
    NO_KEY
}

impl ClientCommand {
    fn into_record(self) -> (u32, Record) {
        let mut record = Record::command(self.partition, self.key, self.intent, self.value);
        if let Some(username) = self.username {
            record = record.with_authentication(Authentication::user(username));
        }
        if let Some(tenant_id) = self.tenant_id {
            record = record.with_tenant(tenant_id);
        }
        (self.partition, record)
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Submits the command on one input line; returns the request to wait for.
fn submit_line(cluster: &ActorCluster, line: &str) -> Option<RequestMetadata> {
    let command: ClientCommand = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(err) => {
            tracing::warn!(error = %err, "skipping malformed command");
            return None;
        }
    };
    let (partition, record) = command.into_record();
    match cluster.submit(partition, record) {
        Ok(request) => Some(request),
        Err(err) => {
            tracing::warn!(partition, error = %err, "skipping command");
            None
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(output: &mut W, response: &CommandResponse) -> Result<()> {
    let mut out = serde_json::to_string(response)?;
    out.push('\n');
    output.write_all(out.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

/// Reads commands line by line and writes every response as it arrives.
///
/// A response may come long after its command, e.g. a claim waits for the
/// completion of its listener jobs, so reading never blocks on one. Once the
/// input ends, outstanding responses are awaited for at most `drain_timeout`.
async fn serve<R, W>(
    cluster: &ActorCluster,
    responses: &mut mpsc::UnboundedReceiver<CommandResponse>,
    input: R,
    mut output: W,
    drain_timeout: Duration,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut outstanding = HashSet::new();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(request) = submit_line(cluster, &line) {
                    outstanding.insert(request);
                }
            }
            Some(response) = responses.recv() => {
                outstanding.remove(&response.request);
                write_response(&mut output, &response).await?;
            }
        }
    }

    while !outstanding.is_empty() {
        match tokio::time::timeout(drain_timeout, responses.recv()).await {
            Ok(Some(response)) => {
                outstanding.remove(&response.request);
                write_response(&mut output, &response).await?;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(outstanding = outstanding.len(), "input closed before every command was answered");
                break;
            }
        }
    }
    Ok(())
}

async fn run(partitions: u32, config: EngineConfig, drain_timeout: Duration) -> Result<()> {
    let config = Arc::new(config);
    let (responses_tx, mut responses) = mpsc::unbounded_channel::<CommandResponse>();
    let cluster = ActorCluster::start(partitions, config.clone(), Arc::new(responses_tx))?;

    let mut background = BackgroundTaskManager::with_archiver_jobs(
        &config.archiver,
        Arc::new(InMemoryArchiverRepository::new()),
        Arc::new(TokioTaskExecutor::current()?),
    );
    background.start()?;

    let served = serve(
        &cluster,
        &mut responses,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        drain_timeout,
    )
    .await;

    background.close().await;
    cluster.shutdown().await?;
    served
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            partitions,
            config,
            response_timeout,
        } => {
            let config = load_config(config.as_ref())?;
            run(partitions, config, Duration::from_secs(response_timeout)).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdflow::protocol::{
        GroupRecord, JobRecord, TaskListener, TaskListenerEventType, UserTaskRecord, ValueType,
    };
    use tokio::io::{DuplexStream, Lines};

    fn line(partition: u32, key: i64, intent: Intent, value: impl Into<RecordValue>) -> String {
        let mut line = serde_json::json!({
            "partition": partition,
            "key": key,
            "intent": intent,
            "value": value.into(),
        })
        .to_string();
        line.push('\n');
        line
    }

    async fn next_response(output: &mut Lines<BufReader<DuplexStream>>) -> CommandResponse {
        let line = output.next_line().await.unwrap().expect("a response line");
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn listener_flow_is_answered_once_the_job_completes() {
        let (responses_tx, mut responses) = mpsc::unbounded_channel();
        let config = EngineConfig::default().with_identity_setup(false);
        let cluster = ActorCluster::start(1, Arc::new(config), Arc::new(responses_tx)).unwrap();
        let (mut input, input_rx) = tokio::io::duplex(64 * 1024);
        let (output_tx, output_rx) = tokio::io::duplex(64 * 1024);
        let mut output = BufReader::new(output_rx).lines();
        let records = &cluster;

        let client = async move {
            // neither line reaches the engine
            input
                .write_all(line(9, NO_KEY, Intent::Create, GroupRecord::default()).as_bytes())
                .await
                .unwrap();
            input.write_all(b"not json\n").await.unwrap();

            let task = UserTaskRecord {
                bpmn_process_id: "invoice".to_string(),
                task_listeners: vec![TaskListener::new(TaskListenerEventType::Assigning, "audit", 1)],
                ..Default::default()
            };
            input
                .write_all(line(1, NO_KEY, Intent::Create, task).as_bytes())
                .await
                .unwrap();
            let created = next_response(&mut output).await;
            assert_eq!(created.intent, Intent::Created);

            let claim = UserTaskRecord {
                assignee: "alice".to_string(),
                ..Default::default()
            };
            input
                .write_all(line(1, created.key, Intent::Claim, claim).as_bytes())
                .await
                .unwrap();

            let mut job = None;
            for _ in 0..100 {
                job = records.records(1).unwrap().iter().find_map(|record| {
                    (record.is_event()
                        && record.value_type() == ValueType::Job
                        && record.intent == Intent::Created)
                        .then_some(record.key)
                });
                if job.is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let job = job.expect("listener job created");

            input
                .write_all(line(1, job, Intent::Complete, JobRecord::default()).as_bytes())
                .await
                .unwrap();
            let mut answered = vec![
                next_response(&mut output).await,
                next_response(&mut output).await,
            ];
            answered.sort_by_key(|response| response.request.request_id);
            assert_eq!(answered[0].intent, Intent::Assigned);
            assert_eq!(answered[0].key, created.key);
            assert_eq!(answered[1].intent, Intent::Completed);
            drop(input);
        };

        let (served, ()) = tokio::join!(
            serve(
                &cluster,
                &mut responses,
                BufReader::new(input_rx),
                output_tx,
                Duration::from_secs(1),
            ),
            client
        );
        served.unwrap();
        cluster.shutdown().await.unwrap();
    }
}
