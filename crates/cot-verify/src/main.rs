//! Chain-of-Trust Verifier CLI

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cot_core::{RoleLabel, TaskId};
use cot_verify::{verify_chain_of_trust, Config, Context, HttpQueueClient, MinisignVerifier};

/// Verify the chain of trust of a task
#[derive(Parser)]
#[command(name = "cot-verify")]
#[command(about = "Verify the chain of trust of a task", long_about = None)]
struct Cli {
    /// JSON config file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Task to verify
    #[arg(short, long)]
    task_id: String,

    /// Role label of the task
    #[arg(short, long, default_value = "signing")]
    role: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    // Load config
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let client = Arc::new(HttpQueueClient::new(&config.taskcluster_root_url));
    let verifier = Arc::new(MinisignVerifier::from_base64_keys(&config.trusted_keys)?);
    let audit_log = config.audit_log_path();
    let context = Context::new(config, client.clone(), client, verifier);

    let task_id = TaskId::new(cli.task_id);
    match verify_chain_of_trust(context, task_id.clone(), RoleLabel::new(cli.role)).await {
        Ok(()) => {
            info!(task_id = %task_id, audit_log = %audit_log.display(), "Chain of trust verified");
            Ok(())
        }
        Err(e) => {
            error!(task_id = %task_id, audit_log = %audit_log.display(), "Chain of trust verification failed");
            Err(e.into())
        }
    }
}
