use clap::{Parser, Subcommand, ValueEnum};
use common::utils::logging::{init_logging_cli, LogFormat};
use dotenvy::dotenv;
use serde_json::Value;
use service::ai::{ChatClient, ChatMessage, Role};
use service::records::{ChatHistory, ChatRecord, ConsentStore};
use service::storage::{sanitize_key, DurableKv};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sahaay", version, about = "Sahaay local store and chat tooling")]
struct Cli {
    /// Emit structured JSON logs (on stderr) instead of the compact format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the value stored at KEY
    Get {
        key: String,
        /// JSON value to print when the key is absent or unreadable
        #[arg(long)]
        default: Option<String>,
    },
    /// Store VALUE (JSON, or a plain string) at KEY
    Set { key: String, value: String },
    /// Remove KEY
    Delete { key: String },
    /// List every stored key
    Keys,
    /// Show the storage key INPUT normalizes to
    Sanitize { input: String },
    /// Manage privacy consents
    Consent {
        #[arg(value_enum)]
        action: ConsentAction,
    },
    /// Send MESSAGE in chat CHAT_ID and print the reply
    Chat { chat_id: String, message: String },
    /// Show backend, retry settings and metrics
    Diag,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConsentAction {
    Grant,
    Revoke,
    Show,
}

fn init_logging(json: bool) {
    // load .env first so RUST_LOG and SAHAAY_* take effect
    dotenv().ok();
    let format = if json { LogFormat::Json } else { LogFormat::Compact };
    // stderr only: stdout carries command output
    init_logging_cli(format);
    info!(service = "sahaay", event = "logger_init", "tracing subscriber initialized");
}

/// Interpret a CLI argument as JSON, keeping it as a string when it is not.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, cfg: configs::AppConfig) -> anyhow::Result<()> {
    if let Command::Sanitize { input } = &cli.command {
        println!("{}", sanitize_key(input));
        return Ok(());
    }

    common::env::ensure_data_dir(&cfg.storage.data_file).await?;
    let kv = DurableKv::from_config(&cfg);

    match cli.command {
        Command::Get { key, default } => match default {
            Some(raw) => print_json(&kv.get_or(&key, parse_value(&raw)).await)?,
            None => print_json(&kv.get(&key).await?.unwrap_or(Value::Null))?,
        },
        Command::Set { key, value } => {
            kv.set(&key, parse_value(&value)).await?;
            info!(event = "set", %key, "value stored");
        }
        Command::Delete { key } => {
            kv.delete(&key).await?;
            info!(event = "delete", %key, "value removed");
        }
        Command::Keys => {
            for key in kv.keys().await {
                println!("{key}");
            }
        }
        Command::Consent { action } => {
            let consents = ConsentStore::new(kv.clone());
            match action {
                ConsentAction::Grant => {
                    consents.grant_all().await?;
                }
                ConsentAction::Revoke => consents.revoke().await?,
                ConsentAction::Show => {}
            }
            print_json(&serde_json::to_value(consents.load().await)?)?;
        }
        Command::Chat { chat_id, message } => {
            let consents = ConsentStore::new(kv.clone());
            if !consents.load().await.ai_processing {
                anyhow::bail!("AI processing consent not granted; run `sahaay consent grant` first");
            }
            let client = ChatClient::new(&cfg.ai)?;
            let history = ChatHistory::new(kv.clone());

            let records = history.append(&chat_id, ChatRecord::new(Role::User, message)).await?;
            let messages: Vec<ChatMessage> = records.iter().map(ChatMessage::from).collect();
            let reply = client.complete(&messages).await?;
            history.append(&chat_id, ChatRecord::new(Role::Assistant, reply.clone())).await?;
            println!("{reply}");
        }
        Command::Diag => {
            let keys = kv.keys().await;
            let backend = kv.backend_kind().map(|k| k.to_string()).unwrap_or_else(|| "unresolved".into());
            println!("backend: {backend}");
            println!("data_file: {}", cfg.storage.data_file);
            println!("namespace: {}", cfg.storage.namespace);
            println!("keys: {}", keys.len());
            let policy = kv.policy();
            println!(
                "retry: max_retries={} timeout={:?} backoff_base={:?}",
                policy.max_retries(),
                policy.timeout(),
                policy.backoff_for(0)
            );
            print!("{}", service::observability::encode_metrics());
        }
        Command::Sanitize { .. } => {}
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let run_id = Uuid::new_v4();
    let pid = std::process::id();

    // Panic hook: log instead of dying silently
    std::panic::set_hook(Box::new(move |info| {
        error!(service = "sahaay", event = "panic", %run_id, pid, message = %info, "unhandled panic occurred");
    }));

    let cfg = match configs::AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(service = "sahaay", event = "config_invalid", error = %e, "failed to load configuration");
            return std::process::ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "sahaay", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli, cfg)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(service = "sahaay", event = "command_failed", %run_id, error = %e, "command failed");
            eprintln!("error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_get_with_default() {
        let cli = Cli::parse_from(["sahaay", "get", "user-consents", "--default", "{}"]);
        match cli.command {
            Command::Get { key, default } => {
                assert_eq!(key, "user-consents");
                assert_eq!(default.as_deref(), Some("{}"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn non_json_arguments_become_strings() {
        assert_eq!(parse_value("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(parse_value("hello there"), Value::String("hello there".into()));
        assert_eq!(parse_value("42"), serde_json::json!(42));
    }
}
