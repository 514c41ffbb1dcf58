use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use leasehold_sdk::{AckOutcome, LeaseholdClient, MessageState, StatusError};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "leasehold", about = "Leasehold message queue CLI")]
struct Cli {
    /// Server address
    #[arg(long, default_value = "http://localhost:8080", global = true)]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a message to the queue
    Enqueue {
        /// Message body
        payload: String,
    },

    /// Lease messages for processing
    Claim {
        /// Consumer identifier the lease is recorded under
        #[arg(long)]
        client_id: String,

        /// Maximum number of messages to lease
        #[arg(long, default_value = "1")]
        count: u32,

        /// Lease duration in seconds (server default when omitted)
        #[arg(long)]
        lease_secs: Option<u64>,
    },

    /// Acknowledge (delete) a leased message
    Ack {
        /// Message ID
        message_id: Uuid,

        /// Consumer identifier holding the lease
        #[arg(long)]
        client_id: String,
    },

    /// Show a single message
    Inspect {
        /// Message ID
        message_id: Uuid,
    },

    /// Show queue statistics
    Stats,
}

async fn connect(addr: &str) -> LeaseholdClient {
    match LeaseholdClient::connect(addr).await {
        Ok(client) => client,
        Err(_) => {
            eprintln!("Error: cannot connect to server at {addr}");
            process::exit(1);
        }
    }
}

fn format_status_error(err: &StatusError) -> String {
    match err {
        StatusError::InvalidArgument(message) => format!("Error: {message}"),
        StatusError::Unavailable(_) => "Error: queue store unavailable, try again".to_string(),
        StatusError::Transport(_) => "Error: cannot reach server".to_string(),
        other => format!("Error: {other}"),
    }
}

fn fail(message: String) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

async fn cmd_enqueue(client: &LeaseholdClient, payload: String) {
    match client.enqueue(&payload).await {
        Ok(message) => println!("{}", message.message_id),
        Err(leasehold_sdk::EnqueueError::InvalidPayload(message)) => {
            fail(format!("Error: {message}"))
        }
        Err(leasehold_sdk::EnqueueError::Status(err)) => fail(format_status_error(&err)),
    }
}

async fn cmd_claim(client: &LeaseholdClient, client_id: String, count: u32, lease_secs: Option<u64>) {
    let lease = lease_secs.map(Duration::from_secs);
    match client.claim(&client_id, count, lease).await {
        Ok(messages) => {
            if messages.is_empty() {
                println!("No messages available.");
                return;
            }

            println!("{:<36}  {:>13}  MESSAGE", "ID", "LEASE_EXPIRES");
            for m in &messages {
                println!(
                    "{:<36}  {:>13}  {}",
                    m.message_id, m.lease_expires_at, m.message
                );
            }
        }
        Err(leasehold_sdk::ClaimError::InvalidRequest(message)) => {
            fail(format!("Error: {message}"))
        }
        Err(leasehold_sdk::ClaimError::Status(err)) => fail(format_status_error(&err)),
    }
}

async fn cmd_ack(client: &LeaseholdClient, message_id: Uuid, client_id: String) {
    match client.ack(&message_id, &client_id).await {
        Ok(AckOutcome::Deleted) => println!("Acknowledged {message_id}"),
        Ok(AckOutcome::NotOwned) => fail(format!(
            "Error: message {message_id} is not leased to \"{client_id}\""
        )),
        Err(leasehold_sdk::AckError::InvalidRequest(message)) => fail(format!("Error: {message}")),
        Err(leasehold_sdk::AckError::Status(err)) => fail(format_status_error(&err)),
    }
}

async fn cmd_inspect(client: &LeaseholdClient, message_id: Uuid) {
    match client.inspect(&message_id).await {
        Ok(Some(status)) => {
            let state = match status.state {
                MessageState::Unclaimed => "unclaimed",
                MessageState::Leased => "leased",
                MessageState::Expired => "expired",
            };
            println!("Message: {}", status.message_id);
            println!("  State:        {state}");
            println!("  Created at:   {}", status.created_at);
            if let Some(owner) = &status.assigned_to {
                println!("  Assigned to:  {owner}");
            }
            if let Some(expires_at) = status.lease_expires_at {
                println!("  Lease expiry: {expires_at}");
            }
            println!("  Payload:      {}", status.message);
        }
        Ok(None) => fail(format!("Error: message {message_id} does not exist")),
        Err(leasehold_sdk::InspectError::Status(err)) => fail(format_status_error(&err)),
    }
}

async fn cmd_stats(client: &LeaseholdClient) {
    match client.stats().await {
        Ok(stats) => {
            println!("Depth:      {}", stats.depth);
            println!("Unclaimed:  {}", stats.unclaimed);
            println!("In-flight:  {}", stats.in_flight);
            println!("Expired:    {}", stats.expired);
        }
        Err(err) => fail(format_status_error(&err)),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = connect(&cli.addr).await;

    match cli.command {
        Commands::Enqueue { payload } => cmd_enqueue(&client, payload).await,
        Commands::Claim {
            client_id,
            count,
            lease_secs,
        } => cmd_claim(&client, client_id, count, lease_secs).await,
        Commands::Ack {
            message_id,
            client_id,
        } => cmd_ack(&client, message_id, client_id).await,
        Commands::Inspect { message_id } => cmd_inspect(&client, message_id).await,
        Commands::Stats => cmd_stats(&client).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn claim_defaults_to_one_message() {
        let cli = Cli::try_parse_from(["leasehold", "claim", "--client-id", "w1"]).unwrap();
        match cli.command {
            Commands::Claim {
                client_id,
                count,
                lease_secs,
            } => {
                assert_eq!(client_id, "w1");
                assert_eq!(count, 1);
                assert_eq!(lease_secs, None);
            }
            _ => panic!("expected claim"),
        }
        assert_eq!(cli.addr, "http://localhost:8080");
    }

    #[test]
    fn ack_requires_a_uuid() {
        assert!(Cli::try_parse_from(["leasehold", "ack", "nope", "--client-id", "w1"]).is_err());
        let id = Uuid::now_v7().to_string();
        assert!(Cli::try_parse_from(["leasehold", "--addr", "http://h:1", "ack", &id, "--client-id", "w1"]).is_ok());
    }
}
