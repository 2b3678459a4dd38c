use clap::{Parser, Subcommand};
use service_market::config::Config;
use service_market::current_timestamp;
use service_market::error::{Error, Result};
use service_market::market::Market;
use service_market::push::LogPush;
use service_market::replay;
use service_market::storage::FileStorage;
use std::fs;

#[derive(Parser)]
#[command(name = "service-market")]
#[command(about = "Service Market CLI - request lifecycle and token escrow engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: "human" or "json"
    #[arg(short, long, default_value = "human")]
    pub format: String,

    /// Data directory path
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the data directory
    Init,

    /// Register a marketplace account
    Register {
        /// User id
        user_id: String,
        /// Display name shown in notifications
        name: String,
    },

    /// Credit tokens to an account (signup award / top-up)
    Grant {
        user_id: String,
        amount: u64,
    },

    /// Credit one token for a watched advertisement
    WatchAd {
        user_id: String,
    },

    /// Publish a service listing
    AddListing {
        provider_id: String,
        title: String,
        price: u64,
    },

    /// Open a service request against a listing
    Request {
        listing_id: u64,
        requester_id: String,
    },

    /// Accept a pending request (provider only)
    Accept {
        request_id: u64,
        caller_id: String,
    },

    /// Decline a pending request (provider only); refunds the escrow
    Decline {
        request_id: u64,
        caller_id: String,
    },

    /// Confirm completion of a request (either party)
    Complete {
        request_id: u64,
        caller_id: String,
    },

    /// Cancel an active request (requester only); refunds the escrow
    Cancel {
        request_id: u64,
        caller_id: String,
    },

    /// Expire stale pending requests (run from a scheduler, e.g. every 6h)
    Sweep,

    /// File a report ticket against a request
    Report {
        request_id: u64,
        reporter_id: String,
    },

    /// Mark a notification as read
    MarkRead {
        notification_id: u64,
        user_id: String,
    },

    /// Show account information
    Account {
        user_id: String,
    },

    /// Show one request with its event history
    Show {
        request_id: u64,
        viewer_id: String,
    },

    /// List a user's requests (incoming and outgoing)
    Requests {
        user_id: String,
    },

    /// List a user's notifications
    Notifications {
        user_id: String,
    },

    /// Show the reconciliation report (balances, escrow, digest)
    Audit,

    /// Verify the snapshot against a full log replay
    Verify,
}

/// Format output based on format type
fn format_output<T: serde::Serialize + std::fmt::Debug>(data: &T, format: &str) -> Result<String> {
    match format {
        "json" => serde_json::to_string_pretty(data)
            .map_err(|e| Error::StateError(format!("Failed to serialize JSON: {}", e))),
        _ => Ok(format!("{:#?}", data)),
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.set_data_dir(std::path::PathBuf::from(dir));
    }
    if cli.format == "json" {
        config.set_output_format("json".to_string());
    }

    let storage = FileStorage::new(&config);

    if let Commands::Init = cli.command {
        fs::create_dir_all(config.get_data_dir())
            .map_err(|e| Error::StateError(format!("Failed to create data directory: {}", e)))?;
        println!(
            "Initialized data directory at: {}",
            config.get_data_dir().display()
        );
        return Ok(());
    }

    if let Commands::Verify = cli.command {
        let report = replay::verify_storage(&storage)?;
        println!("{}", format_output(&report, &cli.format)?);
        if !report.consistent {
            return Err(Error::StateError(
                "snapshot does not match log replay".to_string(),
            ));
        }
        return Ok(());
    }

    let market = Market::open(storage, LogPush, &config)?;
    let now = current_timestamp();

    match cli.command {
        Commands::Init | Commands::Verify => unreachable!("handled above"),

        Commands::Register { user_id, name } => {
            market.register_account(&user_id, &name)?;
            println!("✓ Registered account {}", user_id);
            Ok(())
        }

        Commands::Grant { user_id, amount } => {
            let balance = market.grant_tokens(&user_id, amount, now)?;
            println!("✓ Granted {} tokens to {} (balance: {})", amount, user_id, balance);
            Ok(())
        }

        Commands::WatchAd { user_id } => {
            let balance = market.watch_advertisement(&user_id, now)?;
            println!("✓ Advertisement credit for {} (balance: {})", user_id, balance);
            Ok(())
        }

        Commands::AddListing {
            provider_id,
            title,
            price,
        } => {
            let listing_id = market.add_listing(&provider_id, &title, price)?;
            println!("✓ Listing {} published by {}", listing_id, provider_id);
            Ok(())
        }

        Commands::Request {
            listing_id,
            requester_id,
        } => {
            let request_id = market.create_request(listing_id, &requester_id, now)?;
            println!("✓ Request {} opened (escrow held)", request_id);
            Ok(())
        }

        Commands::Accept {
            request_id,
            caller_id,
        } => {
            market.accept_request(request_id, &caller_id, now)?;
            println!("✓ Request {} accepted", request_id);
            Ok(())
        }

        Commands::Decline {
            request_id,
            caller_id,
        } => {
            market.decline_request(request_id, &caller_id, now)?;
            println!("✓ Request {} declined (escrow refunded)", request_id);
            Ok(())
        }

        Commands::Complete {
            request_id,
            caller_id,
        } => {
            match market.complete_request(request_id, &caller_id, now)? {
                Some(id) => println!("✓ Request {} completed (escrow released)", id),
                None => println!("✓ Confirmation recorded; waiting for the other party"),
            }
            Ok(())
        }

        Commands::Cancel {
            request_id,
            caller_id,
        } => {
            market.cancel_request(request_id, &caller_id, now)?;
            println!("✓ Request {} cancelled (escrow refunded)", request_id);
            Ok(())
        }

        Commands::Sweep => {
            let expired = market.update_expired_requests(now)?;
            println!("✓ Sweep complete: {} request(s) expired", expired.len());
            Ok(())
        }

        Commands::Report {
            request_id,
            reporter_id,
        } => {
            let ticket = market.file_report(request_id, &reporter_id, now)?;
            println!("✓ Report filed: {}", ticket);
            Ok(())
        }

        Commands::MarkRead {
            notification_id,
            user_id,
        } => {
            market.mark_notification_read(notification_id, &user_id)?;
            println!("✓ Notification {} marked read", notification_id);
            Ok(())
        }

        Commands::Account { user_id } => {
            let view = market.account(&user_id)?;
            println!("{}", format_output(&view, &cli.format)?);
            Ok(())
        }

        Commands::Show {
            request_id,
            viewer_id,
        } => {
            let view = market.request(request_id, &viewer_id)?;
            println!("{}", format_output(&view, &cli.format)?);
            Ok(())
        }

        Commands::Requests { user_id } => {
            let requests = market.user_requests(&user_id)?;
            println!("{}", format_output(&requests, &cli.format)?);
            Ok(())
        }

        Commands::Notifications { user_id } => {
            let notifications = market.notifications(&user_id)?;
            println!("{}", format_output(&notifications, &cli.format)?);
            Ok(())
        }

        Commands::Audit => {
            let report = market.audit()?;
            println!("{}", format_output(&report, &cli.format)?);
            Ok(())
        }
    }
}
