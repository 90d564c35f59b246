//! Nearcard CLI
//!
//! Thin wrapper around nearcard-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show profile and store information
//! nearcard info
//!
//! # Set the card this device shares
//! nearcard profile set "Pinar Olguc" pinar@domain.com --job "iOS Developer"
//!
//! # Show the stored card
//! nearcard profile show
//!
//! # List accepted contacts
//! nearcard contacts list
//!
//! # Show one accepted contact
//! nearcard contacts show "Their Phone"
//!
//! # Delete an accepted contact
//! nearcard contacts remove "Their Phone"
//!
//! # Run a full in-process exchange against a simulated peer
//! nearcard demo
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nearcard_core::{
    CardEvent, MemoryContactStore, MemoryHub, PeerIdentity, ProfilePayload, RedbContactStore,
    SessionConfig, SessionCoordinator, SHORT_INVITE_TIMEOUT,
};

/// Nearcard - local peer card exchange
#[derive(Parser)]
#[command(name = "nearcard")]
#[command(version = "0.1.0")]
#[command(about = "Nearcard - local peer card exchange")]
#[command(
    long_about = "Discovers nearby peers, negotiates sessions with them, and exchanges small business-card profiles."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.nearcard/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show profile and store information
    Info,

    /// Own-card management
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Accepted-contact management
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },

    /// Run a scripted exchange against a simulated peer
    Demo {
        /// Display name of the simulated peer
        #[arg(long, default_value = "Their Phone")]
        peer_name: String,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Show the card this device shares
    Show,
    /// Set the card this device shares
    Set {
        /// Full name (required on the wire)
        name: String,
        /// Email address (required on the wire)
        email: String,
        /// Phone number
        #[arg(long)]
        phone: Option<String>,
        /// Job title
        #[arg(long)]
        job: Option<String>,
    },
}

#[derive(Subcommand)]
enum ContactsAction {
    /// List all accepted contacts
    List,
    /// Show one accepted contact
    Show {
        /// The peer's display-name identity
        identity: String,
    },
    /// Delete an accepted contact
    Remove {
        /// The peer's display-name identity
        identity: String,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.nearcard/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nearcard")
        .join("data")
}

fn profile_path(data_dir: &Path) -> PathBuf {
    data_dir.join("profile.json")
}

fn load_profile(data_dir: &Path) -> Result<Option<ProfilePayload>> {
    let path = profile_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let profile = serde_json::from_slice(&bytes)
        .with_context(|| format!("corrupt profile at {}", path.display()))?;
    Ok(Some(profile))
}

fn save_profile(data_dir: &Path, profile: &ProfilePayload) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let path = profile_path(data_dir);
    let json = serde_json::to_vec_pretty(profile)?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn open_store(data_dir: &Path) -> Result<RedbContactStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let store = RedbContactStore::open(data_dir.join("contacts.redb"))
        .context("failed to open contact store")?;
    Ok(store)
}

fn print_card(payload: &ProfilePayload, indent: &str) {
    println!("{}Name:  {}", indent, payload.name);
    println!("{}Email: {}", indent, payload.email);
    if let Some(phone) = &payload.phone {
        println!("{}Phone: {}", indent, phone);
    }
    if let Some(job) = &payload.job {
        println!("{}Job:   {}", indent, job);
    }
}

fn format_last_seen(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Run a full discovery/invite/exchange cycle against a simulated peer on
/// the in-process hub, persisting whatever card it shares.
async fn run_demo(
    store: RedbContactStore,
    profile: ProfilePayload,
    peer_name: String,
) -> Result<()> {
    let hub = MemoryHub::new();
    let peer_identity: PeerIdentity = peer_name.as_str().into();

    // The simulated peer auto-accepts and shares a fixed card
    let peer_card = ProfilePayload::new(&peer_name, "them@example.com")
        .with_phone("+1 555 0134")
        .with_job("Product Designer");
    let peer_handle = SessionCoordinator::start(
        SessionConfig::default(),
        peer_identity.clone(),
        peer_card,
        hub.endpoint(peer_name.as_str()),
        MemoryContactStore::new(),
    )?;

    // Interactive flow: keep the invitation wait short
    let our_handle = SessionCoordinator::start(
        SessionConfig {
            invite_timeout: SHORT_INVITE_TIMEOUT,
            ..SessionConfig::default()
        },
        "This Device".into(),
        profile,
        hub.endpoint("This Device"),
        store.clone(),
    )?;
    let mut events = our_handle.subscribe();

    // Poll the registry until the peer shows up
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let peers = our_handle.discovered_peers().await?;
        if peers.iter().any(|p| p.identity == peer_identity) {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("peer '{}' was never discovered", peer_name);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("Discovered peer: {}", peer_name);

    println!("Inviting {}...", peer_name);
    our_handle.invite(vec![peer_identity.clone()])?;

    // Walk the exchange to completion via the event stream
    let exchange = async {
        loop {
            match events.recv().await? {
                CardEvent::PeerStateChanged { identity, state } => {
                    println!("  {} -> {}", identity, state);
                }
                CardEvent::OfferUpdated { identity } => {
                    println!("Card received from {}", identity);
                    our_handle.accept_offers(vec![identity])?;
                }
                CardEvent::ContactSaved { identity } => {
                    println!("Contact saved: {}", identity);
                }
                CardEvent::SessionRestarted => {
                    println!("Discovery cycle restarted");
                    return anyhow::Ok(());
                }
                CardEvent::StoreFailed { identity, message } => {
                    bail!("failed to save contact {}: {}", identity, message);
                }
                CardEvent::Fatal { message } => {
                    bail!("session failed: {}", message);
                }
                _ => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), exchange)
        .await
        .context("exchange did not complete in time")??;

    match store.load(&peer_identity)? {
        Some(contact) => {
            println!();
            println!("Accepted card:");
            print_card(&contact.payload, "  ");
        }
        None => bail!("exchange finished but no contact was stored"),
    }

    let _ = our_handle.shutdown();
    let _ = peer_handle.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    tracing::debug!(data_dir = %data_dir.display(), "Using data directory");

    match cli.command {
        Commands::Info => {
            println!("Nearcard v0.1.0");
            println!();
            println!("Data directory: {}", data_dir.display());
            println!();
            match load_profile(&data_dir)? {
                Some(profile) => {
                    println!("Profile:");
                    print_card(&profile, "  ");
                }
                None => println!("Profile: (not set - run 'nearcard profile set')"),
            }
            println!();
            let store = open_store(&data_dir)?;
            println!("Accepted contacts: {}", store.list()?.len());
        }

        Commands::Profile { action } => match action {
            ProfileAction::Show => match load_profile(&data_dir)? {
                Some(profile) => print_card(&profile, ""),
                None => println!("No profile set. Run 'nearcard profile set <name> <email>'."),
            },
            ProfileAction::Set {
                name,
                email,
                phone,
                job,
            } => {
                let mut profile = ProfilePayload::new(name, email);
                profile.phone = phone;
                profile.job = job;
                save_profile(&data_dir, &profile)?;
                println!("Profile saved.");
                print_card(&profile, "  ");
            }
        },

        Commands::Contacts { action } => {
            let store = open_store(&data_dir)?;
            match action {
                ContactsAction::List => {
                    let contacts = store.list()?;
                    if contacts.is_empty() {
                        println!("No accepted contacts.");
                    } else {
                        println!("Contacts ({}):", contacts.len());
                        println!();
                        for contact in contacts {
                            println!(
                                "  {} <{}>  (accepted {})",
                                contact.payload.name,
                                contact.payload.email,
                                format_last_seen(contact.last_seen)
                            );
                        }
                    }
                }
                ContactsAction::Show { identity } => {
                    match store.load(&identity.as_str().into())? {
                        Some(contact) => {
                            println!("Contact: {}", contact.identity);
                            print_card(&contact.payload, "  ");
                            println!("  Accepted: {}", format_last_seen(contact.last_seen));
                        }
                        None => println!("No contact named '{}'.", identity),
                    }
                }
                ContactsAction::Remove { identity } => {
                    store.remove(&identity.as_str().into())?;
                    println!("Removed contact: {}", identity);
                }
            }
        }

        Commands::Demo { peer_name } => {
            let profile = load_profile(&data_dir)?.unwrap_or_else(|| {
                ProfilePayload::new("This Device", "me@example.com")
            });
            let store = open_store(&data_dir)?;
            run_demo(store, profile, peer_name).await?;
        }
    }

    Ok(())
}
