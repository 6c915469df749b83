//! Tribes node binary.
//!
//! # Usage
//!
//! ```bash
//! # List groups and memberships held in a key store
//! tribes-node --data-dir ./node inspect
//!
//! # Create a group, invite an in-memory peer and replicate to it
//! tribes-node --data-dir ./node demo --text "welcome"
//! ```

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tribes_node::{
    HostLog, Identity, KeyStore, MemoryLog, MemoryStorage, NodeConfig, ProcessOutcome,
    RedbStorage, SystemEnv, Tribes,
};

/// Private groups node
#[derive(Parser, Debug)]
#[command(name = "tribes-node")]
#[command(about = "Private groups on an append-only log")]
#[command(version)]
struct Args {
    /// Directory holding node state
    #[arg(short, long, default_value = ".tribes")]
    data_dir: PathBuf,

    /// Maximum recipients per message
    #[arg(long, default_value = "16")]
    max_recipients: usize,

    /// Do not rebuild the log when members are added
    #[arg(long)]
    no_rebuild: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List persisted groups and memberships
    Inspect,
    /// Create a group and invite a simulated peer
    Demo {
        /// Text attached to the invite
        #[arg(long)]
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = NodeConfig {
        data_dir: args.data_dir,
        rebuild_on_new_members: !args.no_rebuild,
        max_recipients: args.max_recipients,
        ..Default::default()
    };
    std::fs::create_dir_all(&config.data_dir)?;

    match args.command {
        Command::Inspect => inspect(&config).await,
        Command::Demo { text } => demo(config, text).await,
    }
}

async fn inspect(config: &NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storage = RedbStorage::open(config.keystore_path())?;
    let keys = KeyStore::open(storage, SystemEnv::new());
    keys.ready().await?;

    let groups = keys.list_groups().await?;
    tracing::info!("{} group(s) in {}", groups.len(), config.keystore_path().display());
    for (group_id, info) in &groups {
        tracing::info!("group {group_id} root {} scheme {}", info.root, info.scheme);
    }

    for (feed, group_ids) in keys.list_memberships().await? {
        for group_id in group_ids {
            tracing::info!("member {feed} of {group_id}");
        }
    }

    keys.close().await?;
    Ok(())
}

async fn demo(config: NodeConfig, text: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let env = SystemEnv::new();

    let alice_identity = Identity::generate(&env);
    let alice_log = Arc::new(MemoryLog::new(alice_identity.feed_id(), env.clone()));
    let storage = RedbStorage::open(config.keystore_path())?;
    let alice =
        Tribes::start(alice_identity, storage, alice_log.clone(), env.clone(), config.clone());

    let bob_identity = Identity::generate(&env);
    let bob_feed = bob_identity.feed_id();
    let bob_log = Arc::new(MemoryLog::new(bob_feed, env.clone()));
    let bob = Tribes::start(bob_identity, MemoryStorage::new(), bob_log.clone(), env, config);
    let mut bob_inbox = bob_log.subscribe();

    let created = alice.create().await?;
    tracing::info!("alice created {} (root {})", created.group_id, created.root.key);

    let invite = alice.invite(created.group_id, &[bob_feed], text).await?;
    alice.handle_message(&invite).await?;
    tracing::info!("alice invited {bob_feed} in {}", invite.key);

    for msg in alice_log.messages() {
        bob_log.add(msg).await?;
    }

    while let Ok(msg) = bob_inbox.try_recv() {
        if let ProcessOutcome::Applied { group_id, new_authors, rebuild_triggered } =
            bob.handle_message(&msg).await?
        {
            tracing::info!(
                "bob applied add-member for {group_id}: {} new author(s), rebuild {rebuild_triggered}",
                new_authors.len()
            );
        }
    }

    let root_readable = bob_log.readable_content(&created.root.key).is_some();
    tracing::info!(
        "bob knows {:?}; root readable after rebuild: {root_readable}",
        bob.member_groups(&bob_feed)
    );

    let link = bob.create_link(created.group_id, Some("demo".to_string())).await?;
    alice_log.add(link).await?;
    for found in alice.find_by_feed_id(&bob_feed).await? {
        tracing::info!("alice sees bob linked to {} as {:?}", found.group_id, found.name);
    }

    alice.close().await?;
    bob.close().await?;
    Ok(())
}
