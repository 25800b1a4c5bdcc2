//! `shard-catalog-cli`: a small operator tool for the shard catalog, in the
//! same spirit as this workspace's other single-purpose admin binaries --
//! read `--database-url`/`DATABASE_URL`, do one thing, print the result.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shard_catalog_codec::KeyType;
use shard_catalog_core::key::ShardKey;
use shard_catalog_core::{CreateMode, ShardMapManager};
use shard_catalog_sql::types::ShardMapKind;

/// Administers a shard catalog: create the schema, register shards and
/// mappings, and inspect the current layout.
#[derive(Debug, Parser)]
#[clap(name = "shard-catalog-cli", version, author)]
struct Cli {
    /// Postgres connection string for the global shard map database.
    #[clap(long, env = "DATABASE_URL")]
    database_url: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Command {
    /// Create (or replace) the global shard map schema.
    Init {
        /// Wipe an existing catalog schema instead of refusing to touch it.
        #[clap(long)]
        replace: bool,
    },
    /// Register a new shard location under an existing shard map.
    AddShard {
        /// Name of the shard map to add the shard to.
        #[clap(long)]
        map: String,
        #[clap(long)]
        host: String,
        #[clap(long)]
        database: String,
        #[clap(long)]
        protocol: Option<String>,
        #[clap(long)]
        port: Option<i32>,
    },
    /// Map a key (or key range) to a shard already registered in the map.
    AddMapping {
        /// Name of the shard map to add the mapping to.
        #[clap(long)]
        map: String,
        /// Lower bound of the mapping, in the map's key type (see `show`).
        #[clap(long)]
        low: String,
        /// Upper bound, exclusive; omit for an unbounded range map or for
        /// a list map, where it is always unused.
        #[clap(long)]
        high: Option<String>,
        #[clap(long)]
        shard_host: String,
        #[clap(long)]
        shard_database: String,
    },
    /// Print shard maps, shards and mappings currently in the catalog.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Init { replace } => {
            let mode = if replace { CreateMode::ReplaceExisting } else { CreateMode::KeepExisting };
            ShardMapManager::create_sql_shard_map_manager(&cli.database_url, mode)
                .await
                .context("creating shard map manager")?;
            println!("catalog schema ready");
        }
        Command::AddShard { map, host, database, protocol, port } => {
            let manager = connect(&cli.database_url).await?;
            let row = manager
                .lookup_shard_map_by_name(&map)
                .await
                .context("looking up shard map")?
                .ok_or_else(|| anyhow::anyhow!("no shard map named '{map}'"))?;
            add_shard(&manager, row.kind, row.key_type, &map, protocol, host, database, port).await?;
        }
        Command::AddMapping { map, low, high, shard_host, shard_database } => {
            let manager = connect(&cli.database_url).await?;
            let row = manager
                .lookup_shard_map_by_name(&map)
                .await
                .context("looking up shard map")?
                .ok_or_else(|| anyhow::anyhow!("no shard map named '{map}'"))?;
            add_mapping(&manager, row.kind, row.key_type, &map, &low, high.as_deref(), &shard_host, &shard_database)
                .await?;
        }
        Command::Show => {
            let manager = connect(&cli.database_url).await?;
            show(&manager).await?;
        }
    }
    Ok(())
}

async fn connect(database_url: &str) -> anyhow::Result<Arc<ShardMapManager>> {
    ShardMapManager::get_sql_shard_map_manager(database_url, shard_catalog_core::LoadPolicy::Lazy)
        .await
        .context("connecting to shard map manager")
}

/// Dispatches a key-typed façade call to the concrete `ShardKey` impl
/// matching the map's runtime `KeyType` (§9 design note: the generic map
/// wrappers and the runtime-tagged core never drift apart because both go
/// through this trait).
macro_rules! dispatch_key_type {
    ($key_type:expr, $ty:ident => $body:expr) => {
        match $key_type {
            KeyType::Int32 => {
                type $ty = i32;
                $body
            }
            KeyType::Int64 => {
                type $ty = i64;
                $body
            }
            KeyType::Uuid => {
                type $ty = uuid::Uuid;
                $body
            }
            KeyType::Binary => {
                type $ty = Vec<u8>;
                $body
            }
            other => anyhow::bail!("shard-catalog-cli does not support key type {other}"),
        }
    };
}

async fn add_shard(
    manager: &Arc<ShardMapManager>,
    kind: ShardMapKind,
    key_type: KeyType,
    map: &str,
    protocol: Option<String>,
    host: String,
    database: String,
    port: Option<i32>,
) -> anyhow::Result<()> {
    dispatch_key_type!(key_type, T => {
        let shard = match kind {
            ShardMapKind::List => {
                let handle = manager.get_list_shard_map::<T>(map).await?;
                handle.create_shard(protocol, host, database, port).await?
            }
            ShardMapKind::Range => {
                let handle = manager.get_range_shard_map::<T>(map).await?;
                handle.create_shard(protocol, host, database, port).await?
            }
        };
        println!("created shard {} on {}", shard.id, shard.host);
    });
    Ok(())
}

async fn add_mapping(
    manager: &Arc<ShardMapManager>,
    kind: ShardMapKind,
    key_type: KeyType,
    map: &str,
    low: &str,
    high: Option<&str>,
    shard_host: &str,
    shard_database: &str,
) -> anyhow::Result<()> {
    dispatch_key_type!(key_type, T => {
        let low_key: T = parse_key::<T>(low)?;
        let high_key: Option<T> = high.map(parse_key::<T>).transpose()?;
        match kind {
            ShardMapKind::List => {
                let handle = manager.get_list_shard_map::<T>(map).await?;
                let shard = handle.get_shard(shard_host, shard_database).await?;
                let mapping = handle.create_point_mapping(low_key, &shard).await?;
                println!("created mapping {}", mapping.id);
            }
            ShardMapKind::Range => {
                let handle = manager.get_range_shard_map::<T>(map).await?;
                let shard = handle.get_shard(shard_host, shard_database).await?;
                let mapping = handle.create_range_mapping(low_key, high_key, &shard).await?;
                println!("created mapping {}", mapping.id);
            }
        }
    });
    Ok(())
}

/// Parses a CLI literal into a key of type `T`. Each `ShardKey` impl this
/// binary dispatches to has an obvious textual form; anything else (dates,
/// durations) isn't exposed through this tool.
fn parse_key<T: ShardKeyFromStr>(literal: &str) -> anyhow::Result<T> {
    T::parse(literal)
}

trait ShardKeyFromStr: ShardKey {
    fn parse(literal: &str) -> anyhow::Result<Self>;
}

impl ShardKeyFromStr for i32 {
    fn parse(literal: &str) -> anyhow::Result<Self> {
        literal.parse().context("parsing int32 key")
    }
}

impl ShardKeyFromStr for i64 {
    fn parse(literal: &str) -> anyhow::Result<Self> {
        literal.parse().context("parsing int64 key")
    }
}

impl ShardKeyFromStr for uuid::Uuid {
    fn parse(literal: &str) -> anyhow::Result<Self> {
        uuid::Uuid::parse_str(literal).context("parsing uuid key")
    }
}

impl ShardKeyFromStr for Vec<u8> {
    fn parse(literal: &str) -> anyhow::Result<Self> {
        hex::decode(literal).context("parsing hex-encoded binary key")
    }
}

async fn show(manager: &Arc<ShardMapManager>) -> anyhow::Result<()> {
    let maps = manager.get_shard_maps().await.context("listing shard maps")?;
    for map in maps {
        println!("map {} ({:?}, key type {})", map.name, map.kind, map.key_type);
        dispatch_key_type!(map.key_type, T => {
            match map.kind {
                ShardMapKind::List => {
                    let handle = manager.get_list_shard_map::<T>(&map.name).await?;
                    print_shards_and_mappings(handle.get_shards().await?, handle.get_mappings().await?);
                }
                ShardMapKind::Range => {
                    let handle = manager.get_range_shard_map::<T>(&map.name).await?;
                    print_shards_and_mappings(handle.get_shards().await?, handle.get_mappings().await?);
                }
            }
        });
    }
    Ok(())
}

fn print_shards_and_mappings(
    shards: Vec<shard_catalog_sql::gsm::shards::ShardRow>,
    mappings: Vec<shard_catalog_sql::gsm::mappings::MappingRow>,
) {
    for shard in &shards {
        println!("  shard {} {}/{} ({:?})", shard.id, shard.host, shard.database, shard.status);
    }
    for mapping in &mappings {
        let low = hex::encode(&mapping.low);
        let high = mapping.high.as_deref().map(hex::encode).unwrap_or_else(|| "+inf".to_string());
        println!("  mapping {} [{}, {}) -> shard {} ({:?})", mapping.id, low, high, mapping.shard_id, mapping.status);
    }
}
