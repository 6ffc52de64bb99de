//! Command handlers for the Chatlink CLI

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use chatlink_core::{
    FileStorage, FriendListCache, GroupMemberListCache, SessionConfig, Snapshot, SnapshotFile,
};

use crate::cli::{CacheKind, Cli, Commands, SnapshotArgs};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command, returning what should be printed
    pub fn execute(cli: &Cli) -> Result<String> {
        match &cli.command {
            Commands::Config { file } => Self::handle_config_command(file.as_deref()),
            Commands::Cache { kind } => match kind {
                CacheKind::Friends(args) => Self::handle_friends_command(args),
                CacheKind::Group(args) => Self::handle_group_command(args),
            },
        }
    }

    /// Validate configuration and render the effective settings as TOML
    fn handle_config_command(file: Option<&Path>) -> Result<String> {
        let config = match file {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                SessionConfig::load_from_file(path)?
            }
            None => {
                info!("Using default configuration");
                SessionConfig::default()
            }
        };
        Ok(config.to_toml_string()?)
    }

    fn handle_friends_command(args: &SnapshotArgs) -> Result<String> {
        let (file, snapshot) = load_snapshot::<FriendListCache>(&args.file)?;
        if args.compact {
            compact(&file, &snapshot)?;
        }
        if args.json {
            return Ok(serde_json::to_string_pretty(&snapshot)?);
        }

        let mut out = String::new();
        writeln!(out, "Friend list snapshot: {}", args.file.display())?;
        writeln!(out, "  format version: {}", snapshot.version)?;
        writeln!(out, "  sequence:       {}", snapshot.friend_list_seq)?;
        writeln!(out, "  timestamp:      {}", snapshot.timestamp)?;
        write!(out, "  friends:        {}", snapshot.list.len())?;
        for friend in &snapshot.list {
            write!(out, "\n    {:>12}  {}", friend.uin, friend.nick)?;
            if !friend.remark.is_empty() {
                write!(out, " ({})", friend.remark)?;
            }
        }
        Ok(out)
    }

    fn handle_group_command(args: &SnapshotArgs) -> Result<String> {
        let (file, snapshot) = load_snapshot::<GroupMemberListCache>(&args.file)?;
        if args.compact {
            compact(&file, &snapshot)?;
        }
        if args.json {
            return Ok(serde_json::to_string_pretty(&snapshot)?);
        }

        let mut out = String::new();
        writeln!(out, "Group member snapshot: {}", args.file.display())?;
        writeln!(out, "  format version: {}", snapshot.version)?;
        writeln!(out, "  member seq:     {}", snapshot.troop_member_num_seq)?;
        write!(out, "  members:        {}", snapshot.list.len())?;
        for member in &snapshot.list {
            let name = if member.name_card.is_empty() {
                &member.nick
            } else {
                &member.name_card
            };
            let permission = format!("{:?}", member.permission);
            write!(out, "\n    {:>12}  {:<13}  {}", member.uin, permission, name)?;
        }
        Ok(out)
    }
}

/// Open the snapshot at `path` and decode it
fn load_snapshot<T: Snapshot>(path: &Path) -> Result<(SnapshotFile<T>, T)> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} is not a file path", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    debug!("Reading snapshot {:?} from {}", name, dir.display());

    let file = SnapshotFile::new(Arc::new(FileStorage::new(dir)), name);
    let snapshot = file
        .load_blocking()
        .with_context(|| format!("Cannot read snapshot {}", path.display()))?
        .ok_or_else(|| anyhow!("Snapshot {} is missing or empty", path.display()))?;
    Ok((file, snapshot))
}

fn compact<T: Snapshot>(file: &SnapshotFile<T>, snapshot: &T) -> Result<()> {
    file.save_blocking(snapshot)
        .with_context(|| format!("Cannot rewrite snapshot {}", file.location().display()))?;
    info!("Rewrote {}", file.location().display());
    Ok(())
}
