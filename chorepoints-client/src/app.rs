use std::sync::Arc;
use std::time::Duration;

use chorepoints_shared::gate::ParentConsole;
use chorepoints_shared::{Child, DomainError, Entity, RewardId, TaskId};
use tracing::{info, warn};

use crate::ClientError;
use crate::cache::SnapshotCache;
use crate::cli::{Cli, Command};
use crate::config::{self, ClientConfig, Clock};
use crate::http::HttpStore;
use crate::repository::Repository;
use crate::session::SyncSession;

const WATCH_POLL: Duration = Duration::from_secs(2);

pub async fn run(cli: Cli) -> Result<(), ClientError> {
    crate::init_tracing();

    if let Some(Command::SetServer { url, timezone }) = &cli.command {
        return set_server(cli.config.clone(), url, timezone.clone()).await;
    }

    let (cfg_path, cfg) = ClientConfig::find_and_load(cli.config)?;
    info!(path = ?cfg_path, server = %cfg.server_url, "loaded config");

    let remote = Arc::new(HttpStore::new(&cfg.server_url));
    let repo = Arc::new(Repository::new(remote, Clock::Zone(cfg.tz()?)));
    let cache = cfg
        .cache_file()
        .map(|p| SnapshotCache::new(p, &cfg.server_url));
    let session = SyncSession::start(repo.clone(), cache).await?;

    let result = match cli.command.unwrap_or(Command::Summary) {
        Command::SetServer { .. } => Ok(()),
        Command::Summary => {
            print_summary(&repo).await;
            Ok(())
        }
        Command::Ledger { child, daily } => print_ledger(&repo, &child, daily).await,
        Command::Done { task, photo } => {
            let task = repo.mark_done(&TaskId::from(task.as_str()), photo).await?;
            println!("{} submitted", task.title);
            Ok(())
        }
        Command::Redeem { reward, child } => {
            let child = find_child(&repo, &child).await?;
            repo.redeem(&RewardId::from(reward.as_str()), &child.id)
                .await?;
            println!("{} now has {} points", child.name, repo.child(&child.id).await?.points);
            Ok(())
        }
        Command::Approve { task, pin } => {
            let console = unlock(&repo, &pin).await?;
            let task = repo.approve(&console, &TaskId::from(task.as_str())).await?;
            println!("{} approved", task.title);
            Ok(())
        }
        Command::Reject { task, pin } => {
            let console = unlock(&repo, &pin).await?;
            let task = repo.reject(&console, &TaskId::from(task.as_str())).await?;
            println!("{} rejected", task.title);
            Ok(())
        }
        Command::Deduct {
            child,
            amount,
            reason,
            pin,
        } => {
            let console = unlock(&repo, &pin).await?;
            let child = find_child(&repo, &child).await?;
            let entry = repo.deduct(&console, &child.id, amount, &reason).await?;
            println!("{}: {} points", child.name, entry.points);
            Ok(())
        }
        Command::Watch => watch(&repo).await,
    };

    session.shutdown().await;
    result
}

async fn set_server(
    config_path: Option<std::path::PathBuf>,
    url: &str,
    timezone: Option<String>,
) -> Result<(), ClientError> {
    let path = config::resolve_config_path(config_path)?;
    let mut cfg = match config::load_config(&path) {
        Ok(cfg) => cfg,
        Err(_) => ClientConfig {
            server_url: String::new(),
            timezone: None,
            cache_path: None,
        },
    };
    cfg.server_url = config::normalize_server_url(url);
    if timezone.is_some() {
        cfg.timezone = timezone;
    }
    cfg.tz()?;
    if let Err(e) = HttpStore::new(&cfg.server_url).health().await {
        warn!(server = %cfg.server_url, error = %e, "server not reachable; saving anyway");
    }
    config::save_config(&path, &cfg)?;
    println!("saved {} to {}", cfg.server_url, path.display());
    Ok(())
}

async fn unlock(repo: &Repository, pin: &str) -> Result<ParentConsole, ClientError> {
    repo.unlock(pin).await.ok_or(ClientError::Locked)
}

/// Match by id first, then by name ignoring case.
async fn find_child(repo: &Repository, key: &str) -> Result<Child, ClientError> {
    let children = repo.children().await;
    children
        .iter()
        .find(|c| c.id.as_str() == key)
        .or_else(|| children.iter().find(|c| c.name.eq_ignore_ascii_case(key)))
        .cloned()
        .ok_or_else(|| DomainError::not_found(Entity::Child, key).into())
}

async fn print_summary(repo: &Repository) {
    println!("Children:");
    for c in repo.children().await {
        println!("  {} {:<16} {:>5} pts  ({})", c.avatar, c.name, c.points, c.id);
    }
    let queue = repo.approval_queue().await;
    if !queue.is_empty() {
        println!("Waiting for approval:");
        for item in queue {
            let who = item.child.map(|c| c.name).unwrap_or_else(|| "?".into());
            println!(
                "  {:<24} +{:<4} {:<12} ({})",
                item.task.title, item.task.points, who, item.task.id
            );
        }
    }
    let redemptions = repo.pending_redemptions().await;
    if !redemptions.is_empty() {
        println!("Rewards to hand out:");
        for r in redemptions {
            println!("  {} for {} ({})", r.reward_id, r.child_id, r.id);
        }
    }
}

async fn print_ledger(repo: &Repository, key: &str, daily: bool) -> Result<(), ClientError> {
    let child = find_child(repo, key).await?;
    if daily {
        for (date, total) in repo.daily_totals(&child.id).await.iter().rev() {
            println!("{date}  {total:+}");
        }
        return Ok(());
    }
    let sheet = repo.balance_sheet(&child.id).await?;
    println!("{} has {} points", child.name, sheet.current);
    for line in sheet.lines {
        let e = line.entry;
        println!(
            "{}  {:+5}  {:>5}  {:<8} {}",
            e.date, e.points, line.balance, e.kind, e.reason
        );
    }
    Ok(())
}

async fn watch(repo: &Repository) -> Result<(), ClientError> {
    print_summary(repo).await;
    let mut last = repo.snapshot().await;
    loop {
        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r?;
                info!("interrupted");
                return Ok(());
            }
            _ = tokio::time::sleep(WATCH_POLL) => {}
        }
        let now = repo.snapshot().await;
        if now != last {
            println!();
            print_summary(repo).await;
            last = now;
        }
    }
}
