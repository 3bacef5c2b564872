//! Keep the index live and stream change notices for agents.

use anyhow::{Context, Result};
use chrono::Utc;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vaultdex_index::{ChangeNotice, FsVault, Index, IndexOptions};
use vaultdex_types::{DocEvent, DocPath};

use crate::context::{load_config, persist};

pub async fn watch_vault(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let vault_dir = config.vault_dir();
    if !vault_dir.is_dir() {
        anyhow::bail!("Vault directory {:?} does not exist", vault_dir);
    }

    let mut index = Index::new(FsVault::from_config(&config), IndexOptions::from_config(&config));
    index.subscribe(Box::new(|notice: &ChangeNotice| {
        let payload = json!({
            "event": "index-changed",
            "revision": notice.revision,
            "immediate": notice.immediate,
            "timestamp": Utc::now().to_rfc3339(),
        });
        println!("{}", payload);
    }));

    let report = index
        .warm_start()
        .with_context(|| format!("Failed to index {:?}", vault_dir))?;
    info!(
        items = report.items,
        restored = report.restored,
        scanned = report.scanned,
        "Index ready"
    );
    eprintln!("Watching {:?} for changes (Ctrl+C to stop)...", vault_dir);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )
    .context("Failed to initialize watcher")?;

    watcher
        .watch(&vault_dir, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {:?}", vault_dir))?;

    loop {
        let wait = index.time_until_deadline();
        let deadline = async move {
            match wait {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(Ok(ev)) => {
                        for doc_event in doc_events(index.source(), &ev) {
                            debug!(?doc_event, "Applying change");
                            index.apply_event(&doc_event);
                        }
                    }
                    Some(Err(err)) => warn!("Watcher error: {err}"),
                    None => break,
                }
            }
            _ = deadline => {
                let outcome = index.poll();
                if outcome.cache_flushed {
                    debug!(revision = %index.revision(), "Cache written");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watcher");
                break;
            }
        }
    }

    persist(&mut index);
    Ok(())
}

/// Translate a filesystem event into document events for the index
fn doc_events(vault: &FsVault, ev: &notify::Event) -> Vec<DocEvent> {
    let docs = |paths: &[PathBuf]| -> Vec<DocPath> {
        paths.iter().filter_map(|p| vault.relative_path(p)).collect()
    };

    match &ev.kind {
        EventKind::Create(_) => docs(ev.paths.as_slice()).into_iter().map(DocEvent::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if ev.paths.len() == 2 => {
            let from = vault.relative_path(&ev.paths[0]);
            let to = vault.relative_path(&ev.paths[1]);
            match (from, to) {
                (Some(from), Some(to)) => vec![DocEvent::Renamed { from, to }],
                (Some(from), None) => vec![DocEvent::Deleted(from)],
                (None, Some(to)) => vec![DocEvent::Created(to)],
                (None, None) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            docs(ev.paths.as_slice()).into_iter().map(DocEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            docs(ev.paths.as_slice()).into_iter().map(DocEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => ev
            .paths
            .iter()
            .filter_map(|abs| {
                let doc = vault.relative_path(abs)?;
                Some(if abs.exists() {
                    DocEvent::Modified(doc)
                } else {
                    DocEvent::Deleted(doc)
                })
            })
            .collect(),
        EventKind::Modify(_) => docs(ev.paths.as_slice()).into_iter().map(DocEvent::Modified).collect(),
        EventKind::Remove(_) => docs(ev.paths.as_slice()).into_iter().map(DocEvent::Deleted).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn vault() -> FsVault {
        FsVault::new("/vault")
    }

    #[test]
    fn test_create_and_modify() {
        let ev = notify::Event::new(EventKind::Create(CreateKind::File)).add_path("/vault/a.md".into());
        assert_eq!(
            doc_events(&vault(), &ev),
            vec![DocEvent::Created(DocPath::new("a.md"))]
        );

        let ev = notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/vault/notes/b.md".into());
        assert_eq!(
            doc_events(&vault(), &ev),
            vec![DocEvent::Modified(DocPath::new("notes/b.md"))]
        );
    }

    #[test]
    fn test_rename_both() {
        let ev = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/vault/old.md".into())
            .add_path("/vault/new.md".into());
        assert_eq!(
            doc_events(&vault(), &ev),
            vec![DocEvent::Renamed {
                from: DocPath::new("old.md"),
                to: DocPath::new("new.md"),
            }]
        );
    }

    #[test]
    fn test_ignored_paths_are_dropped() {
        let ev = notify::Event::new(EventKind::Remove(RemoveKind::File))
            .add_path("/vault/.vaultdex/cache.json".into())
            .add_path("/vault/image.png".into())
            .add_path("/elsewhere/c.md".into())
            .add_path("/vault/gone.md".into());
        assert_eq!(
            doc_events(&vault(), &ev),
            vec![DocEvent::Deleted(DocPath::new("gone.md"))]
        );
    }
}
