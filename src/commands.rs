//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::Context;
use tessera_core::{CheckState, EngineConfig, NodeKind};
use tessera_engine::{EngineBuilder, EngineHandle};
use tessera_watcher::WatcherService;

pub fn open_engine(roots: Vec<PathBuf>, config: Option<&Path>) -> anyhow::Result<EngineHandle> {
    let config = match config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    for root in &roots {
        tracing::info!("Root: {}", root.display());
    }
    let engine = EngineBuilder::new(config).roots(roots).spawn()?;
    Ok(engine)
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolving {}", path.display()))
}

pub async fn list(engine: &EngineHandle, dir: Option<PathBuf>, depth: usize) -> anyhow::Result<()> {
    let dirs = match dir {
        Some(dir) => vec![absolute(&dir)?],
        None => engine.roots().await?.into_iter().map(|r| r.path).collect(),
    };
    for dir in dirs {
        println!("{}", dir.display());
        print_tree(engine, &dir, depth, 1).await?;
    }
    Ok(())
}

/// Print the visible children of `dir`, descending up to `depth` levels.
async fn print_tree(
    engine: &EngineHandle,
    dir: &Path,
    depth: usize,
    level: usize,
) -> anyhow::Result<()> {
    if level > depth {
        return Ok(());
    }
    for child in engine.list_children(dir).await? {
        let indent = "  ".repeat(level);
        if child.is_dir() {
            println!("{}{}/", indent, child.name);
            Box::pin(print_tree(engine, &child.path, depth, level + 1)).await?;
        } else {
            println!("{}{}", indent, child.name);
        }
    }
    Ok(())
}

pub async fn search(engine: &EngineHandle, query: &str) -> anyhow::Result<()> {
    let view = engine.set_query(query).await?;
    tracing::info!("{} matches for {:?}", view.matches.len(), view.query);
    for path in &view.matches {
        println!("{}", path.display());
    }
    Ok(())
}

pub async fn weigh(engine: &EngineHandle, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    for path in paths {
        let path = absolute(&path)?;
        println!("{:>8}  {}", engine.weight_of(&path).await, path.display());
    }
    engine.flush_cache().await?;
    Ok(())
}

pub async fn select(engine: &EngineHandle, paths: Vec<PathBuf>, summary: bool) -> anyhow::Result<()> {
    for path in paths {
        let path = absolute(&path)?;
        let kind = NodeKind::from_is_dir(path.is_dir());
        let outcome = engine.toggle(&path, kind, CheckState::Checked).await?;
        if !outcome.completed {
            tracing::warn!(
                "Selection of {} stopped after {} directories",
                path.display(),
                outcome.directories_visited
            );
        }
    }

    let weights = engine.summarize().await?;
    if summary {
        for (dir, weight) in &weights.per_directory {
            println!("{:>8}  {}/", weight, dir.display());
        }
    } else {
        for (path, weight) in &weights.files {
            println!("{:>8}  {}", weight, path.display());
        }
    }
    println!("{:>8}  total", weights.total);

    engine.flush_cache().await?;
    Ok(())
}

pub async fn clear_cache(engine: &EngineHandle) -> anyhow::Result<()> {
    tracing::info!("Clearing cache: {}", engine.cache().document_path().display());
    engine.clear_cache().await?;
    tracing::info!("Cache cleared");
    Ok(())
}

pub async fn watch(engine: &EngineHandle) -> anyhow::Result<()> {
    let service = WatcherService::new(engine.clone())?;

    tokio::select! {
        result = service.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping watcher");
        }
    }

    engine.flush_cache().await?;
    Ok(())
}
