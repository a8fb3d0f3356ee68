use anyhow::Context;
use dispatch_core::{config::Config, io, paths, store::RedbStore};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing dispatch in: {}", root.display());

    let dir = paths::dispatch_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    let existed = paths::database_path(root).exists();
    RedbStore::open_root(root).context("failed to create database")?;
    if existed {
        println!("  exists:  {}", paths::DATABASE_FILE);
    } else {
        println!("  created: {}", paths::DATABASE_FILE);
    }
    Ok(())
}
