pub mod dispatch;
pub mod init;
pub mod metrics;
pub mod serve;
pub mod task;
pub mod worker;

use anyhow::Context;
use dispatch_core::config::Config;
use dispatch_core::identity::TenantScope;
use dispatch_core::store::RedbStore;
use std::path::Path;

/// Audit actor for changes made from the command line.
pub const CLI_ACTOR: &str = "cli";

/// The CLI operates with platform scope.
pub fn cli_scope() -> TenantScope {
    TenantScope::Platform
}

/// Load config and open the database of an initialized root.
pub fn open(root: &Path) -> anyhow::Result<(Config, RedbStore)> {
    let config = Config::load(root)?;
    let store = RedbStore::open_root(root)
        .with_context(|| format!("failed to open database under {}", root.display()))?;
    Ok((config, store))
}
