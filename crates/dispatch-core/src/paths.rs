use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DISPATCH_DIR: &str = ".dispatch";
pub const CONFIG_FILE: &str = ".dispatch/config.yaml";
pub const DATABASE_FILE: &str = ".dispatch/dispatch.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn dispatch_dir(root: &Path) -> PathBuf {
    root.join(DISPATCH_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn database_path(root: &Path) -> PathBuf {
    root.join(DATABASE_FILE)
}
