pub mod restore;

use std::path::PathBuf;

pub fn default_app_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}
