use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::restore::pathing::resolve_under_root;

pub const DEFAULT_ENGINE_ROOT_DIR: &str = "photo_restoration";
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestoreSettingsOverlay {
    pub engine_root: Option<String>,
    pub python_binary: Option<String>,
    pub gpu_device: Option<i64>,
    pub deadline_secs: Option<u64>,
    pub resolution_workers: Option<usize>,
    pub download_dir: Option<String>,
}

/// Fully resolved settings: every overlay gap filled with a default and
/// every relative path anchored under the app root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSettings {
    pub engine_root: PathBuf,
    pub python_binary: String,
    pub gpu_device: i64,
    pub deadline: Option<Duration>,
    pub resolution_workers: usize,
    pub download_dir: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RestoreSettingsError {
    #[error("failed to read restore settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse restore settings JSON '{path}': {message}")]
    ParseJson { path: String, message: String },
    #[error("failed to parse restore settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("restore settings root must be a JSON object")]
    RootMustBeObject,
    #[error("restore settings field '{field}' has invalid type")]
    InvalidFieldType { field: String },
}

pub fn load_app_restore_settings(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<RestoreSettingsOverlay, RestoreSettingsError> {
    if let Some(path) = explicit_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .map(|p| if p.is_absolute() { p } else { app_root.join(p) })
    {
        return load_optional_overlay_by_extension(path.as_path());
    }

    let toml_path = app_root.join("config/restore.settings.toml");
    if toml_path.exists() {
        return load_optional_overlay_from_toml_path(toml_path.as_path());
    }

    // Back-compat for setups that predate the TOML config.
    load_optional_overlay_from_json_path(app_root.join("config/restore.settings.json").as_path())
}

pub fn merge_restore_settings_overlays(
    app: &RestoreSettingsOverlay,
    overrides: &RestoreSettingsOverlay,
) -> RestoreSettingsOverlay {
    RestoreSettingsOverlay {
        engine_root: choose_string(overrides.engine_root.as_deref(), app.engine_root.as_deref()),
        python_binary: choose_string(
            overrides.python_binary.as_deref(),
            app.python_binary.as_deref(),
        ),
        gpu_device: overrides.gpu_device.or(app.gpu_device),
        deadline_secs: overrides.deadline_secs.or(app.deadline_secs),
        resolution_workers: overrides.resolution_workers.or(app.resolution_workers),
        download_dir: choose_string(
            overrides.download_dir.as_deref(),
            app.download_dir.as_deref(),
        ),
    }
}

pub fn resolve_restore_settings(
    app_root: &Path,
    overlay: &RestoreSettingsOverlay,
) -> RestoreSettings {
    RestoreSettings {
        engine_root: overlay
            .engine_root
            .as_deref()
            .map(|value| resolve_under_root(app_root, value))
            .unwrap_or_else(|| app_root.join(DEFAULT_ENGINE_ROOT_DIR)),
        python_binary: overlay
            .python_binary
            .clone()
            .unwrap_or_else(|| String::from("python")),
        gpu_device: overlay.gpu_device.unwrap_or(0),
        deadline: overlay.deadline_secs.map(Duration::from_secs),
        resolution_workers: overlay.resolution_workers.unwrap_or(1).max(1),
        download_dir: overlay
            .download_dir
            .as_deref()
            .map(|value| resolve_under_root(app_root, value))
            .unwrap_or_else(|| app_root.join(DEFAULT_DOWNLOAD_DIR)),
    }
}

pub fn parse_restore_settings_overlay_json(
    value: &Value,
) -> Result<RestoreSettingsOverlay, RestoreSettingsError> {
    let root = value
        .as_object()
        .ok_or(RestoreSettingsError::RootMustBeObject)?;
    let restore_value = root.get("restore").unwrap_or(value);
    let restore = restore_value
        .as_object()
        .ok_or(RestoreSettingsError::RootMustBeObject)?;

    let mut out = RestoreSettingsOverlay::default();
    if let Some(v) = restore.get("download_dir") {
        out.download_dir = Some(parse_string(v, "download_dir")?);
    }
    if let Some(v) = restore.get("resolution_workers") {
        out.resolution_workers = Some(parse_usize(v, "resolution_workers")?);
    }
    if let Some(engine) = restore.get("engine") {
        let engine = engine
            .as_object()
            .ok_or_else(|| RestoreSettingsError::InvalidFieldType {
                field: String::from("engine"),
            })?;
        if let Some(v) = engine.get("root") {
            out.engine_root = Some(parse_string(v, "engine.root")?);
        }
        if let Some(v) = engine.get("python_binary") {
            out.python_binary = Some(parse_string(v, "engine.python_binary")?);
        }
        if let Some(v) = engine.get("gpu_device") {
            out.gpu_device = Some(parse_i64(v, "engine.gpu_device")?);
        }
        if let Some(v) = engine.get("deadline_secs") {
            out.deadline_secs = Some(parse_u64(v, "engine.deadline_secs")?);
        }
    }
    Ok(out)
}

fn load_optional_overlay_by_extension(
    path: &Path,
) -> Result<RestoreSettingsOverlay, RestoreSettingsError> {
    match path
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| v.to_ascii_lowercase())
    {
        Some(ext) if ext == "toml" => load_optional_overlay_from_toml_path(path),
        _ => load_optional_overlay_from_json_path(path),
    }
}

fn load_optional_overlay_from_json_path(
    path: &Path,
) -> Result<RestoreSettingsOverlay, RestoreSettingsError> {
    if !path.exists() {
        return Ok(RestoreSettingsOverlay::default());
    }
    let raw = fs::read_to_string(path).map_err(|error| RestoreSettingsError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    let parsed = serde_json::from_str::<Value>(raw.as_str()).map_err(|error| {
        RestoreSettingsError::ParseJson {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    })?;
    parse_restore_settings_overlay_json(&parsed)
}

fn load_optional_overlay_from_toml_path(
    path: &Path,
) -> Result<RestoreSettingsOverlay, RestoreSettingsError> {
    if !path.exists() {
        return Ok(RestoreSettingsOverlay::default());
    }
    let raw = fs::read_to_string(path).map_err(|error| RestoreSettingsError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    let parsed = toml::from_str::<toml::Value>(raw.as_str()).map_err(|error| {
        RestoreSettingsError::ParseToml {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    })?;
    let json_value =
        serde_json::to_value(parsed).map_err(|error| RestoreSettingsError::ParseToml {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
    parse_restore_settings_overlay_json(&json_value)
}

fn choose_string(a: Option<&str>, b: Option<&str>) -> Option<String> {
    a.or(b).map(str::to_string)
}

fn parse_string(value: &Value, field: &str) -> Result<String, RestoreSettingsError> {
    let parsed = value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| RestoreSettingsError::InvalidFieldType {
            field: field.to_string(),
        })?;
    if parsed.is_empty() {
        return Err(RestoreSettingsError::InvalidFieldType {
            field: field.to_string(),
        });
    }
    Ok(parsed.to_string())
}

fn parse_i64(value: &Value, field: &str) -> Result<i64, RestoreSettingsError> {
    value
        .as_i64()
        .ok_or_else(|| RestoreSettingsError::InvalidFieldType {
            field: field.to_string(),
        })
}

fn parse_u64(value: &Value, field: &str) -> Result<u64, RestoreSettingsError> {
    value
        .as_u64()
        .ok_or_else(|| RestoreSettingsError::InvalidFieldType {
            field: field.to_string(),
        })
}

fn parse_usize(value: &Value, field: &str) -> Result<usize, RestoreSettingsError> {
    value
        .as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| RestoreSettingsError::InvalidFieldType {
            field: field.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn parses_nested_restore_settings_overlay() {
        let overlay = parse_restore_settings_overlay_json(&serde_json::json!({
            "restore": {
                "download_dir": "exports",
                "resolution_workers": 4,
                "engine": {
                    "root": "engines/photo_restoration",
                    "python_binary": "python3",
                    "gpu_device": 1,
                    "deadline_secs": 1800
                }
            }
        }))
        .expect("settings overlay should parse");

        assert_eq!(overlay.download_dir.as_deref(), Some("exports"));
        assert_eq!(overlay.resolution_workers, Some(4));
        assert_eq!(
            overlay.engine_root.as_deref(),
            Some("engines/photo_restoration")
        );
        assert_eq!(overlay.python_binary.as_deref(), Some("python3"));
        assert_eq!(overlay.gpu_device, Some(1));
        assert_eq!(overlay.deadline_secs, Some(1800));
    }

    #[test]
    fn merges_layers_with_override_precedence() {
        let app = RestoreSettingsOverlay {
            engine_root: Some(String::from("app_engine")),
            gpu_device: Some(0),
            download_dir: Some(String::from("app_downloads")),
            ..RestoreSettingsOverlay::default()
        };
        let overrides = RestoreSettingsOverlay {
            gpu_device: Some(2),
            deadline_secs: Some(600),
            ..RestoreSettingsOverlay::default()
        };

        let merged = merge_restore_settings_overlays(&app, &overrides);

        assert_eq!(merged.engine_root.as_deref(), Some("app_engine"));
        assert_eq!(merged.gpu_device, Some(2));
        assert_eq!(merged.deadline_secs, Some(600));
        assert_eq!(merged.download_dir.as_deref(), Some("app_downloads"));
    }

    #[test]
    fn loads_the_app_toml_settings_file() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("relume_settings_{stamp}"));
        let config_dir = root.join("app/config");
        fs::create_dir_all(config_dir.as_path()).expect("config dir should be creatable");
        fs::write(
            config_dir.join("restore.settings.toml"),
            r#"[restore]
download_dir = "exports"
resolution_workers = 2

[restore.engine]
root = "engines/photo_restoration"
gpu_device = 1
"#,
        )
        .expect("app settings should be writable");

        let overlay =
            load_app_restore_settings(root.join("app").as_path(), None).expect("app load");

        assert_eq!(overlay.download_dir.as_deref(), Some("exports"));
        assert_eq!(overlay.resolution_workers, Some(2));
        assert_eq!(
            overlay.engine_root.as_deref(),
            Some("engines/photo_restoration")
        );
        assert_eq!(overlay.gpu_device, Some(1));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn app_loader_falls_back_to_json_when_toml_missing() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("relume_settings_json_fallback_{stamp}"));
        let config_dir = root.join("app/config");
        fs::create_dir_all(config_dir.as_path()).expect("config dir should be creatable");
        fs::write(
            config_dir.join("restore.settings.json"),
            r#"{"restore":{"engine":{"root":"legacy_engine"}}}"#,
        )
        .expect("json app settings should be writable");

        let overlay =
            load_app_restore_settings(root.join("app").as_path(), None).expect("app load");

        assert_eq!(overlay.engine_root.as_deref(), Some("legacy_engine"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_settings_files_yield_an_empty_overlay() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("relume_settings_missing_{stamp}"));
        fs::create_dir_all(root.as_path()).expect("root should be creatable");

        let overlay = load_app_restore_settings(root.as_path(), None).expect("app load");

        assert_eq!(overlay, RestoreSettingsOverlay::default());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn rejects_empty_string_settings_values() {
        let err = parse_restore_settings_overlay_json(&serde_json::json!({
            "restore": {
                "engine": {
                    "root": "   "
                }
            }
        }))
        .expect_err("empty engine root should fail");

        assert_eq!(
            err,
            RestoreSettingsError::InvalidFieldType {
                field: String::from("engine.root")
            }
        );
    }

    #[test]
    fn resolved_settings_fill_defaults_and_anchor_relative_paths() {
        let app_root = Path::new("/opt/relume");

        let defaults = resolve_restore_settings(app_root, &RestoreSettingsOverlay::default());
        assert_eq!(
            defaults.engine_root,
            PathBuf::from("/opt/relume/photo_restoration")
        );
        assert_eq!(defaults.python_binary, "python");
        assert_eq!(defaults.gpu_device, 0);
        assert_eq!(defaults.deadline, None);
        assert_eq!(defaults.resolution_workers, 1);
        assert_eq!(defaults.download_dir, PathBuf::from("/opt/relume/downloads"));

        let overlay = RestoreSettingsOverlay {
            engine_root: Some(String::from("engines/pr")),
            download_dir: Some(String::from("/var/exports")),
            deadline_secs: Some(120),
            resolution_workers: Some(0),
            ..RestoreSettingsOverlay::default()
        };
        let resolved = resolve_restore_settings(app_root, &overlay);
        assert_eq!(resolved.engine_root, PathBuf::from("/opt/relume/engines/pr"));
        assert_eq!(resolved.download_dir, PathBuf::from("/var/exports"));
        assert_eq!(resolved.deadline, Some(Duration::from_secs(120)));
        assert_eq!(resolved.resolution_workers, 1);
    }
}
