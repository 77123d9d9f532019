use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::restore::engine::{EngineInvocationError, EngineLayout};

pub const LANDMARK_MODEL_REL_PATH: &str = "Face_Detection/shape_predictor_68_face_landmarks.dat";
pub const FACE_CHECKPOINTS_REL_PATH: &str = "Face_Enhancement/checkpoints";
pub const GLOBAL_CHECKPOINTS_REL_PATH: &str = "Global/checkpoints";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupCheck {
    pub name: String,
    pub path: String,
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSetupReport {
    pub engine_root: String,
    pub ok: bool,
    pub checks: Vec<SetupCheck>,
    pub missing: Vec<String>,
}

fn dir_has_entries(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Verifies the on-disk engine installation: run script, face landmark
/// model, and both checkpoint directories. The engine fails late and
/// confusingly when these are absent, so callers check before invoking.
pub fn check_engine_setup(layout: &EngineLayout) -> EngineSetupReport {
    let root = layout.engine_root.as_path();
    let run_script = layout.run_script_path();
    let landmark = root.join(LANDMARK_MODEL_REL_PATH);
    let face_checkpoints = root.join(FACE_CHECKPOINTS_REL_PATH);
    let global_checkpoints = root.join(GLOBAL_CHECKPOINTS_REL_PATH);

    let checks = vec![
        SetupCheck {
            name: String::from("engine root"),
            path: root.display().to_string(),
            ok: root.is_dir(),
        },
        SetupCheck {
            name: layout.run_script.clone(),
            path: run_script.display().to_string(),
            ok: run_script.is_file(),
        },
        SetupCheck {
            name: String::from(LANDMARK_MODEL_REL_PATH),
            path: landmark.display().to_string(),
            ok: landmark.is_file(),
        },
        SetupCheck {
            name: String::from(FACE_CHECKPOINTS_REL_PATH),
            path: face_checkpoints.display().to_string(),
            ok: dir_has_entries(face_checkpoints.as_path()),
        },
        SetupCheck {
            name: String::from(GLOBAL_CHECKPOINTS_REL_PATH),
            path: global_checkpoints.display().to_string(),
            ok: dir_has_entries(global_checkpoints.as_path()),
        },
    ];
    let missing: Vec<String> = checks
        .iter()
        .filter(|check| !check.ok)
        .map(|check| check.name.clone())
        .collect();
    EngineSetupReport {
        engine_root: root.display().to_string(),
        ok: missing.is_empty(),
        checks,
        missing,
    }
}

pub fn ensure_engine_setup(layout: &EngineLayout) -> Result<(), EngineInvocationError> {
    let report = check_engine_setup(layout);
    if report.ok {
        Ok(())
    } else {
        Err(EngineInvocationError::SetupMissing {
            engine_root: layout.engine_root.clone(),
            missing: report.missing,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use std::fs;
    use std::path::Path;

    use crate::restore::engine::ENGINE_RUN_SCRIPT;

    use super::{FACE_CHECKPOINTS_REL_PATH, GLOBAL_CHECKPOINTS_REL_PATH, LANDMARK_MODEL_REL_PATH};

    pub(crate) fn seed_complete_engine_root(root: &Path) {
        let landmark = root.join(LANDMARK_MODEL_REL_PATH);
        fs::create_dir_all(landmark.parent().expect("landmark path should have a parent"))
            .expect("landmark dir should be creatable");
        fs::write(landmark, b"landmarks").expect("landmark model should be writable");
        for checkpoints in [FACE_CHECKPOINTS_REL_PATH, GLOBAL_CHECKPOINTS_REL_PATH] {
            let dir = root.join(checkpoints);
            fs::create_dir_all(dir.as_path()).expect("checkpoint dir should be creatable");
            fs::write(dir.join("weights.pth"), b"weights")
                .expect("checkpoint file should be writable");
        }
        fs::write(root.join(ENGINE_RUN_SCRIPT), b"print('engine')")
            .expect("run script should be writable");
    }
}
