use std::path::{Path, PathBuf};

use crate::restore::EngineOptions;

pub const FINAL_OUTPUT_DIR: &str = "final_output";
pub const STAGE_1_RESTORE_DIR: &str = "stage_1_restore_output";
pub const STAGE_2_DETECTION_DIR: &str = "stage_2_detection_output";
pub const STAGE_3_FACE_DIR: &str = "stage_3_face_output";

/// One directory the external engine may produce under the output root.
/// `produced_when` gates the entry on the run options, so mode-dependent
/// layouts stay a table edit instead of new branching.
#[derive(Debug, Clone, Copy)]
pub struct StageDescriptor {
    pub name: &'static str,
    pub relative_path: &'static str,
    pub produced_when: fn(&EngineOptions) -> bool,
}

fn always(_options: &EngineOptions) -> bool {
    true
}

fn scratch_mode(options: &EngineOptions) -> bool {
    options.remove_scratches
}

/// Result-bearing stage directories in resolution priority order, the merged
/// final output first. `stage_2_detection_output` is deliberately absent: it
/// holds landmark overlays, never restored results, and the extension
/// fallback would happily return one.
pub const RESULT_STAGE_TABLE: &[StageDescriptor] = &[
    StageDescriptor {
        name: "final-merge",
        relative_path: "final_output",
        produced_when: always,
    },
    StageDescriptor {
        name: "flat-restored",
        relative_path: "restored_image",
        produced_when: always,
    },
    StageDescriptor {
        name: "global-restore",
        relative_path: "stage_1_restore_output/restored_image",
        produced_when: always,
    },
    StageDescriptor {
        name: "scratch-origin",
        relative_path: "stage_1_restore_output/origin",
        produced_when: scratch_mode,
    },
    StageDescriptor {
        name: "face-crops",
        relative_path: "stage_3_face_output/each_img",
        produced_when: always,
    },
];

/// Top-level directories the engine may create under the output root,
/// options aside. Used by the output-tree report; resolution works from
/// `RESULT_STAGE_TABLE` instead.
pub const ENGINE_STAGE_DIRS: &[&str] = &[
    STAGE_1_RESTORE_DIR,
    STAGE_2_DETECTION_DIR,
    STAGE_3_FACE_DIR,
    FINAL_OUTPUT_DIR,
];

/// Ordered candidate directories for output resolution, most specific first,
/// with the output root itself appended as the last-resort candidate.
pub fn candidate_output_dirs(output_dir: &Path, options: &EngineOptions) -> Vec<PathBuf> {
    let mut candidates = RESULT_STAGE_TABLE
        .iter()
        .filter(|stage| (stage.produced_when)(options))
        .map(|stage| output_dir.join(stage.relative_path))
        .collect::<Vec<_>>();
    candidates.push(output_dir.to_path_buf());
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_options_skip_scratch_only_stages() {
        let options = EngineOptions::default();
        let candidates = candidate_output_dirs(Path::new("/out"), &options);

        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/out/final_output"),
                PathBuf::from("/out/restored_image"),
                PathBuf::from("/out/stage_1_restore_output/restored_image"),
                PathBuf::from("/out/stage_3_face_output/each_img"),
                PathBuf::from("/out"),
            ]
        );
    }

    #[test]
    fn scratch_mode_inserts_the_origin_stage_before_face_crops() {
        let options = EngineOptions {
            remove_scratches: true,
            ..EngineOptions::default()
        };
        let candidates = candidate_output_dirs(Path::new("/out"), &options);

        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/out/final_output"),
                PathBuf::from("/out/restored_image"),
                PathBuf::from("/out/stage_1_restore_output/restored_image"),
                PathBuf::from("/out/stage_1_restore_output/origin"),
                PathBuf::from("/out/stage_3_face_output/each_img"),
                PathBuf::from("/out"),
            ]
        );
    }

    #[test]
    fn output_root_is_always_the_lowest_priority_candidate() {
        for options in [
            EngineOptions::default(),
            EngineOptions {
                use_gpu: true,
                remove_scratches: true,
                high_resolution: true,
            },
        ] {
            let candidates = candidate_output_dirs(Path::new("/out"), &options);
            assert_eq!(candidates.last(), Some(&PathBuf::from("/out")));
        }
    }

    #[test]
    fn detection_stage_never_appears_as_a_result_candidate() {
        let options = EngineOptions {
            use_gpu: true,
            remove_scratches: true,
            high_resolution: true,
        };
        let candidates = candidate_output_dirs(Path::new("/out"), &options);
        assert!(candidates
            .iter()
            .all(|dir| !dir.to_string_lossy().contains(STAGE_2_DETECTION_DIR)));
    }
}
