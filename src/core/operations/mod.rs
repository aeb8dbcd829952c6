mod file_ops;

pub use file_ops::{move_file, move_with_sidecar, sidecar_path_for, SIDECAR_SUFFIX};
