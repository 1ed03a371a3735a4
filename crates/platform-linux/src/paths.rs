//! Output file naming and directory lookup.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Environment variable naming the directory for generated file names.
pub const DEFAULT_DIR_ENV: &str = "WLGRAB_DEFAULT_DIR";

/// Where the encoded image should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

/// Timestamped file name, e.g. `20240305_14h07m09s_wlgrab.png`.
pub fn default_filename(extension: &str, time: NaiveDateTime) -> String {
    format!("{}_wlgrab.{extension}", time.format("%Y%m%d_%Hh%Mm%Ss"))
}

/// Directory for generated file names: `$WLGRAB_DEFAULT_DIR`, then the XDG
/// pictures directory, then the working directory. Directories that do not
/// exist are skipped.
pub fn output_dir() -> PathBuf {
    let env_dir = std::env::var_os(DEFAULT_DIR_ENV).map(PathBuf::from);
    pick_output_dir(env_dir, dirs::picture_dir())
}

fn pick_output_dir(env_dir: Option<PathBuf>, pictures: Option<PathBuf>) -> PathBuf {
    [env_dir, pictures]
        .into_iter()
        .flatten()
        .find(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Decide where to write: `"-"` is stdout, an explicit path is used as is,
/// and no path yields a timestamped name in `directory` (or [`output_dir`]).
pub fn resolve_output_target(
    path: Option<&str>,
    extension: &str,
    directory: Option<&Path>,
) -> OutputTarget {
    match path {
        Some("-") => OutputTarget::Stdout,
        Some(path) => OutputTarget::File(PathBuf::from(path)),
        None => {
            let dir = directory.map(Path::to_path_buf).unwrap_or_else(output_dir);
            let name = default_filename(extension, chrono::Local::now().naive_local());
            OutputTarget::File(dir.join(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn filename_embeds_timestamp_and_extension() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap();
        assert_eq!(default_filename("png", time), "20240305_14h07m09s_wlgrab.png");
        assert_eq!(default_filename("jpeg", time), "20240305_14h07m09s_wlgrab.jpeg");
    }

    #[test]
    fn missing_directories_fall_through_to_cwd() {
        let missing = PathBuf::from("/nonexistent/wlgrab/dir");
        assert_eq!(
            pick_output_dir(Some(missing.clone()), Some(missing)),
            PathBuf::from(".")
        );
        let tmp = std::env::temp_dir();
        assert_eq!(pick_output_dir(None, Some(tmp.clone())), tmp);
    }

    #[test]
    fn pictures_dir_is_used_when_it_exists() {
        let expected = dirs::picture_dir()
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from("."));
        assert_eq!(pick_output_dir(None, dirs::picture_dir()), expected);

        let tmp = std::env::temp_dir();
        assert_eq!(pick_output_dir(Some(tmp.clone()), dirs::picture_dir()), tmp);
    }

    #[test]
    fn dash_means_stdout() {
        assert_eq!(resolve_output_target(Some("-"), "png", None), OutputTarget::Stdout);
        assert_eq!(
            resolve_output_target(Some("shot.ppm"), "ppm", None),
            OutputTarget::File(PathBuf::from("shot.ppm"))
        );
        let tmp = std::env::temp_dir();
        match resolve_output_target(None, "png", Some(&tmp)) {
            OutputTarget::File(path) => {
                assert!(path.starts_with(&tmp));
                assert!(path.to_string_lossy().ends_with("_wlgrab.png"));
            }
            OutputTarget::Stdout => panic!("expected a file target"),
        }
    }
}
