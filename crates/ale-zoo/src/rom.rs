//! ROM lookup.

use crate::{AleZooError, Result};
use std::path::{Path, PathBuf};

/// Candidate locations for `<game>.bin` under `root`, in search order:
/// the root itself, a `roms` subdirectory, then the legacy
/// `ROM/<game>/` layout.
pub fn candidates(root: &Path, game: &str) -> Vec<PathBuf> {
    let file = format!("{game}.bin");
    vec![
        root.join(&file),
        root.join("roms").join(&file),
        root.join("ROM").join(game).join(&file),
    ]
}

/// Find the ROM for `game`, searching from `root` or the working directory
pub fn locate(root: Option<&Path>, game: &str) -> Result<PathBuf> {
    let root = match root {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let searched = candidates(&root, game);
    match searched.iter().find(|path| path.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(AleZooError::ResourceNotFound {
            game: game.to_string(),
            searched,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_search_order() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("ROM").join("pong");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join("pong.bin"), b"legacy").unwrap();
        assert_eq!(
            locate(Some(dir.path()), "pong").unwrap(),
            legacy.join("pong.bin")
        );

        fs::create_dir_all(dir.path().join("roms")).unwrap();
        fs::write(dir.path().join("roms").join("pong.bin"), b"roms").unwrap();
        assert_eq!(
            locate(Some(dir.path()), "pong").unwrap(),
            dir.path().join("roms").join("pong.bin")
        );

        fs::write(dir.path().join("pong.bin"), b"root").unwrap();
        assert_eq!(
            locate(Some(dir.path()), "pong").unwrap(),
            dir.path().join("pong.bin")
        );
    }

    #[test]
    fn test_missing_rom_lists_candidates() {
        let dir = tempfile::tempdir().unwrap();
        match locate(Some(dir.path()), "combat") {
            Err(AleZooError::ResourceNotFound { game, searched }) => {
                assert_eq!(game, "combat");
                assert_eq!(searched, candidates(dir.path(), "combat"));
            }
            other => panic!("expected ResourceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_directory_is_not_a_rom() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pong.bin")).unwrap();
        assert!(locate(Some(dir.path()), "pong").is_err());
    }

    #[test]
    fn test_defaults_to_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        let rom = tempfile::Builder::new()
            .prefix("rom-lookup-")
            .suffix(".bin")
            .tempfile_in(&cwd)
            .unwrap();
        let game = rom.path().file_stem().unwrap().to_str().unwrap();
        assert_eq!(locate(None, game).unwrap(), cwd.join(format!("{game}.bin")));

        match locate(None, "rom-lookup-absent") {
            Err(AleZooError::ResourceNotFound { searched, .. }) => {
                assert_eq!(searched, candidates(&cwd, "rom-lookup-absent"));
            }
            other => panic!("expected ResourceNotFound, got {other:?}"),
        }
    }
}
