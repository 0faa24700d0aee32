//! On-disk persistence for generated and seed language profiles, keyed by a fingerprint
//! of the codebase's file list so a profile is only regenerated when the set of files for
//! that language actually changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::ProfileError;
use crate::model::LanguageProfile;
use crate::seed::seed_profile;

pub const PROFILES_DIR: &str = ".trustbot/profiles";

pub fn profiles_dir(root: &Path) -> PathBuf {
    root.join(PROFILES_DIR)
}

fn profile_path(root: &Path, language: &str) -> PathBuf {
    profiles_dir(root).join(format!("{language}.json"))
}

/// Fingerprints a set of files by path and size, not content — cheap enough to run on
/// every profile lookup and stable across runs as long as nothing in the set changed.
pub fn fingerprint_files(root: &Path, files: &[PathBuf]) -> String {
    let mut sorted: Vec<&PathBuf> = files.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for path in sorted {
        let rel = path.strip_prefix(root).unwrap_or(path);
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(b":");
        hasher.update(size.to_le_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Loads the profile persisted for `language` if its codebase hash matches
/// `expected_hash`, returning `None` on any cache miss (no file, parse failure, or a
/// hash that no longer matches the codebase).
pub fn load_cached(root: &Path, language: &str, expected_hash: &str) -> Option<LanguageProfile> {
    let path = profile_path(root, language);
    let contents = std::fs::read_to_string(&path).ok()?;
    let profile: LanguageProfile = serde_json::from_str(&contents).ok()?;
    if profile.codebase_hash == expected_hash {
        Some(profile)
    } else {
        tracing::info!(
            language,
            cached_hash = %profile.codebase_hash,
            expected_hash,
            "profile cache miss: codebase hash changed",
        );
        None
    }
}

pub fn persist(root: &Path, profile: &LanguageProfile) -> Result<(), ProfileError> {
    let dir = profiles_dir(root);
    std::fs::create_dir_all(&dir).map_err(|source| ProfileError::Io { path: dir.display().to_string(), source })?;
    let path = profile_path(root, &profile.language);
    let json = serde_json::to_string_pretty(profile)?;
    std::fs::write(&path, json).map_err(|source| ProfileError::Io { path: path.display().to_string(), source })?;
    tracing::debug!(path = %path.display(), "persisted language profile");
    Ok(())
}

/// Returns the best available profile for `language`: whichever of a disk-cached profile
/// (matching `expected_hash`), a hand-maintained seed profile, or `None` applies first.
/// Never touches the network — profile generation is a separate, explicit step.
pub fn resolve(root: &Path, language: &str, expected_hash: &str) -> Option<LanguageProfile> {
    load_cached(root, language, expected_hash).or_else(|| seed_profile(language))
}

/// Loads every profile currently persisted under the profile store, ignoring files that
/// fail to parse.
pub fn load_all_persisted(root: &Path) -> HashMap<String, LanguageProfile> {
    let dir = profiles_dir(root);
    let mut result = HashMap::new();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return result;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(contents) = std::fs::read_to_string(&path) {
            if let Ok(profile) = serde_json::from_str::<LanguageProfile>(&contents) {
                result.insert(profile.language.clone(), profile);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn persists_and_reloads_a_profile() {
        let dir = tempdir().unwrap();
        let mut profile = seed_profile("python").unwrap();
        profile.codebase_hash = "abc123".to_string();

        persist(dir.path(), &profile).unwrap();
        let loaded = load_cached(dir.path(), "python", "abc123").unwrap();
        assert_eq!(loaded.language, "python");
    }

    #[test]
    fn cache_miss_on_hash_mismatch() {
        let dir = tempdir().unwrap();
        let mut profile = seed_profile("python").unwrap();
        profile.codebase_hash = "abc123".to_string();
        persist(dir.path(), &profile).unwrap();

        assert!(load_cached(dir.path(), "python", "different-hash").is_none());
    }

    #[test]
    fn resolve_falls_back_to_seed_when_uncached() {
        let dir = tempdir().unwrap();
        let profile = resolve(dir.path(), "go", "whatever").unwrap();
        assert_eq!(profile.language, "go");
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        std::fs::write(&a, "x").unwrap();
        std::fs::write(&b, "yy").unwrap();

        let f1 = fingerprint_files(dir.path(), &[a.clone(), b.clone()]);
        let f2 = fingerprint_files(dir.path(), &[b, a]);
        assert_eq!(f1, f2);
    }
}
