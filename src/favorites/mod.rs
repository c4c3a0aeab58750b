//! Favorite repository lists.
//!
//! The worker asks its [`FavoritesSource`] for the favorite repositories at
//! the start of every cycle, so edits to the tracked-repositories file are
//! picked up without a restart.

use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::debug;

use crate::github::error::SourceError;

/// Provides the favorite repositories, in `owner/name` form.
#[cfg_attr(test, mockall::automock)]
pub trait FavoritesSource: Send + Sync {
    /// Current favorite repositories.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying list cannot be read.
    fn favorites(&self) -> Result<Vec<String>, SourceError>;
}

/// A fixed list of favorites, typically from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticFavorites(Vec<String>);

impl StaticFavorites {
    /// Creates a list, dropping blank entries and duplicates.
    #[must_use]
    pub fn new(repositories: impl IntoIterator<Item = String>) -> Self {
        Self(dedup(repositories))
    }
}

impl FavoritesSource for StaticFavorites {
    fn favorites(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackedRepo {
    full_name: Option<String>,
    repo_name: Option<String>,
    #[serde(default)]
    favorite: bool,
}

#[derive(Debug, Deserialize)]
struct TrackedReposDocument {
    #[serde(default)]
    repos: Vec<TrackedRepo>,
}

/// Favorites read from a tracked-repositories JSON file.
///
/// The file holds a `repos` array whose entries carry `fullName` or
/// `repoName` and a `favorite` flag; other fields are ignored. A missing
/// file yields no favorites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedReposFile {
    path: Utf8PathBuf,
}

impl TrackedReposFile {
    /// Creates a reader for `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the tracked-repositories file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl FavoritesSource for TrackedReposFile {
    fn favorites(&self) -> Result<Vec<String>, SourceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path, "tracked repositories file not found");
                return Ok(Vec::new());
            }
            Err(error) => {
                return Err(SourceError::Io {
                    message: format!("failed to read {}: {error}", self.path),
                });
            }
        };

        let document: TrackedReposDocument =
            serde_json::from_str(&contents).map_err(|error| SourceError::Configuration {
                message: format!("invalid tracked repositories file {}: {error}", self.path),
            })?;

        Ok(dedup(
            document
                .repos
                .into_iter()
                .filter(|repo| repo.favorite)
                .filter_map(|repo| repo.full_name.or(repo.repo_name)),
        ))
    }
}

/// Union of several favorite sources, in order, without duplicates.
#[derive(Default)]
pub struct MergedFavorites(Vec<Box<dyn FavoritesSource>>);

impl MergedFavorites {
    /// Creates a union over `sources`.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn FavoritesSource>>) -> Self {
        Self(sources)
    }
}

impl FavoritesSource for MergedFavorites {
    fn favorites(&self) -> Result<Vec<String>, SourceError> {
        let mut all = Vec::new();
        for source in &self.0 {
            all.extend(source.favorites()?);
        }
        Ok(dedup(all))
    }
}

fn dedup(repositories: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    repositories
        .into_iter()
        .map(|repository| repository.trim().to_owned())
        .filter(|repository| !repository.is_empty())
        .filter(|repository| seen.insert(repository.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::{FavoritesSource, MergedFavorites, StaticFavorites, TrackedReposFile};
    use crate::github::error::SourceError;

    struct TempFile {
        _dir: TempDir,
        path: Utf8PathBuf,
    }

    #[fixture]
    fn repos_file() -> TempFile {
        let dir = TempDir::new().expect("temp dir should be created");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("repos-tracked.json"))
            .expect("temp path should be UTF-8");
        TempFile { _dir: dir, path }
    }

    #[rstest]
    fn reads_favorite_entries_only(repos_file: TempFile) {
        std::fs::write(
            &repos_file.path,
            r#"{
                "version": 1,
                "paths": { "bareRoot": "/srv/bare", "worktreeRoot": "/srv/trees" },
                "repos": [
                    { "fullName": "octo/widgets", "defaultBranch": "main", "favorite": true },
                    { "repoName": "gadgets", "defaultBranch": "main", "favorite": true },
                    { "fullName": "octo/ignored", "defaultBranch": "main", "favorite": false },
                    { "fullName": "octo/widgets", "defaultBranch": "main", "favorite": true }
                ]
            }"#,
        )
        .expect("file should be written");

        let favorites = TrackedReposFile::new(repos_file.path.clone())
            .favorites()
            .expect("favorites should load");

        assert_eq!(favorites, vec!["octo/widgets".to_owned(), "gadgets".to_owned()]);
    }

    #[rstest]
    fn missing_file_yields_no_favorites(repos_file: TempFile) {
        let favorites = TrackedReposFile::new(repos_file.path.clone())
            .favorites()
            .expect("missing file is not an error");

        assert!(favorites.is_empty());
    }

    #[rstest]
    fn malformed_file_is_a_configuration_error(repos_file: TempFile) {
        std::fs::write(&repos_file.path, "{ not json").expect("file should be written");

        let error = TrackedReposFile::new(repos_file.path.clone())
            .favorites()
            .expect_err("malformed file should fail");

        assert!(matches!(error, SourceError::Configuration { .. }));
    }

    #[rstest]
    fn merged_favorites_keep_first_occurrence() {
        let merged = MergedFavorites::new(vec![
            Box::new(StaticFavorites::new(["a/one".to_owned(), " ".to_owned()])),
            Box::new(StaticFavorites::new(["b/two".to_owned(), "a/one".to_owned()])),
        ]);

        assert_eq!(
            merged.favorites().expect("static favorites never fail"),
            vec!["a/one".to_owned(), "b/two".to_owned()]
        );
    }
}
