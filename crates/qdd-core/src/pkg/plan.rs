//! Install planning.
//!
//! Walks the lock file tree once, synchronously, and turns every entry that
//! needs fetching into an [`InstallTask`]. The whole tree is validated before
//! any task exists, so a bad entry anywhere means nothing is touched.

use super::cache::PackageCache;
use super::lockfile::{codes, Dependencies, DependencyEntry, LockNode};
use crate::config::Config;
use crate::paths::package_dest_dir;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// One package to materialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallTask {
    pub name: String,
    pub integrity: String,
    pub url: String,
    /// Install location, or `None` in cache-only mode.
    pub dest_dir: Option<PathBuf>,
    /// Cache slot, or `None` when the cache is bypassed.
    pub cache_dir: Option<PathBuf>,
}

/// What the walk includes and where tasks point.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Skip `dev` entries and everything beneath them.
    pub production: bool,
    /// Give tasks a `node_modules` destination.
    pub use_dest: bool,
    /// Give tasks a cache slot.
    pub cache: Option<PackageCache>,
}

impl PlanOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            production: config.production,
            use_dest: config.use_dest(),
            cache: config
                .use_cache()
                .then(|| PackageCache::new(config.cache_dir.clone())),
        }
    }
}

/// A non-bundled entry whose `integrity` or `resolved` is missing, empty, or
/// unusable as a cache key.
#[derive(Debug, Clone)]
pub struct InvalidEntryError {
    /// Dependency name as keyed in its parent.
    pub name: String,
    /// Names of the enclosing entries, outermost first.
    pub ancestors: Vec<String>,
    pub entry: DependencyEntry,
}

impl InvalidEntryError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        codes::PKG_LOCK_ENTRY_INVALID
    }

    /// The fields the entry is missing. Empty strings count as missing.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if present(self.entry.integrity.as_deref()).is_none() {
            missing.push("integrity");
        }
        if present(self.entry.resolved.as_deref()).is_none() {
            missing.push("resolved");
        }
        missing
    }

    /// Render the offending entry as `{ "<name>": { ... } }`.
    #[must_use]
    pub fn render_entry(&self) -> String {
        let mut map = Map::new();
        map.insert(
            self.name.clone(),
            serde_json::to_value(&self.entry).unwrap_or_default(),
        );
        serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_default()
    }
}

impl fmt::Display for InvalidEntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path = self.ancestors.join(" > ");
        if !path.is_empty() {
            path.push_str(" > ");
        }
        write!(f, "{}: invalid entry '{path}{}", self.code(), self.name)?;
        if let Some(version) = self.entry.version() {
            write!(f, "@{version}")?;
        }
        let missing = self.missing_fields();
        if missing.is_empty() {
            write!(
                f,
                "': integrity '{}' is not a valid cache key",
                self.entry.integrity.as_deref().unwrap_or_default()
            )
        } else {
            write!(f, "': missing {}", missing.join(" and "))
        }
    }
}

impl std::error::Error for InvalidEntryError {}

fn present(field: Option<&str>) -> Option<&str> {
    field.filter(|s| !s.is_empty())
}

/// Build the ordered task list for `root`, installing under `project_root`.
///
/// # Errors
/// Returns the first invalid entry found; no partial plan is returned.
pub fn plan_install(
    root: &LockNode,
    project_root: &Path,
    options: &PlanOptions,
) -> Result<Vec<InstallTask>, InvalidEntryError> {
    let mut walker = Walker {
        options,
        ancestors: Vec::new(),
        tasks: Vec::new(),
    };
    walker.walk(root.dependencies.as_ref(), Some(project_root))?;
    Ok(walker.tasks)
}

struct Walker<'a> {
    options: &'a PlanOptions,
    ancestors: Vec<String>,
    tasks: Vec<InstallTask>,
}

impl Walker<'_> {
    fn walk(
        &mut self,
        deps: Option<&Dependencies>,
        dir: Option<&Path>,
    ) -> Result<(), InvalidEntryError> {
        let Some(deps) = deps else {
            return Ok(());
        };

        for (name, entry) in deps {
            if entry.bundled {
                continue;
            }
            if self.options.production && entry.dev {
                continue;
            }

            let (Some(integrity), Some(url)) = (
                present(entry.integrity.as_deref()).filter(|i| PackageCache::is_valid_key(i)),
                present(entry.resolved.as_deref()),
            ) else {
                return Err(InvalidEntryError {
                    name: name.clone(),
                    ancestors: self.ancestors.clone(),
                    entry: entry.clone(),
                });
            };

            let dest_dir = if self.options.use_dest {
                dir.map(|d| package_dest_dir(d, name))
            } else {
                None
            };
            let cache_dir = self.options.cache.as_ref().map(|c| c.entry_dir(integrity));

            self.tasks.push(InstallTask {
                name: name.clone(),
                integrity: integrity.to_string(),
                url: url.to_string(),
                dest_dir: dest_dir.clone(),
                cache_dir,
            });

            if entry.dependencies.is_some() {
                self.ancestors.push(name.clone());
                self.walk(entry.dependencies.as_ref(), dest_dir.as_deref())?;
                self.ancestors.pop();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> DependencyEntry {
        DependencyEntry::new(format!("file:{name}.tgz"), format!("sha1-{name}"))
    }

    fn options(production: bool, use_dest: bool, cache: Option<&str>) -> PlanOptions {
        PlanOptions {
            production,
            use_dest,
            cache: cache.map(PackageCache::new),
        }
    }

    fn names(tasks: &[InstallTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    fn sample_tree() -> LockNode {
        LockNode::default()
            .with_dependency("a", entry("a").with_dependency("b", entry("b")))
            .with_dependency(
                "dev-tool",
                entry("dev-tool")
                    .dev()
                    .with_dependency("helper", entry("helper")),
            )
            .with_dependency("c", entry("c"))
    }

    #[test]
    fn test_no_dependencies() {
        let tasks = plan_install(
            &LockNode::default(),
            Path::new("/p"),
            &options(false, true, Some("/cache")),
        )
        .unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_nested_paths() {
        let tasks = plan_install(
            &sample_tree(),
            Path::new("/p"),
            &options(false, true, Some("/cache")),
        )
        .unwrap();

        assert_eq!(names(&tasks), vec!["a", "b", "dev-tool", "helper", "c"]);

        let b = &tasks[1];
        assert_eq!(
            b.dest_dir.as_deref(),
            Some(Path::new("/p/node_modules/a/node_modules/b"))
        );
        assert_eq!(b.cache_dir.as_deref(), Some(Path::new("/cache/sha1-b")));
        assert_eq!(b.url, "file:b.tgz");
        assert_eq!(b.integrity, "sha1-b");
    }

    #[test]
    fn test_production_skips_dev_subtree() {
        let tasks = plan_install(
            &sample_tree(),
            Path::new("/p"),
            &options(true, true, Some("/cache")),
        )
        .unwrap();
        // "helper" is not marked dev but is only reachable through "dev-tool"
        assert_eq!(names(&tasks), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_prod_path_survives_dev_path() {
        let tree = LockNode::default()
            .with_dependency("shared", entry("shared"))
            .with_dependency(
                "dev-tool",
                entry("dev-tool").dev().with_dependency("shared", entry("shared")),
            );
        let tasks = plan_install(&tree, Path::new("/p"), &options(true, true, None)).unwrap();
        assert_eq!(names(&tasks), vec!["shared"]);
        assert_eq!(
            tasks[0].dest_dir.as_deref(),
            Some(Path::new("/p/node_modules/shared"))
        );
    }

    #[test]
    fn test_bundled_skips_subtree() {
        let mut bundled = DependencyEntry::default()
            .bundled()
            .with_dependency("inner", entry("inner"));
        bundled.other.insert("version".into(), "1.0.0".into());
        let tree = LockNode::default()
            .with_dependency("host", entry("host"))
            .with_dependency("packed", bundled);

        let tasks = plan_install(&tree, Path::new("/p"), &options(false, true, None)).unwrap();
        assert_eq!(names(&tasks), vec!["host"]);
    }

    #[test]
    fn test_no_cache_leaves_cache_dir_unset() {
        let tasks = plan_install(&sample_tree(), Path::new("/p"), &options(false, true, None)).unwrap();
        assert!(tasks.iter().all(|t| t.cache_dir.is_none()));
        assert!(tasks.iter().all(|t| t.dest_dir.is_some()));
    }

    #[test]
    fn test_cache_only_has_no_dest_at_any_depth() {
        let tree = LockNode::default().with_dependency(
            "top",
            entry("top").with_dependency(
                "mid",
                entry("mid").with_dependency("leaf", entry("leaf")),
            ),
        );
        let tasks = plan_install(&tree, Path::new("/p"), &options(false, false, Some("/cache"))).unwrap();

        assert_eq!(names(&tasks), vec!["top", "mid", "leaf"]);
        for task in &tasks {
            assert!(task.dest_dir.is_none(), "{} has a destination", task.name);
            assert!(task.cache_dir.is_some());
        }
    }

    #[test]
    fn test_shared_integrity_shares_cache_slot() {
        let tree = LockNode::default()
            .with_dependency("x", DependencyEntry::new("https://a.test/x.tgz", "sha512-same"))
            .with_dependency("y", DependencyEntry::new("https://b.test/y.tgz", "sha512-same"));
        let tasks = plan_install(&tree, Path::new("/p"), &options(false, true, Some("/cache"))).unwrap();
        assert_eq!(tasks[0].cache_dir, tasks[1].cache_dir);
        assert_ne!(tasks[0].dest_dir, tasks[1].dest_dir);
    }

    #[test]
    fn test_invalid_entry_anywhere_fails_whole_plan() {
        let mut tree = LockNode::default();
        for i in 0..1000 {
            tree = tree.with_dependency(format!("a{i:04}"), entry(&format!("a{i}")));
        }
        let broken = DependencyEntry {
            resolved: Some("file:broken.tgz".into()),
            ..Default::default()
        };
        tree = tree.with_dependency("zz", entry("zz").with_dependency("broken", broken));

        let err = plan_install(&tree, Path::new("/p"), &options(false, true, None)).unwrap_err();
        assert_eq!(err.name, "broken");
        assert_eq!(err.ancestors, vec!["zz".to_string()]);
        assert_eq!(err.missing_fields(), vec!["integrity"]);
        assert_eq!(err.code(), codes::PKG_LOCK_ENTRY_INVALID);
        assert!(err.to_string().contains("zz > broken"));
    }

    #[test]
    fn test_walk_follows_lock_file_order() {
        let lock = LockNode::from_json(
            r#"{"dependencies": {
                "zeta": { "resolved": "file:zeta.tgz", "integrity": "sha1-zeta" },
                "alpha": { "resolved": "file:alpha.tgz", "integrity": "sha1-alpha" },
                "mid": { "resolved": "file:mid.tgz", "integrity": "sha1-mid" }
            }}"#,
        )
        .unwrap();
        let tasks = plan_install(&lock, Path::new("/p"), &options(false, true, None)).unwrap();
        assert_eq!(names(&tasks), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_first_invalid_entry_in_document_is_reported() {
        let lock = LockNode::from_json(
            r#"{"dependencies": {
                "zeta": { "resolved": "file:zeta.tgz" },
                "alpha": { "integrity": "sha1-alpha" }
            }}"#,
        )
        .unwrap();
        let err = plan_install(&lock, Path::new("/p"), &options(false, true, None)).unwrap_err();
        assert_eq!(err.name, "zeta");
    }

    #[test]
    fn test_empty_fields_are_missing() {
        let tree = LockNode::default().with_dependency(
            "a",
            DependencyEntry::new("https://registry.test/a.tgz", ""),
        );
        let err = plan_install(&tree, Path::new("/p"), &options(false, true, Some("/cache")))
            .unwrap_err();
        assert_eq!(err.missing_fields(), vec!["integrity"]);
        assert!(err.to_string().ends_with("missing integrity"));

        let tree = LockNode::default().with_dependency("b", DependencyEntry::new("", "sha1-b"));
        let err = plan_install(&tree, Path::new("/p"), &options(false, true, Some("/cache")))
            .unwrap_err();
        assert_eq!(err.name, "b");
        assert_eq!(err.missing_fields(), vec!["resolved"]);
    }

    #[test]
    fn test_integrity_outside_cache_root_is_invalid() {
        for integrity in ["/etc", "../../etc", "sha1-a/../../outside"] {
            let tree = LockNode::default()
                .with_dependency("a", DependencyEntry::new("file:a.tgz", integrity));
            let err = plan_install(&tree, Path::new("/p"), &options(false, true, Some("/cache")))
                .unwrap_err();
            assert!(err.missing_fields().is_empty());
            assert!(
                err.to_string().contains("is not a valid cache key"),
                "{integrity}: {err}"
            );
        }

        // Rejected even when the cache is bypassed
        let tree = LockNode::default().with_dependency("a", DependencyEntry::new("file:a.tgz", "/etc"));
        assert!(plan_install(&tree, Path::new("/p"), &options(false, true, None)).is_err());
    }

    #[test]
    fn test_invalid_dev_entry_ignored_in_production() {
        let tree = LockNode::default()
            .with_dependency("ok", entry("ok"))
            .with_dependency("devonly", DependencyEntry::default().dev());

        assert!(plan_install(&tree, Path::new("/p"), &options(false, true, None)).is_err());
        let tasks = plan_install(&tree, Path::new("/p"), &options(true, true, None)).unwrap();
        assert_eq!(names(&tasks), vec!["ok"]);
    }

    #[test]
    fn test_render_entry() {
        let mut e = DependencyEntry::default();
        e.other.insert("version".into(), "1.2.3".into());
        let err = InvalidEntryError {
            name: "left-pad".into(),
            ancestors: Vec::new(),
            entry: e,
        };
        let rendered: Value = serde_json::from_str(&err.render_entry()).unwrap();
        assert_eq!(rendered["left-pad"]["version"], "1.2.3");
        assert_eq!(err.missing_fields(), vec!["integrity", "resolved"]);
        assert!(err.to_string().contains("'left-pad@1.2.3'"));
    }

    #[test]
    fn test_from_config() {
        let config = Config::new(PathBuf::from("/p"))
            .with_cache_dir("/cache")
            .with_production(true)
            .with_cache_only(true);
        let opts = PlanOptions::from_config(&config);
        assert!(opts.production);
        assert!(!opts.use_dest);
        assert_eq!(opts.cache.unwrap().root(), Path::new("/cache"));

        let opts = PlanOptions::from_config(&config.with_cache_only(false).with_no_cache(true));
        assert!(opts.use_dest);
        assert!(opts.cache.is_none());
    }
}
