//! CI and version-control provenance for a test run
//!
//! Provenance is resolved through an ordered list of tiers; the first tier
//! that recognizes its environment wins:
//! 1. CI providers (GitHub Actions, CircleCI) from their own variables
//! 2. The enclosing git repository
//! 3. Explicit `CODECOMET_*` overrides
//!
//! A build id is always produced, generated if no tier supplied one.

mod providers;
mod vcs;

pub use providers::{CircleCi, GithubActions};
pub use vcs::{detect_from_git, find_repo_root, parse_remote_url, VcsTier};

use crate::config::{prefixed, EnvSource};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// CI system a run was detected in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CiSystem {
    GithubActions,
    CircleCi,
    #[default]
    Unknown,
}

impl CiSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiSystem::GithubActions => "Github Actions",
            CiSystem::CircleCi => "CircleCI",
            CiSystem::Unknown => "(none)",
        }
    }
}

impl std::fmt::Display for CiSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a test run came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub system: CiSystem,
    pub repository_owner: String,
    pub repository_name: String,
    pub branch: String,
    pub commit_hash: String,
    /// Never empty once returned from [`Resolver::resolve`].
    pub build_id: String,
}

impl Provenance {
    /// `owner/name`, or just the name when the owner is unknown.
    pub fn repository(&self) -> String {
        if self.repository_owner.is_empty() {
            self.repository_name.clone()
        } else {
            format!("{}/{}", self.repository_owner, self.repository_name)
        }
    }
}

/// One strategy in the provenance fallback chain.
///
/// Returns `None` when the tier does not apply, letting the next one try.
pub trait ProvenanceTier {
    fn name(&self) -> &'static str;

    fn resolve(&self, env: &dyn EnvSource) -> Option<Provenance>;
}

/// Last resort: whatever `CODECOMET_*` overrides are set, empty otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverrideTier;

impl ProvenanceTier for EnvOverrideTier {
    fn name(&self) -> &'static str {
        "env-override"
    }

    fn resolve(&self, env: &dyn EnvSource) -> Option<Provenance> {
        let var = |name: &str| env.non_empty(&prefixed(name)).unwrap_or_default();
        Some(Provenance {
            system: CiSystem::Unknown,
            repository_owner: var("REPOSITORY_OWNER"),
            repository_name: var("REPOSITORY"),
            branch: var("BRANCH"),
            commit_hash: var("COMMIT_HASH"),
            build_id: String::new(),
        })
    }
}

/// Prioritized list of provenance tiers
pub struct Resolver {
    tiers: Vec<Box<dyn ProvenanceTier>>,
}

impl Resolver {
    pub fn new(tiers: Vec<Box<dyn ProvenanceTier>>) -> Self {
        Self { tiers }
    }

    /// Providers, then git starting at `cwd`, then env overrides.
    pub fn standard(cwd: &Path) -> Self {
        Self::new(vec![
            Box::new(GithubActions),
            Box::new(CircleCi),
            Box::new(VcsTier::new(cwd)),
            Box::new(EnvOverrideTier),
        ])
    }

    pub fn resolve(&self, env: &dyn EnvSource) -> Provenance {
        let mut provenance = self
            .tiers
            .iter()
            .find_map(|tier| {
                let found = tier.resolve(env);
                match &found {
                    Some(_) => debug!(tier = tier.name(), "provenance resolved"),
                    None => debug!(tier = tier.name(), "provenance tier did not apply"),
                }
                found
            })
            .unwrap_or_default();

        if provenance.build_id.is_empty() {
            provenance.build_id = fallback_build_id(env);
        }
        provenance
    }
}

/// Resolve provenance for a run started in `cwd`.
pub fn resolve(env: &dyn EnvSource, cwd: &Path) -> Provenance {
    Resolver::standard(cwd).resolve(env)
}

fn fallback_build_id(env: &dyn EnvSource) -> String {
    env.non_empty(&prefixed("BUILD_ID"))
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    struct Fixed(Option<Provenance>);

    impl ProvenanceTier for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn resolve(&self, _env: &dyn EnvSource) -> Option<Provenance> {
            self.0.clone()
        }
    }

    #[test]
    fn test_first_matching_tier_wins() {
        let first = Provenance {
            branch: "first".into(),
            build_id: "b1".into(),
            ..Default::default()
        };
        let second = Provenance {
            branch: "second".into(),
            ..Default::default()
        };
        let resolver = Resolver::new(vec![
            Box::new(Fixed(None)),
            Box::new(Fixed(Some(first))),
            Box::new(Fixed(Some(second))),
        ]);

        let provenance = resolver.resolve(&env(&[]));
        assert_eq!(provenance.branch, "first");
        assert_eq!(provenance.build_id, "b1");
    }

    #[test]
    fn test_no_ci_no_repo_falls_through_to_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(vec![
            Box::new(GithubActions),
            Box::new(CircleCi),
            Box::new(VcsTier::new(dir.path())),
            Box::new(EnvOverrideTier),
        ]);

        let provenance = resolver.resolve(&env(&[
            ("CODECOMET_BRANCH", "main"),
            ("CODECOMET_REPOSITORY", "widgets"),
            ("CODECOMET_COMMIT_HASH", "abc123"),
        ]));

        assert_eq!(provenance.system, CiSystem::Unknown);
        assert_eq!(provenance.branch, "main");
        assert_eq!(provenance.repository_name, "widgets");
        assert_eq!(provenance.repository_owner, "");
        assert_eq!(provenance.commit_hash, "abc123");
        assert!(!provenance.build_id.is_empty());
    }

    #[test]
    fn test_build_id_generated_when_nothing_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(vec![
            Box::new(VcsTier::new(dir.path())),
            Box::new(EnvOverrideTier),
        ]);

        let provenance = resolver.resolve(&env(&[]));
        assert_eq!(provenance.branch, "");
        assert_eq!(provenance.build_id.len(), 32);
        assert!(provenance.build_id.chars().all(|c| c.is_ascii_hexdigit()));

        let again = resolver.resolve(&env(&[]));
        assert_ne!(provenance.build_id, again.build_id);
    }

    #[test]
    fn test_build_id_override() {
        let resolver = Resolver::new(vec![Box::new(EnvOverrideTier)]);
        let provenance = resolver.resolve(&env(&[("CODECOMET_BUILD_ID", "nightly-7")]));
        assert_eq!(provenance.build_id, "nightly-7");
    }

    #[test]
    fn test_provider_build_id_beats_override() {
        let resolver = Resolver::new(vec![Box::new(CircleCi), Box::new(EnvOverrideTier)]);
        let provenance = resolver.resolve(&env(&[
            ("CIRCLECI", "true"),
            ("CIRCLE_BUILD_NUM", "321"),
            ("CODECOMET_BUILD_ID", "ignored"),
        ]));
        assert_eq!(provenance.system, CiSystem::CircleCi);
        assert_eq!(provenance.build_id, "circle-321");
    }

    #[test]
    fn test_empty_chain_still_has_build_id() {
        let provenance = Resolver::new(Vec::new()).resolve(&env(&[]));
        assert_eq!(provenance.system, CiSystem::Unknown);
        assert!(!provenance.build_id.is_empty());
    }

    #[test]
    fn test_repository_display() {
        let mut provenance = Provenance {
            repository_owner: "acme".into(),
            repository_name: "widgets".into(),
            ..Default::default()
        };
        assert_eq!(provenance.repository(), "acme/widgets");
        provenance.repository_owner.clear();
        assert_eq!(provenance.repository(), "widgets");
    }

    #[test]
    fn test_ci_system_labels() {
        assert_eq!(CiSystem::GithubActions.to_string(), "Github Actions");
        assert_eq!(CiSystem::CircleCi.to_string(), "CircleCI");
        assert_eq!(CiSystem::Unknown.to_string(), "(none)");
    }
}
