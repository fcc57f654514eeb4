//! CI provider detection from well-known environment variables
//!
//! - GitHub Actions: https://docs.github.com/en/actions/learn-github-actions/variables
//! - CircleCI: https://circleci.com/docs/variables/

use super::{CiSystem, Provenance, ProvenanceTier};
use crate::config::EnvSource;

#[derive(Debug, Clone, Copy, Default)]
pub struct GithubActions;

impl ProvenanceTier for GithubActions {
    fn name(&self) -> &'static str {
        "github-actions"
    }

    fn resolve(&self, env: &dyn EnvSource) -> Option<Provenance> {
        if env.var("GITHUB_ACTIONS").as_deref() != Some("true") {
            return None;
        }

        // GITHUB_REPOSITORY is "owner/name"
        let full_name = env.non_empty("GITHUB_REPOSITORY").unwrap_or_default();
        let (owner, name) = match full_name.split_once('/') {
            Some((owner, name)) => (owner.to_string(), name.to_string()),
            None => (String::new(), full_name),
        };

        // Pull request runs check out a merge ref; the head ref is the real branch.
        let branch = env
            .non_empty("GITHUB_HEAD_REF")
            .or_else(|| env.non_empty("GITHUB_REF_NAME"))
            .unwrap_or_default();

        let build_id = env
            .non_empty("GITHUB_RUN_NUMBER")
            .map(|run| {
                let attempt = env
                    .non_empty("GITHUB_RUN_ATTEMPT")
                    .unwrap_or_else(|| "1".to_string());
                format!("gha-{}-{}", run, attempt)
            })
            .unwrap_or_default();

        Some(Provenance {
            system: CiSystem::GithubActions,
            repository_owner: env.non_empty("GITHUB_REPOSITORY_OWNER").unwrap_or(owner),
            repository_name: name,
            branch,
            commit_hash: env.non_empty("GITHUB_SHA").unwrap_or_default(),
            build_id,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CircleCi;

impl ProvenanceTier for CircleCi {
    fn name(&self) -> &'static str {
        "circleci"
    }

    fn resolve(&self, env: &dyn EnvSource) -> Option<Provenance> {
        if env.var("CIRCLECI").as_deref() != Some("true") {
            return None;
        }

        Some(Provenance {
            system: CiSystem::CircleCi,
            repository_owner: env.non_empty("CIRCLE_PROJECT_USERNAME").unwrap_or_default(),
            repository_name: env.non_empty("CIRCLE_PROJECT_REPONAME").unwrap_or_default(),
            branch: env.non_empty("CIRCLE_BRANCH").unwrap_or_default(),
            commit_hash: env.non_empty("CIRCLE_SHA1").unwrap_or_default(),
            build_id: env
                .non_empty("CIRCLE_BUILD_NUM")
                .map(|num| format!("circle-{}", num))
                .unwrap_or_default(),
        })
    }
}
