//! Which revision to deploy, and what commit it names on the site.

use serde::Serialize;

use crate::alias::Alias;
use crate::error::{Error, Result};
use crate::git;
use crate::log::DeployLog;
use crate::operation::SiteOperations;
use crate::settings::Settings;

/// Abbreviated or full hex commit id.
pub fn looks_like_sha(value: &str) -> bool {
    (4..=40).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RevisionSpec {
    Sha(String),
    Tag(String),
    Branch(String),
}

impl RevisionSpec {
    /// Pick the revision from settings. A SHA beats a tag, a tag beats a
    /// branch; naming more than one only gets an advisory.
    pub fn from_settings(settings: &Settings, log: &dyn DeployLog) -> Result<Self> {
        let sha = settings.get_str("sha");
        let tag = settings.get_str("tag");
        let branch = settings.get_str("branch");

        let given = [&sha, &tag, &branch].iter().filter(|v| v.is_some()).count();
        if given > 1 {
            let winner = if sha.is_some() { "sha" } else { "tag" };
            log.warning(&format!(
                "More than one of branch/tag/sha specified, using {}.",
                winner
            ));
        }

        if let Some(sha) = sha {
            return Ok(RevisionSpec::Sha(sha));
        }
        if let Some(tag) = tag {
            return Ok(RevisionSpec::Tag(tag));
        }
        if let Some(branch) = branch {
            return Ok(RevisionSpec::Branch(branch));
        }

        Err(Error::validation_missing_argument(vec![
            "branch".to_string(),
            "tag".to_string(),
            "sha".to_string(),
        ])
        .with_hint("You must provide at least one of --branch, --tag or --sha."))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RevisionSpec::Sha(_) => "sha",
            RevisionSpec::Tag(_) => "tag",
            RevisionSpec::Branch(_) => "branch",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RevisionSpec::Sha(v) | RevisionSpec::Tag(v) | RevisionSpec::Branch(v) => v,
        }
    }
}

/// A revision spec pinned to a full commit SHA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Revision {
    pub spec: RevisionSpec,
    pub sha: String,
}

impl Revision {
    pub fn branch(&self) -> Option<&str> {
        match &self.spec {
            RevisionSpec::Branch(b) => Some(b),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.spec {
            RevisionSpec::Tag(t) => Some(t),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match &self.spec {
            RevisionSpec::Sha(_) => format!("SHA {}", self.sha),
            RevisionSpec::Tag(t) => format!("tag {} (SHA {})", t, self.sha),
            RevisionSpec::Branch(b) => format!("branch {} (SHA {})", b, self.sha),
        }
    }
}

/// Resolve `spec` against the site's checkout.
pub fn resolve(
    spec: RevisionSpec,
    target: &Alias,
    ops: &dyn SiteOperations,
    log: &dyn DeployLog,
) -> Result<Revision> {
    let fetched = git::fetch(ops, target);
    if !fetched.success {
        log.warning(&format!(
            "Could not fetch from remote, using local refs: {}",
            fetched.error_text()
        ));
    }

    let sha = match &spec {
        RevisionSpec::Sha(sha) => {
            if !looks_like_sha(sha) {
                return Err(Error::revision_not_found("sha", sha, "Invalid SHA."));
            }
            git::rev_parse(ops, target, sha)
                .ok_or_else(|| Error::revision_not_found("sha", sha, "Unknown SHA."))?
        }
        RevisionSpec::Tag(tag) => git::rev_parse(ops, target, &format!("refs/tags/{}", tag))
            .ok_or_else(|| Error::revision_not_found("tag", tag, "Error finding SHA for tag."))?,
        RevisionSpec::Branch(branch) => {
            let name = branch.trim_start_matches("origin/");
            git::rev_parse(ops, target, &format!("refs/remotes/origin/{}", name))
                .or_else(|| git::rev_parse(ops, target, &format!("refs/heads/{}", name)))
                .ok_or_else(|| {
                    Error::revision_not_found("branch", branch, "Error finding SHA for branch.")
                })?
        }
    };

    Ok(Revision { spec, sha })
}
