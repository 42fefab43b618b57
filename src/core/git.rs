//! Git queries and commands run inside a site checkout.
//!
//! Everything goes through `SiteOperations::exec_shell`, so the checkout may
//! be local or on a remote host.

use crate::alias::Alias;
use crate::operation::SiteOperations;
use crate::ssh::CommandOutput;
use crate::utils::shell;

fn git(ops: &dyn SiteOperations, target: &Alias, args: &[&str]) -> CommandOutput {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    ops.exec_shell(target, &format!("git {}", shell::quote_args(&args)))
}

fn first_line(output: &CommandOutput) -> Option<String> {
    if !output.success {
        return None;
    }
    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
}

pub fn fetch(ops: &dyn SiteOperations, target: &Alias) -> CommandOutput {
    git(ops, target, &["fetch", "--tags", "--quiet"])
}

/// Full commit SHA for any revision expression, if it names a commit.
pub fn rev_parse(ops: &dyn SiteOperations, target: &Alias, revision: &str) -> Option<String> {
    let expr = format!("{}^{{commit}}", revision);
    first_line(&git(ops, target, &["rev-parse", "--verify", "--quiet", &expr]))
}

pub fn head(ops: &dyn SiteOperations, target: &Alias) -> Option<String> {
    rev_parse(ops, target, "HEAD")
}

/// Porcelain status of tracked files. Untracked files don't count.
pub fn tracked_changes(ops: &dyn SiteOperations, target: &Alias) -> CommandOutput {
    git(
        ops,
        target,
        &["status", "--porcelain", "--untracked-files=no"],
    )
}

/// Exit status 1 from `git diff --cached --quiet` means staged changes.
pub fn index_is_clean(ops: &dyn SiteOperations, target: &Alias) -> CommandOutput {
    git(ops, target, &["diff", "--cached", "--quiet"])
}

pub fn checkout(ops: &dyn SiteOperations, target: &Alias, sha: &str) -> CommandOutput {
    git(ops, target, &["checkout", "--quiet", sha])
}

pub fn tags_pointing_at(ops: &dyn SiteOperations, target: &Alias, sha: &str) -> Vec<String> {
    let output = git(ops, target, &["tag", "--points-at", sha]);
    if !output.success {
        return Vec::new();
    }
    output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
