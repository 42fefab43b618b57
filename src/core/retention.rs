//! Dump file naming and the bounded rotation of old dumps.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::context::DeployContext;
use crate::utils::shell;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// `<alias>-<YYYYmmddTHHMMSS>-<sha>.sql`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpName {
    pub alias: String,
    pub timestamp: NaiveDateTime,
    pub sha: String,
}

impl DumpName {
    pub fn new(alias: &str, timestamp: NaiveDateTime, sha: &str) -> Self {
        Self {
            alias: alias.to_string(),
            timestamp,
            sha: sha.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.sql",
            self.alias,
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.sha
        )
    }

    /// Parse a dump file name belonging to `alias`. Other aliases' dumps and
    /// unrelated files give `None`.
    pub fn parse(alias: &str, file_name: &str) -> Option<Self> {
        let pattern = format!(
            r"^{}-(\d{{8}}T\d{{6}})-([0-9a-fA-F]{{4,40}}|unknown)\.sql$",
            regex::escape(alias)
        );
        let captures = Regex::new(&pattern).ok()?.captures(file_name)?;
        let timestamp = NaiveDateTime::parse_from_str(&captures[1], TIMESTAMP_FORMAT).ok()?;

        Some(Self::new(alias, timestamp, &captures[2]))
    }

    /// The commit the site was at when the dump was taken, if known.
    pub fn commit(&self) -> Option<&str> {
        (self.sha != "unknown").then_some(self.sha.as_str())
    }
}

/// Which of `filenames` to delete so that only the `keep` newest remain.
/// Names sort chronologically within one alias. `keep == 0` keeps everything.
pub fn select_for_deletion<S: AsRef<str>>(filenames: &[S], keep: usize) -> BTreeSet<String> {
    if keep == 0 || filenames.len() <= keep {
        return BTreeSet::new();
    }

    let mut sorted: Vec<&str> = filenames.iter().map(|f| f.as_ref()).collect();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();

    sorted.into_iter().skip(keep).map(String::from).collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dump files for the context's alias in `dump_dir`, newest first.
pub fn list_dumps(ctx: &DeployContext, dump_dir: &str) -> Vec<DumpName> {
    let listing = ctx.shell(&format!("ls -1 {}", shell::quote_path(dump_dir)));
    if !listing.success {
        return Vec::new();
    }

    let mut dumps: Vec<DumpName> = listing
        .stdout
        .lines()
        .map(str::trim)
        .filter_map(|line| DumpName::parse(&ctx.alias.name, line))
        .collect();
    dumps.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    dumps
}

/// Apply the retention policy to the alias' dumps. `just_written` is never
/// deleted, whatever the clock says.
pub fn purge_dumps(
    ctx: &DeployContext,
    dump_dir: &str,
    keep: usize,
    just_written: Option<&str>,
) -> PurgeReport {
    if keep == 0 {
        ctx.log.info("Not purging any dumps.");
        return PurgeReport::default();
    }

    let names: Vec<String> = list_dumps(ctx, dump_dir)
        .iter()
        .map(DumpName::file_name)
        .collect();
    let mut doomed = select_for_deletion(&names, keep);
    if let Some(written) = just_written {
        let written = written.rsplit('/').next().unwrap_or(written);
        doomed.remove(written);
    }

    let kept: Vec<String> = names
        .iter()
        .filter(|name| !doomed.contains(*name))
        .cloned()
        .collect();

    if doomed.is_empty() {
        return PurgeReport {
            kept,
            ..PurgeReport::default()
        };
    }

    let deleted: Vec<String> = doomed.into_iter().collect();
    let listing = deleted
        .iter()
        .map(|name| format!("  {}", name))
        .collect::<Vec<_>>()
        .join("\n");
    ctx.log
        .info(&format!("Purge the following dump files:\n{}", listing));

    let paths: Vec<String> = deleted
        .iter()
        .map(|name| shell::quote_path(&format!("{}/{}", dump_dir.trim_end_matches('/'), name)))
        .collect();
    let removed = ctx.shell(&format!("rm -f {}", paths.join(" ")));

    if !removed.success {
        let message = format!("Could not delete old dumps: {}", removed.error_text());
        ctx.log.warning(&message);
        return PurgeReport {
            kept,
            deleted: Vec::new(),
            error: Some(message),
        };
    }

    PurgeReport {
        kept,
        deleted,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use crate::log::MemoryLog;
    use crate::settings::Settings;
    use crate::ssh::CommandOutput;
    use crate::testing::FakeOperations;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn dump(alias: &str, day: u32) -> String {
        DumpName::new(alias, at(day, 12), "abc1234").file_name()
    }

    #[test]
    fn file_names_round_trip_through_parse() {
        let name = DumpName::new("prod-eu", at(5, 9), "deadbeef");
        assert_eq!(name.file_name(), "prod-eu-20260305T090000-deadbeef.sql");
        assert_eq!(DumpName::parse("prod-eu", &name.file_name()), Some(name));
    }

    #[test]
    fn dump_names_serialize_with_their_timestamp() {
        let value = serde_json::to_value(DumpName::new("prod", at(5, 9), "deadbeef")).unwrap();
        assert_eq!(value["alias"], "prod");
        assert_eq!(value["timestamp"], "2026-03-05T09:00:00");
        assert_eq!(value["sha"], "deadbeef");
    }

    #[test]
    fn parse_ignores_other_aliases_and_files() {
        let name = dump("prod-eu", 1);
        assert!(DumpName::parse("prod", &name).is_none());
        assert!(DumpName::parse("prod-eu", "notes.txt").is_none());
        assert!(DumpName::parse("prod-eu", &format!("{}.gz", name)).is_none());
    }

    #[test]
    fn keep_zero_deletes_nothing() {
        let files: Vec<String> = (1..=9).map(|d| dump("prod", d)).collect();
        assert!(select_for_deletion(&files, 0).is_empty());
    }

    #[test]
    fn fewer_files_than_keep_deletes_nothing() {
        let files = vec![dump("prod", 1), dump("prod", 2)];
        assert!(select_for_deletion(&files, 2).is_empty());
        assert!(select_for_deletion(&files, 5).is_empty());
    }

    #[test]
    fn keeps_the_newest() {
        let files = vec![dump("prod", 3), dump("prod", 1), dump("prod", 4), dump("prod", 2)];
        let doomed = select_for_deletion(&files, 2);
        assert_eq!(
            doomed,
            [dump("prod", 1), dump("prod", 2)].into_iter().collect()
        );
    }

    #[test]
    fn selection_is_idempotent() {
        let files: Vec<String> = (1..=7).map(|d| dump("prod", d)).collect();
        let doomed = select_for_deletion(&files, 3);
        let survivors: Vec<String> = files
            .iter()
            .filter(|f| !doomed.contains(*f))
            .cloned()
            .collect();
        assert_eq!(survivors.len(), 3);
        assert!(select_for_deletion(&survivors, 3).is_empty());
    }

    #[test]
    fn purge_leaves_three_newest_of_seven() {
        let mut files: Vec<String> = (1..=6).map(|d| dump("prod", d)).collect();
        let newest = dump("prod", 7);
        files.push(newest.clone());
        files.push(dump("stage", 9));
        files.push("README".to_string());

        let ops = FakeOperations::new();
        ops.on("ls -1", CommandOutput::ok(files.join("\n")));
        let alias = Alias::local("prod", "/srv");
        let settings = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &settings, &ops, &log);

        let report = purge_dumps(&ctx, "/var/dumps", 3, Some(&format!("/var/dumps/{}", newest)));

        assert_eq!(report.kept, vec![newest, dump("prod", 6), dump("prod", 5)]);
        assert_eq!(report.deleted.len(), 4);
        assert!(log.contains("Purge the following dump files:"));
        let rm = ops.calls().into_iter().find(|c| c.starts_with("rm -f")).unwrap();
        assert!(rm.contains(&dump("prod", 1)));
        assert!(!rm.contains("stage"));
    }

    #[test]
    fn purge_with_keep_zero_touches_nothing() {
        let ops = FakeOperations::new();
        let alias = Alias::local("prod", "/srv");
        let settings = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &settings, &ops, &log);

        let report = purge_dumps(&ctx, "/var/dumps", 0, None);
        assert!(report.deleted.is_empty());
        assert!(ops.calls().is_empty());
        assert!(log.contains("Not purging any dumps."));
    }
}
