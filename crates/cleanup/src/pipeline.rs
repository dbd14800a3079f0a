use std::collections::BTreeMap;

use serde::Serialize;

use crate::archive;
use crate::classify::{classify_records, Classifier};
use crate::config::CleanupConfig;
use crate::dedup::{reconcile, MergeGroup};
use crate::error::CleanupError;
use crate::model::{AgencyRecord, ChangeSet, ProcessingStatus};
use crate::names::normalize_names;
use crate::store::RecordStore;
use crate::summary::{summarize_store, StoreSummary};
use crate::urls::repair_websites;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Per-stage counts for one pass over the pending set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageCounts {
    pub pending: usize,
    pub names_normalized: usize,
    pub websites_repaired: usize,
    pub categories_changed: usize,
    pub duplicates_removed: usize,
    pub archived: usize,
    pub cleaned: usize,
}

/// Pure pipeline output: what to write, and what happened.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub changes: ChangeSet,
    pub counts: StageCounts,
    pub groups: Vec<MergeGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub engine_version: String,
    pub run_at: String,
}

/// Result of a full cleanup run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub meta: RunMeta,
    pub counts: StageCounts,
    pub groups: Vec<MergeGroup>,
    pub before: StoreSummary,
    pub after: StoreSummary,
}

impl RunReport {
    /// True when the run wrote anything to the store.
    pub fn changed(&self) -> bool {
        self.counts.pending > 0
    }
}

/// One independently runnable cleanup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Names,
    Urls,
    Classify,
    Dedup,
    Archive,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Names => "names",
            Step::Urls => "urls",
            Step::Classify => "classify",
            Step::Dedup => "dedup",
            Step::Archive => "archive",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub pending: usize,
    /// Records rewritten, deleted or relocated.
    pub affected: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<MergeGroup>,
}

// ---------------------------------------------------------------------------
// Pure pipeline
// ---------------------------------------------------------------------------

/// Run every stage over the pending records and describe the result.
///
/// Records that are not pending are ignored. Survivors come back `cleaned`,
/// archived records `archived`, duplicate losers as deletions.
pub fn process(pending: Vec<AgencyRecord>, config: &CleanupConfig) -> Outcome {
    let mut records: Vec<AgencyRecord> = pending
        .into_iter()
        .filter(|r| r.status == ProcessingStatus::Pending)
        .collect();
    let mut counts = StageCounts {
        pending: records.len(),
        ..StageCounts::default()
    };
    if records.is_empty() {
        return Outcome::default();
    }

    counts.names_normalized = normalize_names(&mut records);
    log::info!("names: {} of {} normalized", counts.names_normalized, counts.pending);

    counts.websites_repaired = repair_websites(&mut records, &config.urls);
    log::info!("urls: {} repaired", counts.websites_repaired);

    counts.categories_changed = classify_records(&mut records, &config.classify);
    log::info!("classify: {} categories changed", counts.categories_changed);

    let outcome = reconcile(records, config.dedup.key);
    let mut records = outcome.survivors;
    reclassify_winners(&mut records, &outcome.groups, config);
    counts.duplicates_removed = outcome.deleted.len();
    log::info!(
        "dedup: {} group(s), {} duplicate(s) removed",
        outcome.groups.len(),
        counts.duplicates_removed
    );

    let (kept, archived) = archive::partition(records);
    counts.archived = archived.len();
    log::info!("archive: {} record(s) without contact data", counts.archived);

    let updates: Vec<AgencyRecord> = kept
        .into_iter()
        .map(|mut r| {
            r.status = ProcessingStatus::Cleaned;
            r
        })
        .collect();
    counts.cleaned = updates.len();

    Outcome {
        changes: ChangeSet {
            updates,
            deletions: outcome.deleted,
            archived,
        },
        counts,
        groups: outcome.groups,
    }
}

/// Merged fields can carry new regional signals.
fn reclassify_winners(records: &mut [AgencyRecord], groups: &[MergeGroup], config: &CleanupConfig) {
    let classifier = Classifier::new(&config.classify);
    for group in groups.iter().filter(|g| !g.merged_fields.is_empty()) {
        if let Some(winner) = records.iter_mut().find(|r| r.id == group.winner_id) {
            let category = classifier.classify(winner);
            if category != winner.category {
                log::debug!("type #{} after merge: {} -> {}", winner.id, winner.category, category);
                winner.category = category;
            }
        }
    }
}

/// Apply one step to the pending set. Field changes come back as updates
/// with status left `pending`; only the archive step relocates records.
pub fn process_step(step: Step, pending: Vec<AgencyRecord>, config: &CleanupConfig) -> (ChangeSet, Vec<MergeGroup>) {
    let mut records: Vec<AgencyRecord> = pending
        .into_iter()
        .filter(|r| r.status == ProcessingStatus::Pending)
        .collect();
    let before: BTreeMap<i64, AgencyRecord> = records.iter().map(|r| (r.id, r.clone())).collect();

    let mut changes = ChangeSet::default();
    let mut groups = Vec::new();
    match step {
        Step::Names => {
            normalize_names(&mut records);
        }
        Step::Urls => {
            repair_websites(&mut records, &config.urls);
        }
        Step::Classify => {
            classify_records(&mut records, &config.classify);
        }
        Step::Dedup => {
            let outcome = reconcile(records, config.dedup.key);
            records = outcome.survivors;
            reclassify_winners(&mut records, &outcome.groups, config);
            changes.deletions = outcome.deleted;
            groups = outcome.groups;
        }
        Step::Archive => {
            let (kept, archived) = archive::partition(records);
            records = kept;
            changes.archived = archived;
        }
    }

    changes.updates = records
        .into_iter()
        .filter(|r| before.get(&r.id) != Some(r))
        .collect();
    (changes, groups)
}

// ---------------------------------------------------------------------------
// Store-backed entry points
// ---------------------------------------------------------------------------

/// Full cleanup run: fetch pending, process, commit in one `apply`.
///
/// A storage error leaves the store as it was; every record stays pending
/// and the next run picks it up again.
pub fn run<S: RecordStore + ?Sized>(store: &mut S, config: &CleanupConfig) -> Result<RunReport, CleanupError> {
    let before = summarize_store(store)?;
    let run_at = chrono::Utc::now().to_rfc3339();

    let pending = store.fetch_pending()?;
    let outcome = process(pending, config);

    if outcome.counts.pending == 0 {
        log::info!("nothing pending; store untouched");
    } else {
        store.apply(&outcome.changes)?;
        log::info!(
            "run: {} pending -> {} cleaned, {} archived, {} merged away",
            outcome.counts.pending,
            outcome.counts.cleaned,
            outcome.counts.archived,
            outcome.counts.duplicates_removed
        );
    }

    let after = summarize_store(store)?;
    Ok(RunReport {
        meta: RunMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at,
        },
        counts: outcome.counts,
        groups: outcome.groups,
        before,
        after,
    })
}

/// Run a single step against the store.
pub fn run_step<S: RecordStore + ?Sized>(
    store: &mut S,
    step: Step,
    config: &CleanupConfig,
) -> Result<StepReport, CleanupError> {
    let pending = store.fetch_pending()?;
    let total = pending.len();
    let (changes, groups) = process_step(step, pending, config);
    let affected = changes.updates.len() + changes.deletions.len() + changes.archived.len();

    if !changes.is_empty() {
        store.apply(&changes)?;
    }
    log::info!("{}: {} of {} pending record(s) affected", step.name(), affected, total);

    Ok(StepReport {
        step,
        pending: total,
        affected,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use crate::store::MemoryStore;

    fn rec(id: i64, name: &str, website: &str, phone: &str, address: &str) -> AgencyRecord {
        let mut r = AgencyRecord::new(id, name);
        r.website = website.into();
        r.phone = phone.into();
        r.address = address.into();
        r
    }

    #[test]
    fn empty_pending_is_noop() {
        let out = process(Vec::new(), &CleanupConfig::default());
        assert!(out.changes.is_empty());
        assert_eq!(out.counts, StageCounts::default());
    }

    #[test]
    fn non_pending_records_ignored() {
        let mut done = rec(1, "1. Done", "", "", "");
        done.status = ProcessingStatus::Cleaned;
        let out = process(vec![done], &CleanupConfig::default());
        assert!(out.changes.is_empty());
    }

    #[test]
    fn stages_run_in_order() {
        let records = vec![
            rec(1, "1. Casa Sol", "casasol.es", "+34 600 000 000", "Marbella"),
            rec(2, "Casa Sol", "", "", "Puerto Banus"),
            rec(3, "Ghost", "", "", ""),
        ];
        let out = process(records, &CleanupConfig::default());

        assert_eq!(out.counts.names_normalized, 1);
        assert_eq!(out.counts.websites_repaired, 1);
        assert_eq!(out.changes.deletions, vec![2]);
        assert_eq!(out.changes.archived.len(), 1);
        assert_eq!(out.changes.archived[0].id, 3);

        let winner = &out.changes.updates[0];
        assert_eq!(winner.id, 1);
        assert_eq!(winner.name, "Casa Sol");
        assert_eq!(winner.website, "https://casasol.es");
        assert_eq!(winner.status, ProcessingStatus::Cleaned);
        assert_eq!(winner.category, Category::Region("marbella".into()));
    }

    #[test]
    fn merged_winner_is_reclassified() {
        // The winner has no regional signal of its own until the merge
        // brings in the loser's phone.
        let mut a = rec(1, "Dom Nieruchomosci", "https://dom.example", "", "");
        a.description = "long description without any hint".into();
        let b = rec(2, "Dom Nieruchomosci", "", "+48 22 123 45 67", "");

        let out = process(vec![a, b], &CleanupConfig::default());
        assert_eq!(out.changes.updates.len(), 1);
        assert_eq!(out.changes.updates[0].category, Category::Region("polish".into()));
    }

    #[test]
    fn second_run_is_noop() {
        let mut store = MemoryStore::with_records([
            rec(1, "2) Prime", "prime.es", "", ""),
            rec(2, "Nothing", "", "", ""),
        ]);
        let config = CleanupConfig::default();

        let first = run(&mut store, &config).unwrap();
        assert!(first.changed());
        assert_eq!(first.after.archived, 1);

        let snapshot = store.clone();
        let second = run(&mut store, &config).unwrap();
        assert!(!second.changed());
        assert_eq!(store, snapshot);
    }

    #[test]
    fn step_keeps_status_pending() {
        let mut store = MemoryStore::with_records([rec(1, "5. Alpha", "", "+34 1", ""), rec(2, "Beta", "", "+34 2", "")]);
        let report = run_step(&mut store, Step::Names, &CleanupConfig::default()).unwrap();
        assert_eq!(report.affected, 1);
        let r = store.get(1).unwrap();
        assert_eq!(r.name, "Alpha");
        assert_eq!(r.status, ProcessingStatus::Pending);
    }

    #[test]
    fn archive_step_relocates() {
        let mut store = MemoryStore::with_records([rec(1, "Keep", "", "+34 1", ""), rec(2, "Gone", "", "", "")]);
        let report = run_step(&mut store, Step::Archive, &CleanupConfig::default()).unwrap();
        assert_eq!(report.affected, 1);
        assert!(store.get(2).is_none());
        assert_eq!(store.fetch_archived().unwrap()[0].id, 2);
        assert_eq!(store.get(1).unwrap().status, ProcessingStatus::Pending);
    }
}
