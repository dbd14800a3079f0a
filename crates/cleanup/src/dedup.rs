use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::KeyMode;
use crate::model::{AgencyRecord, Field};
use crate::scoring::Weights;
use crate::urls::host;

/// Outcome of one duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeGroup {
    pub key: String,
    pub winner_id: i64,
    pub loser_ids: Vec<i64>,
    /// Fields the winner gained from losers.
    pub merged_fields: Vec<Field>,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// One record per identity key, in input order.
    pub survivors: Vec<AgencyRecord>,
    /// Losing records, removed for good.
    pub deleted: Vec<i64>,
    pub groups: Vec<MergeGroup>,
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_key(name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity key for grouping candidate duplicates. Empty when the record has
/// no usable name; such records are never grouped.
pub fn identity_key(record: &AgencyRecord, mode: KeyMode) -> String {
    let name = normalize_key(&record.name);
    if name.is_empty() {
        return name;
    }
    match mode {
        KeyMode::Name => name,
        KeyMode::NameAndDomain => {
            let domain = host(&record.website).unwrap_or_default();
            format!("{name}|{domain}")
        }
    }
}

/// Populated informative fields, each counted once.
pub fn completeness(record: &AgencyRecord) -> f64 {
    let weights = Weights::uniform(Field::ALL, 1.0);
    weights.score(record.populated_fields().into_iter().map(|f| (f, 1)))
}

/// Rank for winner selection: completeness, then longer description, then
/// the older (lower) id.
fn rank(record: &AgencyRecord) -> (u64, usize, Reverse<i64>) {
    // scores are small whole numbers; keep ordering total
    let score = (completeness(record) * 1000.0).round() as u64;
    (score, record.description.trim().chars().count(), Reverse(record.id))
}

/// Collapse every duplicate group to its most complete record.
///
/// Fields the winner lacks are copied from losers, best loser first; the
/// winner's populated fields are never overwritten.
pub fn reconcile(records: Vec<AgencyRecord>, mode: KeyMode) -> ReconcileOutcome {
    let mut by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        let key = identity_key(record, mode);
        if !key.is_empty() {
            by_key.entry(key).or_default().push(idx);
        }
    }

    let mut drop = vec![false; records.len()];
    let mut merged: BTreeMap<usize, AgencyRecord> = BTreeMap::new();
    let mut groups = Vec::new();
    let mut deleted = Vec::new();

    for (key, mut members) in by_key {
        if members.len() < 2 {
            continue;
        }
        members.sort_by_key(|&i| Reverse(rank(&records[i])));
        let winner_idx = members[0];
        let mut winner = records[winner_idx].clone();
        let mut merged_fields = Vec::new();
        let mut loser_ids = Vec::new();

        for &loser_idx in &members[1..] {
            let loser = &records[loser_idx];
            for field in Field::ALL {
                if !winner.has(field) && loser.has(field) {
                    *winner.field_mut(field) = loser.field(field).trim().to_string();
                    merged_fields.push(field);
                }
            }
            if winner.additional_info.trim().is_empty() && !loser.additional_info.trim().is_empty() {
                winner.additional_info = loser.additional_info.clone();
            }
            loser_ids.push(loser.id);
            drop[loser_idx] = true;
        }

        let ids: Vec<String> = loser_ids.iter().map(|id| format!("#{id}")).collect();
        let note = format!("merged {} duplicate record(s) ({})", loser_ids.len(), ids.join(", "));
        winner.additional_info = if winner.additional_info.trim().is_empty() {
            note
        } else {
            format!("{} | {}", winner.additional_info, note)
        };

        log::info!(
            "duplicate '{}': kept #{} (score {:.0}), removed {:?}, merged {:?}",
            key,
            winner.id,
            completeness(&records[winner_idx]),
            loser_ids,
            merged_fields
        );

        deleted.extend(loser_ids.iter().copied());
        groups.push(MergeGroup {
            key,
            winner_id: winner.id,
            loser_ids,
            merged_fields,
        });
        merged.insert(winner_idx, winner);
    }

    let survivors = records
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !drop[*i])
        .map(|(i, r)| merged.remove(&i).unwrap_or(r))
        .collect();

    deleted.sort_unstable();
    ReconcileOutcome {
        survivors,
        deleted,
        groups,
    }
}
