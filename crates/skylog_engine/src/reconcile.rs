//! Timestamp-fuzzy reconciliation of remote flight records against
//! local candidates.

use skylog_protocol::{Event, EventId, RemoteEvent};

/// Maximum whole-hour offset accepted by the fuzzy match. Covers
/// daylight-saving drift in either direction.
const FUZZY_HOURS: i64 = 2;

/// The result of reconciling one remote window.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Remote events with no local counterpart, queued for insertion.
    pub inserts: Vec<RemoteEvent>,
    /// Local events whose first-discovery flag must change to the
    /// remote's value.
    pub discovery_updates: Vec<(EventId, bool)>,
    /// Number of remote events matched to a local candidate.
    pub matched: usize,
}

/// Pairs remote events with local candidates.
///
/// Candidates must be time-ordered. Each remote event is first matched
/// exactly (same system name, case-insensitive, identical UTC
/// timestamp); failing that, the scan resumes from the index after the
/// last successful match looking for a same-named candidate offset by a
/// whole number of hours within ±2. A matched candidate is consumed and
/// the resume index only advances, so no candidate pairs twice.
///
/// The remote is authoritative for first-discovery credit: a matched
/// pair whose flags disagree yields a discovery update.
pub fn reconcile(remote: &[RemoteEvent], local: &[Event]) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let mut used = vec![false; local.len()];
    let mut resume = 0usize;

    let mut ordered: Vec<&RemoteEvent> = remote.iter().collect();
    ordered.sort_by_key(|r| r.timestamp);

    for record in ordered {
        let exact = local.iter().enumerate().position(|(i, candidate)| {
            !used[i]
                && names_match(candidate, record)
                && candidate.timestamp == record.timestamp
        });

        let hit = exact.or_else(|| {
            (resume..local.len()).find(|&i| {
                !used[i]
                    && names_match(&local[i], record)
                    && whole_hours_apart(&local[i], record)
            })
        });

        match hit {
            Some(i) => {
                used[i] = true;
                resume = resume.max(i + 1);
                outcome.matched += 1;

                if local[i].first_discovery != Some(record.first_discovery) {
                    outcome
                        .discovery_updates
                        .push((local[i].id, record.first_discovery));
                }
            }
            None => outcome.inserts.push(record.clone()),
        }
    }

    outcome
}

fn names_match(candidate: &Event, record: &RemoteEvent) -> bool {
    candidate
        .system_name
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case(&record.system_name))
}

fn whole_hours_apart(candidate: &Event, record: &RemoteEvent) -> bool {
    let seconds = (record.timestamp - candidate.timestamp).num_seconds();
    seconds % 3600 == 0 && (seconds / 3600).abs() <= FUZZY_HOURS
}
