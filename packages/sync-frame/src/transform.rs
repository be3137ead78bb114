//! Transform & Dedup (C4).
//!
//! Given one direction's freshly-pulled changeset, maps each record into
//! the destination side's shape, filters out echoes of the engine's own
//! past writes, and resolves true conflicts (the same logical record
//! changed on both sides in one cycle). Both directions of a cycle share
//! one `pushed_this_cycle` set so a record just pushed in the first pass
//! is never pushed straight back in the second.

use std::collections::HashSet;

use crate::config::ConflictPolicy;
use crate::conflict::{self, Resolution};
use crate::error::LinkIndexResult;
use crate::link_index::{Conflict, LinkIndex};
use crate::mapper::Mapper;
use crate::model::{ChangeSet, Record, RecordRef};

/// Ids already produced in either direction this cycle. Shared between
/// the A→B and B→A passes of one cycle.
pub type PushedThisCycle = HashSet<String>;

/// One direction's endpoints, for building [`RecordRef`]s and looking
/// records up in the link index.
pub struct Endpoint<'a> {
    pub adapter: &'a str,
    pub table: &'a str,
}

impl<'a> Endpoint<'a> {
    fn record_ref(&self, id: impl Into<String>) -> RecordRef {
        RecordRef::new(self.adapter, self.table, id)
    }
}

/// Output of transforming one direction's changeset.
#[derive(Default)]
pub struct TransformOutcome {
    /// Records ready to push to the destination side.
    pub mapped: ChangeSet,
    /// Links to install once the push for this direction succeeds.
    pub link_map: Vec<(RecordRef, RecordRef)>,
    /// Non-fatal per-record mapping failures.
    pub mapper_errors: Vec<String>,
    /// Conflicts recorded under the `manual` policy.
    pub conflicts: Vec<Conflict>,
}

/// Transform one direction's changeset `src_changes`, consulting
/// `dest_changes` (the same cycle's changeset pulled from the
/// destination side) only to detect true conflicts.
#[allow(clippy::too_many_arguments)]
pub async fn transform(
    job_id: &str,
    src: &Endpoint<'_>,
    dest: &Endpoint<'_>,
    mapper: &dyn Mapper,
    src_changes: &ChangeSet,
    dest_changes: &ChangeSet,
    link_index: &dyn LinkIndex,
    conflict_policy: ConflictPolicy,
    pushed_this_cycle: &mut PushedThisCycle,
) -> LinkIndexResult<TransformOutcome> {
    let mut outcome = TransformOutcome::default();

    for src_rec in &src_changes.upserts {
        if pushed_this_cycle.contains(&src_rec.id) {
            continue;
        }

        let dest_rec = match mapper.to_dest(src_rec) {
            Ok(rec) => rec,
            Err(err) => {
                tracing::warn!(record_id = %src_rec.id, error = %err, "mapper failed, skipping record");
                outcome.mapper_errors.push(err.to_string());
                continue;
            }
        };

        // A link touching this destination id may have been installed from
        // either direction (the side that first creates a link need not be
        // the side that next reports a change to it), so this must use the
        // same symmetric lookup as the existing-dest check below rather
        // than `find_source` alone.
        let existing_src = link_index.find_counterpart(&dest.record_ref(dest_rec.id.clone())).await?;
        if existing_src.as_ref().map(|r| r.id.as_str()) == Some(src_rec.id.as_str()) {
            // The destination side is merely reporting our own write back to us.
            pushed_this_cycle.insert(src_rec.id.clone());
            continue;
        }

        let existing_dest = link_index.find_counterpart(&src.record_ref(src_rec.id.clone())).await?;

        match existing_dest {
            Some(dest_ref) => {
                let conflicting = dest_changes.upserts.iter().find(|r| r.id == dest_ref.id);
                let resolution = match conflicting {
                    Some(dest_side_rec) => conflict::resolve(conflict_policy, src_rec, dest_side_rec),
                    None => Resolution::TakeSource,
                };

                match resolution {
                    Resolution::TakeSource => {
                        outcome.mapped.upserts.push(retarget(dest_rec, dest_ref.id.clone()));
                        outcome.link_map.push((src.record_ref(src_rec.id.clone()), dest_ref));
                    }
                    Resolution::TakeDest => {
                        // Destination already holds the winning value; nothing to push.
                    }
                    Resolution::Defer => {
                        let dest_payload = conflicting
                            .map(|r| serde_json::Value::Object(r.fields.clone()))
                            .unwrap_or(serde_json::Value::Null);
                        outcome.conflicts.push(Conflict::new(
                            job_id,
                            src.record_ref(src_rec.id.clone()),
                            dest_ref,
                            serde_json::Value::Object(src_rec.fields.clone()),
                            dest_payload,
                        ));
                    }
                }
            }
            None => {
                let new_dest_ref = dest.record_ref(dest_rec.id.clone());
                outcome.mapped.upserts.push(dest_rec);
                outcome.link_map.push((src.record_ref(src_rec.id.clone()), new_dest_ref));
            }
        }

        pushed_this_cycle.insert(src_rec.id.clone());
    }

    for src_id in &src_changes.deletes {
        if pushed_this_cycle.contains(src_id) {
            continue;
        }

        if let Some(dest_ref) = link_index.find_counterpart(&src.record_ref(src_id.clone())).await? {
            outcome.mapped.deletes.push(dest_ref.id);
            pushed_this_cycle.insert(src_id.clone());
        }
    }

    Ok(outcome)
}

fn retarget(record: Record, id: String) -> Record {
    Record { id, fields: record.fields }
}
