//! Deterministic conflict resolution for causally-concurrent task versions.
//!
//! Two versions of a task are in true conflict when neither vector clock
//! dominates the other. Resolution is field-level and fully deterministic,
//! so every device converges on the same merged record without
//! coordination:
//!
//! - Scalar fields (title, notes, completion, priority, due date, list)
//!   use last-writer-wins by `updated_at`, tie-broken by device identifier
//!   string ordering over the two clocks.
//! - Collection fields (tags, subtasks, dependencies) are unioned rather
//!   than overwritten; dropping a concurrently-added entry is a worse
//!   outcome than a harmless duplicate.
//!
//! The merged clock is the pointwise maximum of both inputs, establishing
//! the new causal frontier.

use std::collections::BTreeSet;

use sync_types::{Subtask, TaskId, TaskRecord};

/// Merge two causally-concurrent versions of the same task.
///
/// Pure and symmetric: `resolve(a, b)` and `resolve(b, a)` produce the
/// same record.
pub fn resolve(local: &TaskRecord, remote: &TaskRecord) -> TaskRecord {
    let (winner, loser) = if local_wins(local, remote) {
        (local, remote)
    } else {
        (remote, local)
    };

    TaskRecord {
        id: winner.id.clone(),
        title: winner.title.clone(),
        notes: winner.notes.clone(),
        list: winner.list.clone(),
        completed: winner.completed,
        priority: winner.priority,
        tags: union_tags(&winner.tags, &loser.tags),
        subtasks: union_subtasks(&winner.subtasks, &loser.subtasks),
        dependencies: union_dependencies(&winner.dependencies, &loser.dependencies),
        due_at: winner.due_at,
        created_at: winner.created_at.min(loser.created_at),
        updated_at: winner.updated_at.max(loser.updated_at),
        clock: winner.clock.merge(&loser.clock),
    }
}

/// Decide whether the local version supplies the scalar fields.
///
/// Later `updated_at` wins. On an exact timestamp tie, walk the union of
/// clock entries in device-id order and let the side with the higher
/// counter at the first differing device win - a total order that every
/// device computes identically.
fn local_wins(local: &TaskRecord, remote: &TaskRecord) -> bool {
    if local.updated_at != remote.updated_at {
        return local.updated_at > remote.updated_at;
    }

    let devices: BTreeSet<_> = local
        .clock
        .iter()
        .map(|(d, _)| d.clone())
        .chain(remote.clock.iter().map(|(d, _)| d.clone()))
        .collect();

    for device in devices {
        let l = local.clock.get(&device);
        let r = remote.clock.get(&device);
        if l != r {
            return l > r;
        }
    }

    // Identical clocks and timestamps: the versions are interchangeable.
    true
}

fn union_tags(winner: &BTreeSet<String>, loser: &BTreeSet<String>) -> BTreeSet<String> {
    winner.union(loser).cloned().collect()
}

/// Winner's subtasks keep their order; subtasks only the loser knows are
/// appended in the loser's order. A subtask marked done on either side
/// stays done.
fn union_subtasks(winner: &[Subtask], loser: &[Subtask]) -> Vec<Subtask> {
    let mut merged: Vec<Subtask> = winner.to_vec();
    for sub in loser {
        match merged.iter_mut().find(|s| s.id == sub.id) {
            Some(existing) => existing.done |= sub.done,
            None => merged.push(sub.clone()),
        }
    }
    merged
}

fn union_dependencies(winner: &[TaskId], loser: &[TaskId]) -> Vec<TaskId> {
    let mut merged: Vec<TaskId> = winner.to_vec();
    for dep in loser {
        if !merged.contains(dep) {
            merged.push(dep.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sync_types::{DeviceId, VectorClock};

    fn task(title: &str, updated_minute: u32, clock: VectorClock) -> TaskRecord {
        TaskRecord {
            id: TaskId::from("t1"),
            title: title.into(),
            notes: String::new(),
            list: "inbox".into(),
            completed: false,
            priority: false,
            tags: BTreeSet::new(),
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            due_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap(),
            updated_at: Utc
                .with_ymd_and_hms(2024, 1, 10, 9, updated_minute, 0)
                .unwrap(),
            clock,
        }
    }

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        entries
            .iter()
            .fold(VectorClock::new(), |acc, (d, c)| {
                let device = DeviceId::from(*d);
                let mut next = acc;
                for _ in 0..*c {
                    next = next.increment(&device);
                }
                next
            })
    }

    #[test]
    fn later_writer_wins_scalars_and_clocks_merge() {
        // Device A sets the title at {A:2,B:1}; device B independently
        // sets it at {A:1,B:2} a minute later.
        let local = task("Buy milk", 0, clock(&[("A", 2), ("B", 1)]));
        let remote = task("Buy oat milk", 1, clock(&[("A", 1), ("B", 2)]));

        let merged = resolve(&local, &remote);

        assert_eq!(merged.title, "Buy oat milk");
        assert_eq!(merged.clock, clock(&[("A", 2), ("B", 2)]));
    }

    #[test]
    fn resolution_is_symmetric() {
        let a = task("Buy milk", 0, clock(&[("A", 2), ("B", 1)]));
        let b = task("Buy oat milk", 1, clock(&[("A", 1), ("B", 2)]));

        assert_eq!(resolve(&a, &b), resolve(&b, &a));
    }

    #[test]
    fn timestamp_tie_breaks_on_device_order() {
        // Same updated_at; first differing device in id order is A, and
        // the left side holds the higher counter there.
        let a = task("from A", 0, clock(&[("A", 2), ("B", 1)]));
        let b = task("from B", 0, clock(&[("A", 1), ("B", 2)]));

        let merged = resolve(&a, &b);
        assert_eq!(merged.title, "from A");
        // Deterministic regardless of argument order.
        assert_eq!(resolve(&b, &a).title, "from A");
    }

    #[test]
    fn tags_are_unioned() {
        let mut a = task("t", 0, clock(&[("A", 2), ("B", 1)]));
        a.tags.insert("errands".into());
        let mut b = task("t", 1, clock(&[("A", 1), ("B", 2)]));
        b.tags.insert("groceries".into());

        let merged = resolve(&a, &b);
        assert!(merged.tags.contains("errands"));
        assert!(merged.tags.contains("groceries"));
    }

    #[test]
    fn subtasks_union_keeps_winner_order_and_appends_unseen() {
        let mut a = task("t", 1, clock(&[("A", 2), ("B", 1)]));
        a.subtasks = vec![
            Subtask {
                id: "s1".into(),
                title: "one".into(),
                done: false,
            },
            Subtask {
                id: "s2".into(),
                title: "two".into(),
                done: false,
            },
        ];
        let mut b = task("t", 0, clock(&[("A", 1), ("B", 2)]));
        b.subtasks = vec![Subtask {
            id: "s3".into(),
            title: "three".into(),
            done: true,
        }];

        let merged = resolve(&a, &b);
        let ids: Vec<&str> = merged.subtasks.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn subtask_done_on_either_side_stays_done() {
        let mut a = task("t", 1, clock(&[("A", 2), ("B", 1)]));
        a.subtasks = vec![Subtask {
            id: "s1".into(),
            title: "one".into(),
            done: false,
        }];
        let mut b = task("t", 0, clock(&[("A", 1), ("B", 2)]));
        b.subtasks = vec![Subtask {
            id: "s1".into(),
            title: "one".into(),
            done: true,
        }];

        let merged = resolve(&a, &b);
        assert!(merged.subtasks[0].done);
    }

    #[test]
    fn dependencies_are_unioned_without_duplicates() {
        let mut a = task("t", 1, clock(&[("A", 2), ("B", 1)]));
        a.dependencies = vec![TaskId::from("x"), TaskId::from("y")];
        let mut b = task("t", 0, clock(&[("A", 1), ("B", 2)]));
        b.dependencies = vec![TaskId::from("y"), TaskId::from("z")];

        let merged = resolve(&a, &b);
        assert_eq!(
            merged.dependencies,
            vec![TaskId::from("x"), TaskId::from("y"), TaskId::from("z")]
        );
    }

    #[test]
    fn earliest_creation_time_is_kept() {
        let mut a = task("t", 1, clock(&[("A", 2), ("B", 1)]));
        a.created_at = Utc.with_ymd_and_hms(2024, 1, 9, 8, 0, 0).unwrap();
        let b = task("t", 0, clock(&[("A", 1), ("B", 2)]));

        let merged = resolve(&a, &b);
        assert_eq!(merged.created_at, a.created_at);
    }

    #[test]
    fn merged_clock_dominates_both_sides() {
        use sync_types::ClockOrdering;

        let a = task("t", 0, clock(&[("A", 3)]));
        let b = task("t", 1, clock(&[("B", 4)]));
        let merged = resolve(&a, &b);

        assert_eq!(merged.clock.compare(&a.clock), ClockOrdering::After);
        assert_eq!(merged.clock.compare(&b.clock), ClockOrdering::After);
    }
}
