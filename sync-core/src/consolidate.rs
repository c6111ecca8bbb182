//! Queue consolidation rules.
//!
//! When a mutation is enqueued for a task that already has a live queue
//! item, the new item supersedes the old one and must carry the *net
//! effect* of both. The relay has only ever seen what was actually pushed,
//! so the resulting operation kind depends on what the superseded item
//! would have told it.

use sync_types::OpKind;

/// Operation kind of a queue item that supersedes an earlier live one.
///
/// - A pending `Create` followed by an `Update` stays a `Create`: the
///   relay has never seen the task.
/// - Anything followed by a `Delete` nets to `Delete`.
/// - A pending `Delete` followed by a re-`Create` nets to `Update`: the
///   relay still holds the old version, since the delete never left the
///   queue.
pub fn consolidated_kind(old: OpKind, new: OpKind) -> OpKind {
    match (old, new) {
        (OpKind::Create, OpKind::Update) => OpKind::Create,
        (OpKind::Delete, OpKind::Create) => OpKind::Update,
        (_, new) => new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_update_stays_create() {
        assert_eq!(
            consolidated_kind(OpKind::Create, OpKind::Update),
            OpKind::Create
        );
    }

    #[test]
    fn create_then_delete_nets_to_delete() {
        assert_eq!(
            consolidated_kind(OpKind::Create, OpKind::Delete),
            OpKind::Delete
        );
    }

    #[test]
    fn update_then_update_stays_update() {
        assert_eq!(
            consolidated_kind(OpKind::Update, OpKind::Update),
            OpKind::Update
        );
    }

    #[test]
    fn update_then_delete_nets_to_delete() {
        assert_eq!(
            consolidated_kind(OpKind::Update, OpKind::Delete),
            OpKind::Delete
        );
    }

    #[test]
    fn delete_then_recreate_nets_to_update() {
        assert_eq!(
            consolidated_kind(OpKind::Delete, OpKind::Create),
            OpKind::Update
        );
    }
}
