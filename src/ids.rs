//! Temporary identifiers for rows created locally before the service has
//! assigned a real one.
//!
//! Format: `<type>-<unix millis>-<counter>`. The counter is process-wide and
//! monotonic, so two creates in the same millisecond still differ.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::fields::EntityKind;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Next temporary identifier for `kind`.
pub fn temp_id(kind: EntityKind) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", kind.prefix(), Utc::now().timestamp_millis(), n)
}

/// Whether `id` has the shape produced by [`temp_id`].
pub fn is_temp(id: &str) -> bool {
    let mut parts = id.splitn(3, '-');
    let (Some(prefix), Some(millis), Some(counter)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    matches!(prefix, "project" | "board" | "task")
        && !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && !counter.is_empty()
        && counter.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_millisecond_ids_do_not_collide() {
        let ids: HashSet<String> = (0..1000).map(|_| temp_id(EntityKind::Task)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn recognizes_its_own_shape() {
        let id = temp_id(EntityKind::Board);
        assert!(id.starts_with("board-"));
        assert!(is_temp(&id));
        assert!(!is_temp("b1"));
        assert!(!is_temp("board-abc-1"));
        assert!(!is_temp("4f1c2a9e-7d61-4c0e-9a55-2b1f0e7d3c11"));
    }
}
