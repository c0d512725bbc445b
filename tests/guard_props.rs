//! Property tests for the read-only guard.
//!
//! Properties:
//! - A denylisted keyword standing alone rejects the query, in any case
//! - A keyword embedded inside a longer identifier does not
//! - `is_read_only` and `check` always agree

use proptest::prelude::*;
use sqlrelay::{is_read_only, ReadOnlyGuard, DENYLIST};

// ============================================================================
// STRATEGIES
// ============================================================================

fn arb_keyword() -> impl Strategy<Value = &'static str> {
    prop::sample::select(DENYLIST.to_vec())
}

fn arb_single_word_keyword() -> impl Strategy<Value = &'static str> {
    prop::sample::select(
        DENYLIST
            .iter()
            .copied()
            .filter(|kw| !kw.contains(' '))
            .collect::<Vec<_>>(),
    )
}

/// Re-case `kw` letter by letter and widen inner spaces.
fn arb_spelling(kw: &'static str) -> impl Strategy<Value = String> {
    (
        prop::collection::vec(any::<bool>(), kw.len()),
        "[ \t\n]{1,3}",
    )
        .prop_map(move |(upper, gap)| {
            kw.chars()
                .zip(upper)
                .map(|(c, up)| {
                    if c == ' ' {
                        gap.clone()
                    } else if up {
                        c.to_ascii_uppercase().to_string()
                    } else {
                        c.to_ascii_lowercase().to_string()
                    }
                })
                .collect()
        })
}

/// SQL fragments built from words that are never denylisted.
fn arb_safe_fragment() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            "SELECT", "games.home_score", "FROM", "games", "WHERE", "teams.name", "=", "'x'",
            "ORDER", "BY", "DESC", "NULLS", "LAST", "LIMIT", "10", "updated_at", "created_by",
            "deleted", "(", ")", ",",
        ]),
        0..8,
    )
    .prop_map(|words| words.join(" "))
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn standalone_keyword_is_rejected(
        spelled in arb_keyword().prop_flat_map(arb_spelling),
        before in arb_safe_fragment(),
        after in arb_safe_fragment(),
    ) {
        let sql = format!("{before} {spelled} {after}");
        prop_assert!(!is_read_only(&sql), "accepted: {sql:?}");
    }

    #[test]
    fn embedded_keyword_is_accepted(
        kw in arb_single_word_keyword(),
        left in "[a-z0-9_]{1,5}",
        right in "[a-z0-9_]{1,5}",
    ) {
        let sql = format!("SELECT {left}{}{right} FROM games", kw.to_lowercase());
        prop_assert!(is_read_only(&sql), "rejected: {sql:?}");
    }

    #[test]
    fn safe_fragments_are_accepted(sql in arb_safe_fragment()) {
        prop_assert!(is_read_only(&sql));
    }

    #[test]
    fn check_agrees_with_is_read_only(sql in ".{0,80}") {
        let guard = ReadOnlyGuard::new();
        prop_assert_eq!(guard.is_read_only(&sql), guard.check(&sql).is_ok());
        prop_assert_eq!(guard.is_read_only(&sql), guard.is_read_only(&sql));
    }
}

#[test]
fn rejection_names_the_keyword() {
    let err = ReadOnlyGuard::new()
        .check("select 1; lock\n\ttables games write")
        .unwrap_err();
    assert_eq!(err.keyword, "LOCK TABLES");
}
