//! Password age derived from an entry's change history.
//!
//! Editing any field of an entry (title, notes, URL) pushes a revision to its
//! history, so the entry's last-modified time says nothing about when the
//! password itself changed. The resolver walks the history newest to oldest
//! and keeps moving the creation time back for as long as the historical
//! password equals the current one.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::secret::Secret;

/// Milliseconds per hour. Every age in Keyward is expressed in hours.
pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// One historical revision of an entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordRevision {
    /// The password at that revision, or `None` when the revision stored an
    /// unprotected placeholder instead of a protected value.
    pub password: Option<Secret>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Hours between `now` and the moment `current` was first set.
///
/// `last_modified` is the entry's own modification time; when unknown the
/// password is assumed to have been set at `now`. Revisions without a
/// protected password are skipped. The walk stops at the first revision
/// holding a different password. The result is never negative.
pub fn password_age_hours(
    current: &Secret,
    last_modified: Option<DateTime<Utc>>,
    history: &[PasswordRevision],
    now: DateTime<Utc>,
) -> f64 {
    let mut created = last_modified.unwrap_or(now);

    let mut revisions: Vec<&PasswordRevision> = history.iter().collect();
    revisions.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));

    for revision in revisions {
        let Some(password) = &revision.password else {
            continue;
        };
        if !password.equals(current) {
            break;
        }
        if let Some(at) = revision.modified_at {
            created = at;
        }
    }

    let elapsed_ms = (now - created).num_milliseconds() as f64;
    (elapsed_ms / MS_PER_HOUR).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rev(password: Option<&str>, at: DateTime<Utc>) -> PasswordRevision {
        PasswordRevision {
            password: password.map(Secret::text),
            modified_at: Some(at),
        }
    }

    #[test]
    fn no_history_uses_last_modified() {
        let now = Utc::now();
        let age = password_age_hours(
            &Secret::text("pw"),
            Some(now - Duration::hours(5)),
            &[],
            now,
        );
        assert!((age - 5.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_last_modified_is_zero_age() {
        let now = Utc::now();
        assert_eq!(password_age_hours(&Secret::text("pw"), None, &[], now), 0.0);
    }

    #[test]
    fn unchanged_password_walks_back_through_history() {
        let now = Utc::now();
        let history = vec![
            rev(Some("old"), now - Duration::hours(100)),
            rev(Some("pw"), now - Duration::hours(10)),
            rev(Some("pw"), now - Duration::hours(50)),
        ];
        let age = password_age_hours(
            &Secret::text("pw"),
            Some(now - Duration::hours(1)),
            &history,
            now,
        );
        assert!((age - 50.0).abs() < 1e-9);
    }

    #[test]
    fn placeholders_are_skipped() {
        let now = Utc::now();
        let history = vec![
            rev(None, now - Duration::hours(3)),
            rev(Some("pw"), now - Duration::hours(7)),
            rev(Some("other"), now - Duration::hours(9)),
        ];
        let age = password_age_hours(
            &Secret::text("pw"),
            Some(now - Duration::hours(2)),
            &history,
            now,
        );
        assert!((age - 7.0).abs() < 1e-9);
    }

    #[test]
    fn first_different_password_stops_the_walk() {
        let now = Utc::now();
        let history = vec![
            rev(Some("changed"), now - Duration::hours(4)),
            rev(Some("pw"), now - Duration::hours(40)),
        ];
        let age = password_age_hours(
            &Secret::text("pw"),
            Some(now - Duration::hours(2)),
            &history,
            now,
        );
        assert!((age - 2.0).abs() < 1e-9);
    }

    #[test]
    fn future_timestamps_clamp_to_zero() {
        let now = Utc::now();
        let age = password_age_hours(
            &Secret::text("pw"),
            Some(now + Duration::hours(2)),
            &[],
            now,
        );
        assert_eq!(age, 0.0);
    }

    proptest::proptest! {
        #[test]
        fn age_grows_with_now(offset_h in 0i64..10_000, later_h in 0i64..10_000) {
            let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
            let modified = Some(base);
            let pw = Secret::text("pw");
            let a = password_age_hours(&pw, modified, &[], base + Duration::hours(offset_h));
            let b = password_age_hours(&pw, modified, &[], base + Duration::hours(offset_h + later_h));
            proptest::prop_assert!(b >= a);
            proptest::prop_assert!(a >= 0.0);
        }
    }
}
