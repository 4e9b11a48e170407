//! Lending fold and state machine
//!
//! A book moves `NoLending -> Open -> NoLending`. A closed lending never
//! reopens; borrowing again opens a new lending id. While a lending is open
//! its borrower may borrow again, which extends the due date on the same
//! lending instead of failing.

use chrono::{DateTime, Days, Utc};
use holocron_storage::{LendingEventRow, LendingEventType, UserId};
use serde::Serialize;
use thiserror::Error;
use ulid::Ulid;

use super::{parse_instant, ReconstructionError};

/// Loan period when the borrower does not ask for one
pub const DEFAULT_DUE_DAYS: u32 = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LendingError {
    #[error("Invalid due days {0}: must be at least 1")]
    InvalidDueDays(i64),

    #[error("Due date out of range")]
    DueDateOutOfRange,

    #[error("Book is already borrowed by another user")]
    AlreadyBorrowed,

    #[error("Book is not currently borrowed")]
    NotBorrowed,

    #[error("Book is borrowed by another user")]
    NotBorrower,
}

/// An open lending as derived from its events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentLending {
    pub lending_id: Ulid,
    pub book_id: Ulid,
    pub borrower_id: UserId,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// What a borrow request turns into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BorrowDecision {
    /// No open lending: start a new one
    Open {
        lending_id: Ulid,
        due_date: DateTime<Utc>,
        due_days: u32,
    },
    /// The borrower already holds the book: push its due date out
    Extend {
        lending: CurrentLending,
        due_date: DateTime<Utc>,
        due_days: u32,
    },
}

/// Compute a due date in whole calendar days (UTC)
///
/// With an open lending the new date counts from its current due date,
/// otherwise from `now`.
pub fn calculate_due_date(
    now: DateTime<Utc>,
    requested_due_days: Option<i64>,
    current: Option<&CurrentLending>,
) -> Result<(DateTime<Utc>, u32), LendingError> {
    let due_days = match requested_due_days {
        None => DEFAULT_DUE_DAYS,
        Some(d) if d < 1 => return Err(LendingError::InvalidDueDays(d)),
        Some(d) => u32::try_from(d).map_err(|_| LendingError::DueDateOutOfRange)?,
    };

    let base = current.map(|l| l.due_date).unwrap_or(now);
    let due_date = base
        .checked_add_days(Days::new(u64::from(due_days)))
        .ok_or(LendingError::DueDateOutOfRange)?;

    Ok((due_date, due_days))
}

#[derive(Debug)]
struct OpenLending {
    lending_id: Ulid,
    book_id: Ulid,
    borrower_id: UserId,
    borrowed_at: DateTime<Utc>,
    borrowed_due_date: Option<DateTime<Utc>>,
    extended_due_date: Option<DateTime<Utc>>,
}

impl OpenLending {
    /// Latest extension, else the borrow's own due date, else borrowed_at + 7 days
    fn resolve(self) -> CurrentLending {
        let due_date = self
            .extended_due_date
            .or(self.borrowed_due_date)
            .or_else(|| {
                self.borrowed_at
                    .checked_add_days(Days::new(u64::from(DEFAULT_DUE_DAYS)))
            })
            .unwrap_or(self.borrowed_at);

        CurrentLending {
            lending_id: self.lending_id,
            book_id: self.book_id,
            borrower_id: self.borrower_id,
            borrowed_at: self.borrowed_at,
            due_date,
        }
    }
}

fn optional_instant(
    row: &LendingEventRow,
) -> Result<Option<DateTime<Utc>>, ReconstructionError> {
    row.due_date
        .as_deref()
        .map(|raw| parse_instant(row.event_id, "due_date", raw))
        .transpose()
}

/// Fold lending rows, oldest first, into the lendings still open
///
/// Works on any row set that contains every event of each lending it
/// touches: a book's stream, or all rows of one borrower. Results keep the
/// order in which the lendings were opened.
pub fn open_lendings(rows: &[LendingEventRow]) -> Result<Vec<CurrentLending>, ReconstructionError> {
    let mut open: Vec<OpenLending> = Vec::new();

    for row in rows {
        let event_type = row.event_type.parse::<LendingEventType>().map_err(|e| {
            ReconstructionError::UnknownEventType {
                event_id: row.event_id,
                event_type: e.0,
            }
        })?;
        let occurred_at = parse_instant(row.event_id, "occurred_at", &row.occurred_at)?;
        let due_date = optional_instant(row)?;

        match event_type {
            LendingEventType::Borrowed => open.push(OpenLending {
                lending_id: row.lending_id,
                book_id: row.book_id,
                borrower_id: row.borrower_id.clone(),
                borrowed_at: occurred_at,
                borrowed_due_date: due_date,
                extended_due_date: None,
            }),
            LendingEventType::DueDateExtended => {
                if let Some(lending) = open.iter_mut().find(|l| l.lending_id == row.lending_id) {
                    if due_date.is_some() {
                        lending.extended_due_date = due_date;
                    }
                }
            }
            LendingEventType::Returned => open.retain(|l| l.lending_id != row.lending_id),
        }
    }

    Ok(open.into_iter().map(OpenLending::resolve).collect())
}

/// The open lending of one book, if any
///
/// More than one open lending breaks the one-lending-per-book rule; the most
/// recently opened one wins and the inconsistency is logged.
pub fn current_lending(
    rows: &[LendingEventRow],
) -> Result<Option<CurrentLending>, ReconstructionError> {
    let mut open = open_lendings(rows)?;
    if open.len() > 1 {
        tracing::warn!(
            book_id = %open[0].book_id,
            open_lendings = open.len(),
            "book has more than one open lending; using the most recent"
        );
    }
    Ok(open.pop())
}

/// Decide how a borrow request applies to the book's current lending
pub fn decide_borrow(
    current: Option<&CurrentLending>,
    borrower_id: &UserId,
    now: DateTime<Utc>,
    requested_due_days: Option<i64>,
) -> Result<BorrowDecision, LendingError> {
    match current {
        Some(lending) if &lending.borrower_id != borrower_id => Err(LendingError::AlreadyBorrowed),
        Some(lending) => {
            let (due_date, due_days) = calculate_due_date(now, requested_due_days, Some(lending))?;
            Ok(BorrowDecision::Extend {
                lending: lending.clone(),
                due_date,
                due_days,
            })
        }
        None => {
            let (due_date, due_days) = calculate_due_date(now, requested_due_days, None)?;
            Ok(BorrowDecision::Open {
                lending_id: Ulid::new(),
                due_date,
                due_days,
            })
        }
    }
}

/// Only the current borrower may return a book
pub fn validate_return<'a>(
    current: Option<&'a CurrentLending>,
    requester_id: &UserId,
) -> Result<&'a CurrentLending, LendingError> {
    let lending = current.ok_or(LendingError::NotBorrowed)?;
    if &lending.borrower_id != requester_id {
        return Err(LendingError::NotBorrower);
    }
    Ok(lending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, 12, 0, 0).unwrap()
    }

    fn lending(borrower: &str, due: DateTime<Utc>) -> CurrentLending {
        CurrentLending {
            lending_id: Ulid::new(),
            book_id: Ulid::new(),
            borrower_id: UserId::new(borrower),
            borrowed_at: t(1),
            due_date: due,
        }
    }

    fn event(
        lending_id: Ulid,
        book_id: Ulid,
        borrower: &str,
        event_type: &str,
        due_date: Option<&str>,
        occurred_at: &str,
    ) -> LendingEventRow {
        LendingEventRow {
            event_id: Ulid::new(),
            lending_id,
            book_id,
            borrower_id: UserId::new(borrower),
            event_type: event_type.to_string(),
            due_date: due_date.map(str::to_string),
            occurred_at: occurred_at.to_string(),
        }
    }

    #[test]
    fn test_default_due_days() {
        let (due, days) = calculate_due_date(t(1), None, None).unwrap();
        assert_eq!(days, 7);
        assert_eq!(due, t(8));
    }

    #[test]
    fn test_invalid_due_days() {
        assert_eq!(
            calculate_due_date(t(1), Some(0), None),
            Err(LendingError::InvalidDueDays(0))
        );
        assert_eq!(
            calculate_due_date(t(1), Some(-3), Some(&lending("u1", t(8)))),
            Err(LendingError::InvalidDueDays(-3))
        );
    }

    #[test]
    fn test_extension_counts_from_existing_due_date() {
        let current = lending("u1", t(8));
        let (due, days) = calculate_due_date(t(3), Some(5), Some(&current)).unwrap();
        assert_eq!(days, 5);
        assert_eq!(due, t(13));
    }

    #[test]
    fn test_huge_due_days_is_out_of_range() {
        assert_eq!(
            calculate_due_date(t(1), Some(i64::MAX), None),
            Err(LendingError::DueDateOutOfRange)
        );
    }

    #[test]
    fn test_no_rows_no_lending() {
        assert_eq!(current_lending(&[]), Ok(None));
    }

    #[test]
    fn test_borrowed_opens_lending() {
        let (lid, bid) = (Ulid::new(), Ulid::new());
        let rows = vec![event(
            lid,
            bid,
            "u1",
            "borrowed",
            Some("2024-04-08T12:00:00Z"),
            "2024-04-01T12:00:00Z",
        )];

        let current = current_lending(&rows).unwrap().unwrap();
        assert_eq!(current.lending_id, lid);
        assert_eq!(current.book_id, bid);
        assert_eq!(current.borrower_id.as_str(), "u1");
        assert_eq!(current.borrowed_at, t(1));
        assert_eq!(current.due_date, t(8));
    }

    #[test]
    fn test_latest_extension_wins() {
        let (lid, bid) = (Ulid::new(), Ulid::new());
        let rows = vec![
            event(lid, bid, "u1", "borrowed", Some("2024-04-08T12:00:00Z"), "2024-04-01T12:00:00Z"),
            event(lid, bid, "u1", "due_date_extended", Some("2024-04-15T12:00:00Z"), "2024-04-02T12:00:00Z"),
            event(lid, bid, "u1", "due_date_extended", Some("2024-04-22T12:00:00Z"), "2024-04-03T12:00:00Z"),
        ];

        let current = current_lending(&rows).unwrap().unwrap();
        assert_eq!(current.due_date, t(22));
        assert_eq!(current.borrowed_at, t(1), "extension keeps the original borrow time");
    }

    #[test]
    fn test_missing_due_dates_fall_back_to_default_period() {
        let (lid, bid) = (Ulid::new(), Ulid::new());
        let rows = vec![event(lid, bid, "u1", "borrowed", None, "2024-04-01T12:00:00Z")];

        let current = current_lending(&rows).unwrap().unwrap();
        assert_eq!(current.due_date, t(8));
    }

    #[test]
    fn test_returned_closes_lending() {
        let (lid, bid) = (Ulid::new(), Ulid::new());
        let rows = vec![
            event(lid, bid, "u1", "borrowed", Some("2024-04-08T12:00:00Z"), "2024-04-01T12:00:00Z"),
            event(lid, bid, "u1", "returned", None, "2024-04-02T12:00:00Z"),
        ];
        assert_eq!(current_lending(&rows), Ok(None));
    }

    #[test]
    fn test_new_lending_after_return() {
        let bid = Ulid::new();
        let (first, second) = (Ulid::new(), Ulid::new());
        let rows = vec![
            event(first, bid, "u1", "borrowed", Some("2024-04-08T12:00:00Z"), "2024-04-01T12:00:00Z"),
            event(first, bid, "u1", "returned", None, "2024-04-02T12:00:00Z"),
            event(second, bid, "u2", "borrowed", Some("2024-04-10T12:00:00Z"), "2024-04-03T12:00:00Z"),
        ];

        let current = current_lending(&rows).unwrap().unwrap();
        assert_eq!(current.lending_id, second);
        assert_eq!(current.borrower_id.as_str(), "u2");
    }

    #[test]
    fn test_extension_of_closed_lending_is_ignored() {
        let (lid, bid) = (Ulid::new(), Ulid::new());
        let rows = vec![
            event(lid, bid, "u1", "borrowed", Some("2024-04-08T12:00:00Z"), "2024-04-01T12:00:00Z"),
            event(lid, bid, "u1", "returned", None, "2024-04-02T12:00:00Z"),
            event(lid, bid, "u1", "due_date_extended", Some("2024-04-20T12:00:00Z"), "2024-04-03T12:00:00Z"),
        ];
        assert_eq!(current_lending(&rows), Ok(None));
    }

    #[test]
    fn test_two_open_lendings_picks_most_recent() {
        let bid = Ulid::new();
        let (first, second) = (Ulid::new(), Ulid::new());
        let rows = vec![
            event(first, bid, "u1", "borrowed", None, "2024-04-01T12:00:00Z"),
            event(second, bid, "u2", "borrowed", None, "2024-04-02T12:00:00Z"),
        ];

        assert_eq!(open_lendings(&rows).unwrap().len(), 2);
        assert_eq!(current_lending(&rows).unwrap().unwrap().lending_id, second);
    }

    #[test]
    fn test_invalid_due_date_in_row_is_hard_error() {
        let rows = vec![event(
            Ulid::new(),
            Ulid::new(),
            "u1",
            "borrowed",
            Some("soon"),
            "2024-04-01T12:00:00Z",
        )];
        assert!(matches!(
            current_lending(&rows),
            Err(ReconstructionError::InvalidTimestamp {
                field: "due_date",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_lending_event_type() {
        let rows = vec![event(
            Ulid::new(),
            Ulid::new(),
            "u1",
            "renewed",
            None,
            "2024-04-01T12:00:00Z",
        )];
        assert!(matches!(
            open_lendings(&rows),
            Err(ReconstructionError::UnknownEventType { .. })
        ));
    }

    #[test]
    fn test_decide_borrow_open() {
        let decision = decide_borrow(None, &UserId::new("u1"), t(1), None).unwrap();
        match decision {
            BorrowDecision::Open {
                due_date, due_days, ..
            } => {
                assert_eq!(due_date, t(8));
                assert_eq!(due_days, 7);
            }
            other => panic!("expected Open, got {:?}", other),
        }
    }

    #[test]
    fn test_decide_borrow_same_borrower_extends() {
        let current = lending("u1", t(8));
        let decision = decide_borrow(Some(&current), &UserId::new("u1"), t(2), None).unwrap();
        match decision {
            BorrowDecision::Extend {
                lending, due_date, ..
            } => {
                assert_eq!(lending.lending_id, current.lending_id);
                assert_eq!(due_date, t(15));
            }
            other => panic!("expected Extend, got {:?}", other),
        }
    }

    #[test]
    fn test_decide_borrow_other_borrower_rejected() {
        let current = lending("u1", t(8));
        assert_eq!(
            decide_borrow(Some(&current), &UserId::new("u2"), t(2), None),
            Err(LendingError::AlreadyBorrowed)
        );
    }

    #[test]
    fn test_validate_return() {
        let current = lending("u1", t(8));
        assert_eq!(
            validate_return(None, &UserId::new("u1")),
            Err(LendingError::NotBorrowed)
        );
        assert_eq!(
            validate_return(Some(&current), &UserId::new("u2")),
            Err(LendingError::NotBorrower)
        );
        assert_eq!(
            validate_return(Some(&current), &UserId::new("u1")),
            Ok(&current)
        );
    }

    proptest! {
        #[test]
        fn proptest_fresh_due_date_adds_whole_days(
            secs in 0i64..4_000_000_000,
            days in 1i64..3650,
        ) {
            let now = Utc.timestamp_opt(secs, 0).unwrap();
            let (due, due_days) = calculate_due_date(now, Some(days), None).unwrap();
            prop_assert_eq!(due, now + Duration::days(days));
            prop_assert_eq!(i64::from(due_days), days);
        }

        #[test]
        fn proptest_non_positive_due_days_always_rejected(
            days in i64::MIN..1,
            has_lending in any::<bool>(),
        ) {
            let current = lending("u1", t(8));
            let current = has_lending.then_some(&current);
            prop_assert_eq!(
                calculate_due_date(t(1), Some(days), current),
                Err(LendingError::InvalidDueDays(days))
            );
        }

        #[test]
        fn proptest_extension_adds_to_old_due_date(days in 1i64..365, now_day in 1u32..28) {
            let current = lending("u1", t(8));
            let (due, _) = calculate_due_date(t(now_day), Some(days), Some(&current)).unwrap();
            prop_assert_eq!(due, t(8) + Duration::days(days));
        }
    }
}
