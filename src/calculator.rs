//! Pure spending math.
//!
//! Turns a fetched transaction list plus a reference date into a
//! [`SpendingReport`]. No I/O, no clock reads: callers pass `now` in, which
//! keeps every function deterministic and directly testable.

use crate::config::ReportConfig;
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// A single bank transaction as supplied by the aggregator.
///
/// Positive amounts are spending; negative and zero amounts (refunds,
/// transfers in) are never counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Calendar date the transaction posted.
    pub date: NaiveDate,
    /// Signed dollar amount.
    pub amount: f64,
}

/// Derived spending summary, recomputed on every run and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingReport {
    /// Name used in the message greeting.
    pub recipient_name: String,
    /// Configured daily spending limit.
    pub daily_limit: f64,
    /// Spend within the calendar month containing the reference date.
    pub monthly_spent: f64,
    /// Spend within the previous calendar month.
    pub last_month_spent: f64,
    /// Previous month's spend divided by its day count.
    pub average_daily_last_month: f64,
}

/// Sum of positive amounts dated within the calendar month containing
/// `reference`, inclusive of the first and last day, rounded to 2 decimals.
pub fn monthly_spending(transactions: &[Transaction], reference: NaiveDate) -> f64 {
    let (start, end) = month_bounds(reference);
    let total: f64 = transactions
        .iter()
        .filter(|tx| tx.amount.is_finite() && tx.amount > 0.0)
        .filter(|tx| tx.date >= start && tx.date <= end)
        .map(|tx| tx.amount)
        .sum();
    round2(total)
}

/// Monthly spend divided by the month's inclusive day count (28-31),
/// rounded to 2 decimals.
pub fn daily_average(transactions: &[Transaction], reference: NaiveDate) -> f64 {
    let (_, end) = month_bounds(reference);
    let days = f64::from(end.day());
    round2(monthly_spending(transactions, reference) / days)
}

/// Build the full report for the month containing `now` plus the month
/// before it. An empty transaction list yields zero totals.
pub fn generate_report(
    transactions: &[Transaction],
    now: NaiveDate,
    report: &ReportConfig,
) -> SpendingReport {
    let previous = previous_month(now);
    SpendingReport {
        recipient_name: report.recipient_name.clone(),
        daily_limit: report.daily_limit,
        monthly_spent: monthly_spending(transactions, now),
        last_month_spent: monthly_spending(transactions, previous),
        average_daily_last_month: daily_average(transactions, previous),
    }
}

/// First and last calendar day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = first_of_month(date.year(), date.month());
    let next = if date.month() == 12 {
        first_of_month(date.year() + 1, 1)
    } else {
        first_of_month(date.year(), date.month() + 1)
    };
    // A month always has at least one day, so this never underflows.
    let end = next.checked_sub_days(Days::new(1)).unwrap_or(start);
    (start, end)
}

/// Any date within the calendar month before the one containing `date`.
pub fn previous_month(date: NaiveDate) -> NaiveDate {
    if date.month() == 1 {
        first_of_month(date.year() - 1, 12)
    } else {
        first_of_month(date.year(), date.month() - 1)
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // Month is always 1-12 here; fall back to the epoch rather than panic.
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default())
}

/// Standard half-away-from-zero rounding to 2 decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
