//! Monthly dashboard summaries

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::db::{Database, TransactionFilter};
use crate::error::{Error, Result};
use crate::models::{Transaction, TransactionType};

/// Years accepted from request parameters
const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthPeriod {
    pub year: i32,
    pub month: u32,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(Error::InvalidData(format!(
                "Invalid period {}-{:02}",
                year, month
            )));
        }
        Ok(Self { year, month })
    }

    /// Period from raw query parameters
    ///
    /// A month outside 1-12 or a year outside 2000-2100 (or one that does not
    /// parse) is replaced by the corresponding part of `today`.
    pub fn from_params(month: Option<&str>, year: Option<&str>, today: NaiveDate) -> Self {
        let month = month
            .and_then(|m| m.trim().parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m))
            .unwrap_or_else(|| today.month());
        let year = year
            .and_then(|y| y.trim().parse::<i32>().ok())
            .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
            .unwrap_or_else(|| today.year());
        Self { year, month }
    }

    /// First and last day of the month
    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default();
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        let last = next.and_then(|d| d.pred_opt()).unwrap_or(first);
        (first, last)
    }
}

/// Income and expense totals; transfers count toward neither
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub income: f64,
    pub expense: f64,
    /// income - expense
    pub balance: f64,
    pub count: usize,
}

impl Summary {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut summary = Summary {
            count: transactions.len(),
            ..Default::default()
        };
        for t in transactions {
            match t.transaction_type {
                TransactionType::Income => summary.income += t.amount.abs(),
                TransactionType::Expense => summary.expense += t.amount.abs(),
                TransactionType::InternalTransfer | TransactionType::ExternalTransfer => {}
            }
        }
        summary.balance = summary.income - summary.expense;
        summary
    }
}

/// Dashboard for one month
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub period: MonthPeriod,
    pub summary: Summary,
    /// Newest first
    pub transactions: Vec<Transaction>,
}

/// Build the dashboard of a user's month, optionally filtered by type and search
pub fn dashboard(
    db: &Database,
    user_id: &str,
    period: MonthPeriod,
    transaction_type: Option<TransactionType>,
    search: Option<&str>,
) -> Result<Dashboard> {
    let transactions = db.search_transactions(
        TransactionFilter::new()
            .user_id(Some(user_id))
            .date_range(Some(period.range()))
            .transaction_type(transaction_type)
            .search(search)
            .sort_field(Some("date"))
            .sort_order(Some("desc")),
    )?;
    Ok(Dashboard {
        period,
        summary: Summary::from_transactions(&transactions),
        transactions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_from_params_validates() {
        let today = d(2024, 6, 15);
        assert_eq!(
            MonthPeriod::from_params(Some("3"), Some("2023"), today),
            MonthPeriod { year: 2023, month: 3 }
        );
        assert_eq!(
            MonthPeriod::from_params(Some("13"), Some("1999"), today),
            MonthPeriod { year: 2024, month: 6 }
        );
        assert_eq!(
            MonthPeriod::from_params(Some("abc"), None, today),
            MonthPeriod { year: 2024, month: 6 }
        );
    }

    #[test]
    fn test_range() {
        assert_eq!(
            MonthPeriod::new(2024, 2).unwrap().range(),
            (d(2024, 2, 1), d(2024, 2, 29))
        );
        assert_eq!(
            MonthPeriod::new(2023, 12).unwrap().range(),
            (d(2023, 12, 1), d(2023, 12, 31))
        );
        assert!(MonthPeriod::new(2023, 0).is_err());
    }
}
