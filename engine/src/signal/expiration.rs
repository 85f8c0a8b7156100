use chrono::{Days, NaiveDate};

use crate::quote::OptionQuote;

/// Inclusive upper bound of the expiration window.
///
/// Contracts that already expired pass as well; the window has no lower
/// bound. A cutoff past the calendar's end lets everything through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpirationWindow {
    cutoff: Option<NaiveDate>,
}

impl ExpirationWindow {
    pub fn new(today: NaiveDate, max_days: u32) -> Self {
        Self {
            cutoff: today.checked_add_days(Days::new(u64::from(max_days))),
        }
    }

    pub fn contains(&self, expiration: NaiveDate) -> bool {
        self.cutoff.is_none_or(|cutoff| expiration <= cutoff)
    }
}

/// Anything that carries a contract expiration.
pub trait Expiring {
    fn expiration(&self) -> NaiveDate;
}

impl Expiring for OptionQuote {
    fn expiration(&self) -> NaiveDate {
        self.expiration
    }
}

impl<T: Expiring + ?Sized> Expiring for &T {
    fn expiration(&self) -> NaiveDate {
        (**self).expiration()
    }
}

/// Keeps items expiring on or before `today + max_days`, in input order.
pub fn filter_by_expiration<T, I>(items: I, max_days: u32, today: NaiveDate) -> Vec<T>
where
    T: Expiring,
    I: IntoIterator<Item = T>,
{
    let window = ExpirationWindow::new(today, max_days);
    let kept: Vec<T> = items
        .into_iter()
        .filter(|item| window.contains(item.expiration()))
        .collect();

    tracing::debug!(max_days, kept = kept.len(), "expiration filter applied");
    kept
}
