//! Human-readable order numbers: `OP-YYYYMMDD-NNN`, sequential per day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use netfab_core::DomainError;

const PREFIX: &str = "OP";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber {
    date: NaiveDate,
    sequence: u32,
}

impl OrderNumber {
    pub fn new(date: NaiveDate, sequence: u32) -> Result<Self, DomainError> {
        if sequence == 0 {
            return Err(DomainError::validation("order sequence starts at 1"));
        }
        Ok(Self { date, sequence })
    }

    /// Number following `last` for `date`; `last` is the highest number already
    /// issued that day, if any.
    pub fn next(date: NaiveDate, last: Option<&OrderNumber>) -> Self {
        let sequence = match last {
            Some(last) if last.date == date => last.sequence + 1,
            _ => 1,
        };
        Self { date, sequence }
    }

    /// `OP-YYYYMMDD-` prefix shared by every number issued on `date`.
    pub fn day_prefix(date: NaiveDate) -> String {
        format!("{PREFIX}-{}-", date.format("%Y%m%d"))
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{:03}", Self::day_prefix(self.date), self.sequence)
    }
}

impl core::str::FromStr for OrderNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("invalid order number '{s}'"));

        let mut parts = s.splitn(3, '-');
        let (Some(prefix), Some(day), Some(seq)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if prefix != PREFIX || day.len() != 8 || seq.len() < 3 {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(day, "%Y%m%d").map_err(|_| invalid())?;
        let sequence = seq.parse::<u32>().map_err(|_| invalid())?;
        Self::new(date, sequence).map_err(|_| invalid())
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderNumber> for String {
    fn from(value: OrderNumber) -> Self {
        value.to_string()
    }
}
