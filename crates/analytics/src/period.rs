//! Reporting periods.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::AnalyticsError;

/// A reporting window that ends now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Since midnight UTC.
    #[default]
    Today,
    /// The last seven days.
    Week,
    /// Since the first of the month.
    Month,
    /// Since January 1st.
    Year,
    All,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::All => "all",
        }
    }

    /// Inclusive start of the window that ends at `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = |date: Option<NaiveDate>| {
            date.and_then(|d| d.and_hms_opt(0, 0, 0))
                .map_or(DateTime::<Utc>::UNIX_EPOCH, |dt| dt.and_utc())
        };
        match self {
            Period::Today => midnight(Some(now.date_naive())),
            Period::Week => now - Duration::days(7),
            Period::Month => midnight(now.date_naive().with_day(1)),
            Period::Year => midnight(NaiveDate::from_ymd_opt(now.year(), 1, 1)),
            Period::All => DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Period {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Period::Today),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            "all" => Ok(Period::All),
            other => Err(AnalyticsError::InvalidPeriod(other.to_string())),
        }
    }
}
