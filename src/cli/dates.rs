use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};
use now::DateTimeNow;

use crate::{engine::gaps::Window, utils::time::next_day_start};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Date range shared by every reporting command.
#[derive(Debug, clap::Args)]
pub struct RangeArgs {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option extracts the whole day"
    )]
    treat_as_days: bool,
}

impl RangeArgs {
    /// Resolves the arguments into a concrete query window, defaulting to
    /// the current day so the reports answer for today.
    pub fn resolve(&self) -> Result<Window> {
        let now = Local::now();
        let dialect: chrono_english::Dialect = self.date_style.into();

        let mut start = match self
            .start_date
            .as_deref()
            .map(|value| parse_date_string(value, now, dialect))
        {
            Some(Ok(v)) => v.with_timezone(&Local),
            Some(Err(e)) => return Err(validation_error("start", e)),
            None => now.beginning_of_day(),
        };
        let mut end = match self
            .end_date
            .as_deref()
            .map(|value| parse_date_string(value, now, dialect))
        {
            Some(Ok(v)) => v.with_timezone(&Local),
            Some(Err(e)) => return Err(validation_error("end", e)),
            None => now,
        };
        if self.treat_as_days {
            start = start.beginning_of_day();
            end = next_day_start(end);
        }

        Ok(Window::new(start.to_utc(), end.to_utc())?)
    }
}

/// Parses a single moment like the range bounds, for the log command.
pub fn parse_moment(value: &str, style: DateStyle) -> Result<DateTime<Utc>> {
    match parse_date_string(value, Local::now(), style.into()) {
        Ok(v) => Ok(v.with_timezone(&Utc)),
        Err(e) => Err(validation_error("entry", e)),
    }
}

fn validation_error(field: &str, e: chrono_english::DateError) -> anyhow::Error {
    Args::command()
        .error(
            clap::error::ErrorKind::ValueValidation,
            format!("Failed to validate {field} date {e}"),
        )
        .into()
}
