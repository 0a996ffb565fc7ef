use crate::domain::money::check_range;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Longest configurable period: ten years.
const MAX_HOURS: i64 = 24 * 365 * 10;
const MAX_MINUTES: i64 = MAX_HOURS * 60;

/// Runtime settings for the ledger services.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub currency: String,
    /// Credited to every new account as an `initial_setup` transaction.
    pub starting_balance: Decimal,
    pub ticket_due_hours: i64,
    pub auction: AuctionConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuctionConfig {
    pub default_duration_hours: i64,
    /// Bids this close to the end extend the auction.
    pub anti_snipe_threshold_minutes: i64,
    pub anti_snipe_extension_minutes: i64,
    pub default_min_bid_increment: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: "GDC".to_string(),
            starting_balance: dec!(100.00),
            ticket_due_hours: 72,
            auction: AuctionConfig::default(),
        }
    }
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            default_duration_hours: 24,
            anti_snipe_threshold_minutes: 2,
            anti_snipe_extension_minutes: 5,
            default_min_bid_increment: dec!(1.00),
        }
    }
}

impl LedgerConfig {
    /// Reads a JSON config file and validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency.trim().is_empty() {
            return Err(LedgerError::Config("currency must not be empty".to_string()));
        }
        if self.starting_balance < Decimal::ZERO {
            return Err(LedgerError::Config(format!(
                "starting_balance must not be negative, got {}",
                self.starting_balance
            )));
        }
        if self.starting_balance.normalize().scale() > 2 {
            return Err(LedgerError::Config(format!(
                "starting_balance {} has more than 2 decimal places",
                self.starting_balance
            )));
        }
        check_range(self.starting_balance, "starting_balance")
            .map_err(|e| LedgerError::Config(e.to_string()))?;
        check_period("ticket_due_hours", self.ticket_due_hours, MAX_HOURS)?;
        self.auction.validate()
    }

    pub fn ticket_due(&self) -> Result<Duration> {
        hours("ticket_due_hours", self.ticket_due_hours)
    }
}

impl AuctionConfig {
    fn validate(&self) -> Result<()> {
        let periods = [
            ("auction.default_duration_hours", self.default_duration_hours, MAX_HOURS),
            ("auction.anti_snipe_threshold_minutes", self.anti_snipe_threshold_minutes, MAX_MINUTES),
            ("auction.anti_snipe_extension_minutes", self.anti_snipe_extension_minutes, MAX_MINUTES),
        ];
        for (name, value, max) in periods {
            check_period(name, value, max)?;
        }
        if self.default_min_bid_increment <= Decimal::ZERO {
            return Err(LedgerError::Config(
                "auction.default_min_bid_increment must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_duration(&self) -> Result<Duration> {
        hours("auction.default_duration_hours", self.default_duration_hours)
    }

    pub fn anti_snipe_threshold(&self) -> Result<Duration> {
        minutes("auction.anti_snipe_threshold_minutes", self.anti_snipe_threshold_minutes)
    }

    pub fn anti_snipe_extension(&self) -> Result<Duration> {
        minutes("auction.anti_snipe_extension_minutes", self.anti_snipe_extension_minutes)
    }
}

/// `now + period`, or `InvalidState` past the end of the calendar.
pub fn later(now: DateTime<Utc>, period: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(period)
        .ok_or_else(|| LedgerError::InvalidState(format!("{now} plus {period} is out of range")))
}

fn check_period(name: &str, value: i64, max: i64) -> Result<()> {
    if value <= 0 || value > max {
        return Err(LedgerError::Config(format!(
            "{name} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(())
}

fn hours(name: &str, value: i64) -> Result<Duration> {
    Duration::try_hours(value)
        .ok_or_else(|| LedgerError::Config(format!("{name} of {value} is out of range")))
}

fn minutes(name: &str, value: i64) -> Result<Duration> {
    Duration::try_minutes(value)
        .ok_or_else(|| LedgerError::Config(format!("{name} of {value} is out of range")))
}
