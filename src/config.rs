//! Startup configuration for allocation accounting.
//!
//! Defaults come from cargo features (`coarse-accounting`, `compaction`). [`Config::from_env`]
//! lets the environment override them once at startup. A `Config` never changes after it has
//! been handed to [`Accounting`](crate::alloc::Accounting).

use crate::error::{Error, Result};
use std::{env, str::FromStr};

/// How allocated bytes are counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccountingMode {
    /// An atomic running total, adjusted on every allocation and free.
    Precise,

    /// Whatever the object pool itself reports.
    Coarse,
}

impl Default for AccountingMode {
    fn default() -> Self {
        if cfg!(feature = "coarse-accounting") {
            AccountingMode::Coarse
        } else {
            AccountingMode::Precise
        }
    }
}

impl FromStr for AccountingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "precise" => Ok(AccountingMode::Precise),
            "coarse" => Ok(AccountingMode::Coarse),
            _ => Err(Error::UnknownAccountingMode(s.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    accounting: AccountingMode,
    compaction: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            accounting: AccountingMode::default(),
            compaction: cfg!(feature = "compaction"),
        }
    }
}

impl Config {
    /// Selects the accounting mode. Overrides `coarse-accounting`.
    pub const ACCOUNTING_VAR: &'static str = "GC_DELAY_ACCOUNTING";

    /// Enables or disables compaction. Overrides `compaction`.
    pub const COMPACTION_VAR: &'static str = "GC_DELAY_COMPACTION";

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Config::from_vars(env::vars())
    }

    /// Reads the configuration from key/value pairs, ignoring unrelated keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use gc_delay::config::{AccountingMode, Config};
    ///
    /// let config = Config::from_vars(vec![
    ///     ("GC_DELAY_ACCOUNTING", "coarse"),
    ///     ("GC_DELAY_COMPACTION", "on"),
    /// ])
    /// .unwrap();
    /// assert_eq!(config.accounting(), AccountingMode::Coarse);
    /// assert!(config.compaction_enabled());
    /// ```
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Config::default();
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                Config::ACCOUNTING_VAR => config.accounting = value.parse()?,
                Config::COMPACTION_VAR => {
                    config.compaction = parse_flag(Config::COMPACTION_VAR, value)?
                }
                _ => {}
            }
        }
        Ok(config)
    }

    pub fn with_accounting(mut self, accounting: AccountingMode) -> Self {
        self.accounting = accounting;
        self
    }

    pub fn with_compaction(mut self, compaction: bool) -> Self {
        self.compaction = compaction;
        self
    }

    #[inline]
    pub fn accounting(&self) -> AccountingMode {
        self.accounting
    }

    #[inline]
    pub fn compaction_enabled(&self) -> bool {
        self.compaction
    }
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidFlag {
            var,
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_follow_features() {
        let config = Config::default();
        assert_eq!(
            config.accounting() == AccountingMode::Coarse,
            cfg!(feature = "coarse-accounting")
        );
        assert_eq!(config.compaction_enabled(), cfg!(feature = "compaction"));
    }

    #[test]
    fn parse_mode() {
        assert_eq!("precise".parse::<AccountingMode>().unwrap(), AccountingMode::Precise);
        assert_eq!(" Coarse ".parse::<AccountingMode>().unwrap(), AccountingMode::Coarse);
        match "exact".parse::<AccountingMode>() {
            Err(Error::UnknownAccountingMode(mode)) => assert_eq!(mode, "exact"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn vars_override_defaults() {
        let config = Config::from_vars(vec![
            ("PATH", "/usr/bin"),
            (Config::ACCOUNTING_VAR, "precise"),
            (Config::COMPACTION_VAR, "FALSE"),
        ])
        .unwrap();
        assert_eq!(config.accounting(), AccountingMode::Precise);
        assert!(!config.compaction_enabled());

        let config = Config::from_vars(vec![(Config::COMPACTION_VAR.to_owned(), "1".to_owned())])
            .unwrap();
        assert!(config.compaction_enabled());
    }

    #[test]
    fn invalid_flag() {
        let err = Config::from_vars(vec![(Config::COMPACTION_VAR, "maybe")]).unwrap_err();
        match err {
            Error::InvalidFlag { var, ref value } => {
                assert_eq!(var, Config::COMPACTION_VAR);
                assert_eq!(value, "maybe");
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "invalid value `maybe` for `GC_DELAY_COMPACTION`, expected a boolean"
        );
    }

    #[test]
    fn builder() {
        let config = Config::default()
            .with_accounting(AccountingMode::Coarse)
            .with_compaction(true);
        assert_eq!(config.accounting(), AccountingMode::Coarse);
        assert!(config.compaction_enabled());
    }
}
