use vellum_core::{value::Value, Error, Result};

use std::time::Duration;

/// Configuration for one transaction context.
///
/// The defaults give a read-write transactional context with four retries
/// and exponential backoff between 500 ms and 10 s.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub(crate) read_only: bool,
    pub(crate) consistent_reads: bool,
    pub(crate) retries: u32,
    pub(crate) initial_backoff: Duration,
    pub(crate) max_backoff: Duration,
    pub(crate) cache_models: bool,
}

impl Default for ContextOptions {
    fn default() -> ContextOptions {
        ContextOptions {
            read_only: false,
            consistent_reads: true,
            retries: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(10_000),
            cache_models: false,
        }
    }
}

impl ContextOptions {
    /// Rejects every write operation in the context.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Whether reads share one snapshot. Turning this off is only legal for
    /// read-only contexts; each read is then individually consistent and no
    /// transaction is opened.
    pub fn consistent_reads(mut self, consistent_reads: bool) -> Self {
        self.consistent_reads = consistent_reads;
        self
    }

    /// Maximum additional attempts after the first failure.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Makes a repeated `get` of a tracked key return the cached instance
    /// instead of raising.
    pub fn cache_models(mut self, cache_models: bool) -> Self {
        self.cache_models = cache_models;
        self
    }

    /// Builds options from a configuration map.
    ///
    /// Durations are integer milliseconds. Unknown keys and wrongly-typed
    /// values are rejected.
    pub fn from_value(value: &Value) -> Result<ContextOptions> {
        let Some(map) = value.as_object() else {
            return Err(Error::invalid_options("options must be an object"));
        };

        let mut options = ContextOptions::default();
        for (name, value) in map {
            match name.as_str() {
                "read_only" => options.read_only = expect_bool(name, value)?,
                "consistent_reads" => options.consistent_reads = expect_bool(name, value)?,
                "retries" => options.retries = expect_u64(name, value)? as u32,
                "initial_backoff_ms" => {
                    options.initial_backoff = Duration::from_millis(expect_u64(name, value)?);
                }
                "max_backoff_ms" => {
                    options.max_backoff = Duration::from_millis(expect_u64(name, value)?);
                }
                "cache_models" => options.cache_models = expect_bool(name, value)?,
                _ => {
                    return Err(Error::invalid_options(format!("unknown option `{name}`")));
                }
            }
        }
        options.validate()?;
        Ok(options)
    }

    /// Checks ranges and the illegal option combination.
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.read_only && !self.consistent_reads {
            return Err(Error::invalid_options(
                "inconsistent reads are only available to read-only contexts",
            ));
        }
        if self.initial_backoff < Duration::from_millis(1) {
            return Err(Error::invalid_options("initial_backoff must be >= 1ms"));
        }
        if self.max_backoff < Duration::from_millis(200) {
            return Err(Error::invalid_options("max_backoff must be >= 200ms"));
        }
        Ok(())
    }
}

fn expect_bool(name: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::invalid_options(format!("option `{name}` must be a boolean")))
}

fn expect_u64(name: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| Error::invalid_options(format!("option `{name}` must be a non-negative integer")))
}
