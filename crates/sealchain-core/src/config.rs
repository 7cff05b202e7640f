//! Ledger options and startup validation.
//!
//! Everything a ledger instance needs to run is collected in
//! [`LedgerOptions`] and validated once, at construction. Malformed
//! options fail fast with a specific [`OptionsError`] instead of
//! surfacing later as a broken chain.
//!
//! The secret key is held as a [`SecretBox`] and is neither cloneable out
//! of the options nor rendered by `Debug`.

use std::fmt;
use std::time::Duration;

use secrecy::SecretBox;
use serde::Deserialize;
use thiserror::Error;

/// Default bounded queue capacity (intents).
pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

/// Default writer lease duration.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(30);

/// Default lease heartbeat interval.
pub const DEFAULT_LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of persistence retries per entry, after the initial
/// attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay for persistence retries (doubles per attempt:
/// 2 s, 4 s, 8 s).
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(2);

/// Default name of the lease resource guarding the writer role.
pub const DEFAULT_LOCK_RESOURCE_NAME: &str = "ledger_writer_lock_v1";

/// Errors raised by [`LedgerOptionsBuilder::build`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OptionsError {
    /// No genesis anchor was supplied.
    #[error("genesis hash is required")]
    MissingGenesisHash,

    /// The genesis anchor is not 64 lowercase hex characters.
    #[error("genesis hash must match [0-9a-f]{{64}}, got {got:?}")]
    InvalidGenesisHash {
        /// The rejected value.
        got: String,
    },

    /// No secret key was supplied.
    #[error("secret key is required")]
    MissingSecretKey,

    /// The secret key was empty.
    #[error("secret key must not be empty")]
    EmptySecretKey,

    /// The queue capacity was zero.
    #[error("queue capacity must be positive")]
    InvalidQueueCapacity,

    /// The renew interval does not leave room under the lease duration.
    #[error(
        "lease renew interval ({renew_interval:?}) must be shorter than the lease duration ({lease_duration:?})"
    )]
    RenewIntervalTooLong {
        /// Configured renew interval.
        renew_interval: Duration,
        /// Configured lease duration.
        lease_duration: Duration,
    },

    /// Zero persistence attempts were configured.
    #[error("retry attempts must be at least 1")]
    InvalidRetryAttempts,

    /// The retry base delay was zero.
    #[error("retry base delay must be positive")]
    InvalidRetryBase,

    /// The lock resource name was empty.
    #[error("lock resource name must not be empty")]
    EmptyLockResourceName,
}

/// Validated configuration for a ledger instance.
///
/// Construct through [`LedgerOptions::builder`]; a value of this type is
/// guaranteed to satisfy every startup constraint.
pub struct LedgerOptions {
    genesis_hash: String,
    secret_key: SecretBox<[u8]>,
    queue_capacity: usize,
    lease_duration: Duration,
    lease_renew_interval: Duration,
    retry_attempts: u32,
    retry_base: Duration,
    lock_resource_name: String,
}

impl LedgerOptions {
    /// Returns a builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> LedgerOptionsBuilder {
        LedgerOptionsBuilder::default()
    }

    /// The deployment-wide genesis anchor: `previous_hash` of sequence 1.
    #[must_use]
    pub fn genesis_hash(&self) -> &str {
        &self.genesis_hash
    }

    /// The HMAC key. Crate-internal; the key never crosses the API
    /// boundary after construction.
    pub(crate) fn secret_key(&self) -> &SecretBox<[u8]> {
        &self.secret_key
    }

    /// Bounded queue capacity, the backpressure threshold.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Writer lease TTL.
    #[must_use]
    pub const fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Heartbeat interval for lease renewal. Always shorter than
    /// [`Self::lease_duration`].
    #[must_use]
    pub const fn lease_renew_interval(&self) -> Duration {
        self.lease_renew_interval
    }

    /// Persistence retries per entry after the initial attempt. With the
    /// default base delay this yields the 2 s, 4 s, 8 s schedule.
    #[must_use]
    pub const fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Base delay of the exponential retry schedule.
    #[must_use]
    pub const fn retry_base(&self) -> Duration {
        self.retry_base
    }

    /// Name of the lease resource guarding the writer role.
    #[must_use]
    pub fn lock_resource_name(&self) -> &str {
        &self.lock_resource_name
    }
}

impl fmt::Debug for LedgerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerOptions")
            .field("genesis_hash", &self.genesis_hash)
            .field("queue_capacity", &self.queue_capacity)
            .field("lease_duration", &self.lease_duration)
            .field("lease_renew_interval", &self.lease_renew_interval)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_base", &self.retry_base)
            .field("lock_resource_name", &self.lock_resource_name)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LedgerOptions`].
///
/// Deserializable so a host application can embed the recognized options
/// in its own configuration file; durations are expressed in seconds
/// (`lease_duration_secs`, `lease_renew_interval_secs`,
/// `retry_base_seconds`).
#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerOptionsBuilder {
    genesis_hash: Option<String>,
    #[serde(deserialize_with = "secret_from_string")]
    secret_key: Option<Vec<u8>>,
    queue_capacity: Option<usize>,
    lease_duration_secs: Option<u64>,
    lease_renew_interval_secs: Option<u64>,
    retry_attempts: Option<u32>,
    retry_base_seconds: Option<u64>,
    lock_resource_name: Option<String>,
}

impl LedgerOptionsBuilder {
    /// Sets the genesis anchor (required, 64 lowercase hex characters).
    #[must_use]
    pub fn genesis_hash(mut self, genesis_hash: impl Into<String>) -> Self {
        self.genesis_hash = Some(genesis_hash.into());
        self
    }

    /// Sets the HMAC key (required, non-empty).
    #[must_use]
    pub fn secret_key(mut self, secret_key: impl Into<Vec<u8>>) -> Self {
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Sets the bounded queue capacity.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets the writer lease TTL.
    #[must_use]
    pub const fn lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration_secs = Some(duration.as_secs());
        self
    }

    /// Sets the lease heartbeat interval.
    #[must_use]
    pub const fn lease_renew_interval(mut self, interval: Duration) -> Self {
        self.lease_renew_interval_secs = Some(interval.as_secs());
        self
    }

    /// Sets the number of persistence retries per entry.
    #[must_use]
    pub const fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Sets the base delay of the exponential retry schedule.
    #[must_use]
    pub const fn retry_base(mut self, base: Duration) -> Self {
        self.retry_base_seconds = Some(base.as_secs());
        self
    }

    /// Sets the lease resource name.
    #[must_use]
    pub fn lock_resource_name(mut self, name: impl Into<String>) -> Self {
        self.lock_resource_name = Some(name.into());
        self
    }

    /// Validates and produces the options.
    ///
    /// # Errors
    ///
    /// Returns the first [`OptionsError`] violated, checked in field
    /// order: genesis anchor, secret key, queue capacity, lease timing,
    /// retry schedule, lock resource name.
    pub fn build(self) -> Result<LedgerOptions, OptionsError> {
        let genesis_hash = self.genesis_hash.ok_or(OptionsError::MissingGenesisHash)?;
        if !is_lowercase_hex_64(&genesis_hash) {
            return Err(OptionsError::InvalidGenesisHash { got: genesis_hash });
        }

        let secret = self.secret_key.ok_or(OptionsError::MissingSecretKey)?;
        if secret.is_empty() {
            return Err(OptionsError::EmptySecretKey);
        }
        let secret_key = SecretBox::new(secret.into_boxed_slice());

        let queue_capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            return Err(OptionsError::InvalidQueueCapacity);
        }

        let lease_duration = self
            .lease_duration_secs
            .map_or(DEFAULT_LEASE_DURATION, Duration::from_secs);
        let lease_renew_interval = self
            .lease_renew_interval_secs
            .map_or(DEFAULT_LEASE_RENEW_INTERVAL, Duration::from_secs);
        if lease_renew_interval >= lease_duration {
            return Err(OptionsError::RenewIntervalTooLong {
                renew_interval: lease_renew_interval,
                lease_duration,
            });
        }

        let retry_attempts = self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS);
        if retry_attempts == 0 {
            return Err(OptionsError::InvalidRetryAttempts);
        }

        let retry_base = self
            .retry_base_seconds
            .map_or(DEFAULT_RETRY_BASE, Duration::from_secs);
        if retry_base.is_zero() {
            return Err(OptionsError::InvalidRetryBase);
        }

        let lock_resource_name = self
            .lock_resource_name
            .unwrap_or_else(|| DEFAULT_LOCK_RESOURCE_NAME.to_string());
        if lock_resource_name.is_empty() {
            return Err(OptionsError::EmptyLockResourceName);
        }

        Ok(LedgerOptions {
            genesis_hash,
            secret_key,
            queue_capacity,
            lease_duration,
            lease_renew_interval,
            retry_attempts,
            retry_base,
            lock_resource_name,
        })
    }
}

fn secret_from_string<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(String::into_bytes))
}

fn is_lowercase_hex_64(s: &str) -> bool {
    s.len() == 64
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
