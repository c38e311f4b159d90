//! Human-readable order references (`TL7QK2ZD`, `INV-20260301-7QK2ZD`).
//!
//! Candidates are random; uniqueness is guaranteed by the unique index on
//! `orders.reference_code`. A header insert that hits the index is rolled back
//! to its savepoint and retried with a fresh candidate, a bounded number of times.

use chrono::{DateTime, Utc};
use metrics::counter;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, SqlErr, TransactionTrait,
};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::{BookingSettings, ReferenceCodeFormat};
use crate::entities::order;
use crate::errors::ServiceError;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RANDOM_LEN: usize = 6;
const SHORT_PREFIX: &str = "TL";
const INVOICE_PREFIX: &str = "INV";

/// Uniform index source for candidate characters
pub trait RandomSource: Send + Sync {
    /// Returns a value in `0..upper`
    fn next_index(&self, upper: usize) -> usize;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn next_index(&self, upper: usize) -> usize {
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Deterministic source; two instances with the same seed yield the same codes
#[derive(Debug)]
pub struct SeededSource(Mutex<StdRng>);

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededSource {
    fn next_index(&self, upper: usize) -> usize {
        match self.0.lock() {
            Ok(mut rng) => rng.gen_range(0..upper),
            Err(poisoned) => poisoned.into_inner().gen_range(0..upper),
        }
    }
}

#[derive(Clone)]
pub struct ReferenceCodeGenerator {
    format: ReferenceCodeFormat,
    max_attempts: u32,
    precheck: bool,
    random: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for ReferenceCodeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCodeGenerator")
            .field("format", &self.format)
            .field("max_attempts", &self.max_attempts)
            .field("precheck", &self.precheck)
            .finish()
    }
}

impl ReferenceCodeGenerator {
    pub fn new(format: ReferenceCodeFormat, max_attempts: u32, random: Arc<dyn RandomSource>) -> Self {
        Self {
            format,
            max_attempts: max_attempts.max(1),
            precheck: true,
            random,
        }
    }

    pub fn from_settings(settings: &BookingSettings, random: Arc<dyn RandomSource>) -> Self {
        Self::new(
            settings.reference_code_format,
            settings.reference_code_max_attempts,
            random,
        )
    }

    /// Skip the pre-insert existence query and rely on the unique index alone
    pub fn without_precheck(mut self) -> Self {
        self.precheck = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Produces one candidate code; `now` dates the invoice format
    pub fn candidate(&self, now: DateTime<Utc>) -> String {
        let suffix: String = (0..RANDOM_LEN)
            .map(|_| ALPHABET[self.random.next_index(ALPHABET.len())] as char)
            .collect();

        match self.format {
            ReferenceCodeFormat::Short => format!("{}{}", SHORT_PREFIX, suffix),
            ReferenceCodeFormat::Invoice => {
                format!("{}-{}-{}", INVOICE_PREFIX, now.format("%Y%m%d"), suffix)
            }
        }
    }

    /// Application-level existence check
    pub async fn is_taken<C>(&self, conn: &C, code: &str) -> Result<bool, ServiceError>
    where
        C: ConnectionTrait,
    {
        let count = order::Entity::find()
            .filter(order::Column::ReferenceCode.eq(code))
            .count(conn)
            .await?;
        Ok(count > 0)
    }

    /// Inserts the order header built by `build` under a fresh reference code.
    ///
    /// Each attempt runs in a savepoint of `txn`; a unique violation rolls the
    /// savepoint back and tries the next candidate. Exhaustion is a `Conflict`.
    pub async fn insert_order_header<F>(
        &self,
        txn: &DatabaseTransaction,
        now: DateTime<Utc>,
        build: F,
    ) -> Result<order::Model, ServiceError>
    where
        F: Fn(String) -> order::ActiveModel,
    {
        for attempt in 1..=self.max_attempts {
            let code = self.candidate(now);

            if self.precheck && self.is_taken(txn, &code).await? {
                counter!("tiketloka.reference_code.collisions", 1, "stage" => "precheck");
                debug!(attempt, reference_code = %code, "Reference code already taken");
                continue;
            }

            let savepoint = txn.begin().await?;
            match build(code.clone()).insert(&savepoint).await {
                Ok(model) => {
                    savepoint.commit().await?;
                    return Ok(model);
                }
                Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                    savepoint.rollback().await?;
                    counter!("tiketloka.reference_code.collisions", 1, "stage" => "insert");
                    warn!(attempt, reference_code = %code, "Reference code collided on insert");
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    return Err(ServiceError::DatabaseError(err));
                }
            }
        }

        counter!("tiketloka.reference_code.exhausted", 1);
        Err(ServiceError::Conflict(format!(
            "Could not allocate a unique reference code after {} attempts",
            self.max_attempts
        )))
    }
}
