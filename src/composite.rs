//! Composite rate limiter: a priority-ordered stack of heterogeneous limiters.
//!
//! Each entry pairs a name, a priority, a quota, and a boxed limiter. Entries
//! are evaluated in descending priority order (highest number first) and the
//! first denial short-circuits the chain, so a tight per-second guard can sit
//! in front of a looser daily ceiling without paying for both on every
//! request. If every entry allows, the decision returned is the *last*
//! entry checked — the lowest-priority limiter in the stack — not a merge of
//! all of them; a tighter limiter earlier in the chain can still be closer
//! to its own limit without that showing up in the returned `remaining`.
//! This is a known accounting quirk, not a bug: merging would mean loading
//! every limiter's state even when an early one already denied.

use std::future::Future;
use std::pin::Pin;

use crate::algorithm::Algorithm;
use crate::clock::Clock;
use crate::decision::Decision;
use crate::error::Result;
use crate::kv::KvStore;
use crate::quota::Quota;

// Entries are probed in descending priority order — the highest `priority`
// number goes first — so a guard meant to run ahead of the rest just needs
// the largest number in the stack.

/// Object-safe entry point into a rate limiting algorithm, boxed so a
/// [`CompositeLimiter`] can hold a `Vec` of otherwise-unrelated concrete
/// algorithm types behind one trait object.
pub trait DynLimiter<S>: Send + Sync
where
    S: KvStore,
{
    fn check_and_record<'a>(
        &'a self,
        kv: &'a S,
        clock: &'a dyn Clock,
        key: &'a str,
        quota: &'a Quota,
    ) -> Pin<Box<dyn Future<Output = Result<Decision>> + Send + 'a>>;
}

/// Adapts any [`Algorithm`] into a [`DynLimiter`].
struct AlgorithmAdapter<A>(A);

impl<S, A> DynLimiter<S> for AlgorithmAdapter<A>
where
    S: KvStore,
    A: Algorithm,
{
    fn check_and_record<'a>(
        &'a self,
        kv: &'a S,
        clock: &'a dyn Clock,
        key: &'a str,
        quota: &'a Quota,
    ) -> Pin<Box<dyn Future<Output = Result<Decision>> + Send + 'a>> {
        Box::pin(self.0.check_and_record(kv, clock, key, quota))
    }
}

/// One limiter in a composite stack.
pub struct LimiterEntry<S> {
    name: String,
    priority: u32,
    quota: Quota,
    limiter: Box<dyn DynLimiter<S>>,
}

impl<S: KvStore> LimiterEntry<S> {
    /// Wrap any [`Algorithm`] implementation as a composite entry.
    pub fn new<A>(name: impl Into<String>, priority: u32, quota: Quota, algorithm: A) -> Self
    where
        A: Algorithm,
    {
        Self {
            name: name.into(),
            priority,
            quota,
            limiter: Box::new(AlgorithmAdapter(algorithm)),
        }
    }
}

/// Result of a composite check: the deciding limiter's name plus its
/// decision.
#[derive(Debug, Clone)]
pub struct CompositeDecision {
    /// Name of the limiter whose decision is reported (the first to deny,
    /// or the lowest-priority one if all allowed).
    pub limiter_name: String,
    /// The underlying decision.
    pub decision: Decision,
}

impl CompositeDecision {
    /// Whether the composite check allowed the request.
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }
}

/// Priority-ordered stack of rate limiters evaluated as a unit.
#[derive(Default)]
pub struct CompositeLimiter<S> {
    entries: Vec<LimiterEntry<S>>,
}

impl<S: KvStore> CompositeLimiter<S> {
    /// Create an empty composite limiter.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a limiter entry, re-sorting the stack by descending priority.
    pub fn with_entry(mut self, entry: LimiterEntry<S>) -> Self {
        self.entries.push(entry);
        self.entries.sort_by_key(|e| std::cmp::Reverse(e.priority));
        self
    }

    /// Evaluate every limiter in priority order, short-circuiting on the
    /// first denial.
    pub async fn check_and_record(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
    ) -> Result<CompositeDecision> {
        let mut last: Option<CompositeDecision> = None;

        for entry in &self.entries {
            let decision = entry
                .limiter
                .check_and_record(kv, clock, key, &entry.quota)
                .await?;

            if decision.is_denied() {
                return Ok(CompositeDecision {
                    limiter_name: entry.name.clone(),
                    decision,
                });
            }

            last = Some(CompositeDecision {
                limiter_name: entry.name.clone(),
                decision,
            });
        }

        last.ok_or_else(|| {
            crate::error::GatewayError::Config(crate::error::ConfigError::InvalidValue {
                field: "composite_limiter".into(),
                message: "no limiter entries configured".into(),
            })
        })
    }
}
