//! Cached, rate-limited function evolution
//!
//! `Evolver::evolve` never fails for the caller except on authentication
//! errors: every other failure degrades to returning the original body, so
//! the pipeline always has a safe fallback.

use crate::ai::{AiError, AiResult, PromptTemplate, TextTransform};
use crate::cache::{content_digest, CacheStats, EvolutionCache};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

static FENCE: OnceLock<Regex> = OnceLock::new();

fn fence_pattern() -> &'static Regex {
    FENCE.get_or_init(|| Regex::new(r"```javascript|```js|```").expect("fence regex is valid"))
}

/// Retry behaviour for rate-limited calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// How an evolution result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolveOutcome {
    /// Served from the content-addressed cache, no external call
    CacheHit,
    /// The model produced a substantive rewrite
    Rewritten,
    /// The model only changed whitespace or semicolons; original kept
    Cosmetic,
    /// The call failed; original kept and nothing cached
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evolution {
    pub code: String,
    pub outcome: EvolveOutcome,
}

impl Evolution {
    fn fallback(original: &str) -> Self {
        Self {
            code: original.to_string(),
            outcome: EvolveOutcome::Fallback,
        }
    }
}

/// Wraps a `TextTransform` with caching, a FIFO concurrency gate,
/// backoff on rate limits and output sanitization.
pub struct Evolver {
    transform: Arc<dyn TextTransform>,
    cache: EvolutionCache,
    gate: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl Evolver {
    pub fn new(transform: Arc<dyn TextTransform>, max_concurrent: usize, policy: RetryPolicy) -> Self {
        Self {
            transform,
            cache: EvolutionCache::new(),
            // tokio's semaphore is fair: waiters are admitted in arrival order
            gate: Arc::new(Semaphore::new(max_concurrent.max(1))),
            policy,
        }
    }

    /// Share an existing cache instead of starting empty
    pub fn with_cache(mut self, cache: EvolutionCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &EvolutionCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Rewrite a function body.
    ///
    /// Returns `Err` only for authentication failures.
    pub async fn evolve(&self, name: &str, body: &str) -> AiResult<Evolution> {
        if body.trim().is_empty() {
            return Ok(Evolution::fallback(body));
        }

        let key = content_digest(body);
        if let Some(code) = self.cache.lookup(&key) {
            debug!("Cache hit for {} - skipping API call", name);
            return Ok(Evolution {
                code,
                outcome: EvolveOutcome::CacheHit,
            });
        }

        let prompt = PromptTemplate::evolve(name, body);
        self.request(name, key, body, prompt).await
    }

    /// Ask the model to redo a rewrite that failed validation.
    ///
    /// Keyed by the correction request itself, so the broken rewrite cached
    /// under the body's digest is never served back.
    pub async fn correct(&self, name: &str, body: &str, diagnostic: &str) -> AiResult<Evolution> {
        let prompt = PromptTemplate::correction(name, body, diagnostic);
        let key = content_digest(&prompt);
        if let Some(code) = self.cache.lookup(&key) {
            debug!("Cache hit for correction of {}", name);
            return Ok(Evolution {
                code,
                outcome: EvolveOutcome::CacheHit,
            });
        }

        self.request(name, key, body, prompt).await
    }

    async fn request(
        &self,
        name: &str,
        key: String,
        original: &str,
        prompt: String,
    ) -> AiResult<Evolution> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let result = {
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|_| AiError::ConfigError("concurrency gate closed".to_string()))?;
                self.call(prompt.clone()).await
                // permit released here on every path
            };

            match result {
                Ok(raw) => return Ok(self.accept(name, key, original, &raw, started)),
                Err(AiError::RateLimited { .. }) if attempt < self.policy.max_retries => {
                    let wait = self.policy.delay_for(attempt);
                    attempt += 1;
                    info!(
                        "Rate limited on {}. Retry {}/{}. Waiting {:.1}s...",
                        name,
                        attempt,
                        self.policy.max_retries,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) if e.is_fatal() => {
                    error!("Authentication error while evolving {}: {}", name, e);
                    return Err(e);
                }
                Err(e) => {
                    match &e {
                        AiError::Server { .. } => warn!("Server error [{}]: {}", name, e),
                        AiError::RateLimited { .. } => {
                            warn!("Rate limit retries exhausted for {}, keeping original", name)
                        }
                        _ => warn!("Model error [{}]: {}", name, e),
                    }
                    return Ok(Evolution::fallback(original));
                }
            }
        }
    }

    async fn call(&self, prompt: String) -> AiResult<String> {
        let transform = Arc::clone(&self.transform);
        tokio::task::spawn_blocking(move || transform.transform(&prompt))
            .await
            .map_err(|e| AiError::TaskFailed(e.to_string()))?
    }

    fn accept(
        &self,
        name: &str,
        key: String,
        original: &str,
        raw: &str,
        started: Instant,
    ) -> Evolution {
        let sanitized = sanitize_code(raw, original);

        if is_cosmetic_change(original, &sanitized) {
            info!("Skipped [{}]: already optimized (cosmetic changes only)", name);
            self.cache.insert(key, original.to_string());
            return Evolution {
                code: original.to_string(),
                outcome: EvolveOutcome::Cosmetic,
            };
        }

        log_metrics(name, started, original.len(), sanitized.len());
        self.cache.insert(key, sanitized.clone());
        Evolution {
            code: sanitized,
            outcome: EvolveOutcome::Rewritten,
        }
    }
}

fn log_metrics(name: &str, started: Instant, original_len: usize, evolved_len: usize) {
    let elapsed = started.elapsed().as_secs_f64();
    let diff = original_len as i64 - evolved_len as i64;
    let sign = if diff > 0 { '-' } else { '+' };
    info!(
        "Evolved: {} ({} chars -> {} chars) in {:.2}s [Diff: {}{}]",
        name,
        original_len,
        evolved_len,
        elapsed,
        sign,
        diff.abs()
    );
}

/// Strip markdown fences, surrounding blank lines and trailing semicolons.
///
/// Purely textual. An empty result falls back to `fallback`.
pub fn sanitize_code(code: &str, fallback: &str) -> String {
    let unfenced = fence_pattern().replace_all(code, "");
    let cleaned = unfenced.trim().trim_end_matches(';');

    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// True when two snippets differ only in whitespace or semicolons
pub fn is_cosmetic_change(old_code: &str, new_code: &str) -> bool {
    let strip = |s: &str| -> String {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != ';')
            .collect()
    };
    strip(old_code) == strip(new_code)
}

/// Braces and parentheses counts both match
pub fn is_balanced(code: &str) -> bool {
    let count = |ch: char| code.matches(ch).count();
    count('{') == count('}') && count('(') == count(')')
}
