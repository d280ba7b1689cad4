//! Benchmark runner
//!
//! Drives one model through a prompt suite. Prompts are issued with bounded
//! concurrency; a failed request becomes a failed sample and never stops the
//! rest of the suite. Samples come back in suite order.

use crate::client::{ChatEvent, ChatRequest, ChatTransport, Message, OpenAiClient, TokenUsage};
use crate::error::{BenchError, Result, TransportError};
use crate::metrics::PriceTable;
use crate::prompts::{Prompt, PromptSuite};
use crate::quality_metrics::QualityScorer;
use crate::results::{BenchmarkResult, PromptState, Sample, SampleError};
use crate::RunConfig;
use async_channel::{bounded, Receiver, Sender};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Raw outcome of one successful request
#[derive(Debug, Clone)]
struct Completion {
    text: String,
    usage: Option<TokenUsage>,
    first_token: Option<Duration>,
    total: Duration,
}

/// Runs prompt suites against one transport
#[derive(Clone)]
pub struct BenchmarkRunner {
    transport: Arc<dyn ChatTransport>,
    config: RunConfig,
    prices: PriceTable,
    scorer: QualityScorer,
}

impl BenchmarkRunner {
    pub fn new(transport: Arc<dyn ChatTransport>, config: RunConfig) -> Self {
        BenchmarkRunner {
            transport,
            config,
            prices: PriceTable::builtin(),
            scorer: QualityScorer::default(),
        }
    }

    /// Runner over an [`OpenAiClient`] built from `config`.
    pub fn openai(config: RunConfig) -> Result<Self> {
        let client = OpenAiClient::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.timeout(),
            config.concurrency,
        )?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }

    pub fn with_scorer(mut self, scorer: QualityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Static checks that must pass before any request is sent.
    pub fn validate(&self, model: &str, suite: &PromptSuite) -> Result<()> {
        self.config.validate()?;
        if model.trim().is_empty() {
            return Err(BenchError::Config("model identifier is empty".to_string()));
        }
        if suite.is_empty() {
            return Err(BenchError::Config(format!(
                "suite '{}' has no prompts",
                suite.name
            )));
        }
        if self.config.require_pricing {
            self.prices.lookup(model)?;
        }
        Ok(())
    }

    /// Run every prompt of `suite` against `model`.
    pub async fn run(&self, model: &str, suite: &PromptSuite) -> Result<BenchmarkResult> {
        self.validate(model, suite)?;
        if !self.prices.contains(model) {
            warn!(
                "No price entry for model '{}'; cost will be reported as unavailable",
                model
            );
        }

        let total = suite.len();
        info!(
            "Benchmarking {} on suite '{}' ({} prompts, concurrency {}, streaming {})",
            model, suite.name, total, self.config.concurrency, self.config.stream
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let (tx, rx): (Sender<Sample>, Receiver<Sample>) = bounded(total);
        let progress = self.progress_bar(total)?;
        let started = Instant::now();

        let mut handles = Vec::with_capacity(total);
        for (index, prompt) in suite.prompts.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| BenchError::Config(format!("concurrency limiter closed: {}", e)))?;
            let transport = self.transport.clone();
            let tx = tx.clone();
            let progress = progress.clone();
            let request = self.build_request(model, prompt);
            let prompt = prompt.clone();
            let timeout = self.config.timeout();

            let handle = tokio::spawn(async move {
                debug!(index, state = ?PromptState::InFlight, "Sending prompt");
                let outcome = execute(transport.as_ref(), &request, timeout).await;
                drop(permit);
                progress.inc(1);

                let sample = match outcome {
                    Ok(completion) => completed_sample(index, &prompt, &request, completion),
                    Err((e, elapsed)) => {
                        error!("Prompt {} failed: {}", index, e);
                        failed_sample(index, &prompt, &e, elapsed)
                    }
                };
                debug!(index, state = ?sample.state, latency_secs = sample.latency_secs, "Prompt finished");
                let _ = tx.send(sample).await;
            });
            handles.push(handle);
        }

        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Prompt task aborted: {}", e);
            }
        }

        progress.finish_with_message("done");

        // Index-addressed so completion order never leaks into the result
        let mut slots: Vec<Option<Sample>> = vec![None; total];
        while let Ok(sample) = rx.recv().await {
            let index = sample.index;
            slots[index] = Some(sample);
        }

        let mut samples: Vec<Sample> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let e = TransportError::Connection("request task aborted".to_string());
                    failed_sample(index, &suite.prompts[index], &e, Duration::ZERO)
                })
            })
            .collect();

        for sample in samples.iter_mut().filter(|s| s.success()) {
            sample.quality = self.scorer.score(&sample.response, sample.reference.as_deref());
        }

        let estimated = samples
            .iter()
            .filter(|s| s.success() && !s.usage_reported)
            .count();
        if estimated > 0 {
            warn!(
                "{}/{} requests did not return usage stats. Token counts are estimated from word counts.",
                estimated, total
            );
        }

        let result = BenchmarkResult::new(
            model,
            suite.name.clone(),
            self.config.base_url.clone(),
            samples,
            &self.prices,
        );
        info!(
            "Finished {} on '{}' in {:.2}s: {} ok, {} failed",
            model,
            suite.name,
            started.elapsed().as_secs_f64(),
            result.stats.successful,
            result.stats.failed
        );
        Ok(result)
    }

    fn build_request(&self, model: &str, prompt: &Prompt) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![Message::user(prompt.text.clone())],
            max_tokens: prompt.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: self.config.temperature,
            stream: self.config.stream,
        }
    }

    fn progress_bar(&self, total: usize) -> Result<ProgressBar> {
        if !self.config.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map_err(|e| BenchError::Config(format!("invalid progress template: {}", e)))?
                .progress_chars("#>-"),
        );
        Ok(progress)
    }
}

/// Issue one request and time it. Failures carry the time spent before they
/// happened.
async fn execute(
    transport: &dyn ChatTransport,
    request: &ChatRequest,
    timeout: Duration,
) -> std::result::Result<Completion, (TransportError, Duration)> {
    let start = Instant::now();

    let attempt = async {
        let mut events = transport.open(request).await?;
        let mut text = String::new();
        let mut usage = None;
        let mut first_token = None;

        while let Some(event) = events.next().await {
            match event? {
                ChatEvent::Delta(chunk) => {
                    if first_token.is_none() && !chunk.is_empty() {
                        first_token = Some(start.elapsed());
                    }
                    text.push_str(&chunk);
                }
                ChatEvent::Usage(u) => usage = Some(u),
                ChatEvent::Done => break,
            }
        }

        Ok::<_, TransportError>(Completion {
            text,
            usage,
            first_token,
            total: start.elapsed(),
        })
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(completion)) => Ok(completion),
        Ok(Err(e)) => Err((e, start.elapsed())),
        Err(_) => Err((
            TransportError::Timeout(timeout.as_millis() as u64),
            start.elapsed(),
        )),
    }
}

/// Rough token count for servers that do not report usage (words * 1.3).
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }
    ((words as f64 * 1.3) as u32).max(1)
}

fn completed_sample(
    index: usize,
    prompt: &Prompt,
    request: &ChatRequest,
    completion: Completion,
) -> Sample {
    let (input_tokens, output_tokens, usage_reported) = match completion.usage {
        Some(usage) => (usage.prompt_tokens, usage.completion_tokens, true),
        None => (
            estimate_tokens(&prompt.text),
            estimate_tokens(&completion.text),
            false,
        ),
    };

    let latency_secs = completion.total.as_secs_f64();
    // A stream that produced no text has its first token at the end
    let ttft_secs = request.stream.then(|| {
        completion
            .first_token
            .map(|t| t.as_secs_f64())
            .unwrap_or(latency_secs)
    });

    Sample {
        index,
        prompt: prompt.text.clone(),
        category: prompt.category,
        reference: prompt.reference.clone(),
        state: PromptState::Completed,
        ttft_secs,
        latency_secs,
        input_tokens,
        output_tokens,
        usage_reported,
        response: completion.text,
        quality: None,
        error: None,
    }
}

fn failed_sample(index: usize, prompt: &Prompt, e: &TransportError, elapsed: Duration) -> Sample {
    Sample {
        index,
        prompt: prompt.text.clone(),
        category: prompt.category,
        reference: prompt.reference.clone(),
        state: PromptState::Failed,
        ttft_secs: None,
        latency_secs: elapsed.as_secs_f64(),
        input_tokens: 0,
        output_tokens: 0,
        usage_reported: false,
        response: String::new(),
        quality: None,
        error: Some(SampleError::from(e)),
    }
}
