//! Fuzzing execution loop.
//!
//! Repeats iterations until every obligation has been violated (or the
//! optional iteration cap is hit), shrinking and logging each finding.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use num_bigint::BigUint;
use tayt_types::{field_prime, CompiledArtifact, Felt};
use tracing::{debug, info, warn};

use super::coverage::CoverageAccumulator;
use super::engine::SequenceEngine;
use super::obligations::ObligationSet;
use super::oracle::{ExceptionOracle, Oracle, PropertyOracle};
use super::report::{Finding, FuzzReport, OracleMode};
use super::shrinker::Shrinker;
use super::tx_gen::{default_nonce_range, TxGenerator};
use super::value_gen::ValueGenerator;
use crate::execution::ExecutionClient;
use crate::schema::{SchemaOptions, ALWAYS_BLACKLISTED};
use crate::setup::{self, Deployment, SetupError};

/// Configuration for a fuzz run.
#[derive(Debug, Clone)]
pub struct FuzzConfig {
    /// Calls per generated sequence.
    pub seq_len: usize,
    /// Senders of mutating calls, picked uniformly.
    pub senders: Vec<Felt>,
    /// Sender of property queries.
    pub psender: Felt,
    /// Functions never called, on top of the built-in entry points.
    pub blacklist: BTreeSet<String>,
    /// Minimize violating sequences before reporting them.
    pub shrink: bool,
    pub mode: OracleMode,
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Stop after this many iterations even if obligations remain.
    pub max_iterations: Option<u64>,
    pub property_prefix: String,
    pub modulus: BigUint,
    /// Maximum length of generated arrays.
    pub max_array_len: usize,
    /// Inclusive nonce range of message-handler calls.
    pub nonce_range: (BigUint, BigUint),
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            seq_len: 10,
            senders: vec![Felt::from(0u64), Felt::from(1u64), Felt::from(2u64)],
            psender: Felt::from(1u64),
            blacklist: BTreeSet::new(),
            shrink: true,
            mode: OracleMode::Property,
            seed: 0,
            max_iterations: None,
            property_prefix: "tayt_".to_string(),
            modulus: field_prime(),
            max_array_len: 10,
            nonce_range: default_nonce_range(),
        }
    }
}

impl FuzzConfig {
    /// User blacklist extended with the entry points that are never fuzzed.
    pub fn effective_blacklist(&self) -> BTreeSet<String> {
        let mut blacklist = self.blacklist.clone();
        blacklist.extend(ALWAYS_BLACKLISTED.iter().map(|s| s.to_string()));
        blacklist
    }

    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            property_prefix: self.property_prefix.clone(),
            blacklist: self.effective_blacklist(),
        }
    }
}

/// Runs the fuzz loop against one deployed program.
pub struct FuzzRunner<'a> {
    client: &'a mut dyn ExecutionClient,
    config: FuzzConfig,
    coverage: Arc<CoverageAccumulator>,
}

impl<'a> FuzzRunner<'a> {
    pub fn new(
        client: &'a mut dyn ExecutionClient,
        config: FuzzConfig,
        coverage: Arc<CoverageAccumulator>,
    ) -> Self {
        Self {
            client,
            config,
            coverage,
        }
    }

    /// Declare auxiliary programs and deploy the target.
    pub fn setup(
        &mut self,
        target: Arc<CompiledArtifact>,
        declared: &[Arc<CompiledArtifact>],
    ) -> Result<Deployment, SetupError> {
        setup::deploy(
            &mut *self.client,
            target,
            declared,
            &self.config.schema_options(),
            &self.coverage,
        )
    }

    /// Fuzz until every obligation is violated or the iteration cap is reached.
    pub fn run(&mut self, deployment: &Deployment, target: &str) -> Result<FuzzReport> {
        let config = &self.config;
        let schema = &deployment.schema;
        ensure!(config.seq_len > 0, "sequence length must be at least 1");

        let (obligations, oracle): (Arc<ObligationSet>, Box<dyn Oracle>) = match config.mode {
            OracleMode::Property => {
                let obligations = Arc::new(ObligationSet::new(schema.property_names()));
                let oracle = PropertyOracle::new(
                    deployment.instance.clone(),
                    config.psender.clone(),
                    Arc::clone(&obligations),
                    Arc::clone(&self.coverage),
                );
                (obligations, Box::new(oracle) as Box<dyn Oracle>)
            }
            OracleMode::Exception => {
                let obligations = Arc::new(ObligationSet::new(
                    deployment
                        .diagnostics
                        .iter()
                        .map(|d| d.message_template.clone()),
                ));
                let signatures: BTreeSet<String> = deployment
                    .diagnostics
                    .iter()
                    .map(|d| d.signature.clone())
                    .collect();
                let oracle = ExceptionOracle::new(
                    Arc::clone(&obligations),
                    signatures.into_iter().collect(),
                );
                (obligations, Box::new(oracle) as Box<dyn Oracle>)
            }
        };
        let initial = obligations.live();
        if initial.is_empty() {
            warn!(mode = %config.mode, "nothing to check, no obligations found");
        }

        let values = ValueGenerator::new(config.seed, config.modulus.clone(), config.max_array_len)?;
        let mut tx_gen = TxGenerator::new(values, config.senders.clone(), config.nonce_range.clone())?;
        let engine = SequenceEngine::new(
            deployment.instance.clone(),
            deployment.baseline,
            config.seq_len,
            Arc::clone(&self.coverage),
            !config.shrink,
        );
        let shrinker = Shrinker::new(deployment.instance.clone(), deployment.baseline);

        let start = Instant::now();
        let mut findings = Vec::new();
        let mut iteration = 0u64;

        while !obligations.is_empty() {
            if config.max_iterations.is_some_and(|max| iteration >= max) {
                info!(iterations = iteration, "iteration limit reached");
                break;
            }
            iteration += 1;

            let found = engine
                .run_iteration(&mut *self.client, &mut tx_gen, schema, oracle.as_ref())
                .with_context(|| format!("fuzz iteration {iteration}"))?;
            let Some(found) = found else {
                if iteration % 1000 == 0 {
                    debug!(
                        iterations = iteration,
                        covered = self.coverage.total(),
                        remaining = obligations.len(),
                        "fuzzing"
                    );
                }
                continue;
            };

            let original_len = found.sequence.len();
            let sequence = if config.shrink {
                shrinker
                    .shrink(&mut *self.client, oracle.as_ref(), found.sequence, &found.violations)
                    .context("shrinking violating sequence")?
            } else {
                found.sequence
            };

            let finding = Finding {
                iteration,
                violations: found.violations,
                sequence,
                original_len,
                shrunk: config.shrink,
            };
            finding.log(schema);
            findings.push(finding);
        }

        if obligations.is_empty() {
            info!("All properties have been violated");
        }

        Ok(FuzzReport {
            target: target.to_string(),
            mode: config.mode,
            seed: config.seed,
            iterations: iteration,
            elapsed_ms: start.elapsed().as_millis() as u64,
            obligations: initial,
            remaining: obligations.live(),
            findings,
            covered_instructions: self.coverage.total(),
        })
    }
}
