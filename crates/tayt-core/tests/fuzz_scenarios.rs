//! End-to-end fuzzing scenarios against the in-memory executor.

use std::sync::Arc;

use tayt_core::fuzz::{
    replay_sequence, CoverageAccumulator, FuzzConfig, FuzzReport, FuzzRunner, ObligationSet,
    OracleMode, PropertyOracle, SequenceEngine, Shrinker, TxGenerator, ValueGenerator, Violation,
};
use tayt_core::fuzz::tx_gen::default_nonce_range;
use tayt_core::testing::{InMemoryExecutor, MockOutcome, MockProgram};
use tayt_core::{Deployment, SchemaOptions, SetupError};
use tayt_types::{field_prime, Felt};

const SIGNATURE: &str = "tayt.AssertionException";

fn fuzz(program: MockProgram, config: FuzzConfig) -> (FuzzReport, InMemoryExecutor) {
    let artifact = Arc::new(program.artifact().expect("mock artifact"));
    let mut exec = InMemoryExecutor::new(program);
    let coverage = Arc::new(CoverageAccumulator::new());
    let report = {
        let mut runner = FuzzRunner::new(&mut exec, config, coverage);
        let deployment = runner.setup(artifact, &[]).expect("setup should succeed");
        runner.run(&deployment, "mock.json").expect("run should succeed")
    };
    (report, exec)
}

fn deploy(program: &MockProgram, exec: &mut InMemoryExecutor) -> Result<Deployment, SetupError> {
    let artifact = Arc::new(program.artifact().expect("mock artifact"));
    tayt_core::setup::deploy(
        exec,
        artifact,
        &[],
        &FuzzConfig::default().schema_options(),
        &CoverageAccumulator::new(),
    )
}

fn capped(max_iterations: u64) -> FuzzConfig {
    FuzzConfig {
        seed: 7,
        max_iterations: Some(max_iterations),
        ..Default::default()
    }
}

/// `step` three times breaks `tayt_steps`, `flip` once breaks `tayt_flip`.
fn steps_and_flip() -> MockProgram {
    MockProgram::new()
        .external("step", &[], |state, _| {
            state.set("steps", state.get("steps") + 1);
            Ok(MockOutcome::ok().with_event("Stepped", &[state.get("steps")]))
        })
        .external("flip", &[], |state, _| {
            state.set("flipped", 1);
            Ok(MockOutcome::ok())
        })
        .event("Stepped")
        .property("tayt_steps", |state, _| {
            Ok(MockOutcome::holds(state.get("steps") < 3))
        })
        .property("tayt_flip", |state, _| {
            Ok(MockOutcome::holds(state.get("flipped") == 0))
        })
}

#[test]
fn property_false_from_deploy_shrinks_to_empty_sequence() {
    let program = MockProgram::new()
        .external("noop", &[("x", "felt")], |_, _| Ok(MockOutcome::ok()))
        .property("tayt_never", |_, _| Ok(MockOutcome::holds(false)));

    let (report, _) = fuzz(program, capped(10));

    assert!(report.all_violated());
    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.original_len, 1);
    assert!(finding.sequence.is_empty());
    assert_eq!(finding.violations[0].obligation(), "tayt_never");
}

#[test]
fn each_property_shrinks_to_its_minimal_reproducer() {
    let (report, _) = fuzz(steps_and_flip(), capped(500));

    assert!(report.all_violated(), "remaining: {:?}", report.remaining);
    assert_eq!(report.findings.len(), 2);
    for finding in &report.findings {
        assert_eq!(finding.violations.len(), 1);
        let names: Vec<&str> = finding
            .sequence
            .iter()
            .map(|tx| tx.function_name.as_str())
            .collect();
        match finding.violations[0].obligation() {
            "tayt_steps" => assert_eq!(names, vec!["step", "step", "step"]),
            "tayt_flip" => assert_eq!(names, vec!["flip"]),
            other => panic!("unexpected violation {other}"),
        }
        assert!(finding.sequence.len() <= finding.original_len);
    }
}

#[test]
fn property_events_are_reported_with_the_violation() {
    let program = MockProgram::new()
        .external("noop", &[], |_, _| Ok(MockOutcome::ok()))
        .event("Checked")
        .property("tayt_loud", |_, _| {
            Ok(MockOutcome::holds(false).with_event("Checked", &[42]))
        });

    let (report, _) = fuzz(program, capped(5));
    match &report.findings[0].violations[0] {
        Violation::PropertyViolated { name, events } => {
            assert_eq!(name, "tayt_loud");
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].data, vec![Felt::from(42u64)]);
        }
        other => panic!("unexpected violation {other:?}"),
    }
}

#[test]
fn reverting_calls_never_reach_the_oracle() {
    let program = MockProgram::new()
        .external("always_reverts", &[("x", "felt")], |_, _| {
            Err("assert failed".to_string())
        })
        .property("tayt_holds", |_, _| Ok(MockOutcome::holds(true)));

    let (report, exec) = fuzz(program, capped(20));

    assert!(report.findings.is_empty());
    assert_eq!(report.remaining, vec!["tayt_holds".to_string()]);
    assert_eq!(report.iterations, 20);
    assert_eq!(exec.stats().invokes, 20 * 10);
    assert_eq!(exec.stats().per_function["always_reverts"], 20 * 10);
    assert_eq!(exec.stats().readonly_calls, 0);
    // One baseline restore per sequence.
    assert_eq!(exec.stats().restores, 20);
}

#[test]
fn reverting_property_query_is_not_a_violation() {
    let program = MockProgram::new()
        .external("noop", &[], |_, _| Ok(MockOutcome::ok()))
        .property("tayt_reverts", |_, _| Err("assert failed".to_string()));

    let (report, exec) = fuzz(program, capped(10));

    assert!(report.findings.is_empty());
    assert_eq!(report.remaining, vec!["tayt_reverts".to_string()]);
    assert_eq!(exec.stats().readonly_calls, 10 * 10);
    assert_eq!(exec.stats().reverts, 10 * 10);
}

#[test]
fn struct_arguments_are_flattened_in_member_order() {
    let program = MockProgram::new()
        .structure("Uint256", &[("low", "felt"), ("high", "felt")])
        .external("store", &[("amount", "Uint256"), ("tag", "felt")], |state, call| {
            if call.args.len() != 3 {
                return Err(format!("bad calldata length {}", call.args.len()));
            }
            state.set_felt("low", call.args[0].clone());
            state.set_felt("high", call.args[1].clone());
            state.set_felt("tag", call.args[2].clone());
            state.set("stored", 1);
            Ok(MockOutcome::ok())
        })
        .property("tayt_nothing_stored", |state, _| {
            Ok(MockOutcome::holds(state.get("stored") == 0))
        });

    let config = FuzzConfig {
        shrink: false,
        ..capped(5)
    };
    let (report, exec) = fuzz(program, config);

    assert_eq!(exec.stats().reverts, 0);
    assert_eq!(exec.stats().per_function["store"], 1);
    assert!(report.all_violated());
    let sequence = &report.findings[0].sequence;
    assert_eq!(sequence.len(), 1);
    let tx = &sequence[0];
    assert_eq!(tx.function_name, "store");
    assert_eq!(tx.arguments.len(), 3);
    assert_eq!(exec.state().get_felt("low"), tx.arguments[0]);
    assert_eq!(exec.state().get_felt("high"), tx.arguments[1]);
    assert_eq!(exec.state().get_felt("tag"), tx.arguments[2]);
}

#[test]
fn property_query_coverage_is_recorded() {
    let program = MockProgram::new()
        .external("noop", &[], |_, _| Ok(MockOutcome::ok()))
        .property("tayt_covered", |_, _| {
            Ok(MockOutcome::holds(true).with_pcs(&[500, 501]))
        });
    let artifact = Arc::new(program.artifact().unwrap());
    let mut exec = InMemoryExecutor::new(program);
    let coverage = Arc::new(CoverageAccumulator::new());
    let report = {
        let mut runner = FuzzRunner::new(&mut exec, capped(2), Arc::clone(&coverage));
        let deployment = runner.setup(artifact, &[]).unwrap();
        runner.run(&deployment, "mock.json").unwrap()
    };

    assert!(report.findings.is_empty());
    let instance = exec.instance().expect("deployed instance");
    let covered = coverage.covered(instance);
    assert!(covered.contains(&500) && covered.contains(&501));
    assert_eq!(report.covered_instructions, coverage.total());
}

#[test]
fn empty_sequences_are_rejected() {
    let program = MockProgram::new()
        .external("noop", &[], |_, _| Ok(MockOutcome::ok()))
        .property("tayt_holds", |_, _| Ok(MockOutcome::holds(true)));
    let artifact = Arc::new(program.artifact().unwrap());
    let mut exec = InMemoryExecutor::new(program);
    let config = FuzzConfig {
        seq_len: 0,
        ..FuzzConfig::default()
    };
    let mut runner = FuzzRunner::new(&mut exec, config, Arc::new(CoverageAccumulator::new()));
    let deployment = runner.setup(artifact, &[]).unwrap();
    let err = runner.run(&deployment, "mock.json").unwrap_err();
    assert!(err.to_string().contains("sequence length"));
}

#[test]
fn reverted_calls_are_excluded_from_the_sequence() {
    let program = MockProgram::new()
        .external("good", &[], |state, _| {
            state.set("good", state.get("good") + 1);
            Ok(MockOutcome::ok())
        })
        .external("bad", &[], |_, _| Err("nope".to_string()))
        .property("tayt_few_goods", |state, _| {
            Ok(MockOutcome::holds(state.get("good") < 2))
        });

    let config = FuzzConfig {
        shrink: false,
        ..capped(200)
    };
    let (report, _) = fuzz(program, config);

    assert!(report.all_violated());
    let finding = &report.findings[0];
    assert!(!finding.shrunk);
    assert!(finding
        .sequence
        .iter()
        .all(|tx| tx.function_name == "good"));
    assert_eq!(finding.sequence.len(), 2);
}

#[test]
fn exception_mode_retires_only_the_matched_template() {
    let program = MockProgram::new()
        .external("noop", &[], |_, _| Ok(MockOutcome::ok()))
        .external("boom", &[], |_, _| {
            Err(format!(
                "Error at pc=0:17:\nGot an exception while executing a hint.\n{SIGNATURE}: overflow detected"
            ))
        })
        .diagnostic(SIGNATURE, "overflow")
        .diagnostic(SIGNATURE, "underflow");

    let config = FuzzConfig {
        mode: OracleMode::Exception,
        ..capped(50)
    };
    let (report, _) = fuzz(program, config);

    assert_eq!(report.obligations, vec!["overflow", "underflow"]);
    assert_eq!(report.remaining, vec!["underflow".to_string()]);
    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(
        finding.violations,
        vec![Violation::ExceptionRaised {
            template: "overflow".into(),
            message: "overflow detected".into(),
        }]
    );
    assert_eq!(finding.sequence.len(), 1);
    let last = &finding.sequence[0];
    assert_eq!(last.function_name, "boom");
    assert!(last.events_emitted.is_empty());
}

#[test]
fn exception_mode_without_shrinking_keeps_prefix_and_retires_immediately() {
    let program = MockProgram::new()
        .external("arm", &[], |state, _| {
            state.set("armed", 1);
            Ok(MockOutcome::ok())
        })
        .external("fire", &[], |state, _| {
            if state.get("armed") == 1 {
                Err(format!("{SIGNATURE}: bad state reached"))
            } else {
                Ok(MockOutcome::ok())
            }
        })
        .diagnostic(SIGNATURE, "bad state");

    let config = FuzzConfig {
        mode: OracleMode::Exception,
        shrink: false,
        ..capped(200)
    };
    let (report, _) = fuzz(program, config);

    assert!(report.all_violated());
    let sequence = &report.findings[0].sequence;
    assert_eq!(sequence.last().map(|tx| tx.function_name.as_str()), Some("fire"));
    assert!(sequence.iter().any(|tx| tx.function_name == "arm"));
}

#[test]
fn shrunk_sequence_still_reproduces_and_replay_is_idempotent() {
    let program = steps_and_flip();
    let mut exec = InMemoryExecutor::new(program.clone());
    let deployment = deploy(&program, &mut exec).unwrap();
    let coverage = Arc::new(CoverageAccumulator::new());

    let obligations = Arc::new(ObligationSet::new(["tayt_steps"]));
    let oracle = PropertyOracle::new(
        deployment.instance.clone(),
        Felt::from(1u64),
        Arc::clone(&obligations),
        Arc::clone(&coverage),
    );
    let values = ValueGenerator::new(3, field_prime(), 10).unwrap();
    let mut tx_gen = TxGenerator::new(values, vec![Felt::from(0u64)], default_nonce_range()).unwrap();
    let engine = SequenceEngine::new(
        deployment.instance.clone(),
        deployment.baseline,
        10,
        Arc::clone(&coverage),
        false,
    );

    let mut found = None;
    let mut last_total = coverage.total();
    for _ in 0..200 {
        found = engine
            .run_iteration(&mut exec, &mut tx_gen, &deployment.schema, &oracle)
            .unwrap();
        assert!(coverage.total() >= last_total);
        last_total = coverage.total();
        if found.is_some() {
            break;
        }
    }
    let found = found.expect("three steps within 200 sequences");

    let shrinker = Shrinker::new(deployment.instance.clone(), deployment.baseline);
    let shrunk = shrinker
        .shrink(&mut exec, &oracle, found.sequence.clone(), &found.violations)
        .unwrap();
    assert!(shrunk.len() <= found.sequence.len());
    assert!(obligations.is_empty());

    // Fresh obligations, since shrinking retired the original one.
    let verifier = PropertyOracle::new(
        deployment.instance.clone(),
        Felt::from(1u64),
        Arc::new(ObligationSet::new(["tayt_steps"])),
        coverage,
    );
    assert!(shrinker
        .reproduces(&mut exec, &verifier, &shrunk, &found.violations)
        .unwrap());

    replay_sequence(&mut exec, &deployment.instance, &deployment.baseline, &shrunk, |_| false)
        .unwrap();
    let first = exec.state().clone();
    replay_sequence(&mut exec, &deployment.instance, &deployment.baseline, &shrunk, |_| false)
        .unwrap();
    assert_eq!(exec.state(), &first);
    assert_eq!(first.get("steps"), 3);
}

#[test]
fn array_of_tuples_gets_length_prefixed_flat_arguments() {
    let program = MockProgram::new()
        .external(
            "store_pairs",
            &[("pairs_len", "felt"), ("pairs", "(felt, felt)*")],
            |state, call| {
                let len = u64::try_from(call.args[0].as_biguint()).map_err(|e| e.to_string())?;
                if call.args.len() as u64 != 1 + 2 * len {
                    return Err(format!("bad calldata length {}", call.args.len()));
                }
                state.set("calls", state.get("calls") + 1);
                Ok(MockOutcome::ok())
            },
        )
        .property("tayt_ten_calls", |state, _| {
            Ok(MockOutcome::holds(state.get("calls") < 10))
        });

    let config = FuzzConfig {
        shrink: false,
        ..capped(5)
    };
    let (report, exec) = fuzz(program, config);

    assert_eq!(exec.stats().reverts, 0);
    assert!(report.all_violated());
    for tx in &report.findings[0].sequence {
        let len = u64::try_from(tx.arguments[0].as_biguint()).unwrap();
        assert!((1..=10).contains(&len));
        assert_eq!(tx.arguments.len() as u64, 1 + 2 * len);
    }
}

#[test]
fn message_handlers_are_fuzzed_with_a_nonce() {
    let program = MockProgram::new()
        .l1_handler("deposit", &[("from_address", "felt"), ("amount", "felt")], |state, _| {
            state.set("deposits", state.get("deposits") + 1);
            Ok(MockOutcome::ok())
        })
        .property("tayt_no_deposit", |state, _| {
            Ok(MockOutcome::holds(state.get("deposits") == 0))
        });

    let (report, _) = fuzz(
        program,
        FuzzConfig {
            shrink: false,
            ..capped(5)
        },
    );

    let tx = &report.findings[0].sequence[0];
    assert_eq!(tx.entry_point_type, tayt_core::EntryPointType::L1Handler);
    let nonce = tx.nonce.clone().expect("message handler nonce");
    let (low, high) = default_nonce_range();
    assert!(nonce.as_biguint() >= &low && nonce.as_biguint() <= &high);
}

#[test]
fn setup_rejects_unsupported_programs() {
    let with_args = MockProgram::new()
        .constructor(&[("owner", "felt")], |_, _| Ok(MockOutcome::ok()))
        .external("noop", &[], |_, _| Ok(MockOutcome::ok()));
    let mut exec = InMemoryExecutor::new(with_args.clone());
    assert!(matches!(
        deploy(&with_args, &mut exec),
        Err(SetupError::ConstructorWithArguments { inputs: 1 })
    ));

    let reverting = MockProgram::new()
        .constructor(&[], |_, _| Err("not today".to_string()))
        .external("noop", &[], |_, _| Ok(MockOutcome::ok()));
    let mut exec = InMemoryExecutor::new(reverting.clone());
    match deploy(&reverting, &mut exec) {
        Err(SetupError::ConstructorReverted(message)) => assert_eq!(message, "not today"),
        other => panic!("expected constructor revert, got {other:?}"),
    }

    let views_only = MockProgram::new()
        .property("tayt_fine", |_, _| Ok(MockOutcome::holds(true)))
        .external("constructor_helper", &[], |_, _| Ok(MockOutcome::ok()));
    let mut exec = InMemoryExecutor::new(views_only.clone());
    let options = SchemaOptions {
        blacklist: ["constructor_helper".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let artifact = Arc::new(views_only.artifact().unwrap());
    let result = tayt_core::setup::deploy(
        &mut exec,
        artifact,
        &[],
        &options,
        &CoverageAccumulator::new(),
    );
    assert!(matches!(result, Err(SetupError::NoMutatingFunctions)));

    let missing_abi = tayt_types::CompiledArtifact::from_value(serde_json::json!({}));
    let err = SetupError::from(missing_abi.unwrap_err());
    assert!(matches!(err, SetupError::MissingAbi));
}

#[test]
fn constructor_coverage_is_recorded_at_deploy() {
    let program = MockProgram::new()
        .constructor(&[], |state, _| {
            state.set("owner", 1);
            Ok(MockOutcome::ok().with_pcs(&[100, 101]))
        })
        .external("noop", &[], |_, _| Ok(MockOutcome::ok()));
    let artifact = Arc::new(program.artifact().unwrap());
    let mut exec = InMemoryExecutor::new(program);
    let coverage = CoverageAccumulator::new();
    let deployment = tayt_core::setup::deploy(
        &mut exec,
        artifact,
        &[],
        &SchemaOptions::default(),
        &coverage,
    )
    .unwrap();

    let covered = coverage.covered(&deployment.instance);
    assert!(covered.contains(&100) && covered.contains(&101));
    assert_eq!(coverage.class_of(&deployment.instance), Some(deployment.class_hash.clone()));
    assert!(deployment.classes.contains_key(&deployment.class_hash));
    assert_eq!(exec.state().get("owner"), 1);
}
