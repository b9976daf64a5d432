use anyhow::Result;

use fairgc::adjudicator::{Party, SessionError, Stage, Verdict};
use fairgc::commitment::ih_root;
use fairgc::dispute::{ChallengeOptions, prepare_challenge};
use fairgc::garble::{garble_instance, recompute_gate_leaf_bytes};
use fairgc::workdir;
use fairgc_integration_tests::harness::{Bench, Wallets};

/// Drive an honest run up to the Settle stage
fn run_to_settle(bench: &mut Bench, m: u32, x: u64) -> Result<()> {
    bench.deposit_both()?;
    let commitments = bench.honest_commitments();
    bench.submit_commitments(commitments)?;
    bench.choose(m)?;
    bench.reveal_openings()?;
    bench.waive_dispute()?;
    bench.reveal_labels(x)?;
    Ok(())
}

#[test]
fn test_honest_success_alice_wins() -> Result<()> {
    let mut bench = Bench::new(8)?;
    run_to_settle(&mut bench, 0, 5)?;
    let output = bench.evaluate(3)?;
    let result = bench.settle(output)?;

    assert!(result, "x=5 > y=3 settles in Alice's favor");
    assert_eq!(bench.session.stage(), Stage::Closed);
    assert_eq!(bench.session.verdict(), Some(Verdict::Settled { result: true }));
    assert_eq!(bench.session.vault_total(), 0);
    assert_eq!(Wallets::settled(&bench.session), Wallets { alice: 3, bob: 5 });
    Ok(())
}

#[test]
fn test_honest_success_bob_wins() -> Result<()> {
    let mut bench = Bench::new(8)?;
    run_to_settle(&mut bench, 7, 2)?;
    let output = bench.evaluate(9)?;
    let result = bench.settle(output)?;

    assert!(!result, "x=2 <= y=9 settles in Bob's favor");
    assert_eq!(bench.session.verdict(), Some(Verdict::Settled { result: false }));
    assert_eq!(Wallets::settled(&bench.session), Wallets { alice: 3, bob: 5 });
    Ok(())
}

#[test]
fn test_alice_cheats_bob_catches() -> Result<()> {
    let mut bench = Bench::new(8)?;
    bench.deposit_both()?;

    // Alice tampers leaf #0 of instance 1 and commits to the tampered chain
    let cheated_instance = 1u32;
    let mut commitments = bench.honest_commitments();
    let mut tampered = garble_instance(
        &bench.secrets.seeds[cheated_instance as usize],
        &bench.circuit_id,
        cheated_instance,
        &bench.layout,
    );
    tampered[0].rows[0][0] ^= 0xFF;
    commitments[cheated_instance as usize].root_gc = ih_root(&tampered);
    bench.submit_commitments(commitments)?;

    bench.choose(0)?;
    bench.reveal_openings()?;

    // Bob audits the opened instance and pinpoints the divergent gate
    let challenge = prepare_challenge(
        bench.session.revealed_seed(cheated_instance as usize).unwrap(),
        &bench.circuit_id,
        cheated_instance,
        &bench.layout,
        &tampered,
        &ChallengeOptions::default(),
    )?;
    assert_eq!(challenge.gate_index, 0);

    let now = bench.tick();
    let verdict = bench
        .session
        .challenge_gate_leaf(Party::Evaluator, &challenge, now)?;

    assert_eq!(verdict, Verdict::Slashed { cheater: Party::Garbler });
    assert_eq!(bench.session.stage(), Stage::Closed);
    assert_eq!(bench.session.vault_total(), 0);
    assert_eq!(Wallets::settled(&bench.session), Wallets { alice: 2, bob: 6 });
    Ok(())
}

#[test]
fn test_bob_false_challenges_honest_alice() -> Result<()> {
    let mut bench = Bench::new(8)?;
    bench.deposit_both()?;
    let commitments = bench.honest_commitments();
    bench.submit_commitments(commitments)?;
    bench.choose(4)?;
    bench.reveal_openings()?;

    // A perfectly valid IH + layout proof over an untampered leaf
    let audited = 2u32;
    let leaves = garble_instance(
        &bench.secrets.seeds[audited as usize],
        &bench.circuit_id,
        audited,
        &bench.layout,
    );
    let challenge = prepare_challenge(
        bench.session.revealed_seed(audited as usize).unwrap(),
        &bench.circuit_id,
        audited,
        &bench.layout,
        &leaves,
        &ChallengeOptions {
            gate_index: Some(3),
            allow_false_challenge: true,
            ..Default::default()
        },
    )?;

    let now = bench.tick();
    let verdict = bench
        .session
        .challenge_gate_leaf(Party::Evaluator, &challenge, now)?;

    // The recomputed leaf matches: the challenger is the cheater
    assert_eq!(verdict, Verdict::Slashed { cheater: Party::Evaluator });
    assert_eq!(Wallets::settled(&bench.session), Wallets { alice: 4, bob: 4 });
    Ok(())
}

#[test]
fn test_alice_times_out_at_commitments() -> Result<()> {
    let mut bench = Bench::new(8)?;
    bench.deposit_both()?;
    assert_eq!(bench.session.stage(), Stage::Commitments);

    let now = bench.expire_deadline();
    bench.session.abort_phase2(Party::Evaluator, now)?;

    assert_eq!(
        bench.session.verdict(),
        Some(Verdict::Aborted { claimant: Party::Evaluator })
    );
    assert_eq!(Wallets::settled(&bench.session), Wallets { alice: 2, bob: 6 });
    Ok(())
}

#[test]
fn test_bad_ih_proof_reverts_without_slashing() -> Result<()> {
    let mut bench = Bench::new(8)?;
    bench.deposit_both()?;
    let commitments = bench.honest_commitments();
    bench.submit_commitments(commitments)?;
    bench.choose(0)?;
    bench.reveal_openings()?;

    let audited = 3u32;
    let leaves = garble_instance(
        &bench.secrets.seeds[audited as usize],
        &bench.circuit_id,
        audited,
        &bench.layout,
    );
    let mut challenge = prepare_challenge(
        bench.session.revealed_seed(audited as usize).unwrap(),
        &bench.circuit_id,
        audited,
        &bench.layout,
        &leaves,
        &ChallengeOptions {
            gate_index: Some(1),
            allow_false_challenge: true,
            ..Default::default()
        },
    )?;
    challenge.ih_proof.nodes[0][0] ^= 1;

    let vault_before = bench.session.vault_total();
    let now = bench.tick();
    let err = bench
        .session
        .challenge_gate_leaf(Party::Evaluator, &challenge, now)
        .unwrap_err();

    assert!(matches!(err, SessionError::Proof(_)));
    assert_eq!(bench.session.stage(), Stage::Dispute);
    assert_eq!(bench.session.vault_total(), vault_before);

    // Bob may still finish the run honestly
    bench.waive_dispute()?;
    bench.reveal_labels(5)?;
    let output = bench.evaluate(3)?;
    assert!(bench.settle(output)?);
    assert_eq!(Wallets::settled(&bench.session), Wallets { alice: 3, bob: 5 });
    Ok(())
}

#[test]
fn test_honest_commitments_survive_any_gate_challenge() -> Result<()> {
    // Round-trip property: an honest Garbler cannot be slashed at any gate
    // of any opened instance
    let mut bench = Bench::new(4)?;
    bench.deposit_both()?;
    let commitments = bench.honest_commitments();
    bench.submit_commitments(commitments)?;
    bench.choose(9)?;
    bench.reveal_openings()?;

    for instance in [0u32, 5] {
        for gate_index in [0u32, 7, bench.layout.gates.len() as u32 - 1] {
            let leaves = garble_instance(
                &bench.secrets.seeds[instance as usize],
                &bench.circuit_id,
                instance,
                &bench.layout,
            );
            let challenge = prepare_challenge(
                bench.session.revealed_seed(instance as usize).unwrap(),
                &bench.circuit_id,
                instance,
                &bench.layout,
                &leaves,
                &ChallengeOptions {
                    gate_index: Some(gate_index),
                    allow_false_challenge: true,
                    ..Default::default()
                },
            )?;
            let mut session = bench.session.clone();
            let verdict = session.challenge_gate_leaf(Party::Evaluator, &challenge, bench.now)?;
            assert_eq!(
                verdict,
                Verdict::Slashed { cheater: Party::Evaluator },
                "instance {} gate {}",
                instance,
                gate_index
            );
        }
    }
    Ok(())
}

#[test]
fn test_leaf_conformance_via_work_directory() -> Result<()> {
    // The prover's exported leaf files, re-read from disk, must agree byte
    // for byte with the verifier's recomputation at every gate
    let bench = Bench::new(4)?;
    let dir = tempfile::tempdir()?;
    workdir::export_artifacts(dir.path(), &bench.secrets.seeds, &bench.circuit_id, &bench.layout)?;

    for instance in [0usize, 9] {
        let leaves = workdir::read_leaves(dir.path(), instance)?;
        assert_eq!(leaves.len(), bench.layout.gates.len());
        for (gate_index, (leaf, desc)) in
            leaves.iter().zip(bench.layout.gates.iter()).enumerate()
        {
            let recomputed = recompute_gate_leaf_bytes(
                &bench.secrets.seeds[instance],
                &bench.circuit_id,
                instance as u32,
                gate_index as u32,
                desc,
            );
            assert_eq!(leaf.to_bytes(), recomputed);
        }
        assert_eq!(
            workdir::read_root_gc(dir.path(), instance)?,
            ih_root(&leaves)
        );
    }
    Ok(())
}

#[test]
fn test_exhaustive_small_comparisons() -> Result<()> {
    // Settlement result equals x > y across the full 3-bit input space
    for x in 0..8u64 {
        for y in 0..8u64 {
            let mut bench = Bench::new(3)?;
            run_to_settle(&mut bench, (x ^ y) as u32 % 10, x)?;
            let output = bench.evaluate(y)?;
            let result = bench.settle(output)?;
            assert_eq!(result, x > y, "x={} y={}", x, y);
        }
    }
    Ok(())
}
