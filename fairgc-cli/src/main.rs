//! Command line drivers for both protocol parties.
//!
//! The parties share a session directory standing in for the ledger: every
//! command loads `session.json`, applies one adjudicator transition with the
//! current wall clock, and stores the result. The Garbler's instance seeds
//! live next to it in `garbler-secrets.json`.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fairgc::adjudicator::{Party, Session, SessionConfig, StageDeltas};
use fairgc::circuit::{CircuitLayout, GateDescriptor, GateType, comparator_circuit};
use fairgc::commitment::{IhProof, ih_root, layout_root, result_anchors};
use fairgc::constants::{DEFAULT_DEPOSIT, NUM_INSTANCES};
use fairgc::dispute::{Challenge, ChallengeOptions, prepare_challenge};
use fairgc::evaluator::{EvalPackage, assemble_inputs, evaluate_instance};
use fairgc::garbler::{
    GarblerSecrets, alice_input_labels, build_commitments, build_eval_package, opening_seeds,
};
use fairgc::hash::Digest32;
use fairgc::label::{CircuitId, Seed, WireLabel};
use fairgc::ot::select_input_labels;
use fairgc::workdir;

/// Fair-exchange millionaires protocol driver
#[derive(Parser, Debug)]
#[command(name = "fairgc-cli")]
#[command(about = "Collateralized fair exchange over deterministic garbled circuits")]
#[command(version)]
struct Args {
    /// Directory holding session.json, the parties' shared ledger stand-in
    #[arg(long, global = true, default_value = ".")]
    session_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a fresh session in the Deposits stage
    Init {
        /// Session circuit identifier (hex bytes32 or a small integer)
        #[arg(long)]
        circuit_id: String,
        /// Comparator bit width
        #[arg(long)]
        bit_width: u16,
        /// Collateral per party
        #[arg(long, default_value_t = DEFAULT_DEPOSIT)]
        deposit: u64,
        /// Uniform per-stage deadline window in seconds
        #[arg(long, default_value_t = fairgc::constants::DEFAULT_STAGE_DELTA_SECS)]
        stage_delta: u64,
    },
    /// Print the session state
    Status,
    /// Garbler-side operations
    Garbler {
        #[command(subcommand)]
        command: GarblerCommands,
    },
    /// Evaluator-side operations
    Evaluator {
        #[command(subcommand)]
        command: EvaluatorCommands,
    },
}

#[derive(Subcommand, Debug)]
enum GarblerCommands {
    /// Lock the Garbler's collateral
    Deposit {
        /// Amount to lock
        #[arg(long, default_value_t = DEFAULT_DEPOSIT)]
        amount: u64,
    },
    /// Withdraw the Garbler's deposit while still in Deposits
    Refund,
    /// Publish all ten instance commitments atomically
    SubmitCommitments {
        /// Comparator bit width
        #[arg(long)]
        bit_width: u16,
        /// Session circuit identifier
        #[arg(long)]
        circuit_id: String,
        /// JSON array of ten hex rootGC overrides
        #[arg(long, conflicts_with = "export_dir")]
        root_gcs: Option<String>,
        /// Derive rootGC values from the leaf files in this work directory
        #[arg(long)]
        export_dir: Option<PathBuf>,
        /// JSON array of ten hex h0 overrides
        #[arg(long)]
        h0: Option<String>,
        /// JSON array of ten hex h1 overrides
        #[arg(long)]
        h1: Option<String>,
    },
    /// Reveal the seeds of every non-chosen instance
    RevealOpenings {
        /// The Evaluator's chosen instance (must match the session)
        #[arg(long)]
        m: u32,
        /// Comparator bit width
        #[arg(long)]
        bit_width: u16,
        /// Session circuit identifier
        #[arg(long)]
        circuit_id: String,
    },
    /// Reveal the Garbler's input labels for instance m
    RevealLabels {
        /// JSON label file produced by prepare-eval
        #[arg(long)]
        labels_file: PathBuf,
    },
    /// Write the evaluation payload and the Garbler's label file
    PrepareEval {
        /// The chosen instance
        #[arg(long)]
        m: u32,
        /// The Garbler's private input
        #[arg(long)]
        x: u64,
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,
        /// Comparator bit width
        #[arg(long)]
        bit_width: u16,
        /// Session circuit identifier
        #[arg(long)]
        circuit_id: String,
    },
    /// Write the prover work directory (seeds, leaves, roots) per instance
    ExportArtifacts {
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,
        /// Comparator bit width
        #[arg(long)]
        bit_width: u16,
        /// Session circuit identifier
        #[arg(long)]
        circuit_id: String,
    },
    /// Print the result anchors of every instance
    DeriveAnchors {
        /// Comparator bit width
        #[arg(long)]
        bit_width: u16,
        /// Session circuit identifier
        #[arg(long)]
        circuit_id: String,
    },
    /// Advance out of Dispute once the window expired
    CloseDispute,
    /// Claim both deposits after the Evaluator failed to choose
    AbortPhase3,
    /// Claim both deposits after the Evaluator failed to settle
    AbortPhase6,
}

#[derive(Subcommand, Debug)]
enum EvaluatorCommands {
    /// Lock the Evaluator's collateral
    Deposit {
        /// Amount to lock
        #[arg(long, default_value_t = DEFAULT_DEPOSIT)]
        amount: u64,
    },
    /// Withdraw the Evaluator's deposit while still in Deposits
    Refund,
    /// Pick the evaluation instance
    Choose {
        /// Instance index in [0, 10)
        #[arg(long)]
        m: u32,
    },
    /// Evaluate the chosen instance with the Evaluator's private input
    EvaluateM {
        /// Directory written by the Garbler's prepare-eval
        #[arg(long)]
        eval_dir: PathBuf,
        /// The Evaluator's private input
        #[arg(long)]
        y: u64,
    },
    /// Scan an opened instance for a divergent leaf and build a challenge
    PrepareDispute {
        /// Opened instance to audit
        #[arg(long)]
        instance_id: u32,
        /// The revealed seed for that instance (hex)
        #[arg(long)]
        seed: String,
        /// Leaf file published by the prover
        #[arg(long)]
        claimed_leaves_file: PathBuf,
        /// Require the claimed leaves to fold to this rootGC (hex)
        #[arg(long)]
        expected_root_gc: Option<String>,
        /// Challenge this gate instead of scanning
        #[arg(long)]
        gate_index: Option<u32>,
        /// Build a challenge even if every leaf matches the seed
        #[arg(long, default_value_t = false)]
        allow_false_challenge: bool,
    },
    /// Submit a single-gate challenge to the adjudicator
    Dispute {
        /// Opened instance the gate belongs to
        #[arg(long)]
        instance_id: u32,
        /// The revealed seed for that instance (hex)
        #[arg(long)]
        seed: String,
        /// Position of the gate in the layout
        #[arg(long)]
        gate_index: u32,
        /// Gate type code (AND=0, XOR=1, NOT=2)
        #[arg(long)]
        gate_type: u8,
        /// First input wire
        #[arg(long)]
        wire_a: u16,
        /// Second input wire (0 for NOT)
        #[arg(long)]
        wire_b: u16,
        /// Output wire
        #[arg(long)]
        wire_c: u16,
        /// The committed 71-byte leaf (hex)
        #[arg(long)]
        leaf_bytes: String,
        /// Comma-separated IH proof nodes (hex)
        #[arg(long, default_value = "")]
        ih_proof: String,
        /// Comma-separated layout proof nodes (hex)
        #[arg(long, default_value = "")]
        layout_proof: String,
    },
    /// Submit the output label for settlement
    Settle {
        /// The 16-byte output label (hex)
        #[arg(long)]
        output_label: String,
    },
    /// Advance out of Dispute without a challenge
    CloseDispute,
    /// Claim both deposits after the Garbler failed to commit
    AbortPhase2,
    /// Claim both deposits after the Garbler failed to open
    AbortPhase4,
    /// Claim both deposits after the Garbler withheld her labels
    AbortPhase5,
}

/// On-disk session state shared by both parties
#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    bit_width: u16,
    session: Session,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before 1970")
        .as_secs()
}

fn session_path(dir: &Path) -> PathBuf {
    dir.join("session.json")
}

fn secrets_path(dir: &Path) -> PathBuf {
    dir.join("garbler-secrets.json")
}

fn load_session(dir: &Path) -> Result<SessionFile> {
    let path = session_path(dir);
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("No session at {}; run init first", path.display()))?;
    let file = serde_json::from_str(&data)?;
    Ok(file)
}

fn store_session(dir: &Path, file: &SessionFile) -> Result<()> {
    let json = serde_json::to_string_pretty(file)?;
    std::fs::write(session_path(dir), json)?;
    Ok(())
}

fn parse_circuit_id(text: &str) -> Result<CircuitId> {
    if let Ok(value) = text.parse::<u64>() {
        return Ok(CircuitId::from_u64(value));
    }
    Ok(CircuitId(workdir::parse_hex32(text)?))
}

fn parse_label(text: &str) -> Result<WireLabel> {
    let bytes = workdir::parse_hex(text)?;
    if bytes.len() != 16 {
        bail!("Expected a 16-byte label, got {} bytes", bytes.len());
    }
    let mut label = [0u8; 16];
    label.copy_from_slice(&bytes);
    Ok(WireLabel::new(label))
}

fn parse_digest_list(text: &str) -> Result<Vec<Digest32>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(workdir::parse_hex32)
        .collect()
}

fn parse_digest_json(text: &str) -> Result<[Digest32; NUM_INSTANCES]> {
    let values: Vec<String> = serde_json::from_str(text)?;
    if values.len() != NUM_INSTANCES {
        bail!("Expected {} hex values, got {}", NUM_INSTANCES, values.len());
    }
    let mut digests = [[0u8; 32]; NUM_INSTANCES];
    for (digest, value) in digests.iter_mut().zip(values.iter()) {
        *digest = workdir::parse_hex32(value)?;
    }
    Ok(digests)
}

/// Check a command's circuit parameters against the session before using
/// them for derivation
fn check_session_params(
    file: &SessionFile,
    bit_width: u16,
    circuit_id: &CircuitId,
) -> Result<CircuitLayout> {
    if bit_width != file.bit_width {
        bail!(
            "Session uses bit width {}, got {}",
            file.bit_width,
            bit_width
        );
    }
    if circuit_id != file.session.circuit_id() {
        bail!("Circuit id does not match the session");
    }
    comparator_circuit(bit_width)
}

fn load_or_create_secrets(dir: &Path) -> Result<GarblerSecrets> {
    let path = secrets_path(dir);
    if path.exists() {
        return GarblerSecrets::load_json(&path);
    }
    let mut rng = ChaCha12Rng::from_rng(&mut rand::rng());
    let secrets = GarblerSecrets::generate(&mut rng);
    secrets.save_json(&path)?;
    println!("Generated fresh instance seeds at {}", path.display());
    Ok(secrets)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let dir = args.session_dir.as_path();

    match args.command {
        Commands::Init {
            circuit_id,
            bit_width,
            deposit,
            stage_delta,
        } => {
            let circuit_id = parse_circuit_id(&circuit_id)?;
            let layout = comparator_circuit(bit_width)?;
            let config = SessionConfig {
                deposit_garbler: deposit,
                deposit_evaluator: deposit,
                stage_deltas: StageDeltas::uniform(stage_delta),
            };
            std::fs::create_dir_all(dir)?;
            let file = SessionFile {
                bit_width,
                session: Session::new(config, circuit_id, layout_root(&layout.gates), now()),
            };
            store_session(dir, &file)?;
            println!(
                "Session created: {} gates, layout root {}",
                layout.gates.len(),
                hex::encode(file.session.circuit_layout_root())
            );
        }
        Commands::Status => {
            let file = load_session(dir)?;
            let session = &file.session;
            println!("Stage:    {:?}", session.stage());
            println!("Deadline: {}", session.deadline());
            println!(
                "Vault:    garbler={} evaluator={}",
                session.vault(Party::Garbler),
                session.vault(Party::Evaluator)
            );
            if let Some(m) = session.chosen() {
                println!("Chosen:   {}", m);
            }
            for payout in session.payouts() {
                println!("Payout:   {} -> {:?}", payout.amount, payout.to);
            }
            if let Some(verdict) = session.verdict() {
                println!("Verdict:  {:?}", verdict);
            }
            if let Some(result) = session.result() {
                println!("Result:   {}", if result { "garbler wins" } else { "evaluator wins" });
            }
        }
        Commands::Garbler { command } => run_garbler(dir, command)?,
        Commands::Evaluator { command } => run_evaluator(dir, command)?,
    }
    Ok(())
}

fn run_garbler(dir: &Path, command: GarblerCommands) -> Result<()> {
    let mut file = load_session(dir)?;
    match command {
        GarblerCommands::Deposit { amount } => {
            file.session.deposit(Party::Garbler, amount, now())?;
            println!("Garbler deposit locked; stage is {:?}", file.session.stage());
        }
        GarblerCommands::Refund => {
            file.session.refund(Party::Garbler, now())?;
            println!("Garbler deposit refunded");
        }
        GarblerCommands::SubmitCommitments {
            bit_width,
            circuit_id,
            root_gcs,
            export_dir,
            h0,
            h1,
        } => {
            let circuit_id = parse_circuit_id(&circuit_id)?;
            let layout = check_session_params(&file, bit_width, &circuit_id)?;
            let secrets = load_or_create_secrets(dir)?;
            let mut commitments = build_commitments(&secrets.seeds, &circuit_id, &layout);

            if let Some(json) = root_gcs {
                let roots = parse_digest_json(&json)?;
                for (commitment, root) in commitments.iter_mut().zip(roots.iter()) {
                    commitment.root_gc = *root;
                }
            } else if let Some(export_dir) = export_dir {
                // Commit to whatever the work directory holds, tampered or not
                for (instance, commitment) in commitments.iter_mut().enumerate() {
                    let leaves = workdir::read_leaves(&export_dir, instance)?;
                    commitment.root_gc = ih_root(&leaves);
                }
            }
            if let Some(json) = h0 {
                let anchors = parse_digest_json(&json)?;
                for (commitment, anchor) in commitments.iter_mut().zip(anchors.iter()) {
                    commitment.h0 = *anchor;
                }
            }
            if let Some(json) = h1 {
                let anchors = parse_digest_json(&json)?;
                for (commitment, anchor) in commitments.iter_mut().zip(anchors.iter()) {
                    commitment.h1 = *anchor;
                }
            }

            file.session
                .submit_commitments(Party::Garbler, commitments, now())?;
            println!("Commitments submitted; stage is {:?}", file.session.stage());
        }
        GarblerCommands::RevealOpenings {
            m,
            bit_width,
            circuit_id,
        } => {
            let circuit_id = parse_circuit_id(&circuit_id)?;
            check_session_params(&file, bit_width, &circuit_id)?;
            if file.session.chosen() != Some(m) {
                bail!("Session chose {:?}, not {}", file.session.chosen(), m);
            }
            let secrets = load_or_create_secrets(dir)?;
            let open = file.session.open_indices().to_vec();
            let (indices, seeds) = opening_seeds(&secrets.seeds, &open);
            file.session
                .reveal_openings(Party::Garbler, &indices, &seeds, now())?;
            println!("Opened {} instances; stage is {:?}", indices.len(), file.session.stage());
        }
        GarblerCommands::RevealLabels { labels_file } => {
            let data = std::fs::read_to_string(&labels_file)
                .with_context(|| format!("Failed to read {}", labels_file.display()))?;
            let labels: Vec<WireLabel> = serde_json::from_str(&data)?;
            file.session
                .reveal_garbler_labels(Party::Garbler, labels, now())?;
            println!("Labels revealed; stage is {:?}", file.session.stage());
        }
        GarblerCommands::PrepareEval {
            m,
            x,
            out_dir,
            bit_width,
            circuit_id,
        } => {
            let circuit_id = parse_circuit_id(&circuit_id)?;
            let layout = check_session_params(&file, bit_width, &circuit_id)?;
            let secrets = load_or_create_secrets(dir)?;
            if m as usize >= NUM_INSTANCES {
                bail!("Instance {} out of range", m);
            }
            let seed = &secrets.seeds[m as usize];
            std::fs::create_dir_all(&out_dir)?;

            let package = build_eval_package(seed, &circuit_id, m, &layout, bit_width);
            package.save_binary(out_dir.join("eval-package.bin"))?;

            let labels = alice_input_labels(seed, &circuit_id, m, &layout, x)?;
            let labels_path = out_dir.join("alice-labels.json");
            std::fs::write(&labels_path, serde_json::to_string_pretty(&labels)?)?;
            println!(
                "Evaluation payload at {}; reveal labels later with --labels-file {}",
                out_dir.join("eval-package.bin").display(),
                labels_path.display()
            );
        }
        GarblerCommands::ExportArtifacts {
            out_dir,
            bit_width,
            circuit_id,
        } => {
            let circuit_id = parse_circuit_id(&circuit_id)?;
            let layout = check_session_params(&file, bit_width, &circuit_id)?;
            let secrets = load_or_create_secrets(dir)?;
            workdir::export_artifacts(&out_dir, &secrets.seeds, &circuit_id, &layout)?;
            println!("Work directory written to {}", out_dir.display());
        }
        GarblerCommands::DeriveAnchors {
            bit_width,
            circuit_id,
        } => {
            let circuit_id = parse_circuit_id(&circuit_id)?;
            let layout = check_session_params(&file, bit_width, &circuit_id)?;
            let secrets = load_or_create_secrets(dir)?;
            let mut h0 = Vec::new();
            let mut h1 = Vec::new();
            for (instance, seed) in secrets.seeds.iter().enumerate() {
                let (a0, a1) = result_anchors(seed, &circuit_id, instance as u32, &layout);
                h0.push(hex::encode(a0));
                h1.push(hex::encode(a1));
            }
            println!("{}", serde_json::json!({ "h0": h0, "h1": h1 }));
        }
        GarblerCommands::CloseDispute => {
            file.session.close_dispute(Party::Garbler, now())?;
            println!("Dispute window closed; stage is {:?}", file.session.stage());
        }
        GarblerCommands::AbortPhase3 => {
            file.session.abort_phase3(Party::Garbler, now())?;
            println!("Aborted: evaluator never chose; both deposits claimed");
        }
        GarblerCommands::AbortPhase6 => {
            file.session.abort_phase6(Party::Garbler, now())?;
            println!("Aborted: evaluator never settled; both deposits claimed");
        }
    }
    store_session(dir, &file)
}

fn run_evaluator(dir: &Path, command: EvaluatorCommands) -> Result<()> {
    let mut file = load_session(dir)?;
    match command {
        EvaluatorCommands::Deposit { amount } => {
            file.session.deposit(Party::Evaluator, amount, now())?;
            println!("Evaluator deposit locked; stage is {:?}", file.session.stage());
        }
        EvaluatorCommands::Refund => {
            file.session.refund(Party::Evaluator, now())?;
            println!("Evaluator deposit refunded");
        }
        EvaluatorCommands::Choose { m } => {
            file.session.choose(Party::Evaluator, m, now())?;
            println!("Chose instance {}; stage is {:?}", m, file.session.stage());
        }
        EvaluatorCommands::EvaluateM { eval_dir, y } => {
            let package = EvalPackage::load_binary(eval_dir.join("eval-package.bin"))?;
            if Some(package.instance_id) != file.session.chosen() {
                bail!(
                    "Payload is for instance {}, session chose {:?}",
                    package.instance_id,
                    file.session.chosen()
                );
            }
            let layout = comparator_circuit(package.bit_width)?;
            let alice_labels = file
                .session
                .garbler_labels()
                .context("Garbler labels not revealed yet")?;
            let bob_labels = select_input_labels(&package.bob_wire_labels, y)?;
            let inputs = assemble_inputs(&layout, alice_labels, &bob_labels)?;
            let output = evaluate_instance(
                &package.circuit_id,
                package.instance_id,
                &layout,
                &package.leaves,
                &inputs,
            )?;
            println!("Output label: {}", hex::encode(output.as_bytes()));
            println!("Settle with: evaluator settle --output-label {}", hex::encode(output.as_bytes()));
        }
        EvaluatorCommands::PrepareDispute {
            instance_id,
            seed,
            claimed_leaves_file,
            expected_root_gc,
            gate_index,
            allow_false_challenge,
        } => {
            let seed = Seed(workdir::parse_hex32(&seed)?);
            let layout = comparator_circuit(file.bit_width)?;
            let claimed = workdir::read_leaves_file(&claimed_leaves_file)?;
            let options = ChallengeOptions {
                gate_index,
                expected_root_gc: expected_root_gc
                    .as_deref()
                    .map(workdir::parse_hex32)
                    .transpose()?,
                allow_false_challenge,
            };
            let challenge = prepare_challenge(
                &seed,
                file.session.circuit_id(),
                instance_id,
                &layout,
                &claimed,
                &options,
            )?;
            let path = dir.join("challenge.json");
            std::fs::write(&path, serde_json::to_string_pretty(&challenge)?)?;
            println!(
                "Challenge against gate {} of instance {} written to {}",
                challenge.gate_index,
                challenge.instance_id,
                path.display()
            );
        }
        EvaluatorCommands::Dispute {
            instance_id,
            seed,
            gate_index,
            gate_type,
            wire_a,
            wire_b,
            wire_c,
            leaf_bytes,
            ih_proof,
            layout_proof,
        } => {
            let seed = Seed(workdir::parse_hex32(&seed)?);
            let commitments = file
                .session
                .commitments()
                .context("No commitments submitted yet")?;
            let com_seed = fairgc::hash::keccak256(&[&seed.0]);
            if commitments
                .get(instance_id as usize)
                .map(|c| c.com_seed)
                != Some(com_seed)
            {
                bail!("Seed does not match comSeed of instance {}", instance_id);
            }
            let challenge = Challenge {
                instance_id,
                gate_index,
                desc: GateDescriptor {
                    gate_type: GateType::from_code(gate_type)?,
                    wire_a,
                    wire_b,
                    wire_c,
                },
                leaf_bytes: workdir::parse_hex(&leaf_bytes)?,
                ih_proof: IhProof {
                    nodes: parse_digest_list(&ih_proof)?,
                },
                layout_proof: parse_digest_list(&layout_proof)?,
            };
            let verdict = file
                .session
                .challenge_gate_leaf(Party::Evaluator, &challenge, now())?;
            println!("Challenge adjudicated: {:?}", verdict);
        }
        EvaluatorCommands::Settle { output_label } => {
            let label = parse_label(&output_label)?;
            let result = file.session.settle(Party::Evaluator, label, now())?;
            println!(
                "Settled: {}",
                if result { "garbler wins" } else { "evaluator wins" }
            );
        }
        EvaluatorCommands::CloseDispute => {
            file.session.close_dispute(Party::Evaluator, now())?;
            println!("Dispute waived; stage is {:?}", file.session.stage());
        }
        EvaluatorCommands::AbortPhase2 => {
            file.session.abort_phase2(Party::Evaluator, now())?;
            println!("Aborted: garbler never committed; both deposits claimed");
        }
        EvaluatorCommands::AbortPhase4 => {
            file.session.abort_phase4(Party::Evaluator, now())?;
            println!("Aborted: garbler never opened; both deposits claimed");
        }
        EvaluatorCommands::AbortPhase5 => {
            file.session.abort_phase5(Party::Evaluator, now())?;
            println!("Aborted: garbler withheld labels; both deposits claimed");
        }
    }
    store_session(dir, &file)
}
