use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commitment::{InstanceCommitment, verify_ih, verify_layout};
use crate::constants::NUM_INSTANCES;
use crate::dispute::Challenge;
use crate::garble::recompute_gate_leaf_bytes;
use crate::hash::{Digest32, keccak256};
use crate::label::{CircuitId, Seed, WireLabel};

/// The two protocol parties, also used as caller identity on every
/// transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    /// Alice: garbles, commits, opens, reveals labels
    Garbler,
    /// Bob: chooses, disputes, evaluates, settles
    Evaluator,
}

impl Party {
    fn index(self) -> usize {
        match self {
            Party::Garbler => 0,
            Party::Evaluator => 1,
        }
    }

    /// The counterparty
    pub fn other(self) -> Party {
        match self {
            Party::Garbler => Party::Evaluator,
            Party::Evaluator => Party::Garbler,
        }
    }
}

/// Protocol stage; strictly linear with `Closed` as the only terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Both parties lock collateral
    Deposits,
    /// Garbler publishes the ten instance commitments
    Commitments,
    /// Evaluator picks the evaluation instance `m`
    Choose,
    /// Garbler reveals the nine non-chosen seeds
    Open,
    /// Evaluator may submit single-gate challenges
    Dispute,
    /// Garbler reveals her input labels for instance `m`
    Labels,
    /// Evaluator submits the output label
    Settle,
    /// Terminal; vault fully disbursed or refunded
    Closed,
}

/// Transition rejection; every error reverts the whole transition with no
/// state change and no balance movement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Caller's transition is illegal in the current stage
    #[error("operation not valid in stage {0:?}")]
    Stage(Stage),
    /// Caller is not the party authorized for this transition
    #[error("{0:?} is not authorized for this operation")]
    Auth(Party),
    /// Progress attempted after the deadline, or abort attempted before it
    #[error("deadline violation: now {now}, deadline {deadline}")]
    Deadline {
        /// Ledger time of the attempted transition
        now: u64,
        /// Deadline of the current stage
        deadline: u64,
    },
    /// Wrong deposit amount, double deposit, or refund without balance
    #[error("economic rule violated: {0}")]
    Economic(String),
    /// Seed reveal or reveal-set shape does not match the commitments
    #[error("commitment mismatch: {0}")]
    Commitment(String),
    /// Bad layout proof, bad IH proof, or wrong leaf length
    #[error("proof rejected: {0}")]
    Proof(String),
    /// Output label in settle matches neither result anchor
    #[error("output label matches neither result anchor")]
    Output,
}

/// Per-stage deadline windows in seconds. A stage can never extend its own
/// deadline; the window is installed when the stage is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDeltas {
    /// Deposits window
    pub deposits: u64,
    /// Commitments window
    pub commitments: u64,
    /// Choose window
    pub choose: u64,
    /// Open window
    pub open: u64,
    /// Dispute window
    pub dispute: u64,
    /// Labels window
    pub labels: u64,
    /// Settle window
    pub settle: u64,
}

impl StageDeltas {
    /// Uniform window for every stage
    pub fn uniform(delta: u64) -> Self {
        StageDeltas {
            deposits: delta,
            commitments: delta,
            choose: delta,
            open: delta,
            dispute: delta,
            labels: delta,
            settle: delta,
        }
    }

    fn for_stage(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Deposits => self.deposits,
            Stage::Commitments => self.commitments,
            Stage::Choose => self.choose,
            Stage::Open => self.open,
            Stage::Dispute => self.dispute,
            Stage::Labels => self.labels,
            Stage::Settle => self.settle,
            Stage::Closed => 0,
        }
    }
}

impl Default for StageDeltas {
    fn default() -> Self {
        StageDeltas::uniform(crate::constants::DEFAULT_STAGE_DELTA_SECS)
    }
}

/// Economic parameters fixed at session construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Collateral the Garbler must lock
    pub deposit_garbler: u64,
    /// Collateral the Evaluator must lock
    pub deposit_evaluator: u64,
    /// Per-stage deadline windows
    pub stage_deltas: StageDeltas,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            deposit_garbler: crate::constants::DEFAULT_DEPOSIT,
            deposit_evaluator: crate::constants::DEFAULT_DEPOSIT,
            stage_deltas: StageDeltas::default(),
        }
    }
}

impl SessionConfig {
    fn deposit_for(&self, party: Party) -> u64 {
        match party {
            Party::Garbler => self.deposit_garbler,
            Party::Evaluator => self.deposit_evaluator,
        }
    }
}

/// A vault disbursement recorded by a terminal or refund transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Receiving party
    pub to: Party,
    /// Amount in ledger units
    pub amount: u64,
}

/// How a closed session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Settled cooperatively; `result` is true when the Garbler's input
    /// was strictly greater
    Settled {
        /// The boolean protocol outcome
        result: bool,
    },
    /// A gate challenge was adjudicated; `cheater` forfeited the joint
    /// collateral
    Slashed {
        /// Party whose collateral was forfeited
        cheater: Party,
    },
    /// A stage timed out and `claimant` collected both deposits
    Aborted {
        /// Party that claimed the joint collateral
        claimant: Party,
    },
}

/// The on-ledger adjudicator: an optimistic state machine over seven
/// stages with per-stage deadlines, a collateral vault, and a fraud-proof
/// dispute path. Every method is one atomic ledger transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    config: SessionConfig,
    circuit_id: CircuitId,
    circuit_layout_root: Digest32,
    stage: Stage,
    deadline: u64,
    vault: [u64; 2],
    total_deposited: u64,
    payouts: Vec<Payout>,
    commitments: Option<[InstanceCommitment; NUM_INSTANCES]>,
    chosen: Option<u32>,
    open_indices: Vec<u32>,
    revealed_seeds: [Option<Seed>; NUM_INSTANCES],
    garbler_labels: Option<Vec<WireLabel>>,
    result: Option<bool>,
    verdict: Option<Verdict>,
}

impl Session {
    /// Open a new session in the Deposits stage
    pub fn new(
        config: SessionConfig,
        circuit_id: CircuitId,
        circuit_layout_root: Digest32,
        now: u64,
    ) -> Self {
        let deadline = now + config.stage_deltas.deposits;
        Session {
            config,
            circuit_id,
            circuit_layout_root,
            stage: Stage::Deposits,
            deadline,
            vault: [0; 2],
            total_deposited: 0,
            payouts: Vec::new(),
            commitments: None,
            chosen: None,
            open_indices: Vec::new(),
            revealed_seeds: [None; NUM_INSTANCES],
            garbler_labels: None,
            result: None,
            verdict: None,
        }
    }

    // Read-only accessors

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Session circuit identifier
    pub fn circuit_id(&self) -> &CircuitId {
        &self.circuit_id
    }

    /// Merkle root of the agreed plaintext circuit structure
    pub fn circuit_layout_root(&self) -> &Digest32 {
        &self.circuit_layout_root
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Deadline of the current stage
    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    /// Vault balance held for a party
    pub fn vault(&self, party: Party) -> u64 {
        self.vault[party.index()]
    }

    /// Sum of both vault entries
    pub fn vault_total(&self) -> u64 {
        self.vault.iter().sum()
    }

    /// Everything ever deposited into the session
    pub fn total_deposited(&self) -> u64 {
        self.total_deposited
    }

    /// Disbursements made so far, in order
    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    /// The ten instance commitments, once submitted
    pub fn commitments(&self) -> Option<&[InstanceCommitment; NUM_INSTANCES]> {
        self.commitments.as_ref()
    }

    /// The Evaluator's chosen instance `m`
    pub fn chosen(&self) -> Option<u32> {
        self.chosen
    }

    /// The nine opened indices in natural order
    pub fn open_indices(&self) -> &[u32] {
        &self.open_indices
    }

    /// Seed revealed for instance `i`, if any
    pub fn revealed_seed(&self, instance: usize) -> Option<&Seed> {
        self.revealed_seeds.get(instance)?.as_ref()
    }

    /// The Garbler's input labels for instance `m`, once revealed
    pub fn garbler_labels(&self) -> Option<&[WireLabel]> {
        self.garbler_labels.as_deref()
    }

    /// The boolean outcome, once settled
    pub fn result(&self) -> Option<bool> {
        self.result
    }

    /// How the session closed, if it has
    pub fn verdict(&self) -> Option<Verdict> {
        self.verdict
    }

    // Guards

    fn require_stage(&self, stage: Stage) -> Result<(), SessionError> {
        if self.stage != stage {
            return Err(SessionError::Stage(self.stage));
        }
        Ok(())
    }

    fn require_caller(caller: Party, expected: Party) -> Result<(), SessionError> {
        if caller != expected {
            return Err(SessionError::Auth(caller));
        }
        Ok(())
    }

    fn before_deadline(&self, now: u64) -> Result<(), SessionError> {
        if now > self.deadline {
            return Err(SessionError::Deadline {
                now,
                deadline: self.deadline,
            });
        }
        Ok(())
    }

    fn after_deadline(&self, now: u64) -> Result<(), SessionError> {
        if now <= self.deadline {
            return Err(SessionError::Deadline {
                now,
                deadline: self.deadline,
            });
        }
        Ok(())
    }

    /// Promote to `next` and install its deadline window in one step
    fn advance(&mut self, next: Stage, now: u64) {
        self.stage = next;
        self.deadline = now + self.config.stage_deltas.for_stage(next);
    }

    fn pay(&mut self, to: Party, amount: u64) {
        if amount > 0 {
            self.payouts.push(Payout { to, amount });
        }
    }

    /// Zero both vault entries and hand everything to `to`
    fn drain_vault_to(&mut self, to: Party) {
        let amount = self.vault[0] + self.vault[1];
        self.vault = [0; 2];
        self.pay(to, amount);
    }

    fn close(&mut self, verdict: Verdict) {
        self.stage = Stage::Closed;
        self.verdict = Some(verdict);
    }

    // Stage 0: Deposits

    /// Lock a party's collateral. The second successful deposit advances to
    /// Commitments.
    pub fn deposit(&mut self, caller: Party, amount: u64, now: u64) -> Result<(), SessionError> {
        self.require_stage(Stage::Deposits)?;
        self.before_deadline(now)?;
        if amount != self.config.deposit_for(caller) {
            return Err(SessionError::Economic(format!(
                "expected deposit of {}, got {}",
                self.config.deposit_for(caller),
                amount
            )));
        }
        if self.vault[caller.index()] != 0 {
            return Err(SessionError::Economic("deposit already locked".into()));
        }
        self.vault[caller.index()] = amount;
        self.total_deposited += amount;
        if self.vault[caller.other().index()] != 0 {
            self.advance(Stage::Commitments, now);
        }
        Ok(())
    }

    /// Withdraw one's own deposit while still in Deposits: before the
    /// deadline only while the counterparty has not deposited, afterwards
    /// unconditionally.
    pub fn refund(&mut self, caller: Party, now: u64) -> Result<(), SessionError> {
        self.require_stage(Stage::Deposits)?;
        let amount = self.vault[caller.index()];
        if amount == 0 {
            return Err(SessionError::Economic("nothing to refund".into()));
        }
        if now <= self.deadline && self.vault[caller.other().index()] != 0 {
            return Err(SessionError::Economic(
                "counterparty already deposited".into(),
            ));
        }
        self.vault[caller.index()] = 0;
        self.pay(caller, amount);
        Ok(())
    }

    // Stage 1: Commitments

    /// Garbler publishes all ten instance commitments atomically
    pub fn submit_commitments(
        &mut self,
        caller: Party,
        commitments: [InstanceCommitment; NUM_INSTANCES],
        now: u64,
    ) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Garbler)?;
        self.require_stage(Stage::Commitments)?;
        self.before_deadline(now)?;
        self.commitments = Some(commitments);
        self.advance(Stage::Choose, now);
        Ok(())
    }

    /// Evaluator claims both deposits after the Garbler failed to deliver
    /// the circuit in time
    pub fn abort_phase2(&mut self, caller: Party, now: u64) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Evaluator)?;
        self.require_stage(Stage::Commitments)?;
        self.after_deadline(now)?;
        self.drain_vault_to(Party::Evaluator);
        self.close(Verdict::Aborted {
            claimant: Party::Evaluator,
        });
        Ok(())
    }

    // Stage 2: Choose

    /// Evaluator picks the evaluation instance; the other nine become the
    /// opened set in natural order
    pub fn choose(&mut self, caller: Party, m: u32, now: u64) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Evaluator)?;
        self.require_stage(Stage::Choose)?;
        self.before_deadline(now)?;
        if m as usize >= NUM_INSTANCES {
            return Err(SessionError::Commitment(format!(
                "chosen index {} out of range",
                m
            )));
        }
        self.chosen = Some(m);
        self.open_indices = (0..NUM_INSTANCES as u32).filter(|&i| i != m).collect();
        self.advance(Stage::Open, now);
        Ok(())
    }

    /// Garbler claims both deposits after the Evaluator failed to choose
    pub fn abort_phase3(&mut self, caller: Party, now: u64) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Garbler)?;
        self.require_stage(Stage::Choose)?;
        self.after_deadline(now)?;
        self.drain_vault_to(Party::Garbler);
        self.close(Verdict::Aborted {
            claimant: Party::Garbler,
        });
        Ok(())
    }

    // Stage 3: Open

    /// Garbler reveals the seeds of every non-chosen instance. The reveal
    /// set must be exactly the opened indices in natural order and every
    /// seed must hash to its commitment.
    pub fn reveal_openings(
        &mut self,
        caller: Party,
        indices: &[u32],
        seeds: &[Seed],
        now: u64,
    ) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Garbler)?;
        self.require_stage(Stage::Open)?;
        self.before_deadline(now)?;
        if indices.len() != NUM_INSTANCES - 1 || seeds.len() != NUM_INSTANCES - 1 {
            return Err(SessionError::Commitment(format!(
                "expected {} openings, got {}",
                NUM_INSTANCES - 1,
                indices.len().max(seeds.len())
            )));
        }
        if indices != self.open_indices.as_slice() {
            return Err(SessionError::Commitment(
                "reveal set must be the opened indices in order".into(),
            ));
        }
        let commitments = self
            .commitments
            .as_ref()
            .expect("commitments exist past the Commitments stage");
        for (&index, seed) in indices.iter().zip(seeds.iter()) {
            if keccak256(&[&seed.0]) != commitments[index as usize].com_seed {
                return Err(SessionError::Commitment(format!(
                    "seed for instance {} does not match comSeed",
                    index
                )));
            }
        }
        for (&index, seed) in indices.iter().zip(seeds.iter()) {
            self.revealed_seeds[index as usize] = Some(*seed);
        }
        self.advance(Stage::Dispute, now);
        Ok(())
    }

    /// Evaluator claims both deposits after the Garbler failed to open
    pub fn abort_phase4(&mut self, caller: Party, now: u64) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Evaluator)?;
        self.require_stage(Stage::Open)?;
        self.after_deadline(now)?;
        self.drain_vault_to(Party::Evaluator);
        self.close(Verdict::Aborted {
            claimant: Party::Evaluator,
        });
        Ok(())
    }

    // Stage 4: Dispute

    /// Adjudicate a single-gate challenge.
    ///
    /// A malformed challenge (bad layout proof, bad IH proof, wrong leaf
    /// length, unopened instance) is rejected without touching the vault.
    /// A well-formed one is decided by recomputing the leaf from the
    /// revealed seed: a byte-exact match convicts the challenger, a
    /// mismatch convicts the Garbler. Either way the session closes.
    pub fn challenge_gate_leaf(
        &mut self,
        caller: Party,
        challenge: &Challenge,
        now: u64,
    ) -> Result<Verdict, SessionError> {
        Self::require_caller(caller, Party::Evaluator)?;
        self.require_stage(Stage::Dispute)?;
        self.before_deadline(now)?;

        let instance = challenge.instance_id as usize;
        if !self.open_indices.contains(&challenge.instance_id) {
            return Err(SessionError::Commitment(format!(
                "instance {} is not in the opened set",
                challenge.instance_id
            )));
        }
        let seed = self.revealed_seeds[instance].ok_or_else(|| {
            SessionError::Commitment(format!("no seed revealed for instance {}", instance))
        })?;

        if challenge.layout_proof.len() > crate::constants::MAX_LAYOUT_PROOF_DEPTH
            || challenge.ih_proof.nodes.len() > crate::constants::MAX_IH_PROOF_NODES
        {
            return Err(SessionError::Proof("proof exceeds length bounds".into()));
        }
        if !verify_layout(
            &self.circuit_layout_root,
            challenge.gate_index,
            &challenge.desc,
            &challenge.layout_proof,
        ) {
            return Err(SessionError::Proof("layout proof mismatch".into()));
        }
        if challenge.leaf_bytes.len() != crate::constants::GATE_LEAF_LEN {
            return Err(SessionError::Proof(format!(
                "leaf must be {} bytes, got {}",
                crate::constants::GATE_LEAF_LEN,
                challenge.leaf_bytes.len()
            )));
        }
        let commitments = self
            .commitments
            .as_ref()
            .expect("commitments exist past the Commitments stage");
        if !verify_ih(
            &commitments[instance].root_gc,
            challenge.gate_index,
            &challenge.leaf_bytes,
            &challenge.ih_proof,
        ) {
            return Err(SessionError::Proof("IH proof mismatch".into()));
        }

        let expected = recompute_gate_leaf_bytes(
            &seed,
            &self.circuit_id,
            challenge.instance_id,
            challenge.gate_index,
            &challenge.desc,
        );
        let cheater = if keccak256(&[&expected]) == keccak256(&[&challenge.leaf_bytes]) {
            // Committed leaf is what the seed dictates: false challenge
            Party::Evaluator
        } else {
            Party::Garbler
        };
        self.drain_vault_to(cheater.other());
        let verdict = Verdict::Slashed { cheater };
        self.close(verdict);
        Ok(verdict)
    }

    /// Leave the Dispute stage without a challenge. The Evaluator may do
    /// so at any time; the Garbler only once the dispute window expired.
    pub fn close_dispute(&mut self, caller: Party, now: u64) -> Result<(), SessionError> {
        self.require_stage(Stage::Dispute)?;
        if caller == Party::Garbler {
            self.after_deadline(now)?;
        }
        self.advance(Stage::Labels, now);
        Ok(())
    }

    // Stage 5: Labels

    /// Garbler publishes her input-wire labels for instance `m`
    pub fn reveal_garbler_labels(
        &mut self,
        caller: Party,
        labels: Vec<WireLabel>,
        now: u64,
    ) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Garbler)?;
        self.require_stage(Stage::Labels)?;
        self.before_deadline(now)?;
        if labels.is_empty() {
            return Err(SessionError::Commitment("empty label reveal".into()));
        }
        self.garbler_labels = Some(labels);
        self.advance(Stage::Settle, now);
        Ok(())
    }

    /// Evaluator claims both deposits after the Garbler withheld her labels
    pub fn abort_phase5(&mut self, caller: Party, now: u64) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Evaluator)?;
        self.require_stage(Stage::Labels)?;
        self.after_deadline(now)?;
        self.drain_vault_to(Party::Evaluator);
        self.close(Verdict::Aborted {
            claimant: Party::Evaluator,
        });
        Ok(())
    }

    // Stage 6: Settle

    /// Evaluator submits the output label. Its hash must match one of the
    /// chosen instance's result anchors; a miss reverts without slashing
    /// so the Evaluator may retry before the deadline.
    pub fn settle(
        &mut self,
        caller: Party,
        output_label: WireLabel,
        now: u64,
    ) -> Result<bool, SessionError> {
        Self::require_caller(caller, Party::Evaluator)?;
        self.require_stage(Stage::Settle)?;
        self.before_deadline(now)?;
        let m = self.chosen.expect("chosen index exists past Choose") as usize;
        let commitment = &self.commitments.as_ref().expect("commitments exist")[m];
        let label_hash = keccak256(&[output_label.as_bytes()]);
        let result = if label_hash == commitment.h0 {
            true
        } else if label_hash == commitment.h1 {
            false
        } else {
            return Err(SessionError::Output);
        };
        self.result = Some(result);
        let garbler_amount = self.vault[Party::Garbler.index()];
        let evaluator_amount = self.vault[Party::Evaluator.index()];
        self.vault = [0; 2];
        self.pay(Party::Garbler, garbler_amount);
        self.pay(Party::Evaluator, evaluator_amount);
        self.close(Verdict::Settled { result });
        Ok(result)
    }

    /// Garbler claims both deposits after the Evaluator failed to settle
    pub fn abort_phase6(&mut self, caller: Party, now: u64) -> Result<(), SessionError> {
        Self::require_caller(caller, Party::Garbler)?;
        self.require_stage(Stage::Settle)?;
        self.after_deadline(now)?;
        self.drain_vault_to(Party::Garbler);
        self.close(Verdict::Aborted {
            claimant: Party::Garbler,
        });
        Ok(())
    }
}
