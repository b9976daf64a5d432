use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

use fairgc::adjudicator::{Party, Session, SessionConfig};
use fairgc::circuit::{CircuitLayout, comparator_circuit};
use fairgc::commitment::{InstanceCommitment, layout_root};
use fairgc::constants::NUM_INSTANCES;
use fairgc::evaluator::{assemble_inputs, evaluate_instance};
use fairgc::garble::garble_instance;
use fairgc::garbler::{
    GarblerSecrets, alice_input_labels, bob_wire_label_pairs, build_commitments, opening_seeds,
};
use fairgc::label::{CircuitId, WireLabel};
use fairgc::ot::select_input_labels;

/// Fixed seed for reproducible benches
pub const TEST_SEED: [u8; 32] = [42; 32];

/// Alice's opening balance in the scenario wallets
pub const ALICE_START: u64 = 3;
/// Bob's opening balance
pub const BOB_START: u64 = 5;

/// External ledger balances of both parties, reconciled against the
/// session's deposits and payouts when a scenario finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wallets {
    /// Garbler balance
    pub alice: u64,
    /// Evaluator balance
    pub bob: u64,
}

impl Wallets {
    /// Reference starting balances
    pub fn starting() -> Self {
        Wallets {
            alice: ALICE_START,
            bob: BOB_START,
        }
    }

    /// Final balances: everything deposited left the wallets, every payout
    /// came back
    pub fn settled(session: &Session) -> Self {
        let mut wallets = Wallets {
            alice: ALICE_START - session.config().deposit_garbler,
            bob: BOB_START - session.config().deposit_evaluator,
        };
        for payout in session.payouts() {
            match payout.to {
                Party::Garbler => wallets.alice += payout.amount,
                Party::Evaluator => wallets.bob += payout.amount,
            }
        }
        wallets
    }
}

/// One protocol run: both parties, their shared adjudicator, and a ledger
/// clock that steps forward on every transition
#[derive(Debug)]
pub struct Bench {
    /// The shared comparator layout
    pub layout: CircuitLayout,
    /// Session circuit identifier
    pub circuit_id: CircuitId,
    /// The Garbler's instance seeds
    pub secrets: GarblerSecrets,
    /// The adjudicator state machine
    pub session: Session,
    /// Ledger clock in seconds
    pub now: u64,
}

impl Bench {
    /// Fresh session over a `bit_width`-bit comparator with deterministic
    /// Garbler seeds
    pub fn new(bit_width: u16) -> Result<Self> {
        let layout = comparator_circuit(bit_width)?;
        let circuit_id = CircuitId::from_u64(7);
        let mut rng = ChaCha12Rng::from_seed(TEST_SEED);
        let secrets = GarblerSecrets::generate(&mut rng);
        let now = 1_700_000_000;
        let session = Session::new(
            SessionConfig::default(),
            circuit_id,
            layout_root(&layout.gates),
            now,
        );
        Ok(Bench {
            layout,
            circuit_id,
            secrets,
            session,
            now,
        })
    }

    /// Advance the ledger clock and return the new time
    pub fn tick(&mut self) -> u64 {
        self.now += 10;
        self.now
    }

    /// Jump past the current stage's deadline
    pub fn expire_deadline(&mut self) -> u64 {
        self.now = self.session.deadline() + 1;
        self.now
    }

    /// Both parties lock their collateral
    pub fn deposit_both(&mut self) -> Result<()> {
        let deposit = self.session.config().deposit_garbler;
        let now = self.tick();
        self.session.deposit(Party::Garbler, deposit, now)?;
        let deposit = self.session.config().deposit_evaluator;
        let now = self.tick();
        self.session.deposit(Party::Evaluator, deposit, now)?;
        Ok(())
    }

    /// Honest commitment set derived from the bench seeds
    pub fn honest_commitments(&self) -> [InstanceCommitment; NUM_INSTANCES] {
        build_commitments(&self.secrets.seeds, &self.circuit_id, &self.layout)
    }

    /// Garbler submits the given commitment records
    pub fn submit_commitments(
        &mut self,
        commitments: [InstanceCommitment; NUM_INSTANCES],
    ) -> Result<()> {
        let now = self.tick();
        self.session
            .submit_commitments(Party::Garbler, commitments, now)?;
        Ok(())
    }

    /// Evaluator picks instance `m`
    pub fn choose(&mut self, m: u32) -> Result<()> {
        let now = self.tick();
        self.session.choose(Party::Evaluator, m, now)?;
        Ok(())
    }

    /// Garbler opens every non-chosen instance
    pub fn reveal_openings(&mut self) -> Result<()> {
        let open = self.session.open_indices().to_vec();
        let (indices, seeds) = opening_seeds(&self.secrets.seeds, &open);
        let now = self.tick();
        self.session
            .reveal_openings(Party::Garbler, &indices, &seeds, now)?;
        Ok(())
    }

    /// Evaluator waives the dispute window
    pub fn waive_dispute(&mut self) -> Result<()> {
        let now = self.tick();
        self.session.close_dispute(Party::Evaluator, now)?;
        Ok(())
    }

    /// Garbler reveals her input labels for `x` on the chosen instance
    pub fn reveal_labels(&mut self, x: u64) -> Result<()> {
        let m = self.session.chosen().expect("instance chosen");
        let labels = alice_input_labels(
            &self.secrets.seeds[m as usize],
            &self.circuit_id,
            m,
            &self.layout,
            x,
        )?;
        let now = self.tick();
        self.session
            .reveal_garbler_labels(Party::Garbler, labels, now)?;
        Ok(())
    }

    /// Evaluator runs the chosen garbled instance with his input `y` and
    /// returns the output label
    pub fn evaluate(&self, y: u64) -> Result<WireLabel> {
        let m = self.session.chosen().expect("instance chosen");
        let seed = &self.secrets.seeds[m as usize];
        let leaves = garble_instance(seed, &self.circuit_id, m, &self.layout);
        let pairs = bob_wire_label_pairs(seed, &self.circuit_id, m, &self.layout);
        let bob_labels = select_input_labels(&pairs, y)?;
        let alice_labels = self
            .session
            .garbler_labels()
            .expect("garbler labels revealed");
        let inputs = assemble_inputs(&self.layout, alice_labels, &bob_labels)?;
        evaluate_instance(&self.circuit_id, m, &self.layout, &leaves, &inputs)
    }

    /// Evaluator submits the output label for settlement
    pub fn settle(&mut self, output: WireLabel) -> Result<bool> {
        let now = self.tick();
        Ok(self.session.settle(Party::Evaluator, output, now)?)
    }
}
