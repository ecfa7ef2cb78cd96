#![doc = include_str!("../README.md")]

use apm_cryptography::{
    babyjubjub::primitives::group::Point,
    commitment::{self, prepare_bet, random_salt, Address, Bet, Hasher},
    elgamal::decode_side,
    threshold::{self, combine, partial_decrypt},
    vss::{self, ops::reconstruct_secret},
};
use apm_dkg::{
    engine::{Config, Engine},
    mocks::{Network, StaticRoster},
    roster::Member,
    session::Status,
    store::{self, FileStore, Store},
};
use clap::{Args, Parser, Subcommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use thiserror::Error;
use tracing::{error, info, Level};

/// Key generation CLI.
#[derive(Parser)]
pub struct App {
    /// Args for the runtime configuration.
    #[command(flatten)]
    runtime_args: RuntimeArgs,

    /// The subcommand to run
    #[command(subcommand)]
    subcommand: Subcommands,
}

#[derive(Args)]
pub struct RuntimeArgs {
    /// The log level for traces. opts: (error, debug, info, warn, trace)
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// The number of worker threads for the runtime to use
    #[arg(long, default_value_t = 3)]
    worker_threads: usize,
}

#[derive(Subcommand)]
pub enum Subcommands {
    /// Run a committee in-process, then encrypt and threshold-decrypt a bet under the joint key.
    Simulate(SimulateArgs),
}

/// Arguments for the `simulate` subcommand.
#[derive(Args)]
pub struct SimulateArgs {
    /// The number of committee members.
    #[arg(long, default_value_t = 4)]
    participants: u8,

    /// The number of members required to decrypt.
    #[arg(long, default_value_t = 3)]
    threshold: u32,

    /// The session (market) identifier.
    #[arg(long, default_value_t = 1)]
    session: u64,

    /// The directory to persist each member's share in.
    #[arg(long, default_value = "./data")]
    datadir: PathBuf,

    /// Seed for member addresses and polynomials (random if omitted).
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum time (in seconds) spent in any protocol phase.
    #[arg(long, default_value_t = 30)]
    phase_timeout: u64,
}

#[derive(Error, Debug)]
enum SimulationError {
    #[error("failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("key generation failed: {0}")]
    Dkg(#[from] apm_dkg::Error),
    #[error("store failure: {0}")]
    Store(#[from] store::Error),
    #[error("engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("member {0} ended in {1}")]
    Incomplete(usize, Status),
    #[error("member {0} derived a different joint key")]
    Mismatch(usize),
    #[error("member {0} has no persisted share")]
    Missing(usize),
    #[error("reconstructed secret does not match the joint key")]
    WrongSecret,
    #[error("reconstruction failed: {0}")]
    Vss(#[from] vss::Error),
    #[error("commitment failed: {0}")]
    Commitment(#[from] commitment::Error),
    #[error("threshold decryption failed: {0}")]
    Threshold(#[from] threshold::Error),
    #[error("decrypted side does not match")]
    WrongSide,
}

fn main() -> ExitCode {
    let app = App::parse();
    tracing_subscriber::fmt()
        .with_max_level(app.runtime_args.log_level)
        .init();

    let result = match app.subcommand {
        Subcommands::Simulate(args) => simulate(&app.runtime_args, args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "simulation failed");
            ExitCode::FAILURE
        }
    }
}

fn simulate(runtime: &RuntimeArgs, args: SimulateArgs) -> Result<(), SimulationError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(runtime.worker_threads)
        .enable_all()
        .build()?
        .block_on(run(args))
}

async fn run(args: SimulateArgs) -> Result<(), SimulationError> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let addresses = (0..args.participants)
        .map(|_| Address::new(rng.gen()))
        .collect::<Vec<_>>();
    let roster = StaticRoster::new(addresses.iter().copied().map(Member::new).collect());
    let network = Network::new();
    info!(
        session = args.session,
        participants = args.participants,
        threshold = args.threshold,
        "starting committee"
    );

    // Run every member
    let mut members = Vec::with_capacity(addresses.len());
    for (i, address) in addresses.iter().enumerate() {
        let store = FileStore::new(args.datadir.join(format!("member_{i}")))?;
        let config = Config {
            phase_timeout: Duration::from_secs(args.phase_timeout),
            ..Config::new(args.session, *address, args.threshold)
        };
        let (engine, mailbox) = Engine::new(
            config,
            roster.clone(),
            network.transport(),
            store.clone(),
            StdRng::seed_from_u64(rng.gen()),
        )?;
        members.push((engine.start(), mailbox, store));
    }

    // Wait for every member to finish
    let mut public = None;
    let mut shares = Vec::with_capacity(members.len());
    for (i, (handle, mut mailbox, store)) in members.into_iter().enumerate() {
        let state = mailbox.wait().await;
        if state.status != Status::Complete {
            return Err(SimulationError::Incomplete(i, state.status));
        }
        mailbox.stop().await;
        let record = store.get(args.session)?.ok_or(SimulationError::Missing(i))?;
        if *public.get_or_insert(record.public) != record.public {
            return Err(SimulationError::Mismatch(i));
        }
        info!(member = i, index = record.share.index, status = %handle.await?.status, "member finished");
        shares.push(record.share);
    }
    let Some(public) = public else {
        return Ok(());
    };
    info!(?public, "joint key agreed");

    // Any threshold of members recovers the secret behind the joint key
    let t = args.threshold as usize;
    let secret = reconstruct_secret(args.threshold, &shares[shares.len() - t..])?;
    if Point::mul_base(&secret) != public {
        return Err(SimulationError::WrongSecret);
    }

    // Encrypt a bet and decrypt it with the last t members
    let mut hasher = Hasher::initialized()?;
    let bet = Bet {
        side: rng.gen(),
        salt: random_salt(&mut rng),
        amount: 1_000,
        address: addresses[0],
    };
    let prepared = prepare_bet(&mut rng, &mut hasher, &bet, &public)?;
    info!(commitment = %prepared.commitment, "prepared bet");
    let partials = shares[shares.len() - t..]
        .iter()
        .map(|share| partial_decrypt(share, &prepared.ciphertext))
        .collect::<Vec<_>>();
    let decrypted = combine(args.threshold, &partials, &prepared.ciphertext)?;
    if decrypted != prepared.encoded || decode_side(&decrypted) != bet.side {
        return Err(SimulationError::WrongSide);
    }
    info!(side = bet.side, "threshold decryption recovered bet");
    Ok(())
}
