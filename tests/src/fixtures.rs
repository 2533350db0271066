//! Shared fixtures: deterministic keys, funded accounts, signed transactions
//! and fully wired pool nodes.

use ed25519_dalek::{Signer, SigningKey};
use rc_02_tx_pool::domain::atomic::assemble_group;
use rc_02_tx_pool::{
    Account, ChannelPublisher, Ed25519SignatureVerifier, FeeSelector, GossipPublisher, Idx,
    InMemoryTxStore, ManualTimeSource, NoOpPublisher, Nonce, PoolConfig, PoolDependencies,
    PoolL2Tx, RequestOffset, StaticAccountProvider, TxId, TxPoolService, U256,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Span;

/// First and last account index every test node knows.
pub const FIRST_ACCOUNT: u64 = 256;
pub const LAST_ACCOUNT: u64 = 263;

/// Recipient used by plain transfers.
pub const RECIPIENT: u64 = 500;

/// A pool service with handles on its collaborators.
pub struct TestNode {
    pub service: Arc<TxPoolService>,
    pub accounts: Arc<StaticAccountProvider>,
    pub store: Arc<InMemoryTxStore>,
    pub time: Arc<ManualTimeSource>,
}

impl TestNode {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_publisher(config, Arc::new(NoOpPublisher))
    }

    pub fn with_publisher(config: PoolConfig, publisher: Arc<dyn GossipPublisher>) -> Self {
        let accounts = Arc::new(StaticAccountProvider::with_accounts(
            (FIRST_ACCOUNT..=LAST_ACCOUNT).map(|idx| account(idx, 0)),
        ));
        Self::with_parts(
            config,
            accounts,
            Arc::new(InMemoryTxStore::new()),
            publisher,
            Arc::new(ManualTimeSource::new(1_000)),
        )
    }

    /// Node that gossips local submissions onto a channel.
    pub fn gossiping(config: PoolConfig) -> (Self, mpsc::UnboundedReceiver<PoolL2Tx>) {
        let (publisher, receiver) = ChannelPublisher::channel();
        (Self::with_publisher(config, Arc::new(publisher)), receiver)
    }

    pub fn with_parts(
        config: PoolConfig,
        accounts: Arc<StaticAccountProvider>,
        store: Arc<InMemoryTxStore>,
        publisher: Arc<dyn GossipPublisher>,
        time: Arc<ManualTimeSource>,
    ) -> Self {
        init_tracing();
        let deps = PoolDependencies {
            store: store.clone(),
            accounts: accounts.clone(),
            verifier: Arc::new(Ed25519SignatureVerifier),
            publisher,
            time: time.clone(),
        };
        let span = tracing::info_span!("tx_pool");
        let service = TxPoolService::new(config, deps, span).expect("valid test config");
        Self {
            service: Arc::new(service),
            accounts,
            store,
            time,
        }
    }

    /// A second node over the same store and accounts, as after a restart.
    pub fn restart(&self, config: PoolConfig) -> Self {
        Self::with_parts(
            config,
            self.accounts.clone(),
            self.store.clone(),
            Arc::new(NoOpPublisher),
            self.time.clone(),
        )
    }
}

/// Installs a test-writer subscriber once. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic key for an account index.
pub fn signing_key(idx: Idx) -> SigningKey {
    let mut seed = [0u8; 32];
    seed[..8].copy_from_slice(&idx.0.to_be_bytes());
    seed[31] = 0x5A;
    SigningKey::from_bytes(&seed)
}

pub fn account(idx: u64, nonce: Nonce) -> Account {
    Account {
        idx: Idx(idx),
        token_id: 0,
        nonce,
        balance: U256::from(10u64).pow(U256::from(24u64)),
        public_key: signing_key(Idx(idx)).verifying_key().to_bytes(),
    }
}

/// Signs `tx` with its sender's key.
pub fn sign(mut tx: PoolL2Tx) -> PoolL2Tx {
    let message = tx.hash_to_sign().expect("representable amounts");
    tx.signature = signing_key(tx.from_idx).sign(&message).to_bytes();
    tx
}

pub fn unsigned_transfer(from: u64, nonce: Nonce, fee: u8, amount: u64) -> PoolL2Tx {
    PoolL2Tx::new_transfer(
        Idx(from),
        Idx(RECIPIENT),
        0,
        U256::from(amount),
        FeeSelector(fee),
        nonce,
    )
}

/// Signed transfer.
pub fn transfer(from: u64, nonce: Nonce, fee: u8, amount: u64) -> PoolL2Tx {
    sign(unsigned_transfer(from, nonce, fee, amount))
}

/// Signed atomic group from `(from, nonce, relative request offset)`
/// triples, in position order.
pub fn atomic_group(members: &[(u64, Nonce, i8)]) -> Vec<PoolL2Tx> {
    atomic_group_of(members, 1_000)
}

/// [`atomic_group`] with every member moving `amount`.
pub fn atomic_group_of(members: &[(u64, Nonce, i8)], amount: u64) -> Vec<PoolL2Tx> {
    let txs = members
        .iter()
        .map(|&(from, nonce, offset)| {
            let mut tx = unsigned_transfer(from, nonce, 126, amount);
            tx.rq_offset = RequestOffset::from_relative(offset).expect("valid offset");
            tx
        })
        .collect();
    // signatures cover the request fields, and ids cover the signatures
    let (txs, _) = assemble_group(txs, 8).expect("valid group");
    let signed = txs.into_iter().map(sign).collect();
    assemble_group(signed, 8).expect("valid group").0
}

pub fn ids(txs: &[PoolL2Tx]) -> Vec<TxId> {
    txs.iter().map(|tx| tx.id).collect()
}
