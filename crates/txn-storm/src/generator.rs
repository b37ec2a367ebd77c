use std::{sync::Arc, time::Duration};

use alloy::{
    network::{Ethereum, EthereumWallet, NetworkWallet, TransactionBuilder, eip2718::Encodable2718},
    primitives::{Address, B256, Bytes, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    accounts, client::RpcProvider, partition::AccountRange, traits::Generator, worker::WorkerTask,
};

/// Gas limit for simple ETH transfer (no calldata)
const GAS_LIMIT_TRANSFER: u64 = 21_000;

/// Reads account balances.
#[async_trait]
pub(crate) trait BalanceSource: Send + Sync + 'static {
    async fn balance(&self, address: Address) -> Result<U256>;
}

#[async_trait]
impl BalanceSource for RpcProvider {
    async fn balance(&self, address: Address) -> Result<U256> {
        self.get_balance(address).await.context("Failed to get balance")
    }
}

/// Signed transaction ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedTransfer {
    pub from: Address,
    /// Account index of the signer, `None` for the donor.
    pub account: Option<u64>,
    pub nonce: u64,
    pub hash: B256,
    pub raw: Bytes,
}

/// Chain and funding parameters shared by every generator.
#[derive(Debug, Clone)]
pub(crate) struct TransferSettings {
    pub chain_id: u64,
    pub key_seed: B256,
    /// Donor's pending nonce when the run began.
    pub donor_nonce: u64,
    /// Wei handed to each generated account.
    pub funding_amount: U256,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    /// How often to re-check balances while waiting for funding.
    pub poll_interval: Duration,
}

/// Funding that must be visible on chain before production continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// The hub holds the bootstrap value.
    Hub,
    /// The last account of the range holds its fan-out share.
    Spread,
}

/// Next transfer to produce, committed only once handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Planned {
    from: usize,
    to: usize,
    value: U256,
    nonce: u64,
}

/// Production position, kept across start/stop cycles so nonces never repeat.
///
/// The range's first account (the hub) first funds every other account, then
/// each account sends 1 wei to its successor in turn.
#[derive(Debug)]
struct Cursor {
    nonces: Vec<u64>,
    funded: usize,
    next: usize,
    hub_confirmed: bool,
    spread_confirmed: bool,
}

impl Cursor {
    fn new(width: usize) -> Self {
        Self {
            nonces: vec![0; width],
            funded: 1,
            next: 0,
            hub_confirmed: false,
            spread_confirmed: false,
        }
    }

    fn pending_gate(&self) -> Option<Gate> {
        match (self.is_funding(), self.hub_confirmed, self.spread_confirmed) {
            (true, false, _) => Some(Gate::Hub),
            (false, _, false) => Some(Gate::Spread),
            _ => None,
        }
    }

    fn confirm(&mut self, gate: Gate) {
        match gate {
            Gate::Hub => self.hub_confirmed = true,
            Gate::Spread => self.spread_confirmed = true,
        }
    }

    fn is_funding(&self) -> bool {
        self.funded < self.nonces.len()
    }

    fn peek(&self, funding_amount: U256) -> Planned {
        if self.is_funding() {
            return Planned { from: 0, to: self.funded, value: funding_amount, nonce: self.nonces[0] };
        }
        let from = self.next;
        Planned {
            from,
            to: (from + 1) % self.nonces.len(),
            value: U256::from(1),
            nonce: self.nonces[from],
        }
    }

    fn advance(&mut self, planned: &Planned) {
        self.nonces[planned.from] += 1;
        if self.is_funding() {
            self.funded += 1;
        } else {
            self.next = (self.next + 1) % self.nonces.len();
        }
    }
}

struct Inner<C> {
    chain: C,
    wallet: EthereumWallet,
    donor: Address,
    range: AccountRange,
    accounts: Vec<Address>,
    settings: TransferSettings,
    cursor: Mutex<Cursor>,
}

impl<C: BalanceSource> Inner<C> {
    /// Account and balance that show `gate` has been passed on chain.
    fn requirement(&self, gate: Gate) -> (Address, U256) {
        let funding = self.settings.funding_amount;
        match gate {
            Gate::Hub => {
                (self.accounts[0], funding.saturating_mul(U256::from(self.accounts.len())))
            }
            Gate::Spread => (self.accounts[self.accounts.len() - 1], funding),
        }
    }

    /// Polls until `gate`'s funding is visible. Returns `false` if cancelled first.
    async fn await_funding(&self, gate: Gate, name: &str, cancel: &CancellationToken) -> bool {
        let (account, required) = self.requirement(gate);
        info!(generator = name, ?gate, %account, %required, "Waiting for funding");

        loop {
            let balance = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                balance = self.chain.balance(account) => balance,
            };
            match balance {
                Ok(balance) if balance >= required => {
                    debug!(generator = name, ?gate, %balance, "Funding confirmed");
                    return true;
                }
                Ok(balance) => debug!(generator = name, ?gate, %balance, "Funding pending"),
                Err(e) => warn!(generator = name, error = %e, "Failed to check funding"),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// Builds a `TransactionRequest` and signs it with the wallet
    async fn sign(
        &self,
        from: Address,
        account: Option<u64>,
        to: Address,
        value: U256,
        nonce: u64,
    ) -> Result<SignedTransfer> {
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_value(value)
            .with_nonce(nonce)
            .with_chain_id(self.settings.chain_id)
            .with_max_fee_per_gas(self.settings.max_fee_per_gas)
            .with_max_priority_fee_per_gas(self.settings.max_priority_fee_per_gas)
            .with_gas_limit(GAS_LIMIT_TRANSFER);

        let envelope =
            <EthereumWallet as NetworkWallet<Ethereum>>::sign_request(&self.wallet, tx)
                .await
                .context("Failed to sign transaction")?;

        Ok(SignedTransfer {
            from,
            account,
            nonce,
            hash: *envelope.tx_hash(),
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }

    async fn sign_planned(&self, planned: &Planned) -> Result<SignedTransfer> {
        self.sign(
            self.accounts[planned.from],
            Some(self.range.from + planned.from as u64),
            self.accounts[planned.to],
            planned.value,
            planned.nonce,
        )
        .await
    }
}

/// Generates value transfers for one account range.
///
/// Bootstrap transactions come from the donor and fund the range's hub account.
/// Production waits until that funding, and later the hub's fan-out, is visible
/// through `C`. Account nonces start at zero, so each run should use a fresh key
/// seed or account range.
pub(crate) struct TransferGenerator<C = RpcProvider> {
    name: String,
    inner: Arc<Inner<C>>,
    task: WorkerTask,
}

impl<C> std::fmt::Debug for TransferGenerator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferGenerator")
            .field("name", &self.name)
            .field("donor", &self.inner.donor)
            .field("range", &self.inner.range)
            .finish()
    }
}

impl<C: BalanceSource> TransferGenerator<C> {
    pub(crate) fn new(
        donor: PrivateKeySigner,
        range: AccountRange,
        settings: TransferSettings,
        chain: C,
    ) -> Self {
        let signers = accounts::range_signers(settings.key_seed, range);
        let addresses = accounts::addresses(&signers);
        let donor_address = donor.address();

        let mut wallet = EthereumWallet::from(donor);
        for signer in signers {
            wallet.register_signer(signer);
        }

        Self {
            name: format!("Generator-{}-{}", range.from, range.to),
            inner: Arc::new(Inner {
                chain,
                wallet,
                donor: donor_address,
                range,
                cursor: Mutex::new(Cursor::new(addresses.len())),
                accounts: addresses,
                settings,
            }),
            task: WorkerTask::new(),
        }
    }

    /// Address of the account funded by the bootstrap transaction.
    pub(crate) fn hub(&self) -> Address {
        self.inner.accounts[0]
    }
}

#[async_trait]
impl<C: BalanceSource> Generator for TransferGenerator<C> {
    type Tx = SignedTransfer;

    fn name(&self) -> &str {
        &self.name
    }

    async fn yield_tx(&self, seq: u64) -> Result<SignedTransfer> {
        ensure!(seq >= 1, "bootstrap sequence numbers start at 1");
        let inner = &self.inner;
        let value = inner.settings.funding_amount.saturating_mul(U256::from(inner.range.len()));
        let nonce = inner.settings.donor_nonce + seq - 1;
        inner.sign(inner.donor, None, self.hub(), value, nonce).await
    }

    fn start(&self, out: mpsc::Sender<SignedTransfer>) {
        let inner = Arc::clone(&self.inner);
        let name = self.name.clone();
        self.task.spawn(&self.name, move |cancel| produce(inner, name, out, cancel));
    }

    async fn stop(&self) {
        self.task.stop(&self.name).await;
    }
}

async fn produce<C: BalanceSource>(
    inner: Arc<Inner<C>>,
    name: String,
    out: mpsc::Sender<SignedTransfer>,
    cancel: CancellationToken,
) {
    let mut cursor = inner.cursor.lock().await;
    let mut produced: u64 = 0;
    debug!(generator = %name, funding = cursor.is_funding(), "Generator started");

    while !cancel.is_cancelled() {
        if let Some(gate) = cursor.pending_gate() {
            if !inner.await_funding(gate, &name, &cancel).await {
                break;
            }
            cursor.confirm(gate);
        }

        let planned = cursor.peek(inner.settings.funding_amount);
        let tx = match inner.sign_planned(&planned).await {
            Ok(tx) => tx,
            Err(e) => {
                warn!(generator = %name, error = %e, "Failed to build transaction");
                break;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = out.send(tx) => {
                if sent.is_err() {
                    debug!(generator = %name, "Source channel closed");
                    break;
                }
            }
        }
        cursor.advance(&planned);
        produced += 1;
    }

    debug!(generator = %name, produced, "Generator stopped");
}
