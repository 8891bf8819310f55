//! Single-process wiring of accounts, sagas and the deadline ticker.

use std::sync::{Arc, OnceLock};

use common::{AccountNumber, Amount, CustomerNumber, TransactionId};
use domain::{
    AccountCommand, BankAccountEntity, BankAccountSummary, CreateBankAccount, GetBankAccountState,
};
use event_store::EventStore;
use runtime::{Clock, Router, SystemClock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::aggregate::SagaSummary;
use crate::commands::{GetSagaState, SagaCommand, StartSaga};
use crate::config::BankConfig;
use crate::coordinator::SagaCoordinator;
use crate::error::SagaError;

/// The banking saga system.
///
/// Owns the account and saga routers over one journal, plus the ticker
/// task that drives saga deadlines and retries. A sharded deployment
/// replaces the routers with its own transparent entity routing; the
/// entities themselves are unchanged.
///
/// Must be constructed inside a tokio runtime.
pub struct Bank {
    accounts: Router<BankAccountEntity>,
    sagas: Router<SagaCoordinator>,
    clock: Arc<dyn Clock>,
    ticker: Option<JoinHandle<()>>,
}

impl Bank {
    /// Creates the system on the wall clock.
    pub fn new(store: Arc<dyn EventStore>, config: BankConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Creates the system on an injected clock (deterministic tests).
    pub fn with_clock(
        store: Arc<dyn EventStore>,
        config: BankConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stash_capacity = config.stash_capacity;
        let accounts = Router::new(store.clone(), move |id| {
            BankAccountEntity::new(AccountNumber::new(id), stash_capacity)
        });

        // the saga factory needs the saga router itself to mint reply
        // references; the cell is filled right after construction, before
        // any send can activate an entity
        let cell: Arc<OnceLock<Router<SagaCoordinator>>> = Arc::new(OnceLock::new());
        let factory_cell = cell.clone();
        let factory_accounts = accounts.clone();
        let factory_clock = clock.clone();
        let prepare_timeout = config.prepare_timeout();
        let sagas = Router::new(store, move |id| {
            let sagas = factory_cell.get().expect("saga router is wired").clone();
            SagaCoordinator::new(
                TransactionId::new(id),
                factory_accounts.clone(),
                sagas,
                factory_clock.clone(),
                prepare_timeout,
            )
        });
        let _ = cell.set(sagas.clone());

        let ticker = (config.tick_interval_ms > 0).then(|| {
            let sagas = sagas.clone();
            let clock = clock.clone();
            let period = std::time::Duration::from_millis(config.tick_interval_ms);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    let now = clock.now();
                    sagas.broadcast(|_| SagaCommand::Tick(now));
                }
            })
        });

        Self {
            accounts,
            sagas,
            clock,
            ticker,
        }
    }

    /// Opens a bank account (idempotent) and returns its state.
    #[tracing::instrument(skip(self))]
    pub async fn create_account(
        &self,
        customer_number: CustomerNumber,
        account_number: AccountNumber,
    ) -> Result<BankAccountSummary, SagaError> {
        let (reply, ack) = oneshot::channel();
        self.accounts.send(
            account_number.as_str(),
            AccountCommand::Create(CreateBankAccount {
                customer_number,
                account_number: account_number.clone(),
                reply_to: Some(reply),
            }),
        );
        Ok(ack.await?)
    }

    /// Reads an account's current state.
    #[tracing::instrument(skip(self))]
    pub async fn account_state(
        &self,
        account_number: &AccountNumber,
    ) -> Result<BankAccountSummary, SagaError> {
        let (reply, ack) = oneshot::channel();
        self.accounts.send(
            account_number.as_str(),
            AccountCommand::Get(GetBankAccountState { reply_to: reply }),
        );
        Ok(ack.await?)
    }

    /// Submits a saga over the given deposits and withdrawals.
    ///
    /// Resolves once the saga has accepted (and durably started) the
    /// transaction; completion is observed through [`Bank::saga_state`].
    #[tracing::instrument(skip(self, deposits, withdrawals))]
    pub async fn submit(
        &self,
        tx_id: TransactionId,
        deposits: Vec<(AccountNumber, Amount)>,
        withdrawals: Vec<(AccountNumber, Amount)>,
    ) -> Result<(), SagaError> {
        let mut command = StartSaga::new(tx_id.clone(), deposits, withdrawals);
        let (reply, ack) = oneshot::channel();
        command.reply_to = Some(reply);
        self.sagas.send(tx_id.as_str(), SagaCommand::Start(command));
        ack.await??;
        Ok(())
    }

    /// Reads a saga's current state, re-activating it from the journal if
    /// it was passive.
    #[tracing::instrument(skip(self))]
    pub async fn saga_state(&self, tx_id: &TransactionId) -> Result<SagaSummary, SagaError> {
        let (reply, ack) = oneshot::channel();
        self.sagas.send(
            tx_id.as_str(),
            SagaCommand::Get(GetSagaState { reply_to: reply }),
        );
        Ok(ack.await?)
    }

    /// Delivers one deadline/retry tick to every active saga.
    ///
    /// Tests with a disabled ticker drive time explicitly through this.
    pub fn tick(&self) {
        let now = self.clock.now();
        self.sagas.broadcast(|_| SagaCommand::Tick(now));
    }

    /// The account router, for wiring and tests.
    pub fn accounts(&self) -> &Router<BankAccountEntity> {
        &self.accounts
    }

    /// The saga router, for wiring and tests.
    pub fn sagas(&self) -> &Router<SagaCoordinator> {
        &self.sagas
    }
}

impl Drop for Bank {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
