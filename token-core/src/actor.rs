//! Actor-based concurrency for the market
//!
//! A [`Market`] is a single-writer state machine. To share one between
//! tasks it is moved into a Tokio actor that owns it exclusively; callers
//! talk to it through a cloneable [`MarketHandle`].
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            MarketHandle (Clone)              │
//! │      Sends messages to actor mailbox         │
//! └──────────────────────┬───────────────────────┘
//!                        │ mpsc::channel (bounded)
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │          MarketActor (Single Task)           │
//! │   applies one message at a time to Market    │
//! │   and answers on the message's oneshot       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Messages are applied in mailbox order, so every caller observes a
//! linearizable history.

use crate::market::{AccountSnapshot, Market, MarketSnapshot};
use crate::types::{Address, Amount};
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};

/// Message sent to the market actor
#[derive(Debug)]
pub enum MarketMessage {
    /// Issue base units to a holder
    Stake {
        /// Receiving holder
        holder: Address,
        /// Base units
        units: Amount,
        /// New base balance
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Move base units into the pool
    Deposit {
        /// Depositing holder
        holder: Address,
        /// Base units
        units: Amount,
        /// New receipt balance
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Lend base units out of the pool
    Borrow {
        /// Borrowing holder
        holder: Address,
        /// Base units
        units: Amount,
        /// New debt balance
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Return base units against debt
    Repay {
        /// Repaying holder
        holder: Address,
        /// Base units
        units: Amount,
        /// Remaining debt
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Take base units back out of the pool
    Withdraw {
        /// Withdrawing holder
        holder: Address,
        /// Base units
        units: Amount,
        /// Remaining receipt balance
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Move base units between holders
    Transfer {
        /// Sender
        from: Address,
        /// Recipient
        to: Address,
        /// Base units
        units: Amount,
        /// Transfer outcome
        response: oneshot::Sender<Result<bool>>,
    },

    /// Move receipts between holders
    TransferReceipt {
        /// Sender
        from: Address,
        /// Recipient
        to: Address,
        /// Receipt value
        units: Amount,
        /// Transfer outcome
        response: oneshot::Sender<Result<bool>>,
    },

    /// Multiply the base asset's pooled units
    RebaseByFactor {
        /// Positive factor
        factor: Amount,
        /// New pooled units
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Shift the base asset's pooled units
    RebaseByShift {
        /// Signed shift
        shift: Amount,
        /// New pooled units
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Assign the borrow index
    SetBorrowIndex {
        /// Non-negative index
        index: Amount,
        /// Outcome
        response: oneshot::Sender<Result<()>>,
    },

    /// Multiply the liquidity index
    IncreaseLiquidityIndexByFactor {
        /// Positive factor
        factor: Amount,
        /// New index
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Shift the liquidity index
    IncreaseLiquidityIndexByShift {
        /// Signed shift
        shift: Amount,
        /// New index
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Read one holder's balances
    GetAccount {
        /// Holder
        holder: Address,
        /// Balances
        response: oneshot::Sender<AccountSnapshot>,
    },

    /// Read the market-wide view
    GetSnapshot {
        /// Snapshot
        response: oneshot::Sender<MarketSnapshot>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns a [`Market`]
#[derive(Debug)]
pub struct MarketActor {
    /// Owned state
    market: Market,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<MarketMessage>,
}

impl MarketActor {
    /// Create new actor
    pub fn new(market: Market, mailbox: mpsc::Receiver<MarketMessage>) -> Self {
        Self { market, mailbox }
    }

    /// Run the actor event loop; returns the market once the mailbox is
    /// closed or a shutdown message arrives
    pub async fn run(mut self) -> Market {
        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, MarketMessage::Shutdown) {
                tracing::debug!("Market actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
        self.market
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: MarketMessage) {
        let market = &mut self.market;

        // A dropped receiver only means the caller stopped waiting
        match msg {
            MarketMessage::Stake { holder, units, response } => {
                let _ = response.send(market.stake(&holder, units));
            }

            MarketMessage::Deposit { holder, units, response } => {
                let _ = response.send(market.deposit(&holder, units));
            }

            MarketMessage::Borrow { holder, units, response } => {
                let _ = response.send(market.borrow(&holder, units));
            }

            MarketMessage::Repay { holder, units, response } => {
                let _ = response.send(market.repay(&holder, units));
            }

            MarketMessage::Withdraw { holder, units, response } => {
                let _ = response.send(market.withdraw(&holder, units));
            }

            MarketMessage::Transfer { from, to, units, response } => {
                let _ = response.send(market.transfer(&from, &to, units));
            }

            MarketMessage::TransferReceipt { from, to, units, response } => {
                let _ = response.send(market.transfer_receipt(&from, &to, units));
            }

            MarketMessage::RebaseByFactor { factor, response } => {
                let _ = response.send(market.rebase_by_factor(factor));
            }

            MarketMessage::RebaseByShift { shift, response } => {
                let _ = response.send(market.rebase_by_shift(shift));
            }

            MarketMessage::SetBorrowIndex { index, response } => {
                let _ = response.send(market.set_borrow_index(index));
            }

            MarketMessage::IncreaseLiquidityIndexByFactor { factor, response } => {
                let _ = response.send(market.increase_liquidity_index_by_factor(factor));
            }

            MarketMessage::IncreaseLiquidityIndexByShift { shift, response } => {
                let _ = response.send(market.increase_liquidity_index_by_shift(shift));
            }

            MarketMessage::GetAccount { holder, response } => {
                let _ = response.send(market.account(&holder));
            }

            MarketMessage::GetSnapshot { response } => {
                let _ = response.send(market.snapshot());
            }

            MarketMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct MarketHandle {
    sender: mpsc::Sender<MarketMessage>,
}

impl MarketHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<MarketMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MarketMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Issue base units to `holder`
    pub async fn stake(&self, holder: Address, units: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::Stake { holder, units, response })
            .await?
    }

    /// Move base units into the pool
    pub async fn deposit(&self, holder: Address, units: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::Deposit { holder, units, response })
            .await?
    }

    /// Lend base units out of the pool
    pub async fn borrow(&self, holder: Address, units: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::Borrow { holder, units, response })
            .await?
    }

    /// Return base units against debt
    pub async fn repay(&self, holder: Address, units: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::Repay { holder, units, response })
            .await?
    }

    /// Take base units back out of the pool
    pub async fn withdraw(&self, holder: Address, units: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::Withdraw { holder, units, response })
            .await?
    }

    /// Move base units between holders
    pub async fn transfer(&self, from: Address, to: Address, units: Amount) -> Result<bool> {
        self.request(|response| MarketMessage::Transfer { from, to, units, response })
            .await?
    }

    /// Move receipts between holders
    pub async fn transfer_receipt(
        &self,
        from: Address,
        to: Address,
        units: Amount,
    ) -> Result<bool> {
        self.request(|response| MarketMessage::TransferReceipt { from, to, units, response })
            .await?
    }

    /// Multiply the base asset's pooled units
    pub async fn rebase_by_factor(&self, factor: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::RebaseByFactor { factor, response })
            .await?
    }

    /// Shift the base asset's pooled units
    pub async fn rebase_by_shift(&self, shift: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::RebaseByShift { shift, response })
            .await?
    }

    /// Assign the borrow index
    pub async fn set_borrow_index(&self, index: Amount) -> Result<()> {
        self.request(|response| MarketMessage::SetBorrowIndex { index, response })
            .await?
    }

    /// Multiply the liquidity index
    pub async fn increase_liquidity_index_by_factor(&self, factor: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::IncreaseLiquidityIndexByFactor { factor, response })
            .await?
    }

    /// Shift the liquidity index
    pub async fn increase_liquidity_index_by_shift(&self, shift: Amount) -> Result<Amount> {
        self.request(|response| MarketMessage::IncreaseLiquidityIndexByShift { shift, response })
            .await?
    }

    /// Balances of `holder`
    pub async fn account(&self, holder: Address) -> Result<AccountSnapshot> {
        self.request(|response| MarketMessage::GetAccount { holder, response })
            .await
    }

    /// Market-wide view
    pub async fn snapshot(&self) -> Result<MarketSnapshot> {
        self.request(|response| MarketMessage::GetSnapshot { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MarketMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the market actor with a bounded mailbox of `capacity` messages
pub fn spawn_market_actor(market: Market, capacity: usize) -> MarketHandle {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let actor = MarketActor::new(market, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    MarketHandle::new(tx)
}
