//! Recurring order generation for supply contracts.
//!
//! Each due contract fires in its own transaction: the generated order, its
//! reservations, the `processed` log row and the schedule advance commit
//! together. A failed firing rolls all of that back and records a `failed`
//! log row in a separate transaction, leaving the schedule where it was so the
//! same run is retried on the next pass.
//!
//! Delivery is at-least-once. If a firing's commit outcome is unknown (the
//! connection dropped mid-commit), the retry can generate a second order for
//! the same run.

mod runner;

pub use runner::{ContractSchedulerRunner, RunnerStats, SchedulerHandle};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use tradeflow_contracts::{Contract, ContractOrder, TermOutcome};
use tradeflow_core::{ContractId, ExpectedVersion, ScheduleId};
use tradeflow_sales::OrderOwner;

use crate::contracts::load;
use crate::error::WorkflowError;
use crate::fulfillment::{DraftLine, OrderDraft, place_order_in};
use crate::store::{Store, StoreError, StoreTx};

/// Renew or expire a contract whose term has run out. Returns the contract
/// as it stands afterwards.
async fn settle_in(
    tx: &mut dyn StoreTx,
    contract_id: ContractId,
    now: DateTime<Utc>,
) -> Result<(Contract, TermOutcome), WorkflowError> {
    let mut contract = load(tx, contract_id).await?;
    let expected = ExpectedVersion::of(&contract);
    let outcome = contract.settle_term(now)?;
    if outcome == TermOutcome::Current {
        return Ok((contract, outcome));
    }
    let version = tx.update_contract(&contract, expected).await?;
    Ok((contract.with_version(version), outcome))
}

/// Generate the order for one due contract inside the caller's transaction.
///
/// `None` when the contract is no longer due once re-read under the
/// transaction (another runner got there first).
async fn fire_in(
    tx: &mut dyn StoreTx,
    contract_id: ContractId,
    now: DateTime<Utc>,
) -> Result<Option<ContractOrder>, WorkflowError> {
    let mut contract = load(tx, contract_id).await?;
    if !contract.is_due(now) {
        return Ok(None);
    }
    let expected = ExpectedVersion::of(&contract);
    let schedule_id = contract
        .schedule()
        .map(|s| s.id)
        .ok_or_else(|| WorkflowError::internal(format!("contract {contract_id} has no schedule")))?;

    let draft = OrderDraft {
        order_number: None,
        owner: OrderOwner::company(contract.company_id()),
        shipping: contract.delivery().clone(),
        contract_id: Some(contract_id),
        lines: contract
            .active_items()
            .map(|item| DraftLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: Some(item.unit_price),
            })
            .collect(),
    };
    let order = place_order_in(tx, draft, now).await?;

    let entry = ContractOrder::processed(contract_id, schedule_id, order.id_typed(), now);
    tx.append_contract_order(&entry).await?;
    contract.mark_generated(now)?;
    tx.update_contract(&contract, expected).await?;

    debug!(
        contract_id = %contract_id,
        order_id = %order.id_typed(),
        total = %order.total_amount(),
        "contract order placed"
    );
    Ok(Some(entry))
}

/// Runs due contracts against a store. Safe to call concurrently and to
/// re-run after a crash.
#[derive(Debug, Clone)]
pub struct ContractScheduler<S> {
    store: S,
}

impl<S: Store> ContractScheduler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Fire every contract due at `now`.
    ///
    /// Returns the log rows written by this pass, `processed` and `failed`
    /// alike. A failure on one contract never stops the others; only a failure
    /// to list the candidates is returned as an error.
    #[instrument(skip(self), fields(now = %now), err)]
    pub async fn run_due_contracts(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContractOrder>, WorkflowError> {
        let candidates = {
            let mut tx = self.store.begin().await?;
            tx.list_active_contracts().await?
        };

        let mut written = Vec::new();
        for candidate in candidates {
            let contract_id = candidate.id_typed();
            let contract = match self.settle(candidate, now).await {
                Ok(Some(contract)) => contract,
                Ok(None) => continue,
                Err(err) => {
                    warn!(contract_id = %contract_id, error = %err, "contract term settlement failed");
                    continue;
                }
            };
            if !contract.is_due(now) {
                continue;
            }
            let Some(schedule_id) = contract.schedule().map(|s| s.id) else {
                continue;
            };

            match self.fire(contract_id, now).await {
                Ok(Some(entry)) => written.push(entry),
                Ok(None) => debug!(contract_id = %contract_id, "contract no longer due"),
                Err(err) => {
                    warn!(
                        contract_id = %contract_id,
                        contract_number = %contract.contract_number(),
                        error = %err,
                        delivery = "at-least-once",
                        "contract firing failed; schedule left in place for retry, a retry may duplicate an order whose commit outcome was lost"
                    );
                    if let Some(entry) = self.record_failure(contract_id, schedule_id, &err, now).await {
                        written.push(entry);
                    }
                }
            }
        }

        info!(
            processed = written.iter().filter(|e| e.order_id.is_some()).count(),
            failed = written.iter().filter(|e| e.order_id.is_none()).count(),
            "contract scheduler pass finished"
        );
        Ok(written)
    }

    /// Settle the contract's term if it has run out. `None` when the contract
    /// expired and must not fire.
    async fn settle(
        &self,
        candidate: Contract,
        now: DateTime<Utc>,
    ) -> Result<Option<Contract>, WorkflowError> {
        let mut trial = candidate.clone();
        if trial.settle_term(now)? == TermOutcome::Current {
            return Ok(Some(candidate));
        }

        let contract_id = candidate.id_typed();
        let mut tx = self.store.begin().await?;
        let (contract, outcome) = match settle_in(tx.as_mut(), contract_id, now).await {
            Ok(settled) => settled,
            Err(err) => {
                tx.rollback().await?;
                return Err(err);
            }
        };
        tx.commit().await?;

        match outcome {
            TermOutcome::Current => Ok(Some(contract)),
            TermOutcome::Renewed(end_date) => {
                info!(contract_id = %contract_id, end_date = %end_date, "contract renewed");
                Ok(Some(contract))
            }
            TermOutcome::Expired => {
                info!(contract_id = %contract_id, "contract expired");
                Ok(None)
            }
        }
    }

    async fn fire(
        &self,
        contract_id: ContractId,
        now: DateTime<Utc>,
    ) -> Result<Option<ContractOrder>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        match fire_in(tx.as_mut(), contract_id, now).await {
            Ok(Some(entry)) => {
                tx.commit().await?;
                info!(
                    contract_id = %contract_id,
                    order_id = ?entry.order_id,
                    "contract order generated"
                );
                Ok(Some(entry))
            }
            Ok(None) => {
                tx.rollback().await?;
                Ok(None)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(contract_id = %contract_id, error = %rollback, "rollback of failed firing failed");
                }
                Err(err)
            }
        }
    }

    /// Write the `failed` log row. Errors here are logged, not returned.
    async fn record_failure(
        &self,
        contract_id: ContractId,
        schedule_id: ScheduleId,
        err: &WorkflowError,
        now: DateTime<Utc>,
    ) -> Option<ContractOrder> {
        let entry = ContractOrder::failed(contract_id, schedule_id, err.to_string(), now);
        let written: Result<(), StoreError> = async {
            let mut tx = self.store.begin().await?;
            tx.append_contract_order(&entry).await?;
            tx.commit().await
        }
        .await;

        match written {
            Ok(()) => Some(entry),
            Err(log_err) => {
                warn!(
                    contract_id = %contract_id,
                    error = %log_err,
                    original_error = %err,
                    "could not record failed contract firing"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::test_support::{active_contract, nine, request};
    use crate::contracts::Contracts;
    use crate::fulfillment::OrderFulfillment;
    use crate::ledger::test_support::seed;
    use crate::ledger::InventoryLedger;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use tradeflow_contracts::{ContractOrderStatus, ContractStatus, Recurrence};
    use tradeflow_core::Money;
    use tradeflow_sales::OrderStatus;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn first_firing_places_contract_order_at_negotiated_price() {
        let store = InMemoryStore::new();
        let (p, row) = seed(&store, "P", 100, 10).await;
        let contract = active_contract(
            &store,
            request(&[(p, 3, 70)], at(2024, 4, 1, 0), Some(Recurrence::daily(nine()))),
        )
        .await;
        let scheduler = ContractScheduler::new(store.clone());

        let now = at(2024, 4, 1, 10);
        let written = scheduler.run_due_contracts(now).await.unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].status, ContractOrderStatus::Processed);

        let order = OrderFulfillment::new(store.clone())
            .get_order(written[0].order_id.unwrap())
            .await
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.record().contract_id, Some(contract.id_typed()));
        assert_eq!(order.record().owner, OrderOwner::company(contract.company_id()));
        assert_eq!(order.record().shipping, *contract.delivery());
        assert_eq!(order.total_amount(), Money::from_minor(210));
        assert_eq!(InventoryLedger::new(store.clone()).item(row).await.unwrap().reserved(), 3);

        let schedule = Contracts::new(store.clone())
            .get_contract(contract.id_typed())
            .await
            .unwrap()
            .schedule()
            .cloned()
            .unwrap();
        assert_eq!(schedule.last_generated, Some(now));
        assert_eq!(schedule.next_generation, Some(at(2024, 4, 2, 9)));

        // Same instant again: nothing is due.
        assert!(scheduler.run_due_contracts(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn monthly_day_31_fires_on_last_day_of_short_month() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 100, 100).await;
        let contract = active_contract(
            &store,
            request(&[(p, 1, 50)], at(2024, 4, 1, 0), Some(Recurrence::monthly(31, nine()))),
        )
        .await;
        let scheduler = ContractScheduler::new(store.clone());
        let contracts = Contracts::new(store.clone());

        scheduler.run_due_contracts(at(2024, 4, 1, 10)).await.unwrap();
        let next = |c: Contract| c.schedule().and_then(|s| s.next_generation);
        let loaded = contracts.get_contract(contract.id_typed()).await.unwrap();
        assert_eq!(next(loaded), Some(at(2024, 4, 30, 9)));

        assert!(scheduler.run_due_contracts(at(2024, 4, 29, 23)).await.unwrap().is_empty());

        let written = scheduler.run_due_contracts(at(2024, 4, 30, 9)).await.unwrap();
        assert_eq!(written.len(), 1);
        let loaded = contracts.get_contract(contract.id_typed()).await.unwrap();
        assert_eq!(next(loaded), Some(at(2024, 5, 31, 9)));
    }

    #[tokio::test]
    async fn failed_firing_is_logged_and_retried() {
        let store = InMemoryStore::new();
        let (p, row) = seed(&store, "P", 100, 0).await;
        let contract = active_contract(
            &store,
            request(&[(p, 2, 60)], at(2024, 4, 1, 0), Some(Recurrence::daily(nine()))),
        )
        .await;
        let scheduler = ContractScheduler::new(store.clone());
        let contracts = Contracts::new(store.clone());
        let before = contracts.get_contract(contract.id_typed()).await.unwrap();

        let written = scheduler.run_due_contracts(at(2024, 4, 1, 10)).await.unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].status, ContractOrderStatus::Failed);
        assert!(written[0].order_id.is_none());
        assert!(written[0].error.as_deref().unwrap().contains("out of stock"));

        let after = contracts.get_contract(contract.id_typed()).await.unwrap();
        assert_eq!(after.schedule(), before.schedule());
        assert_eq!(after.record().version, before.record().version);

        let ledger = InventoryLedger::new(store.clone());
        let warehouse = ledger.item(row).await.unwrap().warehouse_id();
        ledger.receive(p, warehouse, 5).await.unwrap();

        let written = scheduler.run_due_contracts(at(2024, 4, 1, 11)).await.unwrap();
        assert_eq!(written[0].status, ContractOrderStatus::Processed);

        let log = contracts.contract_orders(contract.id_typed()).await.unwrap();
        let statuses: Vec<_> = log.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![ContractOrderStatus::Failed, ContractOrderStatus::Processed]);
    }

    #[tokio::test]
    async fn one_failing_contract_does_not_block_others() {
        let store = InMemoryStore::new();
        let (empty, _) = seed(&store, "EMPTY", 100, 0).await;
        let (stocked, _) = seed(&store, "STOCKED", 100, 10).await;
        let start = at(2024, 4, 1, 0);
        active_contract(&store, request(&[(empty, 1, 10)], start, Some(Recurrence::daily(nine())))).await;
        active_contract(&store, request(&[(stocked, 1, 10)], start, Some(Recurrence::daily(nine())))).await;

        let written = ContractScheduler::new(store)
            .run_due_contracts(at(2024, 4, 1, 10))
            .await
            .unwrap();
        let mut statuses: Vec<_> = written.iter().map(|e| e.status.as_str()).collect();
        statuses.sort_unstable();
        assert_eq!(statuses, vec!["failed", "processed"]);
    }

    #[tokio::test]
    async fn paused_draft_and_unscheduled_contracts_do_not_fire() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 100, 10).await;
        let start = at(2024, 4, 1, 0);
        let contracts = Contracts::new(store.clone());

        contracts
            .create_contract(request(&[(p, 1, 10)], start, Some(Recurrence::daily(nine()))))
            .await
            .unwrap();
        active_contract(&store, request(&[(p, 1, 10)], start, None)).await;
        let paused = active_contract(&store, request(&[(p, 1, 10)], start, Some(Recurrence::daily(nine())))).await;
        contracts.set_schedule_active(paused.id_typed(), false).await.unwrap();

        let written = ContractScheduler::new(store)
            .run_due_contracts(at(2024, 4, 2, 10))
            .await
            .unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn ended_contract_expires_or_renews() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 100, 10).await;
        let start = at(2024, 1, 1, 0);

        let mut expiring = request(&[(p, 1, 10)], start, Some(Recurrence::daily(nine())));
        expiring.end_date = Some(at(2024, 2, 1, 0));
        let expiring = active_contract(&store, expiring).await;

        let mut renewing = request(&[(p, 1, 10)], start, Some(Recurrence::daily(nine())));
        renewing.end_date = Some(at(2024, 2, 1, 0));
        renewing.auto_renew = true;
        renewing.renewal_period_months = 12;
        let renewing = active_contract(&store, renewing).await;

        let written = ContractScheduler::new(store.clone())
            .run_due_contracts(at(2024, 3, 1, 10))
            .await
            .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].contract_id, renewing.id_typed());

        let contracts = Contracts::new(store);
        let expired = contracts.get_contract(expiring.id_typed()).await.unwrap();
        assert_eq!(expired.status(), ContractStatus::Expired);
        let renewed = contracts.get_contract(renewing.id_typed()).await.unwrap();
        assert_eq!(renewed.status(), ContractStatus::Active);
        assert_eq!(renewed.record().end_date, Some(at(2025, 2, 1, 0)));
    }
}
