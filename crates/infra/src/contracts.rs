//! Supply contracts: creation, term and schedule maintenance.
//!
//! Order generation itself lives in [`crate::scheduler`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use tradeflow_contracts::{
    Contract, ContractLine, ContractOrder, ContractStatus, CreateContract, Recurrence,
};
use tradeflow_core::{CompanyId, ContractId, ContractItemId, ExpectedVersion, Money, ProductId};
use tradeflow_sales::ShippingInfo;

use crate::error::WorkflowError;
use crate::store::{ContractFilter, Pagination, Store, StoreTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Negotiated price used for every generated order.
    pub unit_price: Money,
}

/// Input to [`Contracts::create_contract`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRequest {
    pub contract_number: Option<String>,
    pub company_id: CompanyId,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub renewal_period_months: u32,
    pub payment_terms_days: u32,
    pub notes: Option<String>,
    pub delivery: ShippingInfo,
    pub lines: Vec<ContractLineRequest>,
    pub schedule: Option<Recurrence>,
}

/// Partial update for [`Contracts::update_contract`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractUpdate {
    pub status: Option<ContractStatus>,
    pub auto_renew: Option<bool>,
    pub payment_terms_days: Option<u32>,
    pub notes: Option<String>,
}

pub(crate) async fn load(
    tx: &mut dyn StoreTx,
    contract_id: ContractId,
) -> Result<Contract, WorkflowError> {
    tx.get_contract(contract_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(format!("contract {contract_id}")))
}

/// Contract maintenance, each call in its own transaction.
#[derive(Debug, Clone)]
pub struct Contracts<S> {
    store: S,
}

impl<S: Store> Contracts<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create a contract in `Draft`. Every product must exist.
    #[instrument(skip(self, request), fields(company_id = %request.company_id, lines = request.lines.len()), err)]
    pub async fn create_contract(&self, request: ContractRequest) -> Result<Contract, WorkflowError> {
        let contract = Contract::create(CreateContract {
            contract_id: ContractId::new(),
            contract_number: request.contract_number,
            company_id: request.company_id,
            start_date: request.start_date,
            end_date: request.end_date,
            auto_renew: request.auto_renew,
            renewal_period_months: request.renewal_period_months,
            payment_terms_days: request.payment_terms_days,
            notes: request.notes,
            delivery: request.delivery,
            lines: request
                .lines
                .into_iter()
                .map(|l| ContractLine {
                    item_id: ContractItemId::new(),
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
            schedule: request.schedule,
            occurred_at: Utc::now(),
        })?;

        let mut tx = self.store.begin().await?;
        for item in contract.items() {
            if tx.get_product(item.product_id).await?.is_none() {
                return Err(WorkflowError::not_found(format!("product {}", item.product_id)));
            }
        }
        tx.insert_contract(&contract).await?;
        tx.commit().await?;

        info!(
            contract_id = %contract.id_typed(),
            contract_number = %contract.contract_number(),
            scheduled = contract.schedule().is_some(),
            "contract created"
        );
        Ok(contract)
    }

    #[instrument(skip(self, update), fields(contract_id = %contract_id), err)]
    pub async fn update_contract(
        &self,
        contract_id: ContractId,
        update: ContractUpdate,
    ) -> Result<Contract, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut contract = load(tx.as_mut(), contract_id).await?;
        let expected = ExpectedVersion::of(&contract);

        if let Some(target) = update.status {
            if let Err(err) = contract.set_status(target, now) {
                warn!(contract_id = %contract_id, error = %err, "contract transition rejected");
                return Err(err.into());
            }
        }
        if update.auto_renew.is_some()
            || update.payment_terms_days.is_some()
            || update.notes.is_some()
        {
            contract.amend_terms(update.auto_renew, update.payment_terms_days, update.notes, now)?;
        }

        let version = tx.update_contract(&contract, expected).await?;
        tx.commit().await?;
        info!(contract_id = %contract_id, status = %contract.status(), "contract updated");
        Ok(contract.with_version(version))
    }

    pub async fn update_contract_status(
        &self,
        contract_id: ContractId,
        status: ContractStatus,
    ) -> Result<Contract, WorkflowError> {
        self.update_contract(
            contract_id,
            ContractUpdate {
                status: Some(status),
                ..ContractUpdate::default()
            },
        )
        .await
    }

    /// Replace the contract's schedule, keeping the last generation.
    #[instrument(skip(self), fields(contract_id = %contract_id), err)]
    pub async fn set_schedule(
        &self,
        contract_id: ContractId,
        recurrence: Recurrence,
    ) -> Result<Contract, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut contract = load(tx.as_mut(), contract_id).await?;
        let expected = ExpectedVersion::of(&contract);

        contract.set_schedule(recurrence, now)?;

        let version = tx.update_contract(&contract, expected).await?;
        tx.commit().await?;
        info!(
            contract_id = %contract_id,
            frequency = %recurrence.frequency,
            next_generation = ?contract.schedule().and_then(|s| s.next_generation),
            "contract schedule set"
        );
        Ok(contract.with_version(version))
    }

    #[instrument(skip(self), fields(contract_id = %contract_id), err)]
    pub async fn set_schedule_active(
        &self,
        contract_id: ContractId,
        active: bool,
    ) -> Result<Contract, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut contract = load(tx.as_mut(), contract_id).await?;
        let expected = ExpectedVersion::of(&contract);

        contract.set_schedule_active(active, now)?;

        let version = tx.update_contract(&contract, expected).await?;
        tx.commit().await?;
        info!(contract_id = %contract_id, active, "contract schedule toggled");
        Ok(contract.with_version(version))
    }

    pub async fn get_contract(&self, contract_id: ContractId) -> Result<Contract, WorkflowError> {
        let mut tx = self.store.begin().await?;
        load(tx.as_mut(), contract_id).await
    }

    /// Contracts matching `filter`, in contract number order.
    pub async fn list_contracts(
        &self,
        filter: &ContractFilter,
        page: Pagination,
    ) -> Result<Vec<Contract>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_contracts(filter, page).await?)
    }

    /// Generation log for a contract, oldest first.
    pub async fn contract_orders(
        &self,
        contract_id: ContractId,
    ) -> Result<Vec<ContractOrder>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        load(tx.as_mut(), contract_id).await?;
        Ok(tx.list_contract_orders(contract_id).await?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, NaiveTime, Utc};

    use tradeflow_contracts::{Contract, ContractStatus, Recurrence};
    use tradeflow_core::{AddressId, CompanyId, Money, ProductId};
    use tradeflow_sales::ShippingInfo;

    use super::{ContractLineRequest, ContractRequest, Contracts};
    use crate::store::InMemoryStore;

    pub fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    pub fn request(
        lines: &[(ProductId, i64, i64)],
        start_date: DateTime<Utc>,
        schedule: Option<Recurrence>,
    ) -> ContractRequest {
        ContractRequest {
            contract_number: None,
            company_id: CompanyId::new(),
            start_date,
            end_date: None,
            auto_renew: false,
            renewal_period_months: 12,
            payment_terms_days: 30,
            notes: None,
            delivery: ShippingInfo {
                address_id: Some(AddressId::new()),
                method: "freight".into(),
                payment_method: "invoice".into(),
                customer_notes: Some("dock 4".into()),
            },
            lines: lines
                .iter()
                .map(|(product_id, quantity, price)| ContractLineRequest {
                    product_id: *product_id,
                    quantity: *quantity,
                    unit_price: Money::from_minor(*price),
                })
                .collect(),
            schedule,
        }
    }

    /// Create and activate a contract from `request`.
    pub async fn active_contract(store: &InMemoryStore, request: ContractRequest) -> Contract {
        let contracts = Contracts::new(store.clone());
        let contract = contracts.create_contract(request).await.unwrap();
        contracts
            .update_contract_status(contract.id_typed(), ContractStatus::Active)
            .await
            .unwrap()
    }
}
