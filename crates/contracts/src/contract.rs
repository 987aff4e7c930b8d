use chrono::{DateTime, Datelike, Months, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{
    AggregateRoot, CompanyId, ContractId, ContractItemId, DomainError, DomainResult, Entity,
    Money, ProductId, ScheduleId, Tracked, TransitionOutcome, document_number, transition,
};
use tradeflow_sales::ShippingInfo;

use crate::schedule::{ContractSchedule, Recurrence, days_in_month};
use crate::status::ContractStatus;

/// Recurring basket line at a negotiated price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractItem {
    pub id: ContractItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub is_active: bool,
}

impl Entity for ContractItem {
    type Id = ContractItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLine {
    pub item_id: ContractItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Command: CreateContract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContract {
    pub contract_id: ContractId,
    pub contract_number: Option<String>,
    pub company_id: CompanyId,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub renewal_period_months: u32,
    pub payment_terms_days: u32,
    pub notes: Option<String>,
    /// Shipping details copied onto every generated order.
    pub delivery: ShippingInfo,
    pub lines: Vec<ContractLine>,
    pub schedule: Option<Recurrence>,
    pub occurred_at: DateTime<Utc>,
}

/// Persisted shape of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: ContractId,
    pub contract_number: String,
    pub company_id: CompanyId,
    pub status: ContractStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub renewal_period_months: u32,
    pub payment_terms_days: u32,
    pub notes: Option<String>,
    pub delivery: ShippingInfo,
    pub items: Vec<ContractItem>,
    pub schedule: Option<ContractSchedule>,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Tracked<ContractStatus> for ContractRecord {
    fn current(&self) -> ContractStatus {
        self.status
    }

    fn set_current(&mut self, state: ContractStatus) {
        self.status = state;
    }

    fn entry_timestamp(&mut self, state: ContractStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match state {
            ContractStatus::Active => Some(&mut self.activated_at),
            _ => None,
        }
    }
}

/// What the scheduler should do with a contract whose term has run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermOutcome {
    /// Still within its term (or open-ended).
    Current,
    /// Extended; carries the new end date.
    Renewed(DateTime<Utc>),
    Expired,
}

/// Aggregate root: Contract.
///
/// Owns its items and at most one schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Contract {
    record: ContractRecord,
}

fn validate_terms(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    auto_renew: bool,
    renewal_period_months: u32,
) -> DomainResult<()> {
    if end.is_some_and(|end| end <= start) {
        return Err(DomainError::validation("contract end date must be after its start date"));
    }
    if auto_renew && renewal_period_months == 0 {
        return Err(DomainError::validation("auto-renewing contract requires a renewal period"));
    }
    Ok(())
}

impl Contract {
    pub fn create(cmd: CreateContract) -> DomainResult<Self> {
        validate_terms(cmd.start_date, cmd.end_date, cmd.auto_renew, cmd.renewal_period_months)?;
        cmd.delivery.validate()?;
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("contract requires at least one item"));
        }

        let mut items = Vec::with_capacity(cmd.lines.len());
        for line in cmd.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be positive",
                    line.product_id
                )));
            }
            if line.unit_price.is_negative() {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
            items.push(ContractItem {
                id: line.item_id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                is_active: true,
            });
        }
        let schedule = cmd
            .schedule
            .map(|r| ContractSchedule::new(ScheduleId::new(), r, cmd.start_date))
            .transpose()?;
        let contract_number = document_number(
            cmd.contract_number,
            "CON",
            cmd.occurred_at,
            cmd.contract_id.as_uuid(),
        )?;

        Ok(Self {
            record: ContractRecord {
                id: cmd.contract_id,
                contract_number,
                company_id: cmd.company_id,
                status: ContractStatus::Draft,
                start_date: cmd.start_date,
                end_date: cmd.end_date,
                auto_renew: cmd.auto_renew,
                renewal_period_months: cmd.renewal_period_months,
                payment_terms_days: cmd.payment_terms_days,
                notes: cmd.notes,
                delivery: cmd.delivery,
                items,
                schedule,
                activated_at: None,
                created_at: cmd.occurred_at,
                updated_at: cmd.occurred_at,
                version: 1,
            },
        })
    }

    pub fn restore(record: ContractRecord) -> DomainResult<Self> {
        if let Some(s) = &record.schedule {
            if let (Some(last), Some(next)) = (s.last_generated, s.next_generation) {
                if s.is_active && next <= last {
                    return Err(DomainError::invariant(format!(
                        "contract {}: next generation {next} not after last {last}",
                        record.id
                    )));
                }
            }
        }
        Ok(Self { record })
    }

    pub fn record(&self) -> &ContractRecord {
        &self.record
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.record.version = version;
        self
    }

    pub fn id_typed(&self) -> ContractId {
        self.record.id
    }

    pub fn contract_number(&self) -> &str {
        &self.record.contract_number
    }

    pub fn company_id(&self) -> CompanyId {
        self.record.company_id
    }

    pub fn status(&self) -> ContractStatus {
        self.record.status
    }

    pub fn delivery(&self) -> &ShippingInfo {
        &self.record.delivery
    }

    pub fn schedule(&self) -> Option<&ContractSchedule> {
        self.record.schedule.as_ref()
    }

    pub fn items(&self) -> &[ContractItem] {
        &self.record.items
    }

    /// Lines that go into a generated order.
    pub fn active_items(&self) -> impl Iterator<Item = &ContractItem> {
        self.record.items.iter().filter(|i| i.is_active)
    }

    pub fn set_status(
        &mut self,
        target: ContractStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome<ContractStatus>> {
        let outcome = transition(&mut self.record, target, at)?;
        if outcome.moved() {
            self.record.updated_at = at;
        }
        Ok(outcome)
    }

    /// Amend commercial terms. Unset fields are left alone.
    pub fn amend_terms(
        &mut self,
        auto_renew: Option<bool>,
        payment_terms_days: Option<u32>,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let auto_renew = auto_renew.unwrap_or(self.record.auto_renew);
        validate_terms(
            self.record.start_date,
            self.record.end_date,
            auto_renew,
            self.record.renewal_period_months,
        )?;
        self.record.auto_renew = auto_renew;
        if let Some(days) = payment_terms_days {
            self.record.payment_terms_days = days;
        }
        if notes.is_some() {
            self.record.notes = notes;
        }
        self.record.updated_at = at;
        Ok(())
    }

    /// Replace the schedule. A previous generation, if any, is kept so the new
    /// cadence continues from it.
    pub fn set_schedule(&mut self, recurrence: Recurrence, at: DateTime<Utc>) -> DomainResult<()> {
        let id = self.record.schedule.as_ref().map(|s| s.id).unwrap_or_default();
        let mut schedule = ContractSchedule::new(id, recurrence, self.record.start_date.max(at))?;
        if let Some(previous) = &self.record.schedule {
            if let Some(last) = previous.last_generated {
                schedule.advance(last);
            }
        }
        self.record.schedule = Some(schedule);
        self.record.updated_at = at;
        Ok(())
    }

    pub fn set_schedule_active(&mut self, active: bool, at: DateTime<Utc>) -> DomainResult<()> {
        let Some(schedule) = self.record.schedule.as_mut() else {
            return Err(DomainError::not_found(format!(
                "schedule for contract {}",
                self.record.contract_number
            )));
        };
        schedule.is_active = active;
        self.record.updated_at = at;
        Ok(())
    }

    /// Active with an active schedule whose run has arrived.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.record.status == ContractStatus::Active
            && self
                .record
                .schedule
                .as_ref()
                .is_some_and(|s| s.is_due(now, self.record.start_date))
    }

    /// Record a successful generation.
    pub fn mark_generated(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        let Some(schedule) = self.record.schedule.as_mut() else {
            return Err(DomainError::invariant(format!(
                "contract {} generated an order without a schedule",
                self.record.contract_number
            )));
        };
        schedule.advance(now);
        self.record.updated_at = now;
        Ok(())
    }

    /// Renew or expire an active contract whose end date has passed.
    ///
    /// Renewal extends the term by the smallest whole number of renewal
    /// periods that covers `now`, counted from the lapsed end date. An end
    /// date on the last day of its month renews to the last day of the target
    /// month, so Jan 31 renews to Feb 29 and then Mar 31.
    pub fn settle_term(&mut self, now: DateTime<Utc>) -> DomainResult<TermOutcome> {
        let Some(end) = self.record.end_date else {
            return Ok(TermOutcome::Current);
        };
        if self.record.status != ContractStatus::Active || end > now {
            return Ok(TermOutcome::Current);
        }
        if !self.record.auto_renew {
            self.set_status(ContractStatus::Expired, now)?;
            return Ok(TermOutcome::Expired);
        }

        let overflow = || {
            DomainError::invariant(format!(
                "contract {}: renewal overflows the calendar",
                self.record.contract_number
            ))
        };
        let at_month_end = end.day() == days_in_month(end.year(), end.month());
        let mut periods = 1u32;
        let renewed = loop {
            let months = self
                .record
                .renewal_period_months
                .checked_mul(periods)
                .ok_or_else(overflow)?;
            let mut candidate = end.checked_add_months(Months::new(months)).ok_or_else(overflow)?;
            if at_month_end {
                let last = days_in_month(candidate.year(), candidate.month());
                candidate = candidate.with_day(last).ok_or_else(overflow)?;
            }
            if candidate > now {
                break candidate;
            }
            periods += 1;
        };

        self.record.end_date = Some(renewed);
        self.record.updated_at = now;
        Ok(TermOutcome::Renewed(renewed))
    }
}

impl AggregateRoot for Contract {
    type Id = ContractId;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }

    fn version(&self) -> u64 {
        self.record.version
    }
}
