//! Domain Snapshot Cache
//!
//! Typed entry points for the snapshot shapes services cache. Each shape has
//! a fixed prefix, a sub-key built from its identifying fields and a TTL tier
//! matching how fresh it must be. Computation stays with the caller.
//!
//! | Shape                      | Prefix      | Sub-key                   | Tier     |
//! |----------------------------|-------------|---------------------------|----------|
//! | [`EmployeeBalanceSnapshot`] | `accrual`   | `{employee_id}:{YYYY-MM-DD}` | SNAPSHOT |
//! | [`DashboardAggregate`]      | `dashboard` | `summary`                 | MEDIUM   |
//! | [`EmployerRollup`]          | `employer`  | `{employer_id}:{period}`  | MEDIUM   |

use crate::cache::{subkey, CacheService, CacheTtl};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Prefix for per-employee daily balance snapshots
pub const BALANCE_PREFIX: &str = "accrual";

/// Prefix for per-tenant dashboard aggregates
pub const DASHBOARD_PREFIX: &str = "dashboard";

/// Prefix for per-employer period rollups
pub const EMPLOYER_PREFIX: &str = "employer";

const DASHBOARD_KEY: &str = "summary";
const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Snapshot Shapes
// =============================================================================

/// Point-in-time sick-time balance of one employee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeBalanceSnapshot {
    pub available_paid_hours: f64,
    pub yearly_accrued: f64,
}

/// Tenant-wide figures shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAggregate {
    pub total_employees: u32,
    pub active_employees: u32,
    pub total_available_hours: f64,
    pub pending_requests: u32,
    pub generated_at: DateTime<Utc>,
}

/// Accrual and usage totals for one employer over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployerRollup {
    pub employer_id: String,
    /// Reporting period label, e.g. `2025-01` or `2025-Q1`
    pub period: String,
    pub employee_count: u32,
    pub total_accrued_hours: f64,
    pub total_used_hours: f64,
}

fn balance_key(employee_id: &str, date: NaiveDate) -> String {
    let day = date.format(DATE_FORMAT).to_string();
    subkey(&[employee_id, day.as_str()])
}

fn rollup_key(employer_id: &str, period: &str) -> String {
    subkey(&[employer_id, period])
}

// =============================================================================
// Snapshot Cache
// =============================================================================

/// Snapshot-shaped facade over [`CacheService`]
#[derive(Clone)]
pub struct SnapshotCache {
    cache: Arc<CacheService>,
}

impl SnapshotCache {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self { cache }
    }

    /// Underlying cache service
    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    // -------------------------------------------------------------------------
    // Employee balances
    // -------------------------------------------------------------------------

    pub async fn cache_balance_snapshot(
        &self,
        tenant_id: &str,
        employee_id: &str,
        date: NaiveDate,
        snapshot: &EmployeeBalanceSnapshot,
    ) -> Result<()> {
        self.cache
            .set(
                tenant_id,
                BALANCE_PREFIX,
                &balance_key(employee_id, date),
                snapshot,
                CacheTtl::Snapshot,
            )
            .await
    }

    pub async fn get_cached_balance_snapshot(
        &self,
        tenant_id: &str,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<Option<EmployeeBalanceSnapshot>> {
        let lookup = self
            .cache
            .get(tenant_id, BALANCE_PREFIX, &balance_key(employee_id, date))
            .await?;
        Ok(lookup.into_data())
    }

    pub async fn get_or_compute_balance_snapshot<E, F, Fut>(
        &self,
        tenant_id: &str,
        employee_id: &str,
        date: NaiveDate,
        compute: F,
    ) -> std::result::Result<EmployeeBalanceSnapshot, E>
    where
        E: From<Error>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<EmployeeBalanceSnapshot, E>>,
    {
        self.cache
            .get_or_compute(
                tenant_id,
                BALANCE_PREFIX,
                &balance_key(employee_id, date),
                compute,
                CacheTtl::Snapshot,
            )
            .await
    }

    /// Balances of several employees on one date, keyed by employee ID
    pub async fn batch_get_balance_snapshots<S: AsRef<str>>(
        &self,
        tenant_id: &str,
        employee_ids: &[S],
        date: NaiveDate,
    ) -> Result<HashMap<String, Option<EmployeeBalanceSnapshot>>> {
        let keys: Vec<String> = employee_ids
            .iter()
            .map(|id| balance_key(id.as_ref(), date))
            .collect();
        let found = self
            .cache
            .batch_get::<EmployeeBalanceSnapshot, _>(tenant_id, BALANCE_PREFIX, keys.as_slice())
            .await?;

        Ok(employee_ids
            .iter()
            .zip(&keys)
            .map(|(id, key)| {
                let data = found.get(key).and_then(|lookup| lookup.data().cloned());
                (id.as_ref().to_string(), data)
            })
            .collect())
    }

    /// Drop one employee's snapshot for one date
    pub async fn invalidate_balance_snapshot(
        &self,
        tenant_id: &str,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<bool> {
        self.cache
            .delete(tenant_id, BALANCE_PREFIX, &balance_key(employee_id, date))
            .await
    }

    /// Drop every balance snapshot of a tenant
    pub async fn invalidate_balance_snapshots(&self, tenant_id: &str) -> Result<u64> {
        self.cache.invalidate_prefix(tenant_id, BALANCE_PREFIX).await
    }

    // -------------------------------------------------------------------------
    // Dashboard
    // -------------------------------------------------------------------------

    pub async fn cache_dashboard(&self, tenant_id: &str, aggregate: &DashboardAggregate) -> Result<()> {
        self.cache
            .set(tenant_id, DASHBOARD_PREFIX, DASHBOARD_KEY, aggregate, CacheTtl::Medium)
            .await
    }

    pub async fn get_cached_dashboard(&self, tenant_id: &str) -> Result<Option<DashboardAggregate>> {
        let lookup = self.cache.get(tenant_id, DASHBOARD_PREFIX, DASHBOARD_KEY).await?;
        Ok(lookup.into_data())
    }

    pub async fn get_or_compute_dashboard<E, F, Fut>(
        &self,
        tenant_id: &str,
        compute: F,
    ) -> std::result::Result<DashboardAggregate, E>
    where
        E: From<Error>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<DashboardAggregate, E>>,
    {
        self.cache
            .get_or_compute(tenant_id, DASHBOARD_PREFIX, DASHBOARD_KEY, compute, CacheTtl::Medium)
            .await
    }

    pub async fn invalidate_dashboard(&self, tenant_id: &str) -> Result<bool> {
        self.cache.delete(tenant_id, DASHBOARD_PREFIX, DASHBOARD_KEY).await
    }

    // -------------------------------------------------------------------------
    // Employer rollups
    // -------------------------------------------------------------------------

    pub async fn cache_employer_rollup(&self, tenant_id: &str, rollup: &EmployerRollup) -> Result<()> {
        self.cache
            .set(
                tenant_id,
                EMPLOYER_PREFIX,
                &rollup_key(&rollup.employer_id, &rollup.period),
                rollup,
                CacheTtl::Medium,
            )
            .await
    }

    pub async fn get_cached_employer_rollup(
        &self,
        tenant_id: &str,
        employer_id: &str,
        period: &str,
    ) -> Result<Option<EmployerRollup>> {
        let lookup = self
            .cache
            .get(tenant_id, EMPLOYER_PREFIX, &rollup_key(employer_id, period))
            .await?;
        Ok(lookup.into_data())
    }

    pub async fn get_or_compute_employer_rollup<E, F, Fut>(
        &self,
        tenant_id: &str,
        employer_id: &str,
        period: &str,
        compute: F,
    ) -> std::result::Result<EmployerRollup, E>
    where
        E: From<Error>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<EmployerRollup, E>>,
    {
        self.cache
            .get_or_compute(
                tenant_id,
                EMPLOYER_PREFIX,
                &rollup_key(employer_id, period),
                compute,
                CacheTtl::Medium,
            )
            .await
    }

    /// Rollups of several employers for one period, keyed by employer ID
    pub async fn batch_get_employer_rollups<S: AsRef<str>>(
        &self,
        tenant_id: &str,
        employer_ids: &[S],
        period: &str,
    ) -> Result<HashMap<String, Option<EmployerRollup>>> {
        let keys: Vec<String> = employer_ids
            .iter()
            .map(|id| rollup_key(id.as_ref(), period))
            .collect();
        let found = self
            .cache
            .batch_get::<EmployerRollup, _>(tenant_id, EMPLOYER_PREFIX, keys.as_slice())
            .await?;

        Ok(employer_ids
            .iter()
            .zip(&keys)
            .map(|(id, key)| {
                let data = found.get(key).and_then(|lookup| lookup.data().cloned());
                (id.as_ref().to_string(), data)
            })
            .collect())
    }

    pub async fn invalidate_employer_rollup(
        &self,
        tenant_id: &str,
        employer_id: &str,
        period: &str,
    ) -> Result<bool> {
        self.cache
            .delete(tenant_id, EMPLOYER_PREFIX, &rollup_key(employer_id, period))
            .await
    }

    /// Drop every employer rollup of a tenant
    pub async fn invalidate_employer_rollups(&self, tenant_id: &str) -> Result<u64> {
        self.cache.invalidate_prefix(tenant_id, EMPLOYER_PREFIX).await
    }
}
