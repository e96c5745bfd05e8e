//! AWS-backed inventory and billing providers.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_iam as iam;
use aws_sdk_sts as sts;
use aws_types::region::Region;
use aws_types::SdkConfig;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{billing, cloudtrail, cloudwatch, ebs, ec2, lambda, rds, s3};
use crate::collector_core::{
    AuditEvent, BillingPeriod, BillingProvider, BudgetStatus, CallerIdentity, DiscoveredResource,
    InventoryProvider, MetricTarget, MetricWindow, TimeWindow,
};

/// Cost Explorer and Budgets only answer in this region.
const BILLING_REGION: &str = "us-east-1";

pub(crate) fn to_chrono(t: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), t.subsec_nanos())
}

pub(crate) fn to_smithy(t: DateTime<Utc>) -> aws_smithy_types::DateTime {
    aws_smithy_types::DateTime::from_secs(t.timestamp())
}

/// Value of the `Name` tag, if any.
pub(crate) fn name_tag<'a>(tags: impl Iterator<Item = (Option<&'a str>, Option<&'a str>)>) -> Option<String> {
    tags.filter_map(|(k, v)| Some((k?, v?)))
        .find(|(k, _)| *k == "Name")
        .map(|(_, v)| v.to_string())
}

pub async fn load_config(home_region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(home_region.to_string()))
        .load()
        .await
}

fn regional(base: &SdkConfig, region: &str) -> SdkConfig {
    base.to_builder().region(Region::new(region.to_string())).build()
}

async fn caller_identity(conf: &SdkConfig) -> Result<(String, Option<String>)> {
    let who = sts::Client::new(conf)
        .get_caller_identity()
        .send()
        .await
        .context("sts:GetCallerIdentity")?;
    let account = who
        .account()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("caller identity has no account id"))?;
    Ok((account, who.arn().map(|s| s.to_string())))
}

pub struct AwsInventory {
    base: SdkConfig,
    home_region: String,
}

impl AwsInventory {
    pub fn new(base: SdkConfig, home_region: &str) -> Self {
        Self {
            base,
            home_region: home_region.to_string(),
        }
    }
}

#[async_trait]
impl InventoryProvider for AwsInventory {
    fn name(&self) -> &'static str {
        "aws"
    }

    async fn identity(&self) -> Result<CallerIdentity> {
        let (account_id, arn) = caller_identity(&self.base).await?;
        let alias = match iam::Client::new(&self.base).list_account_aliases().send().await {
            Ok(resp) => resp.account_aliases().first().cloned(),
            Err(e) => {
                debug!(error = %e, "account alias unavailable");
                None
            }
        };
        Ok(CallerIdentity { account_id, alias, arn })
    }

    async fn partitions(&self) -> Result<Vec<String>> {
        ec2::enabled_regions(&self.base).await
    }

    async fn list_compute(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        ec2::list_instances(&regional(&self.base, partition), partition).await
    }

    async fn list_databases(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        rds::list_instances(&regional(&self.base, partition), partition).await
    }

    async fn list_volumes(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        ebs::list_volumes(&regional(&self.base, partition), partition).await
    }

    async fn list_snapshots(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        ebs::list_snapshots(&regional(&self.base, partition), partition).await
    }

    async fn list_functions(&self, partition: &str) -> Result<Vec<DiscoveredResource>> {
        lambda::list_functions(&regional(&self.base, partition), partition).await
    }

    async fn list_buckets(&self) -> Result<Vec<DiscoveredResource>> {
        s3::list_buckets(&self.base).await
    }

    async fn list_audit_events(&self, window: TimeWindow) -> Result<Vec<AuditEvent>> {
        cloudtrail::lookup_events(&self.base, &self.home_region, window).await
    }

    async fn query_metric(&self, target: &MetricTarget, window: &MetricWindow) -> Result<Vec<f64>> {
        cloudwatch::cpu_average(&regional(&self.base, &target.partition), target, window).await
    }
}

pub struct AwsBilling {
    conf: SdkConfig,
    account_id: OnceCell<String>,
}

impl AwsBilling {
    pub fn new(base: &SdkConfig) -> Self {
        Self {
            conf: regional(base, BILLING_REGION),
            account_id: OnceCell::new(),
        }
    }

    async fn account_id(&self) -> Result<&str> {
        let id = self
            .account_id
            .get_or_try_init(|| async { caller_identity(&self.conf).await.map(|(account, _)| account) })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl BillingProvider for AwsBilling {
    async fn cost_by_service(&self, period: BillingPeriod) -> Result<BTreeMap<String, f64>> {
        billing::cost_grouped_by(&self.conf, period, "SERVICE").await
    }

    async fn cost_by_usage_type(&self, period: BillingPeriod) -> Result<BTreeMap<String, f64>> {
        billing::cost_grouped_by(&self.conf, period, "USAGE_TYPE").await
    }

    async fn budgets(&self) -> Result<Vec<BudgetStatus>> {
        let account_id = self.account_id().await?;
        billing::describe_budgets(&self.conf, account_id).await
    }
}
