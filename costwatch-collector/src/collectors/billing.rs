use std::collections::BTreeMap;

use anyhow::Result;
use aws_sdk_budgets as budgets;
use aws_sdk_costexplorer as ce;
use aws_types::SdkConfig;
use ce::types::{DateInterval, Granularity, GroupDefinition, GroupDefinitionType};

use crate::collector_core::{BillingPeriod, BudgetStatus};

const COST_METRIC: &str = "UnblendedCost";

/// Unblended cost for `period`, summed per value of the `dimension` group key
/// (`SERVICE`, `USAGE_TYPE`).
pub async fn cost_grouped_by(conf: &SdkConfig, period: BillingPeriod, dimension: &str) -> Result<BTreeMap<String, f64>> {
    let client = ce::Client::new(conf);
    let mut out: BTreeMap<String, f64> = BTreeMap::new();

    let mut token: Option<String> = None;
    loop {
        let resp = client
            .get_cost_and_usage()
            .time_period(
                DateInterval::builder()
                    .start(period.start.to_string())
                    .end(period.end.to_string())
                    .build()?,
            )
            .granularity(Granularity::Monthly)
            .metrics(COST_METRIC)
            .group_by(
                GroupDefinition::builder()
                    .r#type(GroupDefinitionType::Dimension)
                    .key(dimension)
                    .build(),
            )
            .set_next_page_token(token.clone())
            .send()
            .await?;

        for result in resp.results_by_time() {
            for g in result.groups() {
                let Some(key) = g.keys().first() else { continue };
                let amount = g
                    .metrics()
                    .and_then(|m| m.get(COST_METRIC))
                    .and_then(|v| v.amount())
                    .and_then(|a| a.parse::<f64>().ok())
                    .unwrap_or(0.0);
                *out.entry(key.clone()).or_default() += amount;
            }
        }

        token = resp.next_page_token().map(|s| s.to_string());
        if token.is_none() {
            break;
        }
    }

    Ok(out)
}

fn parse_amount(s: Option<&str>) -> f64 {
    s.and_then(|a| a.parse::<f64>().ok()).unwrap_or(0.0)
}

pub async fn describe_budgets(conf: &SdkConfig, account_id: &str) -> Result<Vec<BudgetStatus>> {
    let client = budgets::Client::new(conf);
    let mut out = Vec::new();

    let mut token: Option<String> = None;
    loop {
        let resp = client
            .describe_budgets()
            .account_id(account_id)
            .set_next_token(token.clone())
            .send()
            .await?;

        for b in resp.budgets() {
            let name: Option<&str> = b.budget_name().into();
            let limit = b.budget_limit().map(|s| parse_amount(s.amount().into())).unwrap_or(0.0);
            let actual = b
                .calculated_spend()
                .and_then(|c| Into::<Option<&budgets::types::Spend>>::into(c.actual_spend()))
                .map(|s| parse_amount(s.amount().into()))
                .unwrap_or(0.0);
            out.push(BudgetStatus {
                name: name.unwrap_or("unnamed").to_string(),
                limit,
                actual,
            });
        }

        token = resp.next_token().map(|s| s.to_string());
        if token.is_none() {
            break;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_default_to_zero() {
        assert_eq!(parse_amount(Some("12.50")), 12.5);
        assert_eq!(parse_amount(Some("n/a")), 0.0);
        assert_eq!(parse_amount(None), 0.0);
    }
}
