use anyhow::{bail, Result};
use aws_sdk_cloudwatch as cw;
use aws_types::SdkConfig;
use cw::types::{Dimension, Statistic};

use super::aws::to_smithy;
use crate::collector_core::{MetricTarget, MetricWindow, ResourceKind};

fn cpu_series(kind: ResourceKind) -> Result<(&'static str, &'static str)> {
    match kind {
        ResourceKind::Compute => Ok(("AWS/EC2", "InstanceId")),
        ResourceKind::Database => Ok(("AWS/RDS", "DBInstanceIdentifier")),
        other => bail!("no CPU metric for {}", other.label()),
    }
}

/// Average CPUUtilization datapoints for the target.
pub async fn cpu_average(conf: &SdkConfig, target: &MetricTarget, window: &MetricWindow) -> Result<Vec<f64>> {
    let (namespace, dimension) = cpu_series(target.kind)?;
    let client = cw::Client::new(conf);

    let resp = client
        .get_metric_statistics()
        .namespace(namespace)
        .metric_name("CPUUtilization")
        .dimensions(Dimension::builder().name(dimension).value(&target.id).build()?)
        .start_time(to_smithy(window.window.start))
        .end_time(to_smithy(window.window.end))
        .period(window.period_secs as i32)
        .statistics(Statistic::Average)
        .send()
        .await?;

    Ok(resp.datapoints().iter().filter_map(|dp| dp.average()).collect())
}
