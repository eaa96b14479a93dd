use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;

use crate::client::{records, ClientOptions, Market, SecurityId, SimulatedNetwork};
use crate::core::Core;
use crate::source::{Endpoint, EndpointHealthStats};

/// One line of `rank` output
#[derive(Debug, Serialize)]
pub struct RankRow {
    pub rank: Option<usize>,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub latency_ms: Option<f64>,
    pub reachable: bool,
    pub failures: u32,
}

/// Build rank rows: reachable endpoints best first, then the unreachable ones
/// in configuration order
pub fn rank_rows(
    ranked: &[Endpoint],
    stats: &[EndpointHealthStats],
    names: &HashMap<Endpoint, String>,
) -> Vec<RankRow> {
    let by_endpoint: HashMap<&Endpoint, &EndpointHealthStats> =
        stats.iter().map(|s| (&s.endpoint, s)).collect();

    let row = |rank: Option<usize>, endpoint: &Endpoint| {
        let health = by_endpoint.get(endpoint);
        RankRow {
            rank,
            endpoint: endpoint.to_string(),
            name: names.get(endpoint).cloned(),
            latency_ms: health
                .and_then(|h| h.latency)
                .map(|d| d.as_secs_f64() * 1000.0),
            reachable: health.map(|h| h.reachable).unwrap_or(false),
            failures: health.map(|h| h.failure_count).unwrap_or(0),
        }
    };

    let mut rows: Vec<RankRow> = ranked
        .iter()
        .enumerate()
        .map(|(i, ep)| row(Some(i + 1), ep))
        .collect();

    rows.extend(
        stats
            .iter()
            .filter(|s| !ranked.contains(&s.endpoint))
            .map(|s| row(None, &s.endpoint)),
    );
    rows
}

fn format_latency(latency_ms: Option<f64>) -> String {
    match latency_ms {
        Some(ms) => format!("{:.1} ms", ms),
        None => "-".to_string(),
    }
}

/// Rank command - probe configured hosts and list them best first
pub async fn cmd_rank(core: &Core, top: Option<usize>, json: bool) -> Result<()> {
    core.source
        .probe_all()
        .await
        .context("Failed to probe endpoints")?;

    let ranked = core.source.rank();
    let stats = core.source.health_stats();
    let names: HashMap<Endpoint, String> = core
        .config
        .hosts
        .iter()
        .filter_map(|h| h.name.clone().map(|name| (h.endpoint(), name)))
        .collect();

    let mut rows = rank_rows(&ranked, &stats, &names);
    if let Some(top) = top {
        rows.truncate(top);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No endpoints configured");
        return Ok(());
    }

    for row in &rows {
        let rank = row
            .rank
            .map(|r| format!("{:>3}", r))
            .unwrap_or_else(|| "  -".to_string());
        let status = if row.reachable { "" } else { "  unreachable" };
        println!(
            "{}  {:<24} {:>10}  {}{}",
            rank,
            row.endpoint,
            format_latency(row.latency_ms),
            row.name.as_deref().unwrap_or(""),
            status
        );
    }
    println!();
    println!("{} of {} endpoints reachable", ranked.len(), stats.len());

    Ok(())
}

/// Simulate command - drive a pool over the configured hosts with an
/// in-memory client that fails at random
pub async fn cmd_simulate(core: &Core, calls: usize, failure_rate: f64, seed: u64) -> Result<()> {
    let network = SimulatedNetwork::new();
    network.set_failure_rate(failure_rate, seed);

    let source = core.fixed_source();
    let (active, standby) = match source.endpoints() {
        [active, standby, ..] => (active.clone(), standby.clone()),
        _ => anyhow::bail!("At least two hosts are required to simulate"),
    };

    let factory_network = network.clone();
    let pool = core.pool_with_source(
        move |options: &ClientOptions| factory_network.client(options),
        source,
    );

    let policy = pool.policy();
    println!(
        "Simulating {} calls, failure rate {:.0}%, max retries {}, retry interval {:?}",
        calls,
        failure_rate * 100.0,
        policy.max_retries,
        policy.retry_interval
    );

    let session = pool
        .connect(active, standby)
        .await
        .context("Failed to connect pool")?;

    let stocks = vec![
        SecurityId::new(Market::Shenzhen, "000001"),
        SecurityId::new(Market::Shanghai, "600300"),
    ];

    let mut last_quotes = Vec::new();
    let mut failed_calls = 0;
    for i in 0..calls {
        match session.get_security_quotes(stocks.clone()).await {
            Ok(quotes) => {
                let via = session
                    .active_endpoint()
                    .await
                    .map(|ep| ep.to_string())
                    .unwrap_or_default();
                println!("call {:>4}: {} quotes via {}", i + 1, quotes.len(), via);
                last_quotes = quotes;
            }
            Err(e) => {
                failed_calls += 1;
                println!("call {:>4}: {}", i + 1, e);
            }
        }
    }

    if !last_quotes.is_empty() {
        let table = session.to_table(records(&last_quotes)?).await?;
        println!();
        println!("Last result: {} rows, columns {}", table.len(), table.columns.join(", "));
    }

    let stats = session.stats().await;
    session.close().await.context("Failed to disconnect pool")?;

    println!();
    println!("Calls succeeded: {}", stats.calls);
    println!("Calls failed: {}", failed_calls);
    println!("Failed attempts: {}", stats.failures);
    println!("Rotations: {}", stats.rotations);
    println!("Standby misses: {}", stats.standby_misses);
    println!(
        "Final active: {}",
        stats.active.map(|e| e.to_string()).unwrap_or_else(|| "-".into())
    );
    println!(
        "Final standby: {}",
        stats.standby.map(|e| e.to_string()).unwrap_or_else(|| "-".into())
    );
    println!("Network calls: {}", network.calls().len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stats(endpoint: &Endpoint, latency_ms: Option<u64>, failures: u32) -> EndpointHealthStats {
        EndpointHealthStats {
            endpoint: endpoint.clone(),
            latency: latency_ms.map(Duration::from_millis),
            reachable: latency_ms.is_some(),
            failure_count: failures,
            last_probe: Some(Duration::from_millis(5)),
        }
    }

    #[test]
    fn test_rank_rows_order() {
        let a = Endpoint::new("a.example.com", 7709);
        let b = Endpoint::new("b.example.com", 7709);
        let c = Endpoint::new("c.example.com", 7709);

        let health = vec![
            stats(&a, Some(30), 0),
            stats(&b, None, 2),
            stats(&c, Some(10), 0),
        ];
        let names = HashMap::from([(c.clone(), "Shanghai".to_string())]);

        let rows = rank_rows(&[c.clone(), a.clone()], &health, &names);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].endpoint, "c.example.com:7709");
        assert_eq!(rows[0].rank, Some(1));
        assert_eq!(rows[0].name.as_deref(), Some("Shanghai"));
        assert_eq!(rows[1].endpoint, "a.example.com:7709");
        assert_eq!(rows[2].rank, None);
        assert!(!rows[2].reachable);
        assert_eq!(rows[2].failures, 2);
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(Some(12.345)), "12.3 ms");
        assert_eq!(format_latency(None), "-");
    }

    #[tokio::test]
    async fn test_simulate_runs_against_config_hosts() {
        let mut config = crate::config::Config::new();
        for host in ["a.example.com", "b.example.com", "c.example.com"] {
            config.hosts.push(crate::config::HostEntry {
                name: None,
                host: host.to_string(),
                port: 7709,
            });
        }
        config.client.heartbeat = false;
        config.retry.retry_interval_ms = Some(0);

        let core = Core::new(config).unwrap();
        cmd_simulate(&core, 5, 0.3, 42).await.unwrap();
    }
}
