//! Daemon status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    sessions: SessionsInfo,
    compute: ComputeInfo,
    budget: BudgetInfo,
}

#[derive(Deserialize)]
struct SessionsInfo {
    live: usize,
    initialized: usize,
    max: usize,
    idle_timeout_secs: u64,
}

#[derive(Deserialize)]
struct ComputeInfo {
    max_concurrent: usize,
    available: usize,
    waiting: usize,
    in_flight: Vec<ExecutionInfo>,
}

#[derive(Deserialize)]
struct ExecutionInfo {
    id: u64,
    elapsed_ms: u64,
    estimated_seconds: f64,
}

#[derive(Deserialize)]
struct BudgetInfo {
    max_budget_units: u64,
    max_calc_time_secs: f64,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Illuminate Daemon Status");
    println!("═══════════════════════════════════════");
    println!(
        "  Sessions         : {} / {} ({} initialized)",
        resp.sessions.live, resp.sessions.max, resp.sessions.initialized
    );
    println!("  Idle timeout     : {}s", resp.sessions.idle_timeout_secs);
    println!(
        "  Calc slots       : {} free of {}, {} waiting",
        resp.compute.available, resp.compute.max_concurrent, resp.compute.waiting
    );
    println!("  Budget ceiling   : {} units", resp.budget.max_budget_units);
    println!("  Time ceiling     : {:.0}s", resp.budget.max_calc_time_secs);

    if resp.compute.in_flight.is_empty() {
        println!("\n  No calculations running.");
    } else {
        println!("\n  Running:");
        for r in &resp.compute.in_flight {
            println!(
                "  ─ #{}  {:.1}s elapsed, {:.1}s estimated",
                r.id,
                r.elapsed_ms as f64 / 1000.0,
                r.estimated_seconds
            );
        }
    }

    Ok(())
}
