//! Load testing for the gateway's saga endpoint.

use std::time::{Duration, Instant};

use trivia_gateway::config::GatewayConfig;
use trivia_gateway::resilience::CircuitState;

mod common;

#[tokio::test]
async fn test_load_performance() {
    let fake = common::FakeServices::new();
    let mut config = GatewayConfig::default();
    config.rate_limit.enabled = false;
    let gw = common::spawn_gateway(config, fake.clone()).await;

    let concurrency = 20;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::new();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for task in 0..concurrency {
        let client = client.clone();
        let url = gw.url("/users/create_with_game");
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for n in 0..requests_per_task {
                let req_start = Instant::now();
                let body = common::new_user_body(&format!("player-{task}-{n}"));
                if let Ok(res) = client.post(&url).json(&body).send().await {
                    if res.status().is_success() {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies: Vec<Duration> = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    assert_eq!(all_latencies.len(), total_requests, "every saga should complete");
    assert_eq!(fake.count("register"), total_requests);
    assert_eq!(fake.count("delete"), 0);
    for snapshot in gw.state.guard.snapshots() {
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.successes, total_requests as u64);
    }

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p95 = all_latencies[(all_latencies.len() as f64 * 0.95) as usize];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P95 Latency:    {:?}", p95);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");

    gw.shutdown();
}
