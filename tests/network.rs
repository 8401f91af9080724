//! Loopback run of both services and a real agent.

use std::time::Duration;

use mazeswarm::agent::{run_agent, Endpoints};
use mazeswarm::config::{AgentSettings, CoordinationSettings, PerceptionSettings};
use mazeswarm::coordination::CoordinationServer;
use mazeswarm::perception::{Maze, PerceptionServer, PerceptionService};
use tokio::time::timeout;

fn fast_agent() -> AgentSettings {
    AgentSettings {
        step_delay_ms: 1,
        query_timeout_ms: 250,
        command_timeout_ms: 500,
        ack_attempts: 10,
        ack_wait_ms: 200,
        connect_retry_ms: 50,
    }
}

async fn start_services() -> Endpoints {
    let service = PerceptionService::new(Maze::default_layout().unwrap());
    let perception = PerceptionServer::bind("127.0.0.1:0", service, PerceptionSettings::default(), false)
        .await
        .unwrap();
    let coordination = CoordinationServer::bind("127.0.0.1:0", CoordinationSettings::default(), false)
        .await
        .unwrap();

    let endpoints = Endpoints {
        perception: perception.local_addr().unwrap(),
        coordination: coordination.local_addr().unwrap(),
    };
    tokio::spawn(perception.run());
    tokio::spawn(coordination.run());
    endpoints
}

#[tokio::test]
async fn test_single_agent_explores_to_finish() {
    let endpoints = start_services().await;

    let result = timeout(Duration::from_secs(60), run_agent(1, endpoints, &fast_agent()))
        .await
        .expect("agent did not finish in time");
    assert!(result.is_ok(), "agent failed: {:?}", result);
}

#[tokio::test]
async fn test_late_agent_gets_no_reply_after_finish() {
    let endpoints = start_services().await;

    timeout(Duration::from_secs(60), run_agent(1, endpoints, &fast_agent()))
        .await
        .expect("first agent did not finish in time")
        .unwrap();

    // hello after the finish gets no ack; the agent gives up waiting and
    // then finds no command either, so bound it and expect a timeout
    let late = timeout(Duration::from_secs(3), run_agent(2, endpoints, &fast_agent())).await;
    assert!(late.is_err(), "late agent should keep waiting, got {:?}", late);
}
