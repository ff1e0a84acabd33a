use super::fake::FakeAgentClient;
use super::*;
use conman_core::MachineId;

fn spec() -> ForwardSpec {
    ForwardSpec { protocol: Protocol::Tcp, guest_address: "10.0.0.2".to_string(), port: 5000 }
}

#[tokio::test]
async fn start_proxy_then_stop_clears_active_list() {
    let agent = FakeAgentClient::new();
    agent.start_proxy_tcp(&spec(), -1).await.unwrap();
    assert_eq!(agent.active_proxies(), vec![spec()]);

    agent.stop_proxy_tcp(&spec()).await.unwrap();
    assert!(agent.active_proxies().is_empty());
}

#[tokio::test]
async fn update_hostname_records_the_value() {
    let agent = FakeAgentClient::new();
    agent.update_hostname("my-machine").await.unwrap();
    assert_eq!(agent.hostname(), Some("my-machine".to_string()));
}

#[tokio::test]
async fn killed_agent_surfaces_agent_dead_kind() {
    let agent = FakeAgentClient::new();
    let id = MachineId::new();
    agent.kill();
    let err = agent.dead_aware_update_hostname(id, "whatever").await.unwrap_err();
    assert_eq!(err.kind(), conman_core::ErrorKind::AgentDead);
}

#[tokio::test]
async fn synthetic_warn_stop_is_counted_and_infallible() {
    let agent = FakeAgentClient::new();
    agent.synthetic_warn_stop().await;
    agent.synthetic_warn_stop().await;
    assert_eq!(agent.warn_stop_calls(), 2);
}
