use super::*;
use conman_collab::{FakeAgentClient, FakeHostControllerClient, FakePortMonitor};
use std::net::Ipv4Addr;

fn subnet() -> Subnet {
    Subnet::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)), 24)
}

fn listener(protocol: Protocol, address: &str, port: u16) -> ListenerSpec {
    ListenerSpec { protocol, address: address.to_string(), port }
}

struct Harness {
    engine: ForwardEngine,
    agent: FakeAgentClient,
    host_controller: FakeHostControllerClient,
    port_monitor: FakePortMonitor,
    table: Arc<ForwardTable>,
}

fn harness(machine: MachineId) -> Harness {
    let table = Arc::new(ForwardTable::new());
    let agent = FakeAgentClient::new();
    let host_controller = FakeHostControllerClient::new();
    let port_monitor = FakePortMonitor::new();
    let engine = ForwardEngine::new(
        machine,
        table.clone(),
        Arc::new(agent.clone()),
        Arc::new(host_controller.clone()),
        Arc::new(port_monitor.clone()),
        subnet(),
    );
    Harness { engine, agent, host_controller, port_monitor, table }
}

#[test]
fn keeps_loopback_only_at_the_exact_addresses() {
    assert!(passes_filter(&listener(Protocol::Tcp, "127.0.0.1", 22), &subnet()));
    assert!(passes_filter(&listener(Protocol::Tcp, "::1", 22), &subnet()));
    assert!(!passes_filter(&listener(Protocol::Tcp, "127.0.0.2", 22), &subnet()));
}

#[test]
fn keeps_wildcard_unconditionally() {
    assert!(passes_filter(&listener(Protocol::Tcp, "0.0.0.0", 8080), &subnet()));
    assert!(passes_filter(&listener(Protocol::Tcp, "::", 8080), &subnet()));
}

#[test]
fn drops_dhcp_client_and_llmnr() {
    assert!(!passes_filter(&listener(Protocol::Udp, "10.0.0.5", 68), &subnet()));
    assert!(!passes_filter(&listener(Protocol::Udp, "10.0.0.5", 5355), &subnet()));
}

#[test]
fn keeps_addresses_inside_the_assigned_subnet_only() {
    assert!(passes_filter(&listener(Protocol::Tcp, "10.0.0.5", 80), &subnet()));
    assert!(!passes_filter(&listener(Protocol::Tcp, "192.168.1.5", 80), &subnet()));
}

#[tokio::test]
async fn rescan_adds_a_new_listener_end_to_end() {
    let machine = MachineId::new();
    let h = harness(machine);
    h.port_monitor.set_listeners(vec![listener(Protocol::Tcp, "10.0.0.5", 9000)]);

    h.engine.rescan().await.unwrap();

    let spec = ForwardSpec { protocol: Protocol::Tcp, guest_address: "10.0.0.5".to_string(), port: 9000 };
    assert_eq!(h.table.snapshot_for(machine), vec![spec.clone()]);
    assert_eq!(h.agent.active_proxies(), vec![spec.clone()]);
    assert_eq!(h.host_controller.active_forwards(), vec![spec.clone()]);
    assert!(h.port_monitor.blocked_ports().contains(&spec));
}

#[tokio::test]
async fn rescan_removes_a_listener_that_disappeared() {
    let machine = MachineId::new();
    let h = harness(machine);
    h.port_monitor.set_listeners(vec![listener(Protocol::Tcp, "10.0.0.5", 9000)]);
    h.engine.rescan().await.unwrap();

    h.port_monitor.set_listeners(vec![]);
    h.engine.rescan().await.unwrap();

    assert!(h.table.is_empty());
    assert!(h.agent.active_proxies().is_empty());
    assert!(h.host_controller.active_forwards().is_empty());
    assert!(h.port_monitor.blocked_ports().is_empty());
}

#[tokio::test]
async fn a_failed_start_forward_rolls_back_the_agent_proxy_and_the_block() {
    let machine = MachineId::new();
    let h = harness(machine);
    h.host_controller.fail_next_start();
    h.port_monitor.set_listeners(vec![listener(Protocol::Tcp, "10.0.0.5", 9000)]);

    h.engine.rescan().await.unwrap();

    assert!(h.table.is_empty(), "a rejected forward must not stay in the table");
    assert!(h.agent.active_proxies().is_empty(), "the agent proxy must be torn back down");
    assert!(h.port_monitor.blocked_ports().is_empty(), "the port block must be reverted");
}

#[tokio::test]
async fn a_listener_already_owned_by_another_machine_is_not_stolen() {
    let owner = MachineId::new();
    let other = MachineId::new();
    let spec = ForwardSpec { protocol: Protocol::Tcp, guest_address: "10.0.0.5".to_string(), port: 9000 };
    let h = harness(other);
    h.table.insert(spec.clone(), owner);

    h.port_monitor.set_listeners(vec![listener(Protocol::Tcp, "10.0.0.5", 9000)]);
    h.engine.rescan().await.unwrap();

    assert_eq!(h.table.snapshot_for(other), Vec::<ForwardSpec>::new());
    assert!(h.agent.active_proxies().is_empty());
}
