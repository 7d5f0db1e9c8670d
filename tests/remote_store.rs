//! Drives the membership table and gateway provider through a real store node over HTTP.

use chrono::Utc;
use membership_directory::config::{ClusteringOptions, GatewayOptions};
use membership_directory::membership::types::{
    MembershipEntry, SiloAddress, SiloStatus, TableVersion,
};
use membership_directory::membership::{GatewayListProvider, MembershipError, MembershipTable};
use membership_directory::storage::StoreError;
use membership_directory::storage::client::RemoteStore;
use membership_directory::storage::node::StoreNode;
use membership_directory::storage::ColumnStore;
use std::net::SocketAddr;
use std::sync::Arc;

async fn start_node() -> (SocketAddr, Arc<ColumnStore>) {
    let engine = ColumnStore::new();
    let node = StoreNode::new("test-node", engine.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, node.router()).await.unwrap();
    });

    (addr, engine)
}

fn options(addr: SocketAddr) -> ClusteringOptions {
    ClusteringOptions {
        contact_points: vec![addr.to_string()],
        request_timeout_ms: 2_000,
        ..ClusteringOptions::default()
    }
}

fn entry(port: u16, status: SiloStatus, proxy_port: Option<u16>) -> MembershipEntry {
    let address = SiloAddress::new(SocketAddr::from(([127, 0, 0, 1], port)), 7);
    let mut entry = MembershipEntry::new(address, status, Utc::now());
    entry.proxy_port = proxy_port;
    entry.silo_name = format!("silo-{}", port);
    entry
}

#[tokio::test]
async fn test_membership_protocol_over_http() {
    let (addr, _engine) = start_node().await;
    let options = options(addr);

    let table = MembershipTable::new("c1", options.clone());
    table.initialize(true).await.unwrap();

    let mut a = entry(11111, SiloStatus::Joining, Some(30000));
    let b = entry(11112, SiloStatus::Active, None);

    assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());
    assert!(!table.insert_row(&b, &TableVersion::new(0)).await.unwrap());
    assert!(table.insert_row(&b, &TableVersion::new(1)).await.unwrap());

    a.status = SiloStatus::Active;
    a.add_suspector(b.silo_address, Utc::now());
    assert!(table.update_row(&a, &TableVersion::new(2)).await.unwrap());

    let data = table.read_all().await.unwrap();
    assert_eq!(data.version.version, 3);
    assert_eq!(data.len(), 2);
    assert_eq!(data.find(&a.silo_address), Some(&a));

    let provider = GatewayListProvider::new("c1", &options, &GatewayOptions::default());
    provider.initialize().await.unwrap();
    let gateways = provider.get_gateways().await.unwrap();
    assert_eq!(gateways.len(), 1);
    assert_eq!(gateways[0].as_str(), "gwy.tcp://127.0.0.1:30000/7");

    table.delete_membership_table_entries("c1").await.unwrap();
    assert!(matches!(
        table.read_all().await,
        Err(MembershipError::MissingVersion(_))
    ));
}

#[tokio::test]
async fn test_store_errors_cross_the_wire() {
    let (addr, engine) = start_node().await;
    let options = options(addr);

    let table = MembershipTable::new("c1", options.clone());
    table.initialize(true).await.unwrap();

    engine.set_replica_available("orleans", 0, false).unwrap();
    engine.set_replica_available("orleans", 1, false).unwrap();

    match table.read_all().await {
        Err(MembershipError::Store(StoreError::Unavailable {
            required, alive, ..
        })) => {
            assert_eq!(required, 2);
            assert_eq!(alive, 1);
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }

    engine.set_replica_available("orleans", 0, true).unwrap();
    engine.set_replica_available("orleans", 1, true).unwrap();
    assert_eq!(table.read_all().await.unwrap().version.version, 0);
}

#[tokio::test]
async fn test_connect_fails_without_live_contact_point() {
    let options = ClusteringOptions {
        contact_points: vec!["127.0.0.1:9".to_string()],
        request_attempts: 1,
        ..ClusteringOptions::default()
    };

    assert!(RemoteStore::connect(&options).await.is_err());

    let table = MembershipTable::new("c1", options);
    assert!(matches!(
        table.initialize(true).await,
        Err(MembershipError::Store(_))
    ));
}

#[tokio::test]
async fn test_client_never_switches_between_nodes() {
    let (first, _) = start_node().await;
    let (second, _) = start_node().await;

    let both = ClusteringOptions {
        contact_points: vec![first.to_string(), second.to_string()],
        ..ClusteringOptions::default()
    };
    assert!(matches!(
        RemoteStore::connect(&both).await,
        Err(StoreError::InvalidQuery(_))
    ));

    // Each node holds its own table: a cluster initialized on one is unknown to the other.
    let on_first = MembershipTable::new("c1", options(first));
    on_first.initialize(true).await.unwrap();
    let a = entry(11111, SiloStatus::Active, None);
    assert!(on_first.insert_row(&a, &TableVersion::new(0)).await.unwrap());

    let on_second = MembershipTable::new("c1", options(second));
    on_second.initialize(false).await.unwrap();
    assert!(matches!(
        on_second.read_all().await,
        Err(MembershipError::MissingVersion(_))
    ));
    assert_eq!(on_first.read_all().await.unwrap().version.version, 1);
}
