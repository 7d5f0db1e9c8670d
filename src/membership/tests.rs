//! Membership Module Tests
//!
//! Validates the membership table protocol and the gateway view on top of an in-process store.
//!
//! ## Test Scopes
//! - **Identity**: Entity ids and the parsable silo address form.
//! - **Codec**: Rows round-trip entries, suspicion lists are guarded against drift.
//! - **Versioning**: Inserts/updates succeed only at the current version; heartbeats never bump it.
//! - **Discovery**: Only active silos with a proxy port are reported as gateways.
//! - **Concurrency**: Racing writers in conditional and unconditional version-check modes.

#[cfg(test)]
mod tests {
    use crate::config::{ClusteringOptions, GatewayOptions, VersionCheck};
    use crate::membership::codec::{self, CLUSTER_VERSION_ID, columns};
    use crate::membership::error::MembershipError;
    use crate::membership::gateway::GatewayListProvider;
    use crate::membership::table::MembershipTable;
    use crate::membership::types::*;
    use crate::storage::backend::QuorumStore;
    use crate::storage::engine::ColumnStore;
    use crate::storage::types::{Batch, Consistency, Filter, Value};
    use chrono::{Duration, TimeZone, Utc};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    const CLUSTER: &str = "c1";

    fn options(version_check: VersionCheck) -> ClusteringOptions {
        ClusteringOptions {
            version_check,
            ..ClusteringOptions::default()
        }
    }

    fn silo(last_octet: u8, port: u16, generation: i32) -> SiloAddress {
        SiloAddress::from_parts(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)),
            port,
            generation,
        )
    }

    fn entry(address: SiloAddress, status: SiloStatus) -> MembershipEntry {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut entry = MembershipEntry::new(address, status, start);
        entry.silo_name = format!("silo-{}", address.port());
        entry.host_name = "host-a".to_string();
        entry
    }

    async fn table_on(
        store: &Arc<ColumnStore>,
        version_check: VersionCheck,
    ) -> MembershipTable {
        let table = MembershipTable::with_backend(CLUSTER, options(version_check), store.clone());
        table.initialize(true).await.unwrap();
        table
    }

    async fn table(version_check: VersionCheck) -> (Arc<ColumnStore>, MembershipTable) {
        let store = ColumnStore::new();
        let table = table_on(&store, version_check).await;
        (store, table)
    }

    async fn current_version(table: &MembershipTable) -> TableVersion {
        table.read_all().await.unwrap().version
    }

    // ============================================================
    // IDENTITY TESTS
    // ============================================================

    #[test]
    fn test_entity_id_is_deterministic() {
        let a = SiloAddress::from_parts("1.2.3.4".parse().unwrap(), 1000, 5);
        let b = SiloAddress::new("1.2.3.4:1000".parse().unwrap(), 5);

        assert_eq!(a.entity_id(), "1.2.3.4-1000-5");
        assert_eq!(a.entity_id(), b.entity_id());
        assert_ne!(a.entity_id(), silo(4, 1000, 6).entity_id());
    }

    #[test]
    fn test_silo_address_parsable_form() {
        let v4 = silo(7, 11111, 42);
        assert_eq!(v4.to_string(), "10.0.0.7:11111@42");
        assert_eq!("10.0.0.7:11111@42".parse::<SiloAddress>().unwrap(), v4);

        let v6 = SiloAddress::new(SocketAddr::new("::1".parse().unwrap(), 30000), -3);
        assert_eq!(v6.to_string(), "[::1]:30000@-3");
        assert_eq!(v6.to_string().parse::<SiloAddress>().unwrap(), v6);
        assert_eq!(v6.entity_id(), "::1-30000--3");

        for bad in ["10.0.0.7:11111", "10.0.0.7@1", "nope:1@1", "10.0.0.7:1@x"] {
            assert!(matches!(
                bad.parse::<SiloAddress>(),
                Err(MembershipError::InvalidSiloAddress(_))
            ));
        }
    }

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            SiloStatus::Created,
            SiloStatus::Joining,
            SiloStatus::Active,
            SiloStatus::ShuttingDown,
            SiloStatus::Stopping,
            SiloStatus::Dead,
            SiloStatus::Suspect,
        ] {
            assert_eq!(SiloStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(SiloStatus::Active.code(), 3);
        assert_eq!(SiloStatus::from_code(0), None);
        assert!(SiloStatus::Dead.is_terminating());
        assert!(!SiloStatus::Suspect.is_terminating());
    }

    #[test]
    fn test_gateway_uri_uses_proxy_port() {
        let mut gateway = entry(silo(1, 11111, 9), SiloStatus::Active);
        assert_eq!(gateway.gateway_uri(), None);

        gateway.proxy_port = Some(30000);
        assert_eq!(
            gateway.gateway_uri().unwrap().as_str(),
            "gwy.tcp://10.0.0.1:30000/9"
        );

        gateway.status = SiloStatus::Suspect;
        assert_eq!(gateway.gateway_uri(), None);
    }

    // ============================================================
    // CODEC TESTS
    // ============================================================

    #[test]
    fn test_entry_round_trip_with_suspicions() {
        let mut original = entry(silo(1, 11111, 1), SiloStatus::Suspect);
        original.proxy_port = Some(30000);
        original.role_name = "worker".to_string();
        original.update_zone = 2;
        original.fault_zone = 7;
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap();
        original.add_suspector(silo(2, 11111, 1), t0);
        original.add_suspector(silo(3, 11111, 1), t0 + Duration::seconds(3));

        let row = codec::entry_to_row(&original, CLUSTER);
        assert_eq!(
            row.get(columns::ENTITY_ID),
            Some(&Value::from("10.0.0.1-11111-1"))
        );
        assert_eq!(row.get(columns::STATUS), Some(&Value::Int(7)));

        let decoded = codec::row_to_entry(&row).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.suspect_times[1].0, silo(3, 11111, 1));
    }

    #[test]
    fn test_entry_without_proxy_or_suspicions() {
        let original = entry(silo(1, 11111, 1), SiloStatus::Joining);
        let row = codec::entry_to_row(&original, CLUSTER);

        assert!(row.get(columns::PROXY_PORT).is_none());
        let decoded = codec::row_to_entry(&row).unwrap();
        assert_eq!(decoded.proxy_port, None);
        assert!(decoded.suspect_times.is_empty());
    }

    #[test]
    fn test_mismatched_suspicion_lists_are_inconsistent() {
        let mut original = entry(silo(1, 11111, 1), SiloStatus::Suspect);
        original.add_suspector(silo(2, 11111, 1), Utc::now());
        let mut row = codec::entry_to_row(&original, CLUSTER);
        row.set(columns::SUSPECTING_TIMES, Value::TimestampList(Vec::new()));

        match codec::row_to_entry(&row) {
            Err(MembershipError::Inconsistent {
                entity_id,
                silos,
                times,
            }) => {
                assert_eq!(entity_id, "10.0.0.1-11111-1");
                assert_eq!((silos, times), (1, 0));
            }
            other => panic!("expected Inconsistent, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_rows_rejected() {
        let good = codec::entry_to_row(&entry(silo(1, 11111, 1), SiloStatus::Active), CLUSTER);

        let mut bad_status = good.clone();
        bad_status.set(columns::STATUS, 42i64);
        assert!(matches!(
            codec::row_to_entry(&bad_status),
            Err(MembershipError::MalformedRow { .. })
        ));

        let mut bad_port = good.clone();
        bad_port.set(columns::PORT, 70000i64);
        assert!(matches!(
            codec::row_to_entry(&bad_port),
            Err(MembershipError::MalformedRow { .. })
        ));

        let mut no_address = good.clone();
        no_address.remove(columns::ADDRESS);
        assert!(codec::row_to_entry(&no_address).is_err());

        let mut bad_suspector = good;
        bad_suspector.set(
            columns::SUSPECTING_SILOS,
            Value::TextList(vec!["garbage".to_string()]),
        );
        bad_suspector.set(
            columns::SUSPECTING_TIMES,
            Value::TimestampList(vec![Utc::now()]),
        );
        assert!(matches!(
            codec::row_to_entry(&bad_suspector),
            Err(MembershipError::MalformedRow { .. })
        ));
    }

    #[test]
    fn test_version_row() {
        let row = codec::version_to_row(&TableVersion::new(12), CLUSTER, Utc::now());

        assert!(codec::is_version_row(&row));
        assert_eq!(row.get(columns::ENTITY_TYPE), Some(&Value::from(CLUSTER_VERSION_ID)));
        assert_eq!(codec::row_to_version(&row).unwrap(), TableVersion::new(12));

        let silo_row = codec::entry_to_row(&entry(silo(1, 1, 1), SiloStatus::Active), CLUSTER);
        assert!(!codec::is_version_row(&silo_row));
    }

    #[test]
    fn test_schema_is_valid() {
        let schema = codec::membership_schema("cluster_membership");
        assert!(schema.validate().is_ok());
        assert_eq!(
            schema.partition_key,
            vec![columns::CLUSTER_ID.to_string(), columns::ENTITY_ID.to_string()]
        );
        let row = codec::entry_to_row(&entry(silo(1, 1, 1), SiloStatus::Active), CLUSTER);
        assert!(schema.check_row(&row).is_ok());
    }

    // ============================================================
    // TABLE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_version_protocol_scenario() {
        let (_, table) = table(VersionCheck::Conditional).await;

        let initial = table.read_all().await.unwrap();
        assert!(initial.is_empty());
        assert_eq!(initial.version.version, 0);

        let a = entry(
            SiloAddress::from_parts("1.2.3.4".parse().unwrap(), 1000, 5),
            SiloStatus::Joining,
        );
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        let after_a = table.read_row(&a.silo_address).await.unwrap();
        assert_eq!(after_a.version.version, 1);
        assert_eq!(after_a.find(&a.silo_address), Some(&a));

        let b = entry(silo(2, 1000, 5), SiloStatus::Joining);
        assert!(!table.insert_row(&b, &TableVersion::new(0)).await.unwrap());
        assert_eq!(table.read_all().await.unwrap().len(), 1);

        assert!(table.insert_row(&b, &TableVersion::new(1)).await.unwrap());
        let all = table.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.version.version, 2);
    }

    #[tokio::test]
    async fn test_cardinality_after_inserts() {
        let (_, table) = table(VersionCheck::Conditional).await;

        for i in 0..6u8 {
            let version = current_version(&table).await;
            let silo_entry = entry(silo(i, 11111, 1), SiloStatus::Active);
            assert!(table.insert_row(&silo_entry, &version).await.unwrap());
        }

        let all = table.read_all().await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all.version.version, 6);
        assert!(all.members.iter().all(|(_, etag)| etag.is_empty()));
    }

    #[tokio::test]
    async fn test_insert_existing_row_rejected() {
        let (_, table) = table(VersionCheck::Conditional).await;
        let a = entry(silo(1, 11111, 1), SiloStatus::Joining);

        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());
        assert!(!table.insert_row(&a, &TableVersion::new(1)).await.unwrap());
        assert_eq!(current_version(&table).await.version, 1);
    }

    #[tokio::test]
    async fn test_update_row() {
        let (_, table) = table(VersionCheck::Conditional).await;
        let mut a = entry(silo(1, 11111, 1), SiloStatus::Joining);
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        a.status = SiloStatus::Suspect;
        a.add_suspector(silo(2, 11111, 1), Utc::now());

        assert!(!table.update_row(&a, &TableVersion::new(0)).await.unwrap());
        assert!(table.update_row(&a, &TableVersion::new(1)).await.unwrap());

        let data = table.read_row(&a.silo_address).await.unwrap();
        assert_eq!(data.version.version, 2);
        assert_eq!(data.find(&a.silo_address), Some(&a));

        a.status = SiloStatus::Dead;
        a.suspect_times.clear();
        assert!(table.update_row(&a, &data.version).await.unwrap());
        let stored = table.read_row(&a.silo_address).await.unwrap();
        assert!(stored.members[0].0.suspect_times.is_empty());
        assert_eq!(stored.members[0].0.status, SiloStatus::Dead);
    }

    #[tokio::test]
    async fn test_update_missing_row_rejected() {
        let (_, table) = table(VersionCheck::Conditional).await;
        let ghost = entry(silo(9, 11111, 1), SiloStatus::Active);

        assert!(!table.update_row(&ghost, &TableVersion::new(0)).await.unwrap());
        assert!(table.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_touches_only_liveness() {
        let (_, table) = table(VersionCheck::Conditional).await;
        let mut a = entry(silo(1, 11111, 1), SiloStatus::Active);
        a.proxy_port = Some(30000);
        a.add_suspector(silo(2, 11112, 1), a.start_time + Duration::seconds(5));
        a.add_suspector(silo(3, 11113, 1), a.start_time + Duration::seconds(9));
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        let mut beat = a.clone();
        beat.i_am_alive_time = a.i_am_alive_time + Duration::seconds(30);
        beat.status = SiloStatus::Dead;
        beat.proxy_port = None;
        beat.suspect_times.clear();
        table.update_i_am_alive(&beat).await.unwrap();

        let data = table.read_row(&a.silo_address).await.unwrap();
        assert_eq!(data.version.version, 1);
        let stored = data.find(&a.silo_address).unwrap();
        assert_eq!(stored.i_am_alive_time, beat.i_am_alive_time);
        assert_eq!(stored.status, SiloStatus::Active);
        assert_eq!(stored.proxy_port, Some(30000));
        assert_eq!(stored.suspect_times, a.suspect_times);
    }

    #[tokio::test]
    async fn test_heartbeat_after_reset_does_not_recreate_row() {
        let (_, table) = table(VersionCheck::Conditional).await;
        let a = entry(silo(1, 11111, 1), SiloStatus::Active);
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        table.delete_membership_table_entries(CLUSTER).await.unwrap();
        assert!(matches!(
            table.update_i_am_alive(&a).await,
            Err(MembershipError::RowNotFound(_))
        ));

        table.initialize(true).await.unwrap();
        let data = table.read_all().await.unwrap();
        assert_eq!(data.version.version, 0);
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_silo_is_rejected() {
        let (_, table) = table(VersionCheck::Conditional).await;
        let stranger = entry(silo(9, 11119, 1), SiloStatus::Active);

        match table.update_i_am_alive(&stranger).await {
            Err(MembershipError::RowNotFound(entity_id)) => {
                assert_eq!(entity_id, stranger.silo_address.entity_id());
            }
            other => panic!("expected RowNotFound, got {:?}", other),
        }

        let data = table.read_all().await.unwrap();
        assert_eq!(data.version.version, 0);
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_read_row_for_unknown_silo() {
        let (_, table) = table(VersionCheck::Conditional).await;
        let a = entry(silo(1, 11111, 1), SiloStatus::Active);
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        let data = table.read_row(&silo(2, 11111, 1)).await.unwrap();
        assert!(data.is_empty());
        assert_eq!(data.version.version, 1);
    }

    #[tokio::test]
    async fn test_delete_all_is_scoped_to_cluster() {
        let store = ColumnStore::new();
        let table = table_on(&store, VersionCheck::Conditional).await;
        let other = MembershipTable::with_backend(
            "c2",
            options(VersionCheck::Conditional),
            store.clone(),
        );
        other.initialize(true).await.unwrap();

        for i in 0..3u8 {
            let version = current_version(&table).await;
            let silo_entry = entry(silo(i, 11111, 1), SiloStatus::Active);
            assert!(table.insert_row(&silo_entry, &version).await.unwrap());
        }
        let neighbour = entry(silo(50, 11111, 1), SiloStatus::Active);
        assert!(other.insert_row(&neighbour, &TableVersion::new(0)).await.unwrap());

        table.delete_membership_table_entries(CLUSTER).await.unwrap();

        let remaining = store
            .select(
                "orleans",
                "cluster_membership",
                &[Filter::eq(columns::CLUSTER_ID, CLUSTER)],
                Consistency::All,
            )
            .await
            .unwrap();
        assert!(remaining.is_empty());
        assert!(matches!(
            table.read_all().await,
            Err(MembershipError::MissingVersion(_))
        ));

        let neighbours = other.read_all().await.unwrap();
        assert_eq!(neighbours.len(), 1);
        assert_eq!(neighbours.version.version, 1);

        // Deleting an empty cluster is a no-op.
        table.delete_membership_table_entries(CLUSTER).await.unwrap();

        table.initialize(true).await.unwrap();
        assert_eq!(current_version(&table).await.version, 0);
    }

    #[tokio::test]
    async fn test_rebootstrap_keeps_version() {
        let store = ColumnStore::new();
        let first = table_on(&store, VersionCheck::Conditional).await;
        let a = entry(silo(1, 11111, 1), SiloStatus::Active);
        assert!(first.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        let second = table_on(&store, VersionCheck::Conditional).await;
        let data = second.read_all().await.unwrap();
        assert_eq!(data.version.version, 1);
        assert_eq!(data.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_without_version_row() {
        let store = ColumnStore::new();
        let table = MembershipTable::with_backend(
            CLUSTER,
            options(VersionCheck::Conditional),
            store.clone(),
        );
        table.initialize(false).await.unwrap();

        assert!(matches!(
            table.read_all().await,
            Err(MembershipError::MissingVersion(_))
        ));
        let a = entry(silo(1, 11111, 1), SiloStatus::Active);
        assert!(!table.insert_row(&a, &TableVersion::new(0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_operations_before_initialize() {
        let table = MembershipTable::with_backend(
            CLUSTER,
            options(VersionCheck::Conditional),
            ColumnStore::new(),
        );
        let a = entry(silo(1, 11111, 1), SiloStatus::Active);

        assert!(matches!(
            table.read_all().await,
            Err(MembershipError::NotInitialized)
        ));
        assert!(matches!(
            table.insert_row(&a, &TableVersion::new(0)).await,
            Err(MembershipError::NotInitialized)
        ));
        assert!(matches!(
            table.update_i_am_alive(&a).await,
            Err(MembershipError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_cleanup_defunct_entries_not_supported() {
        let (_, table) = table(VersionCheck::Conditional).await;
        let a = entry(silo(1, 11111, 1), SiloStatus::Dead);
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        let result = table
            .cleanup_defunct_silo_entries(Utc::now() + Duration::days(1))
            .await;
        assert!(matches!(result, Err(MembershipError::NotSupported(_))));
        assert_eq!(table.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_row_surfaces_on_read() {
        let (store, table) = table(VersionCheck::Conditional).await;
        let mut a = entry(silo(1, 11111, 1), SiloStatus::Suspect);
        a.add_suspector(silo(2, 11111, 1), Utc::now());
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        let corrupt = Batch::new().update(
            codec::row_key(CLUSTER, &a.silo_address.entity_id()),
            crate::storage::types::Row::new()
                .with(columns::SUSPECTING_TIMES, Value::TimestampList(Vec::new())),
        );
        store
            .execute_batch("orleans", "cluster_membership", corrupt, Consistency::All)
            .await
            .unwrap();

        assert!(matches!(
            table.read_all().await,
            Err(MembershipError::Inconsistent { .. })
        ));
    }

    // ============================================================
    // FAILURE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_unavailable_store_leaves_version_intact() {
        let (store, table) = table(VersionCheck::Conditional).await;
        let a = entry(silo(1, 11111, 1), SiloStatus::Active);
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        store.set_replica_available("orleans", 1, false).unwrap();
        store.set_replica_available("orleans", 2, false).unwrap();

        let b = entry(silo(2, 11111, 1), SiloStatus::Active);
        assert!(matches!(
            table.insert_row(&b, &TableVersion::new(1)).await,
            Err(MembershipError::Store(_))
        ));
        assert!(matches!(
            table.read_all().await,
            Err(MembershipError::Store(_))
        ));

        store.set_replica_available("orleans", 1, true).unwrap();
        store.set_replica_available("orleans", 2, true).unwrap();

        let data = table.read_all().await.unwrap();
        assert_eq!(data.version.version, 1);
        assert_eq!(data.len(), 1);
    }

    #[tokio::test]
    async fn test_single_replica_failure_is_tolerated() {
        let (store, table) = table(VersionCheck::Conditional).await;
        store.set_replica_available("orleans", 0, false).unwrap();

        let a = entry(silo(1, 11111, 1), SiloStatus::Active);
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());

        store.set_replica_available("orleans", 0, true).unwrap();
        store.set_replica_available("orleans", 2, false).unwrap();

        let data = table.read_all().await.unwrap();
        assert_eq!(data.version.version, 1);
        assert_eq!(data.find(&a.silo_address), Some(&a));
    }

    // ============================================================
    // CONCURRENCY TESTS
    // ============================================================

    async fn race_inserts(
        version_check: VersionCheck,
        writers: u8,
    ) -> (usize, MembershipTableData) {
        let store = ColumnStore::new();
        table_on(&store, version_check).await;

        let mut handles = Vec::new();
        for i in 0..writers {
            let table =
                MembershipTable::with_backend(CLUSTER, options(version_check), store.clone());
            handles.push(tokio::spawn(async move {
                table.initialize(false).await.unwrap();
                let mine = entry(silo(i, 11111, 1), SiloStatus::Joining);
                table.insert_row(&mine, &TableVersion::new(0)).await.unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }

        let observer = table_on(&store, version_check).await;
        (applied, observer.read_all().await.unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_conditional_concurrent_inserts_have_one_winner() {
        let (applied, data) = race_inserts(VersionCheck::Conditional, 8).await;

        assert_eq!(applied, 1);
        assert_eq!(data.len(), 1);
        assert_eq!(data.version.version, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unconditional_concurrent_inserts_all_succeed() {
        let (applied, data) = race_inserts(VersionCheck::Unconditional, 8).await;

        // Every writer claimed version 0 -> 1; the version no longer counts changes.
        assert_eq!(applied, 8);
        assert_eq!(data.len(), 8);
        assert_eq!(data.version.version, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bootstrap_seeds_once() {
        let store = ColumnStore::new();
        let mut handles = Vec::new();
        for _ in 0..6 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                table_on(&store, VersionCheck::Conditional).await
            }));
        }
        let mut tables = Vec::new();
        for handle in handles {
            tables.push(handle.await.unwrap());
        }

        let a = entry(silo(1, 11111, 1), SiloStatus::Active);
        assert!(tables[0].insert_row(&a, &TableVersion::new(0)).await.unwrap());
        for table in &tables {
            table.initialize(true).await.unwrap();
            assert_eq!(current_version(table).await.version, 1);
        }
    }

    // ============================================================
    // GATEWAY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_gateway_filtering() {
        let (store, table) = table(VersionCheck::Conditional).await;

        let mut next = 0u8;
        for status in [SiloStatus::Active, SiloStatus::Suspect, SiloStatus::Dead] {
            for proxy_port in [Some(30000u16), None] {
                let mut silo_entry = entry(silo(next, 11111, 3), status);
                silo_entry.proxy_port = proxy_port;
                let version = current_version(&table).await;
                assert!(table.insert_row(&silo_entry, &version).await.unwrap());
                next += 1;
            }
        }
        let mut zero_port = entry(silo(100, 11111, 3), SiloStatus::Active);
        zero_port.proxy_port = Some(0);
        let version = current_version(&table).await;
        assert!(table.insert_row(&zero_port, &version).await.unwrap());

        let provider = GatewayListProvider::with_backend(
            CLUSTER,
            &options(VersionCheck::Conditional),
            &GatewayOptions::default(),
            store.clone(),
        );
        provider.initialize().await.unwrap();

        let gateways = provider.get_gateways().await.unwrap();
        assert_eq!(
            gateways,
            vec![GatewayUri("gwy.tcp://10.0.0.0:30000/3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_gateway_list_follows_status_changes() {
        let (store, table) = table(VersionCheck::Conditional).await;
        let provider = GatewayListProvider::with_backend(
            CLUSTER,
            &options(VersionCheck::Conditional),
            &GatewayOptions::default(),
            store.clone(),
        );
        provider.initialize().await.unwrap();
        assert!(provider.get_gateways().await.unwrap().is_empty());

        let mut a = entry(silo(1, 11111, 1), SiloStatus::Joining);
        a.proxy_port = Some(30000);
        assert!(table.insert_row(&a, &TableVersion::new(0)).await.unwrap());
        assert!(provider.get_gateways().await.unwrap().is_empty());

        a.status = SiloStatus::Active;
        assert!(table.update_row(&a, &TableVersion::new(1)).await.unwrap());
        assert_eq!(provider.get_gateways().await.unwrap().len(), 1);

        a.status = SiloStatus::ShuttingDown;
        assert!(table.update_row(&a, &TableVersion::new(2)).await.unwrap());
        assert!(provider.get_gateways().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_provider_contract() {
        let store = ColumnStore::new();
        let provider = GatewayListProvider::with_backend(
            CLUSTER,
            &options(VersionCheck::Conditional),
            &GatewayOptions {
                refresh_period_secs: 15,
            },
            store,
        );

        assert_eq!(provider.max_staleness(), StdDuration::from_secs(15));
        assert!(provider.is_updatable());
        assert!(matches!(
            provider.get_gateways().await,
            Err(MembershipError::NotInitialized)
        ));

        // The table does not exist yet.
        provider.initialize().await.unwrap();
        assert!(matches!(
            provider.get_gateways().await,
            Err(MembershipError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_without_contact_points_fails() {
        let table = MembershipTable::new(CLUSTER, options(VersionCheck::Conditional));
        assert!(matches!(
            table.initialize(true).await,
            Err(MembershipError::Store(_))
        ));

        let provider = GatewayListProvider::new(
            CLUSTER,
            &options(VersionCheck::Conditional),
            &GatewayOptions::default(),
        );
        assert!(provider.initialize().await.is_err());
    }
}
