/// Membership tests
///
/// addInstance, rejoinInstance, removeInstance and checkInstanceState
/// against a simulated group.
/// Run with: cargo test --test membership_tests

mod common;

use clusteradmin::{
    AddInstanceOptions, CatalogTables, CheckStateOptions, Cluster, ErrorKind, MemberSslMode,
    Outcome, RejoinInstanceOptions, RemoveInstanceOptions,
};
use common::Sim;

const A: &str = "db1:3306";
const B: &str = "db2:3306";
const C: &str = "db3:3306";
const D: &str = "db4:3306";

const GTID_SOURCE: &str = "aaaaaaaa-1111-2222-3333-444444444444";
const GTID_OTHER: &str = "bbbbbbbb-1111-2222-3333-444444444444";

fn sim() -> Sim {
    Sim::new(&[A, B, C, D])
}

fn instance_count(sim: &Sim) -> usize {
    sim.catalog.committed().unwrap().instances.len()
}

// ============================================================================
// addInstance
// ============================================================================

#[test]
fn test_create_cluster_bootstraps_seed() {
    let sim = sim();
    let cluster = sim.cluster(A, &[]);

    let seed = sim.server(A);
    assert_eq!(seed.state, Some("ONLINE"));

    let rs = cluster.default_replica_set().unwrap();
    assert_eq!(rs.group_name().unwrap(), sim.group_name(A));
    assert_eq!(instance_count(&sim), 1);

    let row = cluster.metadata().get_instance(A).unwrap();
    assert_eq!(row.uuid, seed.uuid);
    assert_eq!(row.label, A);
    assert_eq!(row.grendpoint, "db1:33061");
    assert_eq!(row.xendpoint, "db1:33060");
}

#[test]
fn test_add_instance_joins_through_primary() {
    let sim = sim();
    let cluster = sim.cluster(A, &[]);

    let message = cluster
        .add_instance(&sim.options(B), AddInstanceOptions::default())
        .unwrap();

    assert_eq!(
        message,
        "The instance 'db2:3306' was successfully added to the MySQL Cluster."
    );
    assert_eq!(sim.calls(), vec!["join db2:3306 via db1:3306"]);
    assert_eq!(sim.server(B).state, Some("ONLINE"));
    assert_eq!(instance_count(&sim), 2);
}

#[test]
fn test_add_instance_uses_label() {
    let sim = sim();
    let cluster = sim.cluster(A, &[]);

    let options = AddInstanceOptions {
        label: Some("replica_2".into()),
        ..Default::default()
    };
    cluster.add_instance(&sim.options(B), options).unwrap();

    let description = cluster.describe().unwrap();
    let labels: Vec<_> = description
        .default_replica_set
        .unwrap()
        .instances
        .into_iter()
        .map(|i| i.label)
        .collect();
    assert!(labels.contains(&"replica_2".to_string()));
}

#[test]
fn test_add_instance_already_in_cluster() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);

    let err = cluster
        .add_instance(&sim.options(B), AddInstanceOptions::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(
        err.message(),
        "Cluster.addInstance: The instance 'db2:3306' is already part of this InnoDB cluster"
    );
    assert!(sim.calls().is_empty());
}

#[test]
fn test_add_group_member_only_registers_metadata() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);
    sim.join_outside(C, A);

    cluster
        .add_instance(&sim.options(C), AddInstanceOptions::default())
        .unwrap();

    assert!(sim.calls().is_empty());
    assert!(cluster.metadata().get_instance(C).is_ok());
}

#[test]
fn test_add_instance_of_another_group() {
    let sim = sim();
    let cluster = sim.cluster(A, &[]);
    sim.form_group("unmanaged", &[D]);

    let err = cluster
        .add_instance(&sim.options(D), AddInstanceOptions::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err
        .message()
        .ends_with("The instance 'db4:3306' is already part of another Replication Group"));
}

#[test]
fn test_add_local_instance_requires_sandbox() {
    let sim = Sim::new(&[A, "localhost:3310"]);
    let cluster = sim.cluster(A, &[]);

    let err = cluster
        .add_instance(&sim.options("localhost:3310"), AddInstanceOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err.message().contains("valid, non-local hostname"));

    sim.with_server("localhost:3310", |s| s.datadir = "/home/me/sandboxes/3310/sandboxdata/".into());
    cluster
        .add_instance(&sim.options("localhost:3310"), AddInstanceOptions::default())
        .unwrap();
}

#[test]
fn test_add_instance_with_binlog_filters() {
    let sim = sim();
    let cluster = sim.cluster(A, &[]);
    sim.with_server(B, |s| s.binlog_filter = true);

    let err = cluster
        .add_instance(&sim.options(B), AddInstanceOptions::default())
        .unwrap_err();

    assert!(err.message().contains("binlog filters"));
    assert!(sim.calls().is_empty());
    assert_eq!(instance_count(&sim), 1);
}

#[test]
fn test_add_instance_with_conflicting_ssl_mode() {
    let sim = sim();
    let cluster = sim.cluster(A, &[]);

    let options = AddInstanceOptions {
        member_ssl_mode: MemberSslMode::Disabled,
        ..Default::default()
    };
    let err = cluster.add_instance(&sim.options(B), options).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err.message().contains("The cluster has SSL (encryption) enabled"));
    assert!(sim.calls().is_empty());
}

#[test]
fn test_add_instance_invalid_label() {
    let sim = sim();
    let cluster = sim.cluster(A, &[]);

    let options = AddInstanceOptions {
        label: Some("-bad".into()),
        ..Default::default()
    };
    let err = cluster.add_instance(&sim.options(B), options).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Argument);
    assert!(err.message().starts_with("Cluster.addInstance: "));
    assert!(sim.calls().is_empty());
}

#[test]
fn test_add_instance_without_quorum() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B, C]);
    sim.make_unreachable(B);
    sim.make_unreachable(C);

    let err = cluster
        .add_instance(&sim.options(D), AddInstanceOptions::default())
        .unwrap_err();

    assert_eq!(
        err.message(),
        "Cluster.addInstance: There is no quorum to perform the operation as visible from 'db1:3306'"
    );
}

#[test]
fn test_add_instance_through_read_only_member() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);
    cluster.set_group_session(sim.session(B)).unwrap();

    let err = cluster
        .add_instance(&sim.options(C), AddInstanceOptions::default())
        .unwrap_err();

    assert!(err
        .message()
        .contains("not available through a session to a read only instance ('db2:3306')"));
}

// ============================================================================
// removeInstance
// ============================================================================

#[test]
fn test_add_then_remove_restores_catalog() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);
    let before = CatalogTables {
        saved_at: None,
        ..sim.catalog.committed().unwrap()
    };

    cluster
        .add_instance(&sim.options(C), AddInstanceOptions::default())
        .unwrap();
    let outcome = cluster
        .remove_instance(&sim.options(C), RemoveInstanceOptions::default())
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Done("The instance 'db3:3306' was successfully removed from the cluster.".into())
    );
    let after = CatalogTables {
        saved_at: None,
        ..sim.catalog.committed().unwrap()
    };
    assert_eq!(after, before);
    assert_eq!(sim.server(C).state, None);
}

#[test]
fn test_remove_last_instance_is_logic_error() {
    let sim = sim();
    let cluster = sim.cluster(A, &[]);

    for force in [false, true] {
        let options = RemoveInstanceOptions {
            force,
            ..Default::default()
        };
        let err = cluster.remove_instance(&sim.options(A), options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert!(err.message().contains("dissolve()"));
    }
    assert!(sim.calls().is_empty());
    assert_eq!(instance_count(&sim), 1);
}

#[test]
fn test_remove_unreachable_instance_restores_row() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B, C]);
    let row = cluster.metadata().get_instance(C).unwrap();
    sim.make_unreachable(C);

    let err = cluster
        .remove_instance(&sim.options(C), RemoveInstanceOptions::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err.message().contains("it is on a 'Unreachable' state"));
    assert!(err.message().contains("force option set to true"));
    assert_eq!(sim.calls(), vec!["leave db3:3306"]);
    assert_eq!(cluster.metadata().get_instance(C).unwrap(), row);
}

#[test]
fn test_remove_unreachable_instance_with_force() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B, C]);
    sim.make_unreachable(C);

    let options = RemoveInstanceOptions {
        force: true,
        ..Default::default()
    };
    let outcome = cluster.remove_instance(&sim.options(C), options).unwrap();

    assert!(!outcome.is_cancelled());
    assert!(cluster.metadata().get_instance(C).is_err());
    assert_eq!(instance_count(&sim), 2);
}

#[test]
fn test_remove_reachable_failure_reports_gateway_error() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B, C]);
    sim.fail_leave(B);

    let err = cluster
        .remove_instance(&sim.options(B), RemoveInstanceOptions::default())
        .unwrap_err();

    assert_eq!(
        err.message(),
        "Cluster.removeInstance: db2:3306: Unable to connect to the instance 'db2:3306'"
    );
    assert!(cluster.metadata().get_instance(B).is_ok());
}

#[test]
fn test_remove_failure_keeps_gateway_error_when_group_unreadable() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B, C]);
    sim.fail_leave_losing(B, &[A]);

    let err = cluster
        .remove_instance(&sim.options(B), RemoveInstanceOptions::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(
        err.message(),
        "Cluster.removeInstance: db2:3306: Unable to connect to the instance 'db2:3306'"
    );
    assert!(cluster.metadata().get_instance(B).is_ok());
}

#[test]
fn test_remove_unknown_instance() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);

    let err = cluster
        .remove_instance(&sim.options(D), RemoveInstanceOptions::default())
        .unwrap_err();

    assert_eq!(
        err.message(),
        "Cluster.removeInstance: The instance 'db4:3306' does not belong to the ReplicaSet: 'default'."
    );
}

#[test]
fn test_remove_declined_at_prompt() {
    let sim = sim();
    sim.cluster(A, &[B]);
    let cluster = Cluster::get(sim.context(false), sim.session(A), sim.catalog.clone(), None).unwrap();

    let options = RemoveInstanceOptions {
        interactive: Some(true),
        ..Default::default()
    };
    let outcome = cluster.remove_instance(&sim.options(B), options).unwrap();

    assert_eq!(outcome, Outcome::Cancelled);
    assert!(sim.calls().is_empty());
    assert_eq!(instance_count(&sim), 2);
}

// ============================================================================
// rejoinInstance
// ============================================================================

#[test]
fn test_rejoin_instance() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B, C]);
    sim.with_server(C, |s| s.state = None);

    let message = cluster
        .rejoin_instance(&sim.options(C), RejoinInstanceOptions::default())
        .unwrap();

    assert_eq!(message, "The instance 'db3:3306' was successfully rejoined on the cluster.");
    assert_eq!(sim.calls(), vec!["rejoin db3:3306 via db1:3306"]);
    assert_eq!(sim.server(C).state, Some("ONLINE"));
    assert!(sim
        .server(C)
        .executed
        .contains(&"STOP GROUP_REPLICATION".to_string()));
}

#[test]
fn test_rejoin_updates_label() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);
    sim.with_server(B, |s| s.state = None);

    let options = RejoinInstanceOptions {
        label: Some("second".into()),
        ..Default::default()
    };
    cluster.rejoin_instance(&sim.options(B), options).unwrap();

    assert_eq!(cluster.metadata().get_instance(B).unwrap().label, "second");
}

#[test]
fn test_rejoin_with_foreign_group_name_is_split_brain() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B, C]);
    sim.with_server(C, |s| {
        s.state = None;
        s.group_name = Some("ffffffff-0000-0000-0000-000000000000".into());
    });

    let err = cluster
        .rejoin_instance(&sim.options(C), RejoinInstanceOptions::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err.message().contains("possible split-brain scenario"));
    assert!(sim.calls().is_empty());
    assert!(!sim
        .server(C)
        .executed
        .contains(&"STOP GROUP_REPLICATION".to_string()));
}

#[test]
fn test_rejoin_unknown_instance() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);

    let err = cluster
        .rejoin_instance(&sim.options(D), RejoinInstanceOptions::default())
        .unwrap_err();

    assert!(err.message().contains("does not belong to the ReplicaSet: 'default'"));
    assert!(sim.calls().is_empty());
}

// ============================================================================
// checkInstanceState
// ============================================================================

#[test]
fn test_check_instance_state() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);
    sim.with_server(A, |s| s.gtid_executed = format!("{}:1-10", GTID_SOURCE));

    let cases = [
        (String::new(), "ok", "new"),
        (format!("{}:1-5", GTID_SOURCE), "ok", "recoverable"),
        (format!("{}:1-12", GTID_SOURCE), "error", "lost_transactions"),
        (format!("{}:1-3,{}:1", GTID_SOURCE, GTID_OTHER), "error", "diverged"),
    ];
    for (gtids, state, reason) in cases {
        sim.with_server(D, |s| s.gtid_executed = gtids.clone());
        let report = cluster
            .check_instance_state(&sim.options(D), CheckStateOptions::default())
            .unwrap();
        assert_eq!(report.state, state, "gtids: {}", gtids);
        assert_eq!(report.reason.reason(), reason, "gtids: {}", gtids);
    }
}

#[test]
fn test_check_state_of_registered_instance() {
    let sim = sim();
    let cluster = sim.cluster(A, &[B]);
    sim.with_server(A, |s| s.gtid_executed = format!("{}:1-10", GTID_SOURCE));
    sim.with_server(B, |s| {
        s.state = None;
        s.gtid_executed = format!("{}:1-7", GTID_SOURCE);
    });

    let report = cluster
        .check_instance_state(&sim.options(B), CheckStateOptions::default())
        .unwrap();

    assert_eq!(report.state, "ok");
    assert_eq!(report.reason.reason(), "recoverable");

    sim.with_server(B, |s| s.gtid_executed = format!("{}:1-10,{}:1", GTID_SOURCE, GTID_OTHER));
    let report = cluster
        .check_instance_state(&sim.options(B), CheckStateOptions::default())
        .unwrap();
    assert_eq!(report.reason.reason(), "lost_transactions");
}
