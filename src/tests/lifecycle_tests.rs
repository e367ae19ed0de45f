//! Create / clone / migrate / post-processing flows against a mock node.

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::tests::support::*;
use crate::{
    DiskBus, DiskSize, DiskSlot, HaState, NodeName, PoolName, ProxmoxError, QemuCpu, QemuDisk,
    QemuMemory, QemuStorage, QemuStorages, VmConfig,
};

fn create_config() -> VmConfig {
    let mut disks = QemuStorages::default();
    disks.set(
        DiskSlot::new(DiskBus::Scsi, 0).unwrap(),
        QemuStorage::Disk(QemuDisk::new("local-lvm", DiskSize::from_gib(16))),
    );
    VmConfig {
        name: Some("fresh-01".to_string()),
        cpu: Some(QemuCpu {
            cores: Some(2),
            ..Default::default()
        }),
        memory: Some(QemuMemory::with_size(2048)),
        disks: Some(disks),
        pool: Some(PoolName::new_unchecked("prod")),
        ha_state: Some(HaState::Started),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_flow_posts_then_post_processes() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    mount_version(&server).await;
    mount_status_unlocked(&server, 100).await;
    mount_config(
        &server,
        100,
        serde_json::json!({"scsi0": "local-lvm:vm-100-disk-0,size=16G", "cores": 2, "memory": 2048}),
    )
    .await;
    mount_empty_cluster_resources(&server).await;

    let upid = "UPID:pve1:000A:000B:000C:qmcreate:100:root@pam:";
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .and(body_partial_json(serde_json::json!({
            "vmid": 100,
            "name": "fresh-01",
            "cores": 2,
            "memory": 2048,
            "scsi0": "local-lvm:16"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": upid})))
        .expect(1)
        .mount(&server)
        .await;
    mount_task_ok(&server, upid).await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/pools/prod"))
        .and(body_partial_json(serde_json::json!({"vms": "100"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/cluster/ha/resources/vm:100"))
        .and(body_partial_json(serde_json::json!({"state": "started"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&server)
        .await;

    let mut vmr = vmr(100);
    client.create_qemu(&create_config(), &mut vmr).await.unwrap();

    assert!(
        client.api_client.has_cached_permission("/vms/100").await,
        "creation caches the guest permission path"
    );
}

#[tokio::test]
async fn test_create_grows_template_sized_disk() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    mount_version(&server).await;
    mount_status_unlocked(&server, 100).await;
    // the node materialized the disk smaller than requested
    mount_config(
        &server,
        100,
        serde_json::json!({"scsi0": "local-lvm:vm-100-disk-0,size=4G", "cores": 2, "memory": 2048}),
    )
    .await;
    mount_empty_cluster_resources(&server).await;

    let upid = "UPID:pve1:000A:000B:000C:qmcreate:100:root@pam:";
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": upid})))
        .mount(&server)
        .await;
    mount_task_ok(&server, upid).await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/100/resize"))
        .and(body_partial_json(
            serde_json::json!({"disk": "scsi0", "size": "+12G"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_config();
    config.pool = None;
    config.ha_state = None;
    let mut vmr = vmr(100);
    client.create_qemu(&config, &mut vmr).await.unwrap();
}

#[tokio::test]
async fn test_duplicate_vmid_create_is_conflict() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    mount_version(&server).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu"))
        .respond_with(ResponseTemplate::new(409).set_body_string("VM 100 already exists"))
        .mount(&server)
        .await;

    let mut config = create_config();
    config.pool = None;
    config.ha_state = None;
    let mut vmr = vmr(100);
    let err = client.create_qemu(&config, &mut vmr).await.unwrap_err();
    assert!(matches!(err, ProxmoxError::Conflict(_)));
}

#[tokio::test]
async fn test_clone_posts_newid_target_and_storage() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    let upid = "UPID:pve1:000A:000B:000C:qmclone:9000:root@pam:";
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/9000/clone"))
        .and(body_partial_json(serde_json::json!({
            "newid": 100,
            "target": "pve1",
            "name": "clone-01",
            "full": 1,
            "storage": "ceph-rbd"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": upid})))
        .expect(1)
        .mount(&server)
        .await;
    mount_task_ok(&server, upid).await;

    let mut disks = QemuStorages::default();
    disks.set(
        DiskSlot::new(DiskBus::Scsi, 0).unwrap(),
        QemuStorage::Disk(QemuDisk::new("ceph-rbd", DiskSize::from_gib(32))),
    );
    let desired = VmConfig {
        name: Some("clone-01".to_string()),
        disks: Some(disks),
        ..Default::default()
    };

    let source = vmr(9000);
    let target = vmr(100);
    client.clone_qemu(&desired, &source, &target).await.unwrap();
}

#[tokio::test]
async fn test_pool_change_removes_then_adds() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    mount_version(&server).await;
    mount_status_unlocked(&server, 100).await;
    mount_config(&server, 100, serde_json::json!({"cores": 2, "memory": 1024})).await;
    mount_empty_pending(&server, 100).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"vmid": 100, "type": "qemu", "node": "pve1", "pool": "old-pool"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/pools/old-pool"))
        .and(body_partial_json(
            serde_json::json!({"vms": "100", "delete": 1}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api2/json/pools/new-pool"))
        .and(body_partial_json(serde_json::json!({"vms": "100"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .expect(1)
        .mount(&server)
        .await;

    let desired = VmConfig {
        pool: Some(PoolName::new_unchecked("new-pool")),
        ..Default::default()
    };
    let mut vmr = vmr(100);
    let reboot = client.update_qemu(&desired, false, &mut vmr).await.unwrap();
    assert!(!reboot);
    assert_eq!(vmr.pool().unwrap().as_str(), "new-pool");
}

#[tokio::test]
async fn test_node_change_migrates() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    mount_version(&server).await;
    mount_status_unlocked(&server, 100).await;
    mount_config(&server, 100, serde_json::json!({"cores": 2, "memory": 1024})).await;
    mount_empty_cluster_resources(&server).await;

    let upid = "UPID:pve1:000A:000B:000C:qmigrate:100:root@pam:";
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/100/migrate"))
        .and(body_partial_json(
            serde_json::json!({"target": "pve2", "online": 1}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": upid})))
        .expect(1)
        .mount(&server)
        .await;
    mount_task_ok(&server, upid).await;
    // after the migration the guest lives on pve2
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve2/qemu/100/pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let desired = VmConfig {
        node: Some(NodeName::new_unchecked("pve2")),
        ..Default::default()
    };
    let mut vmr = vmr(100);
    client.update_qemu(&desired, false, &mut vmr).await.unwrap();
    assert_eq!(vmr.node().as_str(), "pve2");
}

#[tokio::test]
async fn test_failed_config_task_surfaces_exitstatus() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    mount_version(&server).await;
    mount_status_unlocked(&server, 100).await;
    mount_config(
        &server,
        100,
        serde_json::json!({"name": "old-name", "cores": 2, "memory": 1024}),
    )
    .await;
    mount_empty_cluster_resources(&server).await;

    let upid = "UPID:pve1:000A:000B:000C:qmconfig:100:root@pam:";
    Mock::given(method("PUT"))
        .and(path("/api2/json/nodes/pve1/qemu/100/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": upid})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve1/tasks/{upid}/status").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"status": "stopped", "exitstatus": "volume allocation failed"}
        })))
        .mount(&server)
        .await;

    let desired = VmConfig {
        name: Some("new-name".to_string()),
        ..Default::default()
    };
    let mut vmr = vmr(100);
    let err = client.update_qemu(&desired, false, &mut vmr).await.unwrap_err();
    match err {
        ProxmoxError::TaskFailed { exit_status, .. } => {
            assert_eq!(exit_status, "volume allocation failed")
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_key_string_maps_shifted_keys() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    mount_status_unlocked(&server, 100).await;

    for key in ["shift-h", "i", "shift-1"] {
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu/100/monitor"))
            .and(body_partial_json(
                serde_json::json!({"command": format!("sendkey {key}")}),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": ""})),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let vmr = vmr(100);
    client.send_key_string(&vmr, "Hi!").await.unwrap();
}

#[tokio::test]
async fn test_max_vm_id_floors_at_100() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"vmid": 42, "type": "qemu"},
                {"vmid": 57, "type": "qemu"}
            ]
        })))
        .mount(&server)
        .await;

    assert_eq!(client.max_vm_id().await.unwrap(), 100);
}
