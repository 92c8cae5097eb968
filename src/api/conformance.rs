//! Behaviour both backends must share, driven through the fake array

use crate::api::fake::{rest_backend, test_options, zapi_backend, FakeArray, AGGREGATE};
use crate::api::fault::{FaultPoint, NameMarkerFault};
use crate::api::types::format_lun_comment;
use crate::api::{BackendOptions, Lun, OntapApiRef, RequestContext, SnapmirrorEndpoint, SnapmirrorState, Volume};
use crate::error::{Error, ErrorKind};
use assert_matches::assert_matches;
use indexmap::IndexMap;
use std::sync::Arc;

const GIB: u64 = 1 << 30;

/// Validated ZAPI and REST backends over one array
async fn backends(array: &Arc<FakeArray>, options: BackendOptions) -> Vec<(&'static str, OntapApiRef)> {
    let ctx = RequestContext::background();
    let zapi: OntapApiRef = Arc::new(zapi_backend(array, options.clone()));
    let rest: OntapApiRef = Arc::new(rest_backend(array, options));
    zapi.validate_api_version(&ctx).await.unwrap();
    rest.validate_api_version(&ctx).await.unwrap();
    vec![("zapi", zapi), ("rest", rest)]
}

fn flexvol(name: &str, size: u64) -> Volume {
    Volume {
        aggregates: vec![AGGREGATE.to_string()],
        ..Volume::new(name, size)
    }
}

#[tokio::test]
async fn test_volume_lifecycle_is_idempotent() {
    let ctx = RequestContext::background();
    for (protocol, api) in backends(&FakeArray::new(), test_options(100)).await {
        api.volume_create(&ctx, &flexvol("vol1", 10 * GIB)).await.unwrap();
        api.volume_create(&ctx, &flexvol("vol1", 10 * GIB))
            .await
            .unwrap_or_else(|e| panic!("{}: repeat create failed: {}", protocol, e));

        let err = api.volume_create(&ctx, &flexvol("vol1", 5 * GIB)).await.unwrap_err();
        assert_matches!(err, Error::ResourceConflict { .. }, "{}", protocol);
        assert_eq!(err.kind(), ErrorKind::Permanent);

        assert_eq!(api.volume_info(&ctx, "vol1").await.unwrap().size, 10 * GIB);

        let listed = api.volume_list_by_prefix(&ctx, "vol").await.unwrap();
        let listed: Vec<(&str, u64)> = listed.iter().map(|v| (v.name.as_str(), v.size)).collect();
        assert_eq!(listed, vec![("vol1", 10 * GIB)], "{}", protocol);

        api.volume_destroy(&ctx, "vol1", true).await.unwrap();
        api.volume_destroy(&ctx, "vol1", true)
            .await
            .unwrap_or_else(|e| panic!("{}: repeat destroy failed: {}", protocol, e));

        let err = api.volume_info(&ctx, "vol1").await.unwrap_err();
        assert!(err.is_not_found(), "{}: {}", protocol, err);
        assert!(!api.volume_exists(&ctx, "vol1").await.unwrap());
    }
}

#[tokio::test]
async fn test_volume_modifications_reach_the_array() {
    let ctx = RequestContext::background();
    for (protocol, api) in backends(&FakeArray::new(), test_options(100)).await {
        api.volume_create(&ctx, &flexvol("vol2", GIB)).await.unwrap();
        api.volume_set_comment(&ctx, "vol2", "managed").await.unwrap();
        api.volume_set_size(&ctx, "vol2", 2 * GIB).await.unwrap();
        api.volume_mount(&ctx, "vol2", "/vol2").await.unwrap();

        let volume = api.volume_info(&ctx, "vol2").await.unwrap();
        assert_eq!(volume.comment, "managed", "{}", protocol);
        assert_eq!(volume.junction_path, "/vol2", "{}", protocol);
        assert_eq!(api.volume_size(&ctx, "vol2").await.unwrap(), 2 * GIB);

        api.volume_destroy(&ctx, "vol2", true).await.unwrap();
    }
}

#[tokio::test]
async fn test_gated_operations_never_reach_the_array() {
    let ctx = RequestContext::background();
    let old = FakeArray::with_versions((1, 110), (9, 8, 0));
    let zapi: OntapApiRef = Arc::new(zapi_backend(&old, test_options(100)));
    zapi.validate_api_version(&ctx).await.unwrap();

    let san = FakeArray::san_optimized();
    let rest: OntapApiRef = Arc::new(rest_backend(&san, test_options(100)));
    rest.validate_api_version(&ctx).await.unwrap();

    for (array, api) in [(&old, zapi), (&san, rest)] {
        array.clear_calls();
        let group = Volume {
            style: crate::api::VolumeStyle::FlexGroup,
            ..flexvol("fg1", 10 * GIB)
        };
        assert_matches!(
            api.flexgroup_create(&ctx, &group).await,
            Err(Error::UnsupportedFeature { .. })
        );
        assert_matches!(
            api.flexgroup_snapshot_create(&ctx, "snap1", "fg1").await,
            Err(Error::UnsupportedFeature { .. })
        );
        assert!(array.calls().is_empty(), "gated calls reached the array: {:?}", array.calls());
    }
}

#[tokio::test]
async fn test_unvalidated_backend_refuses_gated_operations() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    let api: OntapApiRef = Arc::new(rest_backend(&array, test_options(100)));
    assert_matches!(api.flexgroup_info(&ctx, "fg1").await, Err(Error::UnsupportedFeature { .. }));
    assert!(array.calls().is_empty());
}

#[tokio::test]
async fn test_listing_follows_every_page() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    for name in ["trident_a", "trident_b", "trident_c", "trident_d", "trident_e", "trident_f", "trident_g"] {
        array.add_volume(name, GIB);
    }
    array.add_volume("other", GIB);

    for (protocol, api) in backends(&array, test_options(2)).await {
        array.clear_calls();
        let names: Vec<String> = api
            .volume_list_by_prefix(&ctx, "trident_")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names.len(), 7, "{}: {:?}", protocol, names);
        assert!(names.iter().all(|n| n.starts_with("trident_")));
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted, "{}: pages out of order or repeated", protocol);
        assert_eq!(array.calls().len(), 4, "{}: {:?}", protocol, array.calls());
    }
}

#[tokio::test]
async fn test_repeated_cursor_is_an_internal_error() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    array.add_volume("trident_a", GIB);
    for (protocol, api) in backends(&array, test_options(1)).await {
        array.set_stuck_pagination(true);
        let err = api.volume_list_by_prefix(&ctx, "trident_").await.unwrap_err();
        assert_matches!(err, Error::Internal { .. }, "{}", protocol);
        assert_eq!(err.kind(), ErrorKind::Internal);
        array.set_stuck_pagination(false);
    }
}

#[tokio::test]
async fn test_resync_guard_skips_satisfied_relationship() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    let source = SnapmirrorEndpoint::new("src_svm", "vol_a");
    let mirrored = SnapmirrorEndpoint::new("svm0", "vol_b");
    let fresh = SnapmirrorEndpoint::new("svm0", "vol_c");
    array.add_relationship(&source, &mirrored, SnapmirrorState::Snapmirrored);
    array.add_relationship(&source, &fresh, SnapmirrorState::Uninitialized);

    for (protocol, api) in backends(&array, test_options(100)).await {
        array.clear_calls();
        api.snapmirror_resync(&ctx, &mirrored, &source).await.unwrap();
        assert_eq!(array.count_calls("snapmirror-resync"), 0, "{}", protocol);
        assert_eq!(array.count_calls("PATCH"), 0, "{}", protocol);

        let err = api.snapmirror_resync(&ctx, &fresh, &source).await.unwrap_err();
        assert_matches!(err, Error::InvalidTransition { .. }, "{}", protocol);
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(array.count_calls("snapmirror-resync"), 0);
        assert_eq!(array.count_calls("PATCH"), 0);
    }
    assert_eq!(array.relationship_state(&fresh), Some(SnapmirrorState::Uninitialized));
}

#[tokio::test]
async fn test_snapmirror_break_then_resync() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    let source = SnapmirrorEndpoint::new("src_svm", "vol_a");
    let destination = SnapmirrorEndpoint::new("svm0", "vol_b");
    array.add_relationship(&source, &destination, SnapmirrorState::Snapmirrored);

    for (protocol, api) in backends(&array, test_options(100)).await {
        api.snapmirror_quiesce(&ctx, &destination, &source).await.unwrap();
        api.snapmirror_break(&ctx, &destination, &source).await.unwrap();
        assert_eq!(array.relationship_state(&destination), Some(SnapmirrorState::BrokenOff), "{}", protocol);
        api.snapmirror_break(&ctx, &destination, &source).await.unwrap();

        api.snapmirror_resync(&ctx, &destination, &source).await.unwrap();
        assert_eq!(array.relationship_state(&destination), Some(SnapmirrorState::Snapmirrored), "{}", protocol);
    }
}

#[tokio::test]
async fn test_lun_comment_round_trip() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    array.add_volume("vol1", 10 * GIB);

    let mut attributes = IndexMap::new();
    attributes.insert("driverContext".to_string(), "docker".to_string());
    attributes.insert("fstype".to_string(), "ext4".to_string());
    let comment = format_lun_comment(&attributes).unwrap();

    for (protocol, api) in backends(&array, test_options(100)).await {
        let path = format!("/vol/vol1/lun_{}", protocol);
        let lun = Lun {
            comment: comment.clone(),
            ..Lun::new(path.as_str(), GIB, "linux")
        };
        api.lun_create(&ctx, &lun).await.unwrap();
        api.lun_create(&ctx, &lun).await.unwrap();

        let (stored, exists) = api.lun_get_comment(&ctx, &path).await.unwrap();
        assert!(exists);
        assert_eq!(stored, comment, "{}", protocol);
        let parsed = api.parse_lun_comment(&stored).unwrap();
        assert_eq!(parsed.keys().collect::<Vec<_>>(), ["driverContext", "fstype"]);

        api.lun_destroy(&ctx, &path).await.unwrap();
        api.lun_destroy(&ctx, &path).await.unwrap();
        assert_eq!(api.lun_get_comment(&ctx, &path).await.unwrap(), (String::new(), false));
    }
}

#[tokio::test]
async fn test_lun_mapping_is_idempotent() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    array.add_volume("vol1", 10 * GIB);

    for (protocol, api) in backends(&array, test_options(100)).await {
        let path = format!("/vol/vol1/map_{}", protocol);
        let igroup = format!("ig_{}", protocol);
        api.lun_create(&ctx, &Lun::new(path.as_str(), GIB, "linux")).await.unwrap();
        api.igroup_create(&ctx, &igroup, "iscsi", "linux").await.unwrap();

        let id = api.ensure_lun_mapped(&ctx, &igroup, &path, false).await.unwrap();
        assert_eq!(api.ensure_lun_mapped(&ctx, &igroup, &path, false).await.unwrap(), id, "{}", protocol);
        assert_eq!(api.lun_map_info(&ctx, &igroup, &path).await.unwrap(), id);

        api.lun_unmap(&ctx, &igroup, &path).await.unwrap();
        api.lun_unmap(&ctx, &igroup, &path).await.unwrap();
        assert_eq!(api.lun_map_info(&ctx, &igroup, &path).await.unwrap(), -1, "{}", protocol);
    }
}

#[tokio::test]
async fn test_fault_hook_stops_lun_create() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    array.add_volume("vol1", 10 * GIB);
    let options =
        test_options(100).with_fault_hook(Arc::new(NameMarkerFault::new(FaultPoint::LunCreate, "fail")));

    for (protocol, api) in backends(&array, options).await {
        array.clear_calls();
        let err = api
            .lun_create(&ctx, &Lun::new("/vol/vol1/lun_fail", GIB, "linux"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::InjectedFault { .. }, "{}", protocol);
        assert!(!array.has_lun("/vol/vol1/lun_fail"));
        assert_eq!(array.count_calls("lun-create-by-size"), 0);
        assert_eq!(array.count_calls("POST /storage/luns"), 0);

        api.lun_create(&ctx, &Lun::new(format!("/vol/vol1/lun_{}", protocol), GIB, "linux"))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_export_rule_destroy_checks_client_match() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    array.add_export_rule("pol", 1, "10.0.0.1");

    for (protocol, api) in backends(&array, test_options(100)).await {
        let err = api.export_rule_destroy(&ctx, "pol", 1, "10.0.0.2").await.unwrap_err();
        assert_matches!(err, Error::ResourceConflict { .. }, "{}", protocol);
        assert_eq!(api.export_rule_list(&ctx, "pol").await.unwrap().get("10.0.0.1"), Some(&1));
    }

    let (_, api) = backends(&array, test_options(100)).await.remove(1);
    api.export_rule_destroy(&ctx, "pol", 1, "10.0.0.1").await.unwrap();
    api.export_rule_destroy(&ctx, "pol", 1, "10.0.0.1").await.unwrap();
    assert!(api.export_rule_list(&ctx, "pol").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_export_rule_destroy_with_shared_client_match() {
    let ctx = RequestContext::background();
    for protocol in ["zapi", "rest"] {
        let array = FakeArray::new();
        array.add_export_rule("pol", 1, "10.0.0.1");
        array.add_export_rule("pol", 2, "10.0.0.1");

        let api = backends(&array, test_options(100))
            .await
            .into_iter()
            .find(|(p, _)| *p == protocol)
            .map(|(_, api)| api)
            .unwrap();
        api.export_rule_destroy(&ctx, "pol", 1, "10.0.0.1").await.unwrap();
        assert_eq!(array.export_rule_indexes("pol"), vec![2], "{}", protocol);
        assert_eq!(api.export_rule_list(&ctx, "pol").await.unwrap().get("10.0.0.1"), Some(&2));

        api.export_rule_destroy(&ctx, "pol", 2, "10.0.0.1").await.unwrap();
        assert!(array.export_rule_indexes("pol").is_empty(), "{}", protocol);
    }
}

#[tokio::test]
async fn test_export_policy_and_rule_create_are_idempotent() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    for (protocol, api) in backends(&array, test_options(100)).await {
        let policy = format!("pol_{}", protocol);
        api.export_policy_create(&ctx, &policy).await.unwrap();
        api.export_policy_create(&ctx, &policy).await.unwrap();
        assert!(api.export_policy_exists(&ctx, &policy).await.unwrap());

        api.export_rule_create(&ctx, &policy, "0.0.0.0/0").await.unwrap();
        api.export_rule_create(&ctx, &policy, "0.0.0.0/0").await.unwrap();
        assert_eq!(api.export_rule_list(&ctx, &policy).await.unwrap().len(), 1, "{}", protocol);

        api.export_policy_destroy(&ctx, &policy).await.unwrap();
        api.export_policy_destroy(&ctx, &policy).await.unwrap();
        assert!(!api.export_policy_exists(&ctx, &policy).await.unwrap());
    }
}

#[tokio::test]
async fn test_igroup_lifecycle() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    for (protocol, api) in backends(&array, test_options(100)).await {
        let name = format!("ig_{}", protocol);
        api.igroup_create(&ctx, &name, "iscsi", "linux").await.unwrap();
        api.igroup_create(&ctx, &name, "iscsi", "linux").await.unwrap();
        assert_matches!(
            api.igroup_create(&ctx, &name, "iscsi", "windows").await,
            Err(Error::ResourceConflict { .. })
        );

        let initiator = "iqn.1993-08.org.debian:01:abc";
        api.ensure_igroup_added(&ctx, &name, initiator).await.unwrap();
        api.ensure_igroup_added(&ctx, &name, initiator).await.unwrap();
        assert!(api.igroup_get_by_name(&ctx, &name).await.unwrap().contains(initiator));

        api.igroup_remove(&ctx, &name, initiator, false).await.unwrap();
        api.igroup_remove(&ctx, &name, initiator, false).await.unwrap();
        api.igroup_destroy(&ctx, &name).await.unwrap();
        api.igroup_destroy(&ctx, &name).await.unwrap();
        assert!(api.igroup_get_by_name(&ctx, &name).await.unwrap_err().is_not_found());
    }
}

#[tokio::test]
async fn test_snapshot_lifecycle() {
    let ctx = RequestContext::background();
    let array = FakeArray::new();
    array.add_volume("vol1", GIB);
    for (protocol, api) in backends(&array, test_options(100)).await {
        let snapshot = format!("snap_{}", protocol);
        api.volume_snapshot_create(&ctx, &snapshot, "vol1").await.unwrap();
        api.volume_snapshot_create(&ctx, &snapshot, "vol1").await.unwrap();
        let names: Vec<String> = api
            .volume_snapshot_list(&ctx, "vol1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert!(names.contains(&snapshot), "{}: {:?}", protocol, names);

        api.volume_snapshot_delete(&ctx, &snapshot, "vol1").await.unwrap();
        api.volume_snapshot_delete(&ctx, &snapshot, "vol1").await.unwrap();
    }
}

#[tokio::test]
async fn test_node_serials_and_aggregates() {
    let ctx = RequestContext::background();
    for (protocol, api) in backends(&FakeArray::new(), test_options(1)).await {
        assert_eq!(api.node_list_serial_numbers(&ctx).await.unwrap().len(), 2, "{}", protocol);
        assert_eq!(api.svm_aggregate_names(&ctx).await.unwrap(), vec![AGGREGATE.to_string()]);
    }
}
