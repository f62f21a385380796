//! Validation, custody and lifetime behavior at the boundary.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use bridge::{host_lock, BridgeErr, CallArgs, HostArray, Net, Phase, Solver, SolverParams};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("bridge-boundary-{}-{name}", std::process::id()))
}

/// MemoryData(batch 2, 1x1x2) -> InnerProduct(1) -> EuclideanLoss.
fn write_tiny_net(name: &str) -> PathBuf {
    let path = temp_path(name);
    let def = json!({
        "name": "tiny",
        "layers": [
            {
                "name": "data",
                "type": "MemoryData",
                "tops": ["data", "label"],
                "memory_data": {"batch_size": 2, "channels": 1, "height": 1, "width": 2}
            },
            {
                "name": "ip",
                "type": "InnerProduct",
                "bottoms": ["data"],
                "tops": ["ip"],
                "inner_product": {"num_output": 1}
            },
            {
                "name": "loss",
                "type": "EuclideanLoss",
                "bottoms": ["ip", "label"],
                "tops": ["loss"]
            }
        ]
    });
    fs::write(&path, def.to_string()).unwrap();
    path
}

fn example_arrays(n: usize) -> (Arc<HostArray>, Arc<HostArray>) {
    let data = HostArray::from_vec(
        &[n, 1, 1, 2],
        (0..n * 2).map(|v| v as f32 * 0.1).collect(),
    )
    .unwrap();
    let labels = HostArray::from_vec(&[n], (0..n).map(|v| v as f32).collect()).unwrap();
    (Arc::new(data), Arc::new(labels))
}

#[test]
fn missing_definition_file_is_a_file_access_error() {
    let err = Net::from_file(&temp_path("does-not-exist.json"), Phase::Train).unwrap_err();
    assert!(matches!(err, BridgeErr::FileAccess { .. }));
    assert!(err.to_string().starts_with("could not open file"));
}

#[test]
fn missing_solver_config_is_a_file_access_error() {
    assert!(matches!(
        Solver::from_file(&temp_path("no-solver.json")),
        Err(BridgeErr::FileAccess { .. })
    ));
}

#[test]
fn validation_failures_leave_custody_untouched() {
    let net_file = write_tiny_net("validation.json");
    let net = Net::from_file(&net_file, Phase::Train).unwrap();

    let (data, labels) = example_arrays(4);
    net.set_input_arrays(0, &data, &labels).unwrap();
    assert_eq!(Arc::strong_count(&data), 2);
    assert_eq!(Arc::strong_count(&labels), 2);

    // Wrong trailing dimension: rejected before any custody transfer, the
    // previously injected arrays stay pinned.
    let bad = Arc::new(HostArray::from_vec(&[4, 1, 1, 3], vec![0.0; 12]).unwrap());
    let (_, good_labels) = example_arrays(4);
    let err = net.set_input_arrays(0, &bad, &good_labels).unwrap_err();
    assert_eq!(
        err.to_string(),
        "data array: shape dimension 3 has wrong size (3 vs. 2)"
    );
    assert_eq!(Arc::strong_count(&bad), 1);
    assert_eq!(Arc::strong_count(&data), 2);

    // Non-contiguous layout is rejected first.
    let strided = Arc::new(
        HostArray::with_strides(&[4, 1, 1, 2], &[1, 1, 1, 4], vec![0.0; 8]).unwrap(),
    );
    assert!(matches!(
        net.set_input_arrays(0, &strided, &good_labels),
        Err(BridgeErr::NotContiguous { name: "data array" })
    ));

    // float64 buffers never reach engine storage.
    let f64_data = Arc::new(HostArray::from_vec_f64(&[4, 1, 1, 2], vec![0.0; 8]).unwrap());
    let err = net.set_input_arrays(0, &f64_data, &good_labels).unwrap_err();
    assert_eq!(err.to_string(), "data array must be float32, got float64");

    // Wrong dimension count.
    let flat = Arc::new(HostArray::from_vec(&[8], vec![0.0; 8]).unwrap());
    assert!(matches!(
        net.set_input_arrays(0, &flat, &good_labels),
        Err(BridgeErr::DimCount { got: 1, expected: 4, .. })
    ));

    fs::remove_file(net_file).unwrap();
}

#[test]
fn mismatched_and_unaligned_example_counts_are_rejected() {
    let net_file = write_tiny_net("counts.json");
    let net = Net::from_file(&net_file, Phase::Train).unwrap();

    let (data, _) = example_arrays(4);
    let (_, labels_6) = example_arrays(6);
    let err = net.set_input_arrays(0, &data, &labels_6).unwrap_err();
    assert_eq!(
        err.to_string(),
        "data and labels must have the same first dimension (4 vs. 6)"
    );

    // 3 examples against batch size 2.
    let (data_3, labels_3) = example_arrays(3);
    let err = net.set_input_arrays(0, &data_3, &labels_3).unwrap_err();
    assert_eq!(
        err.to_string(),
        "first dimension of input arrays (3) must be a multiple of batch size (2)"
    );

    fs::remove_file(net_file).unwrap();
}

#[test]
fn only_memory_data_layers_accept_input_arrays() {
    let net_file = write_tiny_net("notmd.json");
    let net = Net::from_file(&net_file, Phase::Train).unwrap();
    let (data, labels) = example_arrays(2);

    // Layer 1 is the inner product.
    assert!(matches!(
        net.set_input_arrays(1, &data, &labels),
        Err(BridgeErr::NotMemoryData { index: 1 })
    ));

    // The layer-handle entry point shares the same validation.
    let layers = net.layers();
    let loss_layer = layers.get(2).unwrap();
    assert!(matches!(
        net.set_layer_input_arrays(loss_layer, &data, &labels),
        Err(BridgeErr::NotMemoryData { index: 2 })
    ));
    let md_layer = layers.get(0).unwrap();
    net.set_layer_input_arrays(md_layer, &data, &labels).unwrap();

    fs::remove_file(net_file).unwrap();
}

#[test]
fn reinjection_releases_the_previous_arrays() {
    let net_file = write_tiny_net("reinject.json");
    let net = Net::from_file(&net_file, Phase::Train).unwrap();

    let (first_data, first_labels) = example_arrays(4);
    net.set_input_arrays(0, &first_data, &first_labels).unwrap();
    assert_eq!(Arc::strong_count(&first_data), 2);

    let (second_data, second_labels) = example_arrays(2);
    net.set_input_arrays(0, &second_data, &second_labels)
        .unwrap();
    assert_eq!(Arc::strong_count(&first_data), 1);
    assert_eq!(Arc::strong_count(&first_labels), 1);
    assert_eq!(Arc::strong_count(&second_data), 2);

    // Dropping the net releases the remaining custody.
    drop(net);
    assert_eq!(Arc::strong_count(&second_data), 1);
    assert_eq!(Arc::strong_count(&second_labels), 1);

    fs::remove_file(net_file).unwrap();
}

#[test]
fn views_survive_their_net() {
    let net_file = write_tiny_net("views.json");
    let net = Net::from_file(&net_file, Phase::Train).unwrap();

    let blob = net.blob_by_name("ip").unwrap();
    let view = blob.data();
    let shape = view.shape().to_vec();
    drop(blob);
    drop(net);

    // Storage stays reachable through the view's back-reference.
    assert_eq!(view.read().len(), shape.iter().product::<usize>());
    view.write().fill(1.0);
    assert!(view.read().iter().all(|v| *v == 1.0));

    fs::remove_file(net_file).unwrap();
}

#[test]
fn reshape_stales_outstanding_views() {
    let net_file = write_tiny_net("stale.json");
    let net = Net::from_file(&net_file, Phase::Train).unwrap();

    let blob = net.blob_by_name("ip").unwrap();
    let view = blob.data();
    assert!(!view.is_stale());

    blob.reshape(&CallArgs::positional(&[4, 1])).unwrap();
    assert!(view.is_stale());
    assert_eq!(blob.data().shape(), &[4, 1]);

    // Keyword arguments are refused outright.
    let err = blob
        .reshape(&CallArgs::positional(&[2]).with_keyword("axis", 0))
        .unwrap_err();
    assert_eq!(err.to_string(), "Blob.reshape takes no kwargs");

    fs::remove_file(net_file).unwrap();
}

#[test]
fn legacy_axis_accessors_translate_engine_errors() {
    let net_file = write_tiny_net("axes.json");
    let net = Net::from_file(&net_file, Phase::Train).unwrap();

    let label = net.blob_by_name("label").unwrap();
    assert_eq!(label.num_axes(), 1);
    assert_eq!(label.num().unwrap(), 2);
    let err = label.channels().unwrap_err();
    assert!(matches!(err, BridgeErr::Engine(_)));
    assert!(err.to_string().contains("axis"));

    fs::remove_file(net_file).unwrap();
}

#[test]
fn unknown_solver_type_is_rejected_by_name() {
    let net_file = write_tiny_net("rprop-net.json");
    let params: SolverParams = serde_json::from_value(json!({
        "net": net_file,
        "type": "Rprop",
        "max_iter": 5
    }))
    .unwrap();
    let err = Solver::from_params(params).unwrap_err();
    assert_eq!(err.to_string(), "unknown solver type: Rprop");
    fs::remove_file(net_file).unwrap();
}

#[test]
fn forward_without_injected_data_reports_the_layer() {
    let net_file = write_tiny_net("noinput.json");
    let net = Net::from_file(&net_file, Phase::Train).unwrap();
    let mut guard = host_lock().acquire();
    let err = net.forward_all(&mut guard).unwrap_err();
    assert!(matches!(err, BridgeErr::Engine(_)));
    assert!(err.to_string().contains("data"));
    fs::remove_file(net_file).unwrap();
}
