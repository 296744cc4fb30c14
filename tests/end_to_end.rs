use strideplan::{
    get_config, init, plan_and_place, Allocator, ArenaAllocator, DataType, LogLevel, MemorySpace,
    Status, TensorShape,
};

fn shape(dims: &[i64], layout: &str) -> TensorShape {
    TensorShape::from_dims(dims, layout).unwrap()
}

#[test]
fn test_plan_place_and_address() {
    init(LogLevel::Debug, None).unwrap();
    let mut allocator = ArenaAllocator::from_config(&get_config());
    let device_base = allocator.top_addr(MemorySpace::Device);

    let tensors = [
        (shape(&[1, 3, 224, 224], "NCHW"), DataType::F32),
        (shape(&[1, 224, 224, 3], "NHWC"), DataType::U8),
        (shape(&[1000], "W"), DataType::F32),
    ];
    let views = plan_and_place(&mut allocator, &tensors, 256).unwrap();
    assert_eq!(views.len(), 3);

    let mut spans = Vec::new();
    for (data, (expected, _)) in views.iter().zip(&tensors) {
        assert_eq!(data.shape(), expected);
        let view = data.as_strided_device().unwrap();
        let base = view.base() as u64;
        assert!(base >= device_base);
        let last: Vec<i64> = expected.dims().iter().map(|d| d - 1).collect();
        let elem_size = data.dtype().size_bytes().unwrap() as u64;
        let end = view.element_ptr(&last).unwrap() as u64 + elem_size;
        spans.push((base, end));
    }
    spans.sort();
    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "tensors overlap: {pair:?}");
    }

    let nchw = views[0].as_strided().unwrap();
    assert_eq!(nchw.strides(), &[688128, 229376, 1024, 4]);
    assert_eq!(
        nchw.byte_offset(&[0, 1, 2, 3]).unwrap(),
        229376 + 2 * 1024 + 3 * 4
    );
}

#[test]
fn test_out_of_memory_places_nothing() {
    let config = strideplan::PlannerConfig::from_toml(
        r#"
        [arena.device]
        base_addr = 0x10000
        size = 0x100000
        "#,
    )
    .unwrap();
    let mut allocator = ArenaAllocator::from_config(&config);
    let tensors = [
        (shape(&[64, 64], "HW"), DataType::F32),
        (shape(&[1, 3, 512, 512], "NCHW"), DataType::F32),
    ];
    let err = plan_and_place(&mut allocator, &tensors, 256).unwrap_err();
    assert_eq!(err.status(), Status::OutOfMemory);
    assert_eq!(allocator.allocated_bytes(), 0);
}

#[test]
fn test_invalid_tensor_places_nothing() {
    let mut allocator = ArenaAllocator::from_config(&get_config());
    let tensors = [
        (shape(&[4, 4], "HW"), DataType::F32),
        (shape(&[0, 4], "HW"), DataType::F32),
    ];
    let err = plan_and_place(&mut allocator, &tensors, 256).unwrap_err();
    assert_eq!(err.status(), Status::InvalidArgument);
    assert_eq!(allocator.allocated_bytes(), 0);
}

#[test]
fn test_init_with_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strideplan.toml");
    std::fs::write(
        &path,
        "default_alignment = 256\n\n[arena.host]\nbase_addr = 0\nsize = 4096\n",
    )
    .unwrap();
    init(LogLevel::Info, Some(&path)).unwrap();
    assert_eq!(get_config().arena.host.size, 4096);

    let missing = dir.path().join("missing.toml");
    assert_eq!(
        init(LogLevel::Info, Some(&missing)).unwrap_err().status(),
        Status::InvalidArgument
    );
}

#[test]
fn test_requirements_json_export() {
    let reqs = strideplan::calc_requirements(&shape(&[2, 8], "HW"), DataType::F16, 64).unwrap();
    let value: serde_json::Value = serde_json::from_str(&reqs.to_json().unwrap()).unwrap();
    assert_eq!(value["strides"][0], 64);
    assert_eq!(value["strides"][1], 2);
    assert_eq!(value["align_bytes"], 64);
}
