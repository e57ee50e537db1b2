//! Integration test: write rasters to Zarr and read them back lazily.
//!
//! Values use the `col * 1000 + row` pattern from test-utils so any
//! transposition or offset error shows up as a wrong value.

use lazy_raster::{
    with_open, BackendRegistry, DataType, Dimension, ErrorKind, MemoryArray, Metadata, OpenMode,
    RasterArray, RasterConfig, RasterStack, SourceOptions, ZarrCompression,
};
use test_utils::{
    assert_approx_eq, assert_values_approx_eq, create_band_stack, create_elevation_grid,
    create_grid_with_missing, create_test_grid, shapes, test_grid_value, ScratchDir,
};

fn registry() -> BackendRegistry {
    BackendRegistry::from_config(&RasterConfig {
        zarr_chunk_size: 4,
        ..Default::default()
    })
    .expect("valid config")
}

fn labelled(width: usize, height: usize, dtype: DataType, data: Vec<f64>) -> RasterArray {
    let dims = vec![
        Dimension::new("lat", height as u64).with_coords(60.0, -0.25),
        Dimension::new("lon", width as u64).with_coords(-10.0, 0.25),
    ];
    let payload = MemoryArray::new(vec![height as u64, width as u64], dtype, data).unwrap();
    RasterArray::new(payload.into(), dims).unwrap()
}

#[test]
fn test_zarr_roundtrip_preserves_labels_and_values() {
    let scratch = ScratchDir::new();
    let registry = registry();
    let (width, height) = shapes::RAGGED;

    let mut attrs = Metadata::new();
    attrs.insert("units".to_string(), serde_json::json!("K"));
    let original = labelled(
        width,
        height,
        DataType::Float32,
        create_grid_with_missing(width, height, -9999.0),
    )
    .rebuild()
    .metadata(attrs.clone())
    .missing_value(Some(-9999.0))
    .build()
    .unwrap();

    let path = scratch.path("temperature.zarr");
    lazy_raster::write(&registry, &path, &original).unwrap();

    let read = RasterArray::from_path(&registry, &path).unwrap();
    assert_eq!(read.shape(), vec![height as u64, width as u64]);
    assert_eq!(read.dtype(), DataType::Float32);
    assert_eq!(read.missing_value(), Some(-9999.0));
    assert_eq!(read.name(), Some("temperature"));
    assert_eq!(read.metadata(), &attrs);
    assert_eq!(read.dims(), original.dims());

    let values = read.read_all().unwrap();
    assert_values_approx_eq!(&values, &original.read_all().unwrap(), 0.0);
}

#[test]
fn test_every_dtype_roundtrips() {
    let scratch = ScratchDir::new();
    let registry = registry();
    let (width, height) = shapes::TINY;

    for dtype in [
        DataType::UInt8,
        DataType::Int16,
        DataType::Int32,
        DataType::Float32,
        DataType::Float64,
    ] {
        let data: Vec<f64> = (0..width * height).map(|v| (v * 7) as f64).collect();
        let original = labelled(width, height, dtype, data.clone());
        let path = scratch.path(&format!("{}.zarr", dtype));
        lazy_raster::write(&registry, &path, &original).unwrap();

        let read = RasterArray::from_path(&registry, &path).unwrap();
        assert_eq!(read.dtype(), dtype);
        assert_eq!(read.missing_value(), None);
        assert_eq!(read.read_all().unwrap(), data, "dtype {}", dtype);
    }
}

#[test]
fn test_lazy_window_reads_only_requested_block() {
    let scratch = ScratchDir::new();
    let registry = registry();
    let (width, height) = shapes::SIMPLE_10X10;
    let path = scratch.path("grid.zarr");
    lazy_raster::write(
        &registry,
        &path,
        &labelled(width, height, DataType::Float64, create_test_grid(width, height)),
    )
    .unwrap();

    let array = RasterArray::from_path(&registry, &path).unwrap();
    let view = array.slice("lon", 3..7).unwrap().slice("lat", 5..6).unwrap();
    assert_eq!(view.shape(), vec![1, 4]);
    assert_approx_eq!(view.dim("lon").unwrap().start, -9.25, 1e-12);

    let values = with_open(&view, OpenMode::Read, |v| v.read_all()).unwrap();
    let expected: Vec<f64> = (3..7).map(|col| test_grid_value(col, 5)).collect();
    assert_eq!(values, expected);
}

#[test]
fn test_write_session_updates_zarr_in_place() {
    let scratch = ScratchDir::new();
    let registry = registry();
    let (width, height) = shapes::RAGGED;
    let path = scratch.path("dem.zarr");
    lazy_raster::write(
        &registry,
        &path,
        &labelled(width, height, DataType::Int16, create_elevation_grid(width, height)),
    )
    .unwrap();

    let array = RasterArray::from_path(&registry, &path).unwrap();
    let row = array.select("lat", 8).unwrap();
    with_open(&row, OpenMode::Write, |opened| {
        opened.clone().write_block(&[0..width as u64], &vec![-1.0; width])
    })
    .unwrap();

    let reread = RasterArray::from_path(&registry, &path).unwrap();
    let values = reread.read_all().unwrap();
    let expected = create_elevation_grid(width, height);
    assert_eq!(&values[..8 * width], &expected[..8 * width]);
    assert!(values[8 * width..].iter().all(|&v| v == -1.0));
}

#[test]
fn test_band_cube_roundtrip() {
    let scratch = ScratchDir::new();
    let registry = registry();
    let data = create_band_stack(3, 5, 6);
    let original = RasterArray::from_vec(vec![3, 6, 5], DataType::Float64, data.clone()).unwrap();
    let path = scratch.path("cube.zarr");
    lazy_raster::write(&registry, &path, &original).unwrap();

    let read = RasterArray::from_path(&registry, &path).unwrap();
    let names: Vec<&str> = read.dims().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["band", "y", "x"]);

    let band = read.select("band", 2).unwrap();
    assert_eq!(band.refdims()[0].name, "band");
    assert_eq!(band.read_all().unwrap(), data[60..90].to_vec());
}

#[test]
fn test_composite_roundtrip_keeps_layer_order() {
    let scratch = ScratchDir::new();
    let registry = registry();
    let (width, height) = shapes::TINY;
    let layer = |offset: f64| {
        let data = create_test_grid(width, height).iter().map(|v| v + offset).collect();
        labelled(width, height, DataType::Int32, data)
    };
    let stack = RasterStack::new(vec![
        ("red".to_string(), layer(0.0)),
        ("green".to_string(), layer(10.0)),
        ("blue".to_string(), layer(20.0)),
    ])
    .unwrap();

    let path = scratch.path("rgb.zarr");
    let written = lazy_raster::write(&registry, &path, &stack).unwrap();
    assert_eq!(written, vec![path.clone()]);

    let read = RasterStack::from_path(&registry, &path).unwrap();
    assert_eq!(read.len(), 3);
    assert_eq!(read.names().collect::<Vec<_>>(), vec!["red", "green", "blue"]);
    assert_eq!(read.dims(), stack.dims());
    for (name, array) in read.iter() {
        assert_eq!(array.file_handle().unwrap().selector(), Some(name));
        assert_eq!(
            array.read_all().unwrap(),
            stack.get(name).unwrap().read_all().unwrap()
        );
    }

    let green = RasterArray::from_path_with(&registry, &path, &SourceOptions::default().layer("green"))
        .unwrap();
    assert_eq!(green.read_block(&[0..1, 0..1]).unwrap(), vec![10.0]);

    // The group root is not an array.
    let err = RasterArray::from_path(&registry, &path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
}

#[test]
fn test_single_array_opens_as_one_layer_stack() {
    let scratch = ScratchDir::new();
    let registry = registry();
    let path = scratch.path("solo.zarr");
    lazy_raster::write(&registry, &path, &labelled(2, 2, DataType::UInt8, vec![1.0, 2.0, 3.0, 4.0]))
        .unwrap();

    let stack = RasterStack::from_path(&registry, &path).unwrap();
    assert_eq!(stack.names().collect::<Vec<_>>(), vec!["solo"]);
    let loaded = stack.read().unwrap();
    assert!(!loaded.get("solo").unwrap().is_lazy());
}

#[test]
fn test_overwrite_replaces_previous_store() {
    let scratch = ScratchDir::new();
    let registry = registry();
    let path = scratch.path("grid.zarr");
    lazy_raster::write(&registry, &path, &test_stack_3()).unwrap();
    lazy_raster::write(&registry, &path, &labelled(2, 1, DataType::Float32, vec![5.0, 6.0])).unwrap();

    let read = RasterArray::from_path(&registry, &path).unwrap();
    assert_eq!(read.read_all().unwrap(), vec![5.0, 6.0]);
    assert!(RasterStack::from_path(&registry, &path).unwrap().len() == 1);
}

#[test]
fn test_uncompressed_config() {
    let scratch = ScratchDir::new();
    let registry = BackendRegistry::from_config(&RasterConfig {
        zarr_compression: ZarrCompression::None,
        ..Default::default()
    })
    .unwrap();
    let path = scratch.path("plain.zarr");
    let original = labelled(3, 2, DataType::Float64, create_test_grid(3, 2));
    lazy_raster::write(&registry, &path, &original).unwrap();
    assert_eq!(
        RasterArray::from_path(&registry, &path).unwrap().read_all().unwrap(),
        create_test_grid(3, 2)
    );
}

fn test_stack_3() -> RasterStack {
    let layer = |v: f64| RasterArray::from_vec(vec![2], DataType::Float32, vec![v, v]).unwrap();
    RasterStack::new(vec![
        ("a".to_string(), layer(1.0)),
        ("b".to_string(), layer(2.0)),
        ("c".to_string(), layer(3.0)),
    ])
    .unwrap()
}
