use std::{error::Error, sync::Arc};

use h5marshal::{
    attribute,
    backend::{BackendOp, Handle, ObjectKind, StoreBackend},
    dataset,
    guard::ResourceKind,
    storage::store::MemoryStore,
    MarshalError,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn memory_backend() -> Result<(StoreBackend<MemoryStore>, Handle), Box<dyn Error>> {
    init_logger();
    let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
    let root = backend.open_root()?;
    Ok((backend, root))
}

#[test]
fn primary_failure_wins_over_close_failures() -> Result<(), Box<dyn Error>> {
    let (backend, root) = memory_backend()?;
    backend.inject_fault(BackendOp::WriteDataset);
    backend.inject_fault(BackendOp::CloseSpace);
    backend.inject_fault(BackendOp::CloseType);
    let error = dataset::write_dataset(&backend, root, "a", &[3], &[1u8, 2, 3]).unwrap_err();
    assert!(matches!(error, MarshalError::Transfer { .. }));
    assert_eq!(error.status_code(), -5);
    assert_eq!(backend.open_handle_count(), 1);
    Ok(())
}

#[test]
fn close_failure_is_reported_without_primary() -> Result<(), Box<dyn Error>> {
    let (backend, root) = memory_backend()?;
    backend.inject_fault(BackendOp::CloseObject);
    let error = dataset::write_dataset(&backend, root, "a", &[3], &[1u8, 2, 3]).unwrap_err();
    assert!(matches!(
        error,
        MarshalError::ResourceClose {
            resource: ResourceKind::Object(ObjectKind::Dataset),
            ..
        }
    ));
    assert_eq!(error.status_code(), -6);
    assert_eq!(error.to_string(), "a: cannot close dataset: injected failure in CloseObject");
    assert_eq!(backend.open_handle_count(), 1);

    // the data was written before the close failed
    backend.clear_faults();
    assert_eq!(dataset::read_dataset::<_, u8>(&backend, root, "a")?, [1, 2, 3]);
    Ok(())
}

#[test]
fn first_of_several_close_failures_wins() -> Result<(), Box<dyn Error>> {
    let (backend, root) = memory_backend()?;
    backend.inject_fault(BackendOp::CloseSpace);
    backend.inject_fault(BackendOp::CloseType);
    // released in reverse: dataset, datatype, dataspace
    let error = dataset::write_dataset(&backend, root, "a", &[1], &[1.0f32]).unwrap_err();
    assert!(matches!(
        error,
        MarshalError::ResourceClose {
            resource: ResourceKind::Datatype,
            ..
        }
    ));
    assert_eq!(backend.open_handle_count(), 1);
    Ok(())
}

#[test]
fn string_buffer_is_reclaimed() -> Result<(), Box<dyn Error>> {
    let (backend, root) = memory_backend()?;
    dataset::write_string_list_dataset(&backend, root, "list", &["x", "y"])?;
    backend.inject_fault(BackendOp::VlenBufferStrings);
    backend.inject_fault(BackendOp::ReclaimVlenBuffer);
    assert!(matches!(
        dataset::read_string_list_dataset(&backend, root, "list"),
        Err(MarshalError::Transfer { .. })
    ));
    assert_eq!(backend.open_handle_count(), 1);

    backend.clear_faults();
    backend.inject_fault(BackendOp::ReclaimVlenBuffer);
    assert!(matches!(
        dataset::read_string_list_dataset(&backend, root, "list"),
        Err(MarshalError::ResourceClose {
            resource: ResourceKind::VlenBuffer,
            ..
        })
    ));
    assert_eq!(backend.open_handle_count(), 1);
    Ok(())
}

#[test]
fn attribute_failures() -> Result<(), Box<dyn Error>> {
    let (backend, root) = memory_backend()?;
    attribute::write_scalar_attribute(&backend, root, ".", "a", 1i32)?;

    backend.inject_fault(BackendOp::DeleteAttribute);
    let error = attribute::write_scalar_attribute(&backend, root, ".", "a", 2i32).unwrap_err();
    assert!(matches!(
        error,
        MarshalError::ResourceCreate {
            resource: ResourceKind::Attribute,
            ..
        }
    ));
    assert_eq!(error.target(), ".@a");
    backend.clear_faults();
    assert_eq!(
        attribute::read_scalar_attribute::<_, i32>(&backend, root, ".", "a")?,
        1
    );

    backend.inject_fault(BackendOp::ObjectKindOf);
    let error = attribute::write_scalar_attribute(&backend, root, ".", "b", 2i32).unwrap_err();
    assert_eq!(error.status_code(), -3);
    assert!(!attribute::attribute_exists(&backend, root, ".", "a"));
    backend.clear_faults();
    assert!(attribute::attribute_exists(&backend, root, ".", "a"));

    backend.inject_fault(BackendOp::WriteAttribute);
    assert!(matches!(
        attribute::write_string_attribute(&backend, root, ".", "s", "text"),
        Err(MarshalError::Transfer { .. })
    ));
    assert_eq!(backend.open_handle_count(), 1);
    Ok(())
}

#[test]
fn status_codes() {
    let error = MarshalError::NullOrEmptyPayload {
        target: "a".to_string(),
    };
    assert_eq!(error.status_code(), -2);
    assert_eq!(error.to_string(), "a: the payload is empty");
}
