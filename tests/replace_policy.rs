use std::{error::Error, sync::Arc};

use h5marshal::{
    backend::StoreBackend,
    config::{global_config_mut, ReplacePolicy},
    dataset,
    storage::store::MemoryStore,
    MarshalError,
};

// The replace policy is global, so this is the only test in this binary.
#[test]
fn replace_policy_reject() -> Result<(), Box<dyn Error>> {
    let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
    let root = backend.open_root()?;
    global_config_mut().set_replace_policy(ReplacePolicy::Reject);

    dataset::write_string_dataset(&backend, root, "s", "hello")?;
    // same type and extent is overwritten in place
    dataset::write_string_dataset(&backend, root, "s", "world")?;
    assert_eq!(dataset::read_string_dataset(&backend, root, "s")?, "world");
    assert!(matches!(
        dataset::write_string_dataset(&backend, root, "s", "hi"),
        Err(MarshalError::ShapeMismatch { .. })
    ));
    assert_eq!(dataset::read_string_dataset(&backend, root, "s")?, "world");

    dataset::replace_dataset(&backend, root, "a", &[2], &[1u32, 2])?;
    assert!(matches!(
        dataset::replace_dataset(&backend, root, "a", &[3], &[1u32, 2, 3]),
        Err(MarshalError::ShapeMismatch { .. })
    ));

    global_config_mut().set_replace_policy(ReplacePolicy::Recreate);
    dataset::replace_dataset(&backend, root, "a", &[3], &[1u32, 2, 3])?;
    assert_eq!(
        dataset::read_dataset::<_, u32>(&backend, root, "a")?,
        [1, 2, 3]
    );
    assert_eq!(backend.open_handle_count(), 1);
    Ok(())
}
