use std::{error::Error, io::Write, sync::Arc};

use parking_lot::Mutex;

use h5marshal::{
    backend::StoreBackend,
    dataset,
    storage::{storage_adapter::UsageLogStorageAdapter, store::MemoryStore},
};

#[derive(Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn take_lines(output: &Mutex<Vec<u8>>) -> Result<Vec<String>, Box<dyn Error>> {
    let bytes = std::mem::take(&mut *output.lock());
    Ok(String::from_utf8(bytes)?.lines().map(str::to_string).collect())
}

fn calls<'a>(lines: &'a [String], call: &str) -> Vec<&'a str> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("[usage] "))
        .filter_map(|line| line.strip_prefix(call))
        .filter_map(|line| line.split([',', ')']).next())
        .collect()
}

#[test]
fn chunked_dataset_store_keys() -> Result<(), Box<dyn Error>> {
    let output = Arc::new(Mutex::new(Vec::new()));
    let log_writer = Arc::new(Mutex::new(SharedBuffer(output.clone())));
    let store = Arc::new(UsageLogStorageAdapter::new(
        Arc::new(MemoryStore::new()),
        log_writer,
        || "[usage] ".to_string(),
    ));
    let backend = StoreBackend::new(store);
    let root = backend.open_root()?;
    take_lines(&output)?;

    let data: Vec<u16> = (0..16).collect();
    dataset::write_dataset_compressed(&backend, root, "d", &[4, 4], &data, &[2, 2], 5)?;
    let lines = take_lines(&output)?;
    let chunk_keys = ["d/c/0/0", "d/c/0/1", "d/c/1/0", "d/c/1/1"];
    let written = calls(&lines, "set(");
    assert!(written.contains(&"d/node.json"), "{lines:?}");
    assert_eq!(
        written
            .iter()
            .filter(|key| key.starts_with("d/c/"))
            .copied()
            .collect::<Vec<_>>(),
        chunk_keys
    );
    assert!(calls(&lines, "erase_prefix(").is_empty());

    assert_eq!(dataset::read_dataset::<_, u16>(&backend, root, "d")?, data);
    let lines = take_lines(&output)?;
    let read = calls(&lines, "get(");
    for key in chunk_keys {
        assert!(read.contains(&key), "{key} {lines:?}");
    }
    assert!(calls(&lines, "set(").is_empty());

    // a replacement erases the old chunks before writing a contiguous dataset
    dataset::replace_dataset(&backend, root, "d", &[2], &[7u16, 8])?;
    let lines = take_lines(&output)?;
    assert_eq!(calls(&lines, "erase_prefix("), ["d/"]);
    assert!(calls(&lines, "set(").contains(&"d/c/0"), "{lines:?}");
    assert_eq!(dataset::read_dataset::<_, u16>(&backend, root, "d")?, [7, 8]);
    assert_eq!(backend.open_handle_count(), 1);
    Ok(())
}
