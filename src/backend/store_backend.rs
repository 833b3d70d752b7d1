use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;

use crate::{
    chunking::ChunkShape,
    codec::{CompressionLevel, DeflateCodec},
    config::global_config,
    datatype::TypeDescriptor,
    node::{
        retrieve_node_metadata, store_node_metadata, AttributeRecord, AttributeValue,
        DatasetMetadata, GroupMetadata, Layout, NodeMetadata, NodePath,
    },
    storage::{data_key, data_prefix, erase_node, ReadableWritableListableStorageTraits},
};

use super::{
    handle_table::{object_kind_name, wrong_kind, DatasetProperties, HandleEntry, HandleTable},
    region::{convert_elements, copy_region, grid_chunks, indices, to_usize},
    checked_num_elements, Backend, BackendError, BackendOp, Dataspace, Extent, Handle, Hyperslab,
    ObjectKind,
};

/// A [`Backend`] over a key/value store.
///
/// Each group or dataset is a node with [`NodeMetadata`] (holding its attributes) and datasets store their elements under the [data prefix](crate::storage::data_prefix) of the node.
///
/// ### Example
/// ```
/// # use std::sync::Arc;
/// # use h5marshal::backend::{Backend, ObjectKind, StoreBackend};
/// # use h5marshal::storage::store::MemoryStore;
/// let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
/// let root = backend.open_root()?;
/// let group = backend.create_group(root, "group")?;
/// assert_eq!(backend.object_kind_of(root, "group")?, ObjectKind::Group);
/// backend.close_object(group, ObjectKind::Group)?;
/// backend.close_object(root, ObjectKind::Group)?;
/// assert_eq!(backend.open_handle_count(), 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct StoreBackend<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    handles: Mutex<HandleTable>,
    faults: Mutex<HashSet<BackendOp>>,
}

impl<TStorage: ?Sized> std::fmt::Debug for StoreBackend<TStorage> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBackend")
            .field("open_handles", &self.handles.lock().len())
            .field("faults", &*self.faults.lock())
            .finish_non_exhaustive()
    }
}

impl<TStorage: ?Sized + ReadableWritableListableStorageTraits> StoreBackend<TStorage> {
    /// Create a new backend over `storage`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self {
            storage,
            handles: Mutex::new(HandleTable::default()),
            faults: Mutex::new(HashSet::new()),
        }
    }

    /// Get the underlying storage.
    #[must_use]
    pub fn storage(&self) -> Arc<TStorage> {
        self.storage.clone()
    }

    /// Open the root group, creating it if the store is empty.
    ///
    /// The handle is closed with [`Backend::close_object`] and [`ObjectKind::Group`].
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the root node is not a group or there is an underlying store error.
    pub fn open_root(&self) -> Result<Handle, BackendError> {
        self.run(BackendOp::OpenRoot, || {
            let root = NodePath::root();
            match retrieve_node_metadata(&*self.storage, &root)? {
                Some(NodeMetadata::Group(_)) => {}
                Some(NodeMetadata::Dataset(_)) => {
                    return Err(BackendError::WrongObjectKind(
                        root.to_string(),
                        ObjectKind::Group,
                    ))
                }
                None => store_node_metadata(
                    &*self.storage,
                    &root,
                    &NodeMetadata::Group(GroupMetadata::default()),
                )?,
            }
            Ok(self.insert(HandleEntry::Object {
                kind: ObjectKind::Group,
                path: root,
            }))
        })
    }

    /// Create the group `name` relative to `parent` and open it.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the node already exists or its parent is not a group.
    pub fn create_group(&self, parent: Handle, name: &str) -> Result<Handle, BackendError> {
        self.run(BackendOp::CreateGroup, || {
            let path = self.create_path(parent, name)?;
            store_node_metadata(
                &*self.storage,
                &path,
                &NodeMetadata::Group(GroupMetadata::default()),
            )?;
            Ok(self.insert(HandleEntry::Object {
                kind: ObjectKind::Group,
                path,
            }))
        })
    }

    /// Returns the number of open handles.
    #[must_use]
    pub fn open_handle_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Make every subsequent call of `op` fail with [`BackendError::Injected`].
    ///
    /// A failing close operation still closes its handle.
    pub fn inject_fault(&self, op: BackendOp) {
        self.faults.lock().insert(op);
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn run<T>(
        &self,
        op: BackendOp,
        f: impl FnOnce() -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let injected = self.faults.lock().contains(&op);
        let result = if injected {
            Err(BackendError::Injected(op))
        } else {
            f()
        };
        if let Err(err) = &result {
            if global_config().report_backend_errors() {
                log::error!("{op} failed: {err}");
            }
        }
        result
    }

    /// Close `handle` and then run `op`, so the handle is released even if `op` fails.
    fn close(
        &self,
        op: BackendOp,
        handle: Handle,
        expected: &'static str,
    ) -> Result<(), BackendError> {
        let removed = self.handles.lock().remove(handle, expected);
        self.run(op, || removed.map(|_| ()))
    }

    fn insert(&self, entry: HandleEntry) -> Handle {
        self.handles.lock().insert(entry)
    }

    fn object(&self, handle: Handle) -> Result<(ObjectKind, NodePath), BackendError> {
        match self.handles.lock().get(handle)? {
            HandleEntry::Object { kind, path } => Ok((*kind, path.clone())),
            entry => Err(wrong_kind(handle, "object", entry)),
        }
    }

    fn space(&self, handle: Handle) -> Result<Dataspace, BackendError> {
        match self.handles.lock().get(handle)? {
            HandleEntry::Space(space) => Ok(space.clone()),
            entry => Err(wrong_kind(handle, "dataspace", entry)),
        }
    }

    fn datatype(&self, handle: Handle) -> Result<TypeDescriptor, BackendError> {
        match self.handles.lock().get(handle)? {
            HandleEntry::Type(descriptor) => Ok(*descriptor),
            entry => Err(wrong_kind(handle, "datatype", entry)),
        }
    }

    fn properties(&self, handle: Handle) -> Result<DatasetProperties, BackendError> {
        match self.handles.lock().get(handle)? {
            HandleEntry::Properties(properties) => Ok(properties.clone()),
            entry => Err(wrong_kind(handle, "property list", entry)),
        }
    }

    fn update_properties(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut DatasetProperties),
    ) -> Result<(), BackendError> {
        match self.handles.lock().get_mut(handle)? {
            HandleEntry::Properties(properties) => {
                f(properties);
                Ok(())
            }
            entry => Err(wrong_kind(handle, "property list", entry)),
        }
    }

    fn attribute(&self, handle: Handle) -> Result<(NodePath, String), BackendError> {
        match self.handles.lock().get(handle)? {
            HandleEntry::Attribute { object, name } => Ok((object.clone(), name.clone())),
            entry => Err(wrong_kind(handle, "attribute", entry)),
        }
    }

    fn resolve(&self, parent: Handle, name: &str) -> Result<NodePath, BackendError> {
        let (_, parent_path) = self.object(parent)?;
        Ok(parent_path.join(name)?)
    }

    fn node(&self, path: &NodePath) -> Result<NodeMetadata, BackendError> {
        retrieve_node_metadata(&*self.storage, path)?
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    /// Resolve the path of a new node, which must not exist and must have a group parent.
    fn create_path(&self, parent: Handle, name: &str) -> Result<NodePath, BackendError> {
        let path = self.resolve(parent, name)?;
        let Some(group) = path.parent() else {
            return Err(BackendError::AlreadyExists(path.to_string()));
        };
        if self.node(&group)?.kind() != ObjectKind::Group {
            return Err(BackendError::WrongObjectKind(
                group.to_string(),
                ObjectKind::Group,
            ));
        }
        if retrieve_node_metadata(&*self.storage, &path)?.is_some() {
            return Err(BackendError::AlreadyExists(path.to_string()));
        }
        Ok(path)
    }

    fn open_node(
        &self,
        parent: Handle,
        name: &str,
        kind: ObjectKind,
    ) -> Result<Handle, BackendError> {
        let path = self.resolve(parent, name)?;
        if self.node(&path)?.kind() != kind {
            return Err(BackendError::WrongObjectKind(path.to_string(), kind));
        }
        Ok(self.insert(HandleEntry::Object { kind, path }))
    }

    fn dataset(&self, handle: Handle) -> Result<(NodePath, DatasetMetadata), BackendError> {
        let (kind, path) = self.object(handle)?;
        match (kind, self.node(&path)?) {
            (ObjectKind::Dataset, NodeMetadata::Dataset(metadata)) => Ok((path, metadata)),
            _ => Err(BackendError::WrongObjectKind(
                path.to_string(),
                ObjectKind::Dataset,
            )),
        }
    }

    /// Returns the node holding an attribute, and the attribute name.
    fn attribute_node(&self, handle: Handle) -> Result<(NodePath, String, NodeMetadata), BackendError> {
        let (path, name) = self.attribute(handle)?;
        let node = self.node(&path)?;
        if node.attributes().contains_key(&name) {
            Ok((path, name, node))
        } else {
            Err(BackendError::NotFound(format!("{path}@{name}")))
        }
    }

    fn fixed_element_size(descriptor: &TypeDescriptor) -> Result<usize, BackendError> {
        descriptor.size().ok_or(BackendError::TypeConversion {
            from: *descriptor,
            to: *descriptor,
        })
    }

    /// Load all elements of a fixed-size dataset. Unwritten elements are zero.
    fn load_elements(
        &self,
        path: &NodePath,
        metadata: &DatasetMetadata,
        element_size: usize,
    ) -> Result<Vec<u8>, BackendError> {
        let shape = metadata.extent.data_shape();
        let size = to_usize(metadata.extent.num_elements()) * element_size;
        match &metadata.layout {
            Layout::Contiguous => match self.storage.get(&data_key(path, &[]))? {
                Some(bytes) if bytes.len() == size => Ok(bytes),
                Some(bytes) => Err(BackendError::BufferSize {
                    expected: size,
                    actual: bytes.len(),
                }),
                None => Ok(vec![0; size]),
            },
            Layout::Chunked {
                chunk_shape,
                deflate,
            } => {
                let chunk_shape = chunk_shape.to_array_shape();
                let chunk_size = to_usize(chunk_shape.iter().product::<u64>()) * element_size;
                let mut elements = vec![0; size];
                for chunk in grid_chunks(&shape, &chunk_shape) {
                    let Some(encoded) = self.storage.get(&data_key(path, &chunk.indices))? else {
                        continue;
                    };
                    let decoded = match deflate {
                        Some(level) => DeflateCodec::new(*level).decode(&encoded)?,
                        None => encoded,
                    };
                    if decoded.len() != chunk_size {
                        return Err(BackendError::BufferSize {
                            expected: chunk_size,
                            actual: decoded.len(),
                        });
                    }
                    copy_region(
                        &decoded,
                        &chunk_shape,
                        &vec![0; chunk_shape.len()],
                        &mut elements,
                        &shape,
                        &chunk.origin,
                        &chunk.count,
                        element_size,
                    );
                }
                Ok(elements)
            }
        }
    }

    /// Store all elements of a fixed-size dataset.
    fn store_elements(
        &self,
        path: &NodePath,
        metadata: &DatasetMetadata,
        elements: &[u8],
        element_size: usize,
    ) -> Result<(), BackendError> {
        match &metadata.layout {
            Layout::Contiguous => Ok(self.storage.set(&data_key(path, &[]), elements)?),
            Layout::Chunked {
                chunk_shape,
                deflate,
            } => {
                let shape = metadata.extent.data_shape();
                let chunk_shape = chunk_shape.to_array_shape();
                let chunk_size = to_usize(chunk_shape.iter().product::<u64>()) * element_size;
                for chunk in grid_chunks(&shape, &chunk_shape) {
                    let mut decoded = vec![0; chunk_size];
                    copy_region(
                        elements,
                        &shape,
                        &chunk.origin,
                        &mut decoded,
                        &chunk_shape,
                        &vec![0; chunk_shape.len()],
                        &chunk.count,
                        element_size,
                    );
                    let encoded = match deflate {
                        Some(level) => DeflateCodec::new(*level).encode(&decoded)?,
                        None => decoded,
                    };
                    self.storage.set(&data_key(path, &chunk.indices), &encoded)?;
                }
                Ok(())
            }
        }
    }

    /// Returns the selection of `file_space` in a dataset of `extent`, or [`None`] if everything is selected.
    fn file_selection(
        &self,
        file_space: Option<Handle>,
        extent: &Extent,
    ) -> Result<Option<Hyperslab>, BackendError> {
        let Some(file_space) = file_space else {
            return Ok(None);
        };
        let space = self.space(file_space)?;
        if &space.extent != extent {
            return Err(BackendError::InvalidArgument(format!(
                "file space extent {:?} does not match the dataset extent {extent:?}",
                space.extent
            )));
        }
        Ok(space.selection)
    }

    /// Returns the linear element indices of `selection` in an array of `shape`.
    fn selected_indices(shape: &[u64], selection: Option<&Hyperslab>) -> Vec<u64> {
        match selection {
            None => (0..shape.iter().product()).collect(),
            Some(hyperslab) => indices(&hyperslab.count)
                .map(|index| {
                    index
                        .iter()
                        .zip(&hyperslab.offset)
                        .zip(shape)
                        .fold(0, |linear, ((index, offset), extent)| {
                            linear * extent + index + offset
                        })
                })
                .collect(),
        }
    }
}

impl<TStorage: ?Sized + ReadableWritableListableStorageTraits> Backend for StoreBackend<TStorage> {
    fn object_kind_of(&self, parent: Handle, name: &str) -> Result<ObjectKind, BackendError> {
        self.run(BackendOp::ObjectKindOf, || {
            let path = self.resolve(parent, name)?;
            Ok(self.node(&path)?.kind())
        })
    }

    fn open_object(
        &self,
        parent: Handle,
        name: &str,
        kind: ObjectKind,
    ) -> Result<Handle, BackendError> {
        self.run(BackendOp::OpenObject, || self.open_node(parent, name, kind))
    }

    fn close_object(&self, object: Handle, kind: ObjectKind) -> Result<(), BackendError> {
        self.close(BackendOp::CloseObject, object, object_kind_name(kind))
    }

    fn exists_as_dataset(&self, parent: Handle, name: &str) -> Result<bool, BackendError> {
        self.run(BackendOp::ExistsAsDataset, || {
            let path = self.resolve(parent, name)?;
            Ok(retrieve_node_metadata(&*self.storage, &path)?
                .is_some_and(|node| node.kind() == ObjectKind::Dataset))
        })
    }

    fn unlink(&self, parent: Handle, name: &str) -> Result<(), BackendError> {
        self.run(BackendOp::Unlink, || {
            let path = self.resolve(parent, name)?;
            if path.is_root() {
                return Err(BackendError::InvalidArgument(
                    "the root group cannot be unlinked".to_string(),
                ));
            }
            self.node(&path)?;
            Ok(erase_node(&*self.storage, &path)?)
        })
    }

    fn create_simple_space(&self, shape: &[u64]) -> Result<Handle, BackendError> {
        self.run(BackendOp::CreateSimpleSpace, || {
            if shape.is_empty() {
                return Err(BackendError::InvalidArgument(
                    "a simple dataspace must have at least one dimension".to_string(),
                ));
            }
            if checked_num_elements(shape).is_none() {
                return Err(BackendError::InvalidArgument(format!(
                    "the number of elements in {shape:?} overflows"
                )));
            }
            Ok(self.insert(HandleEntry::Space(Dataspace::new(Extent::Simple(
                shape.to_vec(),
            )))))
        })
    }

    fn create_scalar_space(&self) -> Result<Handle, BackendError> {
        self.run(BackendOp::CreateScalarSpace, || {
            Ok(self.insert(HandleEntry::Space(Dataspace::new(Extent::Scalar))))
        })
    }

    fn select_hyperslab(
        &self,
        space: Handle,
        offset: &[u64],
        count: &[u64],
    ) -> Result<(), BackendError> {
        self.run(BackendOp::SelectHyperslab, || {
            let mut handles = self.handles.lock();
            let dataspace = match handles.get_mut(space)? {
                HandleEntry::Space(dataspace) => dataspace,
                entry => return Err(wrong_kind(space, "dataspace", entry)),
            };
            let shape = match &dataspace.extent {
                Extent::Simple(shape) => shape,
                Extent::Scalar => {
                    return Err(BackendError::InvalidArgument(
                        "cannot select a hyperslab of a scalar dataspace".to_string(),
                    ))
                }
            };
            let in_bounds = offset.len() == shape.len()
                && count.len() == shape.len()
                && itertools::izip!(offset, count, shape)
                    .all(|(offset, count, extent)| offset + count <= *extent);
            if !in_bounds {
                return Err(BackendError::InvalidArgument(format!(
                    "hyperslab at {offset:?} of {count:?} is outside {shape:?}"
                )));
            }
            dataspace.selection = Some(Hyperslab {
                offset: offset.to_vec(),
                count: count.to_vec(),
            });
            Ok(())
        })
    }

    fn space_extent(&self, space: Handle) -> Result<Extent, BackendError> {
        self.run(BackendOp::SpaceExtent, || Ok(self.space(space)?.extent))
    }

    fn close_space(&self, space: Handle) -> Result<(), BackendError> {
        self.close(BackendOp::CloseSpace, space, "dataspace")
    }

    fn create_type(&self, descriptor: TypeDescriptor) -> Result<Handle, BackendError> {
        self.run(BackendOp::CreateType, || {
            if !descriptor.is_valid() {
                return Err(BackendError::InvalidArgument(format!(
                    "invalid datatype {descriptor:?}"
                )));
            }
            Ok(self.insert(HandleEntry::Type(descriptor)))
        })
    }

    fn type_descriptor(&self, datatype: Handle) -> Result<TypeDescriptor, BackendError> {
        self.run(BackendOp::TypeDescriptor, || self.datatype(datatype))
    }

    fn close_type(&self, datatype: Handle) -> Result<(), BackendError> {
        self.close(BackendOp::CloseType, datatype, "datatype")
    }

    fn create_dataset_properties(&self) -> Result<Handle, BackendError> {
        self.run(BackendOp::CreateDatasetProperties, || {
            Ok(self.insert(HandleEntry::Properties(DatasetProperties::default())))
        })
    }

    fn set_chunk(&self, properties: Handle, chunk_shape: &[u64]) -> Result<(), BackendError> {
        self.run(BackendOp::SetChunk, || {
            let chunk_shape = ChunkShape::try_from(chunk_shape)
                .map_err(|err| BackendError::InvalidArgument(err.to_string()))?;
            self.update_properties(properties, |properties| {
                properties.chunk_shape = Some(chunk_shape);
            })
        })
    }

    fn set_deflate(&self, properties: Handle, level: u32) -> Result<(), BackendError> {
        self.run(BackendOp::SetDeflate, || {
            let level = CompressionLevel::try_from(level)?;
            self.update_properties(properties, |properties| {
                properties.deflate = Some(level);
            })
        })
    }

    fn close_properties(&self, properties: Handle) -> Result<(), BackendError> {
        self.close(BackendOp::CloseProperties, properties, "property list")
    }

    fn create_dataset(
        &self,
        parent: Handle,
        name: &str,
        datatype: Handle,
        space: Handle,
        properties: Option<Handle>,
    ) -> Result<Handle, BackendError> {
        self.run(BackendOp::CreateDataset, || {
            let datatype = self.datatype(datatype)?;
            let extent = self.space(space)?.extent;
            let properties = properties
                .map(|properties| self.properties(properties))
                .transpose()?
                .unwrap_or_default();
            let layout = match (properties.chunk_shape, properties.deflate) {
                (None, None) => Layout::Contiguous,
                (None, Some(_)) => {
                    return Err(BackendError::InvalidArgument(
                        "deflate requires a chunked layout".to_string(),
                    ))
                }
                (Some(chunk_shape), deflate) => {
                    let fits = chunk_shape.len() == extent.rank()
                        && chunk_shape
                            .iter()
                            .zip(extent.shape())
                            .all(|(chunk, extent)| chunk.get() <= *extent);
                    if !fits {
                        return Err(BackendError::InvalidArgument(format!(
                            "chunk shape {:?} does not fit extent {extent:?}",
                            chunk_shape.to_array_shape()
                        )));
                    }
                    if datatype.is_variable_length() {
                        return Err(BackendError::InvalidArgument(
                            "variable-length datasets must be contiguous".to_string(),
                        ));
                    }
                    Layout::Chunked {
                        chunk_shape,
                        deflate,
                    }
                }
            };
            let path = self.create_path(parent, name)?;
            store_node_metadata(
                &*self.storage,
                &path,
                &NodeMetadata::Dataset(DatasetMetadata {
                    datatype,
                    extent,
                    layout,
                    attributes: Default::default(),
                }),
            )?;
            Ok(self.insert(HandleEntry::Object {
                kind: ObjectKind::Dataset,
                path,
            }))
        })
    }

    fn open_dataset(&self, parent: Handle, name: &str) -> Result<Handle, BackendError> {
        self.run(BackendOp::OpenDataset, || {
            self.open_node(parent, name, ObjectKind::Dataset)
        })
    }

    fn dataset_space(&self, dataset: Handle) -> Result<Handle, BackendError> {
        self.run(BackendOp::DatasetSpace, || {
            let (_, metadata) = self.dataset(dataset)?;
            Ok(self.insert(HandleEntry::Space(Dataspace::new(metadata.extent))))
        })
    }

    fn dataset_type(&self, dataset: Handle) -> Result<Handle, BackendError> {
        self.run(BackendOp::DatasetType, || {
            let (_, metadata) = self.dataset(dataset)?;
            Ok(self.insert(HandleEntry::Type(metadata.datatype)))
        })
    }

    fn dataset_storage_size(&self, dataset: Handle) -> Result<u64, BackendError> {
        self.run(BackendOp::DatasetStorageSize, || {
            let (path, _) = self.dataset(dataset)?;
            Ok(self.storage.size_prefix(&data_prefix(&path))?)
        })
    }

    fn write_dataset(
        &self,
        dataset: Handle,
        mem_type: Handle,
        file_space: Option<Handle>,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        self.run(BackendOp::WriteDataset, || {
            let (path, metadata) = self.dataset(dataset)?;
            let mem_type = self.datatype(mem_type)?;
            let mem_size = Self::fixed_element_size(&mem_type)?;
            let element_size = Self::fixed_element_size(&metadata.datatype)?;
            let selection = self.file_selection(file_space, &metadata.extent)?;
            let selected = selection
                .as_ref()
                .map_or_else(|| metadata.extent.num_elements(), Hyperslab::num_elements);
            let expected = to_usize(selected) * mem_size;
            if bytes.len() != expected {
                return Err(BackendError::BufferSize {
                    expected,
                    actual: bytes.len(),
                });
            }
            let converted = convert_elements(bytes, &mem_type, &metadata.datatype)?;
            match selection {
                None => self.store_elements(&path, &metadata, &converted, element_size),
                Some(hyperslab) => {
                    let shape = metadata.extent.data_shape();
                    let mut elements = self.load_elements(&path, &metadata, element_size)?;
                    copy_region(
                        &converted,
                        &hyperslab.count,
                        &vec![0; shape.len()],
                        &mut elements,
                        &shape,
                        &hyperslab.offset,
                        &hyperslab.count,
                        element_size,
                    );
                    self.store_elements(&path, &metadata, &elements, element_size)
                }
            }
        })
    }

    fn read_dataset(
        &self,
        dataset: Handle,
        mem_type: Handle,
        out: &mut [u8],
    ) -> Result<(), BackendError> {
        self.run(BackendOp::ReadDataset, || {
            let (path, metadata) = self.dataset(dataset)?;
            let mem_type = self.datatype(mem_type)?;
            let mem_size = Self::fixed_element_size(&mem_type)?;
            let element_size = Self::fixed_element_size(&metadata.datatype)?;
            let expected = to_usize(metadata.extent.num_elements()) * mem_size;
            if out.len() != expected {
                return Err(BackendError::BufferSize {
                    expected,
                    actual: out.len(),
                });
            }
            let elements = self.load_elements(&path, &metadata, element_size)?;
            let converted = convert_elements(&elements, &metadata.datatype, &mem_type)?;
            out.copy_from_slice(&converted);
            Ok(())
        })
    }

    fn write_dataset_strings(
        &self,
        dataset: Handle,
        mem_type: Handle,
        file_space: Option<Handle>,
        strings: &[&str],
    ) -> Result<(), BackendError> {
        self.run(BackendOp::WriteDatasetStrings, || {
            let (path, metadata) = self.dataset(dataset)?;
            let mem_type = self.datatype(mem_type)?;
            if !(mem_type.is_variable_length() && metadata.datatype.is_variable_length()) {
                return Err(BackendError::TypeConversion {
                    from: mem_type,
                    to: metadata.datatype,
                });
            }
            let selection = self.file_selection(file_space, &metadata.extent)?;
            let records =
                Self::selected_indices(&metadata.extent.data_shape(), selection.as_ref());
            if records.len() != strings.len() {
                return Err(BackendError::InvalidArgument(format!(
                    "{} strings for a selection of {} elements",
                    strings.len(),
                    records.len()
                )));
            }
            for (record, string) in records.into_iter().zip(strings) {
                self.storage
                    .set(&data_key(&path, &[record]), string.as_bytes())?;
            }
            Ok(())
        })
    }

    fn read_dataset_strings(
        &self,
        dataset: Handle,
        mem_type: Handle,
    ) -> Result<Handle, BackendError> {
        self.run(BackendOp::ReadDatasetStrings, || {
            let (path, metadata) = self.dataset(dataset)?;
            let mem_type = self.datatype(mem_type)?;
            if !(mem_type.is_variable_length() && metadata.datatype.is_variable_length()) {
                return Err(BackendError::TypeConversion {
                    from: metadata.datatype,
                    to: mem_type,
                });
            }
            let strings = (0..metadata.extent.num_elements())
                .map(|record| {
                    let key = data_key(&path, &[record]);
                    match self.storage.get(&key)? {
                        Some(bytes) => String::from_utf8(bytes).map_err(|err| {
                            BackendError::InvalidArgument(format!(
                                "record {key} is not valid UTF-8: {err}"
                            ))
                        }),
                        None => Ok(String::new()),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(self.insert(HandleEntry::VlenBuffer(strings)))
        })
    }

    fn vlen_buffer_strings(&self, buffer: Handle) -> Result<Vec<String>, BackendError> {
        self.run(BackendOp::VlenBufferStrings, || {
            match self.handles.lock().get(buffer)? {
                HandleEntry::VlenBuffer(strings) => Ok(strings.clone()),
                entry => Err(wrong_kind(buffer, "string buffer", entry)),
            }
        })
    }

    fn reclaim_vlen_buffer(&self, buffer: Handle) -> Result<(), BackendError> {
        self.close(BackendOp::ReclaimVlenBuffer, buffer, "string buffer")
    }

    fn attribute_exists(&self, object: Handle, name: &str) -> Result<bool, BackendError> {
        self.run(BackendOp::AttributeExists, || {
            let (_, path) = self.object(object)?;
            Ok(self.node(&path)?.attributes().contains_key(name))
        })
    }

    fn create_attribute(
        &self,
        object: Handle,
        name: &str,
        datatype: Handle,
        space: Handle,
    ) -> Result<Handle, BackendError> {
        self.run(BackendOp::CreateAttribute, || {
            if name.is_empty() {
                return Err(BackendError::InvalidArgument(
                    "attribute names must not be empty".to_string(),
                ));
            }
            let (_, path) = self.object(object)?;
            let datatype = self.datatype(datatype)?;
            let extent = self.space(space)?.extent;
            let mut node = self.node(&path)?;
            if node.attributes().contains_key(name) {
                return Err(BackendError::AlreadyExists(format!("{path}@{name}")));
            }
            let num_elements = to_usize(extent.num_elements());
            let value = match datatype.size() {
                Some(size) => AttributeValue::Bytes(vec![0; num_elements * size]),
                None => AttributeValue::Strings(vec![String::new(); num_elements]),
            };
            node.attributes_mut().insert(
                name.to_string(),
                AttributeRecord {
                    datatype,
                    extent,
                    value,
                },
            );
            store_node_metadata(&*self.storage, &path, &node)?;
            Ok(self.insert(HandleEntry::Attribute {
                object: path,
                name: name.to_string(),
            }))
        })
    }

    fn open_attribute(&self, object: Handle, name: &str) -> Result<Handle, BackendError> {
        self.run(BackendOp::OpenAttribute, || {
            let (_, path) = self.object(object)?;
            if !self.node(&path)?.attributes().contains_key(name) {
                return Err(BackendError::NotFound(format!("{path}@{name}")));
            }
            Ok(self.insert(HandleEntry::Attribute {
                object: path,
                name: name.to_string(),
            }))
        })
    }

    fn delete_attribute(&self, object: Handle, name: &str) -> Result<(), BackendError> {
        self.run(BackendOp::DeleteAttribute, || {
            let (_, path) = self.object(object)?;
            let mut node = self.node(&path)?;
            if node.attributes_mut().remove(name).is_none() {
                return Err(BackendError::NotFound(format!("{path}@{name}")));
            }
            Ok(store_node_metadata(&*self.storage, &path, &node)?)
        })
    }

    fn write_attribute(
        &self,
        attribute: Handle,
        mem_type: Handle,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        self.run(BackendOp::WriteAttribute, || {
            let (path, name, mut node) = self.attribute_node(attribute)?;
            let mem_type = self.datatype(mem_type)?;
            let mem_size = Self::fixed_element_size(&mem_type)?;
            let Some(record) = node.attributes_mut().get_mut(&name) else {
                return Err(BackendError::NotFound(format!("{path}@{name}")));
            };
            if record.datatype.is_variable_length() {
                return Err(BackendError::TypeConversion {
                    from: mem_type,
                    to: record.datatype,
                });
            }
            let expected = to_usize(record.extent.num_elements()) * mem_size;
            if bytes.len() != expected {
                return Err(BackendError::BufferSize {
                    expected,
                    actual: bytes.len(),
                });
            }
            let converted = convert_elements(bytes, &mem_type, &record.datatype)?;
            record.value = AttributeValue::Bytes(converted.into_owned());
            Ok(store_node_metadata(&*self.storage, &path, &node)?)
        })
    }

    fn write_attribute_strings(
        &self,
        attribute: Handle,
        mem_type: Handle,
        strings: &[&str],
    ) -> Result<(), BackendError> {
        self.run(BackendOp::WriteAttributeStrings, || {
            let (path, name, mut node) = self.attribute_node(attribute)?;
            let mem_type = self.datatype(mem_type)?;
            let Some(record) = node.attributes_mut().get_mut(&name) else {
                return Err(BackendError::NotFound(format!("{path}@{name}")));
            };
            if !(mem_type.is_variable_length() && record.datatype.is_variable_length()) {
                return Err(BackendError::TypeConversion {
                    from: mem_type,
                    to: record.datatype,
                });
            }
            let num_elements = to_usize(record.extent.num_elements());
            if strings.len() != num_elements {
                return Err(BackendError::InvalidArgument(format!(
                    "{} strings for an attribute of {num_elements} elements",
                    strings.len()
                )));
            }
            record.value =
                AttributeValue::Strings(strings.iter().map(ToString::to_string).collect());
            Ok(store_node_metadata(&*self.storage, &path, &node)?)
        })
    }

    fn read_attribute(
        &self,
        attribute: Handle,
        mem_type: Handle,
        out: &mut [u8],
    ) -> Result<(), BackendError> {
        self.run(BackendOp::ReadAttribute, || {
            let (path, name, node) = self.attribute_node(attribute)?;
            let mem_type = self.datatype(mem_type)?;
            let mem_size = Self::fixed_element_size(&mem_type)?;
            let Some(record) = node.attributes().get(&name) else {
                return Err(BackendError::NotFound(format!("{path}@{name}")));
            };
            let AttributeValue::Bytes(bytes) = &record.value else {
                return Err(BackendError::TypeConversion {
                    from: record.datatype,
                    to: mem_type,
                });
            };
            let expected = to_usize(record.extent.num_elements()) * mem_size;
            if out.len() != expected {
                return Err(BackendError::BufferSize {
                    expected,
                    actual: out.len(),
                });
            }
            let converted = convert_elements(bytes, &record.datatype, &mem_type)?;
            out.copy_from_slice(&converted);
            Ok(())
        })
    }

    fn attribute_space(&self, attribute: Handle) -> Result<Handle, BackendError> {
        self.run(BackendOp::AttributeSpace, || {
            let (_, name, node) = self.attribute_node(attribute)?;
            let extent = node.attributes()[&name].extent.clone();
            Ok(self.insert(HandleEntry::Space(Dataspace::new(extent))))
        })
    }

    fn attribute_type(&self, attribute: Handle) -> Result<Handle, BackendError> {
        self.run(BackendOp::AttributeType, || {
            let (_, name, node) = self.attribute_node(attribute)?;
            let datatype = node.attributes()[&name].datatype;
            Ok(self.insert(HandleEntry::Type(datatype)))
        })
    }

    fn close_attribute(&self, attribute: Handle) -> Result<(), BackendError> {
        self.close(BackendOp::CloseAttribute, attribute, "attribute")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datatype::StorageTypeTag,
        storage::{store::MemoryStore, ListableStorageTraits},
    };

    fn int32() -> TypeDescriptor {
        TypeDescriptor::Numeric {
            tag: StorageTypeTag::Int32,
        }
    }

    fn create_int32_dataset(
        backend: &StoreBackend<MemoryStore>,
        parent: Handle,
        name: &str,
        shape: &[u64],
        chunk_shape: Option<&[u64]>,
        deflate: Option<u32>,
    ) -> Handle {
        let datatype = backend.create_type(int32()).unwrap();
        let space = backend.create_simple_space(shape).unwrap();
        let properties = backend.create_dataset_properties().unwrap();
        if let Some(chunk_shape) = chunk_shape {
            backend.set_chunk(properties, chunk_shape).unwrap();
        }
        if let Some(level) = deflate {
            backend.set_deflate(properties, level).unwrap();
        }
        let dataset = backend
            .create_dataset(parent, name, datatype, space, Some(properties))
            .unwrap();
        backend.close_properties(properties).unwrap();
        backend.close_space(space).unwrap();
        backend.close_type(datatype).unwrap();
        dataset
    }

    #[test]
    fn store_backend_groups() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        let group = backend.create_group(root, "a").unwrap();
        let nested = backend.create_group(group, "b").unwrap();
        assert_eq!(backend.object_kind_of(root, "a/b").unwrap(), ObjectKind::Group);
        assert_eq!(backend.object_kind_of(group, "/a/b").unwrap(), ObjectKind::Group);
        assert_eq!(backend.object_kind_of(group, ".").unwrap(), ObjectKind::Group);
        assert!(matches!(
            backend.object_kind_of(root, "missing"),
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.create_group(root, "a"),
            Err(BackendError::AlreadyExists(_))
        ));
        assert!(matches!(
            backend.create_group(root, "x/y"),
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.open_object(root, "a", ObjectKind::Dataset),
            Err(BackendError::WrongObjectKind(..))
        ));
        for handle in [nested, group, root] {
            backend.close_object(handle, ObjectKind::Group).unwrap();
        }
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn store_backend_handles() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let space = backend.create_scalar_space().unwrap();
        assert!(matches!(
            backend.close_type(space),
            Err(BackendError::WrongHandleKind { .. })
        ));
        backend.close_space(space).unwrap();
        assert!(matches!(
            backend.close_space(space),
            Err(BackendError::InvalidHandle(_))
        ));
        assert!(backend
            .create_type(TypeDescriptor::FixedString { size: 0 })
            .is_err());
        assert!(backend.create_simple_space(&[]).is_err());
        assert!(matches!(
            backend.create_simple_space(&[u64::MAX, 2]),
            Err(BackendError::InvalidArgument(_))
        ));
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn store_backend_dataset_contiguous() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        let dataset = create_int32_dataset(&backend, root, "data", &[2, 3], None, None);
        assert!(backend.exists_as_dataset(root, "data").unwrap());
        assert!(!backend.exists_as_dataset(root, "other").unwrap());

        let datatype = backend.create_type(int32()).unwrap();
        let elements: Vec<i32> = (0..6).collect();
        backend
            .write_dataset(dataset, datatype, None, bytemuck::cast_slice(&elements))
            .unwrap();
        let mut out = vec![0i32; 6];
        backend
            .read_dataset(dataset, datatype, bytemuck::cast_slice_mut(&mut out))
            .unwrap();
        assert_eq!(out, elements);
        assert!(matches!(
            backend.read_dataset(dataset, datatype, &mut [0; 4]),
            Err(BackendError::BufferSize { .. })
        ));
        assert_eq!(backend.dataset_storage_size(dataset).unwrap(), 24);

        let float32 = backend
            .create_type(TypeDescriptor::Numeric {
                tag: StorageTypeTag::Float32,
            })
            .unwrap();
        assert!(matches!(
            backend.read_dataset(dataset, float32, &mut [0; 24]),
            Err(BackendError::TypeConversion { .. })
        ));

        backend.close_type(float32).unwrap();
        backend.close_type(datatype).unwrap();
        backend.close_object(dataset, ObjectKind::Dataset).unwrap();
        backend.unlink(root, "data").unwrap();
        assert!(!backend.exists_as_dataset(root, "data").unwrap());
        backend.close_object(root, ObjectKind::Group).unwrap();
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn store_backend_dataset_chunked_hyperslab() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        let dataset = create_int32_dataset(&backend, root, "data", &[5, 4], Some(&[2, 3]), Some(6));
        let datatype = backend.create_type(int32()).unwrap();

        let space = backend.dataset_space(dataset).unwrap();
        backend.select_hyperslab(space, &[1, 1], &[3, 2]).unwrap();
        let region: Vec<i32> = (1..=6).collect();
        backend
            .write_dataset(dataset, datatype, Some(space), bytemuck::cast_slice(&region))
            .unwrap();
        assert!(backend.select_hyperslab(space, &[4, 0], &[2, 1]).is_err());
        backend.close_space(space).unwrap();

        let mut out = vec![0i32; 20];
        backend
            .read_dataset(dataset, datatype, bytemuck::cast_slice_mut(&mut out))
            .unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0, 0, 0, 0,
            0, 1, 2, 0,
            0, 3, 4, 0,
            0, 5, 6, 0,
            0, 0, 0, 0,
        ];
        assert_eq!(out, expected);

        // 3 x 2 chunk grid
        let keys = backend
            .storage()
            .list_prefix(&data_prefix(&NodePath::new("/data").unwrap()))
            .unwrap();
        assert_eq!(keys.len(), 6);

        backend.close_type(datatype).unwrap();
        backend.close_object(dataset, ObjectKind::Dataset).unwrap();
        backend.close_object(root, ObjectKind::Group).unwrap();
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn store_backend_dataset_properties() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        let datatype = backend.create_type(int32()).unwrap();
        let space = backend.create_simple_space(&[4]).unwrap();
        let properties = backend.create_dataset_properties().unwrap();
        assert!(backend.set_chunk(properties, &[0]).is_err());
        assert!(matches!(
            backend.set_deflate(properties, 10),
            Err(BackendError::CompressionLevel(_))
        ));
        backend.set_deflate(properties, 1).unwrap();
        assert!(backend
            .create_dataset(root, "a", datatype, space, Some(properties))
            .is_err());
        backend.set_chunk(properties, &[8]).unwrap();
        assert!(backend
            .create_dataset(root, "a", datatype, space, Some(properties))
            .is_err());
        assert!(!backend.exists_as_dataset(root, "a").unwrap());
        backend.close_properties(properties).unwrap();
        backend.close_space(space).unwrap();
        backend.close_type(datatype).unwrap();
        backend.close_object(root, ObjectKind::Group).unwrap();
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn store_backend_strings() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        let datatype = backend.create_type(TypeDescriptor::VariableString).unwrap();
        let space = backend.create_simple_space(&[3]).unwrap();
        let dataset = backend
            .create_dataset(root, "strings", datatype, space, None)
            .unwrap();
        for (index, string) in ["a", "bb"].into_iter().enumerate() {
            let file_space = backend.dataset_space(dataset).unwrap();
            backend
                .select_hyperslab(file_space, &[u64::try_from(index).unwrap()], &[1])
                .unwrap();
            backend
                .write_dataset_strings(dataset, datatype, Some(file_space), &[string])
                .unwrap();
            backend.close_space(file_space).unwrap();
        }
        let buffer = backend.read_dataset_strings(dataset, datatype).unwrap();
        assert_eq!(
            backend.vlen_buffer_strings(buffer).unwrap(),
            vec!["a".to_string(), "bb".to_string(), String::new()]
        );
        backend.reclaim_vlen_buffer(buffer).unwrap();
        assert!(backend.vlen_buffer_strings(buffer).is_err());

        let fixed = backend
            .create_type(TypeDescriptor::FixedString { size: 4 })
            .unwrap();
        assert!(matches!(
            backend.read_dataset_strings(dataset, fixed),
            Err(BackendError::TypeConversion { .. })
        ));
        for handle in [fixed, datatype] {
            backend.close_type(handle).unwrap();
        }
        backend.close_space(space).unwrap();
        backend.close_object(dataset, ObjectKind::Dataset).unwrap();
        backend.close_object(root, ObjectKind::Group).unwrap();
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn store_backend_attributes() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let root = backend.open_root().unwrap();
        let datatype = backend.create_type(int32()).unwrap();
        let space = backend.create_simple_space(&[2]).unwrap();
        assert!(!backend.attribute_exists(root, "attr").unwrap());
        let attribute = backend
            .create_attribute(root, "attr", datatype, space)
            .unwrap();
        assert!(backend.attribute_exists(root, "attr").unwrap());
        assert!(matches!(
            backend.create_attribute(root, "attr", datatype, space),
            Err(BackendError::AlreadyExists(_))
        ));
        backend
            .write_attribute(attribute, datatype, bytemuck::cast_slice(&[7i32, 8]))
            .unwrap();
        let mut out = [0i32; 2];
        backend
            .read_attribute(attribute, datatype, bytemuck::cast_slice_mut(&mut out))
            .unwrap();
        assert_eq!(out, [7, 8]);
        let attribute_space = backend.attribute_space(attribute).unwrap();
        assert_eq!(
            backend.space_extent(attribute_space).unwrap(),
            Extent::Simple(vec![2])
        );
        backend.close_space(attribute_space).unwrap();
        backend.close_attribute(attribute).unwrap();
        backend.delete_attribute(root, "attr").unwrap();
        assert!(!backend.attribute_exists(root, "attr").unwrap());
        assert!(matches!(
            backend.delete_attribute(root, "attr"),
            Err(BackendError::NotFound(_))
        ));
        backend.close_space(space).unwrap();
        backend.close_type(datatype).unwrap();
        backend.close_object(root, ObjectKind::Group).unwrap();
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn store_backend_injected_close_fault() {
        let backend = StoreBackend::new(Arc::new(MemoryStore::new()));
        let space = backend.create_scalar_space().unwrap();
        backend.inject_fault(BackendOp::CloseSpace);
        assert!(matches!(
            backend.close_space(space),
            Err(BackendError::Injected(BackendOp::CloseSpace))
        ));
        assert_eq!(backend.open_handle_count(), 0);
        backend.clear_faults();
        assert!(backend.create_scalar_space().is_ok());
    }
}
