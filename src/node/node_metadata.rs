use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    backend::{Extent, ObjectKind},
    chunking::ChunkShape,
    codec::CompressionLevel,
    datatype::TypeDescriptor,
};

/// The attributes of a node, ordered by name.
pub type Attributes = BTreeMap<String, AttributeRecord>;

/// Node metadata ([`GroupMetadata`] or [`DatasetMetadata`]).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodeMetadata {
    /// Group metadata.
    Group(GroupMetadata),
    /// Dataset metadata.
    Dataset(DatasetMetadata),
}

impl NodeMetadata {
    /// Returns the kind of the node.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Group(_) => ObjectKind::Group,
            Self::Dataset(_) => ObjectKind::Dataset,
        }
    }

    /// Returns the attributes of the node.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        match self {
            Self::Group(group) => &group.attributes,
            Self::Dataset(dataset) => &dataset.attributes,
        }
    }

    /// Returns a mutable reference to the attributes of the node.
    #[must_use]
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Self::Group(group) => &mut group.attributes,
            Self::Dataset(dataset) => &mut dataset.attributes,
        }
    }
}

/// Group metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct GroupMetadata {
    /// The group attributes.
    #[serde(default)]
    pub attributes: Attributes,
}

/// Dataset metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DatasetMetadata {
    /// The element type.
    pub datatype: TypeDescriptor,
    /// The extent.
    pub extent: Extent,
    /// The storage layout.
    pub layout: Layout,
    /// The dataset attributes.
    #[serde(default)]
    pub attributes: Attributes,
}

/// The storage layout of a dataset.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layout {
    /// All elements are stored in one value.
    #[default]
    Contiguous,
    /// Elements are split into a regular grid of chunks, each stored in its own value.
    Chunked {
        /// The chunk shape.
        chunk_shape: ChunkShape,
        /// The deflate level applied to each chunk, if compressed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deflate: Option<CompressionLevel>,
    },
}

/// An attribute stored in node metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AttributeRecord {
    /// The element type.
    pub datatype: TypeDescriptor,
    /// The extent.
    pub extent: Extent,
    /// The value.
    pub value: AttributeValue,
}

/// The value of an attribute.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    /// The elements of a numeric or fixed-width string attribute, in native byte order.
    Bytes(Vec<u8>),
    /// The elements of a variable-length string attribute.
    Strings(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::StorageTypeTag;

    #[test]
    fn dataset_metadata_json() {
        let mut metadata = NodeMetadata::Dataset(DatasetMetadata {
            datatype: TypeDescriptor::Numeric {
                tag: StorageTypeTag::Float32,
            },
            extent: Extent::Simple(vec![4, 3]),
            layout: Layout::Chunked {
                chunk_shape: ChunkShape::try_from([2, 3]).unwrap(),
                deflate: Some(CompressionLevel::try_from(5).unwrap()),
            },
            attributes: Attributes::default(),
        });
        metadata.attributes_mut().insert(
            "units".to_string(),
            AttributeRecord {
                datatype: TypeDescriptor::FixedString { size: 3 },
                extent: Extent::Scalar,
                value: AttributeValue::Bytes(b"mm\0".to_vec()),
            },
        );
        let json = serde_json::to_string(&metadata).unwrap();
        let metadata_from_json: NodeMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, metadata_from_json);
        assert_eq!(metadata_from_json.kind(), ObjectKind::Dataset);
        assert_eq!(metadata_from_json.attributes().len(), 1);
    }

    #[test]
    fn group_metadata_json() {
        let metadata: NodeMetadata = serde_json::from_str(r#"{"node_type":"group"}"#).unwrap();
        assert_eq!(metadata, NodeMetadata::Group(GroupMetadata::default()));
        assert_eq!(metadata.kind(), ObjectKind::Group);
    }
}
