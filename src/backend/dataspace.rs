use serde::{Deserialize, Serialize};

/// Returns the number of elements in `shape`, or [`None`] if the product overflows a [`u64`].
#[must_use]
pub fn checked_num_elements(shape: &[u64]) -> Option<u64> {
    shape
        .iter()
        .try_fold(1u64, |product, &extent| product.checked_mul(extent))
}

/// The extent of a dataspace.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Extent {
    /// A single element with no dimensions.
    Scalar,
    /// A regular N-dimensional extent.
    Simple(Vec<u64>),
}

impl Extent {
    /// Returns the rank (0 for a scalar).
    #[must_use]
    pub fn rank(&self) -> usize {
        match self {
            Self::Scalar => 0,
            Self::Simple(shape) => shape.len(),
        }
    }

    /// Returns the shape (empty for a scalar).
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        match self {
            Self::Scalar => &[],
            Self::Simple(shape) => shape,
        }
    }

    /// Returns the number of elements, saturating at [`u64::MAX`].
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.checked_num_elements().unwrap_or(u64::MAX)
    }

    /// Returns the number of elements, or [`None`] if it overflows a [`u64`].
    #[must_use]
    pub fn checked_num_elements(&self) -> Option<u64> {
        checked_num_elements(self.shape())
    }

    /// Returns the shape of the stored elements, `[1]` for a scalar.
    #[must_use]
    pub fn data_shape(&self) -> Vec<u64> {
        match self {
            Self::Scalar => vec![1],
            Self::Simple(shape) => shape.clone(),
        }
    }
}

/// A hyperslab selection: `count` elements per dimension starting at `offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hyperslab {
    /// The start of the selection.
    pub offset: Vec<u64>,
    /// The number of selected elements per dimension.
    pub count: Vec<u64>,
}

impl Hyperslab {
    /// Returns the number of selected elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        checked_num_elements(&self.count).unwrap_or(u64::MAX)
    }
}

/// A dataspace: an extent and an optional selection.
///
/// Without a selection, every element of the extent is selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataspace {
    /// The extent.
    pub extent: Extent,
    /// The selection.
    pub selection: Option<Hyperslab>,
}

impl Dataspace {
    /// Create a dataspace with every element selected.
    #[must_use]
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            selection: None,
        }
    }

    /// Returns the number of selected elements.
    #[must_use]
    pub fn num_selected(&self) -> u64 {
        self.selection
            .as_ref()
            .map_or_else(|| self.extent.num_elements(), Hyperslab::num_elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent() {
        assert_eq!(Extent::Scalar.rank(), 0);
        assert_eq!(Extent::Scalar.num_elements(), 1);
        assert_eq!(Extent::Scalar.data_shape(), vec![1]);
        let extent = Extent::Simple(vec![4, 3]);
        assert_eq!(extent.rank(), 2);
        assert_eq!(extent.num_elements(), 12);
        assert_eq!(Extent::Simple(vec![4, 0]).num_elements(), 0);
        let huge = Extent::Simple(vec![u64::MAX, 2]);
        assert_eq!(huge.checked_num_elements(), None);
        assert_eq!(huge.num_elements(), u64::MAX);
        assert_eq!(checked_num_elements(&[(1 << 63) + 1, 2]), None);
        assert_eq!(checked_num_elements(&[u64::MAX, 0]), Some(0));
        assert_eq!(serde_json::to_string(&extent).unwrap(), r#"{"simple":[4,3]}"#);
        assert_eq!(serde_json::to_string(&Extent::Scalar).unwrap(), r#""scalar""#);
    }

    #[test]
    fn dataspace_selection() {
        let mut space = Dataspace::new(Extent::Simple(vec![10, 10]));
        assert_eq!(space.num_selected(), 100);
        space.selection = Some(Hyperslab {
            offset: vec![2, 0],
            count: vec![3, 10],
        });
        assert_eq!(space.num_selected(), 30);
    }
}
