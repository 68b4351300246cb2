use serde::{Deserialize, Serialize};

/// Memory order of the four logical axes of an attention tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisOrder {
    /// `[batch, heads, seq, head_dim]`
    Bhsd,
    /// `[batch, seq, heads, head_dim]`
    Bshd,
}

/// Maps a logical `(batch, head, position, feature)` coordinate to an element index.
///
/// `shape` and `strides` are always given in logical order, whatever the memory order is:
///
/// ```text
/// index = offset
///       + batch    * strides[0]
///       + head     * strides[1]
///       + position * strides[2]
///       + feature  * strides[3]
/// ```
///
/// Strides are expressed in elements. The offset lets several tensors share one buffer,
/// which is how packed `qkv` and `kv` inputs are described.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TensorLayout {
    pub shape: [usize; 4],
    pub strides: [usize; 4],
    pub offset: usize,
}

impl TensorLayout {
    /// Contiguous layout in the given memory order.
    pub fn contiguous(order: AxisOrder, batch: usize, heads: usize, seq: usize, dim: usize) -> Self {
        let strides = match order {
            AxisOrder::Bhsd => [heads * seq * dim, seq * dim, dim, 1],
            AxisOrder::Bshd => [seq * heads * dim, dim, heads * dim, 1],
        };

        Self {
            shape: [batch, heads, seq, dim],
            strides,
            offset: 0,
        }
    }

    pub fn bhsd(batch: usize, heads: usize, seq: usize, dim: usize) -> Self {
        Self::contiguous(AxisOrder::Bhsd, batch, heads, seq, dim)
    }

    pub fn bshd(batch: usize, heads: usize, seq: usize, dim: usize) -> Self {
        Self::contiguous(AxisOrder::Bshd, batch, heads, seq, dim)
    }

    /// Views of a `(batch, seq, 3, heads, dim)` buffer, in `[query, key, value]` order.
    pub fn qkv_packed(batch: usize, seq: usize, heads: usize, dim: usize) -> [Self; 3] {
        let views = packed_views::<3>(batch, seq, heads, dim);
        [views[0].clone(), views[1].clone(), views[2].clone()]
    }

    /// Views of a `(batch, seq, 2, heads, dim)` buffer, in `[key, value]` order.
    pub fn kv_packed(batch: usize, seq: usize, heads: usize, dim: usize) -> [Self; 2] {
        let views = packed_views::<2>(batch, seq, heads, dim);
        [views[0].clone(), views[1].clone()]
    }

    #[inline]
    pub fn index(&self, batch: usize, head: usize, position: usize, feature: usize) -> usize {
        self.offset
            + batch * self.strides[0]
            + head * self.strides[1]
            + position * self.strides[2]
            + feature * self.strides[3]
    }

    pub fn num_heads(&self) -> usize {
        self.shape[1]
    }

    pub fn seq_len(&self) -> usize {
        self.shape[2]
    }

    /// Number of logical elements.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Memory order of the layout, decided by whether positions or heads are further apart.
    pub fn axis_order(&self) -> AxisOrder {
        if self.strides[2] > self.strides[1] {
            AxisOrder::Bshd
        } else {
            AxisOrder::Bhsd
        }
    }

    /// Minimum buffer length, in elements, for every index of the layout to be in bounds.
    pub fn required_len(&self) -> usize {
        if self.shape.contains(&0) {
            return self.offset;
        }

        self.offset
            + self
                .shape
                .iter()
                .zip(self.strides.iter())
                .map(|(dim, stride)| (dim - 1) * stride)
                .sum::<usize>()
            + 1
    }
}

fn packed_views<const N: usize>(
    batch: usize,
    seq: usize,
    heads: usize,
    dim: usize,
) -> Vec<TensorLayout> {
    let row = heads * dim;

    (0..N)
        .map(|slot| TensorLayout {
            shape: [batch, heads, seq, dim],
            strides: [seq * N * row, dim, N * row, 1],
            offset: slot * row,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bhsd_strides() {
        let layout = TensorLayout::bhsd(2, 3, 4, 5);

        assert_eq!(layout.strides, [60, 20, 5, 1]);
        assert_eq!(layout.index(1, 2, 3, 4), 119);
        assert_eq!(layout.required_len(), 120);
        assert_eq!(layout.axis_order(), AxisOrder::Bhsd);
    }

    #[test]
    fn bshd_strides() {
        let layout = TensorLayout::bshd(2, 3, 4, 5);

        assert_eq!(layout.strides, [60, 5, 15, 1]);
        // position moves by a whole row of heads
        assert_eq!(layout.index(0, 0, 1, 0), 15);
        assert_eq!(layout.index(0, 1, 0, 0), 5);
        assert_eq!(layout.required_len(), 120);
        assert_eq!(layout.axis_order(), AxisOrder::Bshd);
    }

    #[test]
    fn qkv_packed_views_interleave() {
        let [query, key, value] = TensorLayout::qkv_packed(1, 2, 2, 4);

        assert_eq!(query.index(0, 0, 0, 0), 0);
        assert_eq!(key.index(0, 0, 0, 0), 8);
        assert_eq!(value.index(0, 0, 0, 0), 16);
        assert_eq!(query.index(0, 1, 1, 3), 24 + 4 + 3);
        assert_eq!(value.required_len(), 48);
        assert_eq!(query.axis_order(), AxisOrder::Bshd);
    }

    #[test]
    fn kv_packed_views_interleave() {
        let [key, value] = TensorLayout::kv_packed(2, 3, 1, 2);

        assert_eq!(key.index(1, 0, 2, 1), 12 + 8 + 1);
        assert_eq!(value.index(1, 0, 2, 1), 12 + 8 + 2 + 1);
        assert_eq!(value.required_len(), 24);
    }

    #[test]
    fn empty_layout_requires_only_offset() {
        let mut layout = TensorLayout::bhsd(1, 1, 0, 4);
        layout.offset = 7;

        assert_eq!(layout.num_elements(), 0);
        assert_eq!(layout.required_len(), 7);
    }
}
