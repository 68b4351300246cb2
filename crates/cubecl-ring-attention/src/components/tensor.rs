use derive_new::new;

use crate::components::{
    AttentionElement, AttentionIdent, AxisOrder, FormattedConfigError, InvalidConfigError,
    TensorLayout,
};

#[derive(new, Clone, Debug)]
/// Borrowed view over the local chunk of one attention input.
pub struct TensorHandleRef<'a, E> {
    pub data: &'a [E],
    pub layout: TensorLayout,
}

impl<'a, E: AttentionElement> TensorHandleRef<'a, E> {
    /// Contiguous tensor in the given memory order.
    pub fn contiguous(
        data: &'a [E],
        order: AxisOrder,
        batch: usize,
        heads: usize,
        seq: usize,
        dim: usize,
    ) -> Self {
        Self::new(data, TensorLayout::contiguous(order, batch, heads, seq, dim))
    }

    #[inline]
    pub fn get(&self, batch: usize, head: usize, position: usize, feature: usize) -> E {
        self.data[self.layout.index(batch, head, position, feature)]
    }

    /// Checks that the handle describes a `[batch, heads, seq, dim]` tensor backed by enough data.
    pub fn validate(
        &self,
        ident: AttentionIdent,
        shape: [usize; 4],
    ) -> Result<(), InvalidConfigError> {
        let actual = self.layout.shape;
        if actual != shape {
            return Err(FormattedConfigError::new(move || {
                format!("{ident:?} tensor has shape {actual:?} but {shape:?} was expected")
            }));
        }

        let required = self.layout.required_len();
        let len = self.data.len();
        if len < required {
            return Err(FormattedConfigError::new(move || {
                format!("{ident:?} tensor layout needs {required} elements but only {len} are provided")
            }));
        }

        Ok(())
    }
}
