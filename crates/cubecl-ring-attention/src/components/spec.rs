use core::fmt::Debug;

use bytemuck::Pod;
use half::{bf16, f16};
use num_traits::Float;

/// Element type that can be stored in an attention input or output tensor.
pub trait AttentionElement: Pod + Send + Sync + Debug + PartialEq + 'static {
    /// Widen the element to `f64`.
    fn to_f64(self) -> f64;
    /// Round an `f64` to the nearest representable element.
    fn from_f64(value: f64) -> Self;
}

impl AttentionElement for f16 {
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }
}

impl AttentionElement for bf16 {
    fn to_f64(self) -> f64 {
        bf16::to_f64(self)
    }

    fn from_f64(value: f64) -> Self {
        bf16::from_f64(value)
    }
}

impl AttentionElement for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl AttentionElement for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Element type of the running max, running sum and weighted output.
pub trait AccumulatorElement: Float + Send + Sync + Debug + 'static {
    fn cast_from<E: AttentionElement>(value: E) -> Self;
    fn cast_into<E: AttentionElement>(self) -> E;
    fn from_scalar(value: f64) -> Self;
    fn to_scalar(self) -> f64;
}

impl AccumulatorElement for f32 {
    fn cast_from<E: AttentionElement>(value: E) -> Self {
        value.to_f64() as f32
    }

    fn cast_into<E: AttentionElement>(self) -> E {
        E::from_f64(self as f64)
    }

    fn from_scalar(value: f64) -> Self {
        value as f32
    }

    fn to_scalar(self) -> f64 {
        self as f64
    }
}

impl AccumulatorElement for f64 {
    fn cast_from<E: AttentionElement>(value: E) -> Self {
        value.to_f64()
    }

    fn cast_into<E: AttentionElement>(self) -> E {
        E::from_f64(self)
    }

    fn from_scalar(value: f64) -> Self {
        value
    }

    fn to_scalar(self) -> f64 {
        self
    }
}

/// Attention precisions.
pub trait AttentionPrecision: Send + Sync + Copy + 'static {
    /// Element type of the query, key and value tensors.
    type EI: AttentionElement;
    /// Element type used to accumulate the running softmax state.
    type EA: AccumulatorElement;
    /// Element type of the output tensor.
    type EO: AttentionElement;
}

impl AttentionPrecision for f16 {
    type EI = f16;
    type EA = f32;
    type EO = f16;
}

impl AttentionPrecision for bf16 {
    type EI = bf16;
    type EA = f32;
    type EO = bf16;
}

impl AttentionPrecision for f32 {
    type EI = f32;
    type EA = f32;
    type EO = f32;
}

impl AttentionPrecision for f64 {
    type EI = f64;
    type EA = f64;
    type EO = f64;
}

impl<EI: AttentionElement, EA: AccumulatorElement, EO: AttentionElement> AttentionPrecision
    for (EI, EA, EO)
{
    type EI = EI;
    type EA = EA;
    type EO = EO;
}
