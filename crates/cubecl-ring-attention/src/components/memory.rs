use crate::components::ResourceError;

/// Allocates a buffer of `len` copies of `value`, reporting allocation failure instead of aborting.
pub fn try_filled_vec<T: Clone>(
    buffer: &'static str,
    len: usize,
    value: T,
) -> Result<Vec<T>, ResourceError> {
    let mut data = try_with_capacity(buffer, len)?;
    data.resize(len, value);
    Ok(data)
}

/// Allocates an empty buffer able to hold `len` elements without reallocating.
pub fn try_with_capacity<T>(buffer: &'static str, len: usize) -> Result<Vec<T>, ResourceError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| ResourceError::AllocationFailed {
            buffer,
            elements: len,
        })?;
    Ok(data)
}
