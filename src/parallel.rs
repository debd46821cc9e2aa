//! Parallel/sequential execution helpers.
//!
//! When the `parallel` feature is enabled these use rayon's parallel
//! iterators; otherwise they fall back to standard iterators. Both paths
//! preserve input order, so results are identical either way.
//!
//! Every helper takes a `force_sequential` flag that disables parallelism at
//! runtime even when the feature is compiled in.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Maps `f` over a slice, potentially in parallel.
///
/// Returns results in the same order as the input.
#[inline]
pub fn map_slice<T, F, R>(slice: &[T], f: F, force_sequential: bool) -> Vec<R>
where
    T: Sync,
    F: Fn(&T) -> R + Sync + Send,
    R: Send,
{
    #[cfg(feature = "parallel")]
    {
        if force_sequential {
            slice.iter().map(f).collect()
        } else {
            slice.par_iter().map(f).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = force_sequential;
        slice.iter().map(f).collect()
    }
}

/// Maps `f` over `0..len`, potentially in parallel.
#[inline]
pub fn map_indices<F, R>(len: usize, f: F, force_sequential: bool) -> Vec<R>
where
    F: Fn(usize) -> R + Sync + Send,
    R: Send,
{
    #[cfg(feature = "parallel")]
    {
        if force_sequential {
            (0..len).map(f).collect()
        } else {
            (0..len).into_par_iter().map(f).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = force_sequential;
        (0..len).map(f).collect()
    }
}
